use formgate::prelude::*;
use serde_json::{Value, json};

fn slots_form(always_registered: bool) -> FormConfig {
    let mut slots = FieldArray::new(
        "slots",
        vec![
            FieldDeclaration::select("slotType", ["STATIC", "DYNAMIC"]),
            FieldDeclaration::conditional(
                "staticQuestionId",
                Condition::when(|item| item.get("slotType").and_then(Value::as_str) == Some("STATIC")),
                FieldDeclaration::input("staticQuestionId"),
            ),
        ],
    )
    .with_max(2);
    if always_registered {
        slots = slots.always_registered();
    }
    FormConfig::new(vec![slots.into()]).unwrap()
}

fn leaves(session: &FormSession) -> Vec<(String, bool)> {
    session
        .resolution()
        .unwrap()
        .leaves()
        .into_iter()
        .collect()
}

#[test]
fn slots_walkthrough() {
    let mut session = FormEngine::new(slots_form(false)).start().unwrap();
    assert!(leaves(&session).is_empty());
    assert!(session.can_append("slots").unwrap());

    let outcome = session.append_item("slots", None).unwrap();
    assert_eq!(outcome, ArrayOutcome::Applied { count: 1 });
    session.set_value("slots.0.slotType", json!("STATIC")).unwrap();
    assert_eq!(
        leaves(&session),
        [
            ("slots.0.slotType".to_string(), true),
            ("slots.0.staticQuestionId".to_string(), true),
        ]
    );
    assert_eq!(
        session.registration_state("slots.0.staticQuestionId").unwrap(),
        RegistrationState::RegisteredVisible
    );

    session
        .set_value("slots.0.staticQuestionId", json!("q-17"))
        .unwrap();
    session.set_value("slots.0.slotType", json!("DYNAMIC")).unwrap();
    assert!(!session.is_visible("slots.0.staticQuestionId").unwrap());
    assert_eq!(
        session.registration_state("slots.0.staticQuestionId").unwrap(),
        RegistrationState::Unregistered
    );
    assert_eq!(session.value("slots.0.staticQuestionId").unwrap(), None);

    session.append_item("slots", None).unwrap();
    assert!(!session.can_append("slots").unwrap());
    let outcome = session.append_item("slots", None).unwrap();
    assert!(!outcome.is_applied());
    assert_eq!(session.values()["slots"].as_array().unwrap().len(), 2);
}

#[test]
fn always_registered_keeps_hidden_registration() {
    let mut session = FormEngine::new(slots_form(true))
        .with_values(json!({"slots": [{"slotType": "STATIC", "staticQuestionId": "q-1"}]}))
        .start()
        .unwrap();
    session.set_value("slots.0.slotType", json!("DYNAMIC")).unwrap();

    assert_eq!(
        session.registration_state("slots.0.staticQuestionId").unwrap(),
        RegistrationState::RegisteredHidden
    );
    assert_eq!(
        session.value("slots.0.staticQuestionId").unwrap(),
        Some(json!("q-1"))
    );
    assert_eq!(
        session.submission_values().unwrap(),
        json!({"slots": [{"slotType": "DYNAMIC"}]})
    );
}

#[test]
fn hidden_fields_without_flag_are_unregistered() {
    let mut session = FormEngine::new(slots_form(false))
        .with_values(json!({"slots": [{"slotType": "STATIC", "staticQuestionId": "q-1"}]}))
        .start()
        .unwrap();
    let report = session
        .set_value("slots.0.slotType", json!("DYNAMIC"))
        .unwrap()
        .clone();
    assert_eq!(report.unregistered.len(), 1);
    assert_eq!(report.unregistered[0].to_string(), "slots.0.staticQuestionId");
    assert_eq!(session.values(), json!({"slots": [{"slotType": "DYNAMIC"}]}));
}
