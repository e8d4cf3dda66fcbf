use formgate::prelude::*;
use formgate::Rejection;
use serde_json::json;

fn bounded() -> FormConfig {
    FormConfig::new(vec![
        FieldArray::new("items", vec![FieldDeclaration::input("value")])
            .with_min(1)
            .with_max(3)
            .sortable()
            .into(),
    ])
    .unwrap()
}

#[test]
fn count_stays_within_bounds() {
    let mut session = FormEngine::new(bounded()).start().unwrap();
    assert_eq!(session.values(), json!({"items": [{"value": ""}]}));
    assert!(!session.can_remove("items").unwrap());
    assert_eq!(
        session.remove_item("items", 0).unwrap(),
        ArrayOutcome::Rejected(Rejection::AtMinimum)
    );

    for expected in 2..=3 {
        assert_eq!(
            session.append_item("items", None).unwrap(),
            ArrayOutcome::Applied { count: expected }
        );
    }
    assert_eq!(
        session.append_item("items", Some(json!({"value": "x"}))).unwrap(),
        ArrayOutcome::Rejected(Rejection::AtMaximum)
    );
    assert_eq!(session.values()["items"].as_array().unwrap().len(), 3);
}

#[test]
fn item_paths_are_rewritten_after_removal() {
    let mut session = FormEngine::new(bounded())
        .with_values(json!({"items": [{"value": "a"}, {"value": "b"}, {"value": "c"}]}))
        .start()
        .unwrap();
    let keys = session.item_keys("items").unwrap().to_vec();

    session.remove_item("items", 1).unwrap();
    assert_eq!(session.values(), json!({"items": [{"value": "a"}, {"value": "c"}]}));
    assert_eq!(session.item_keys("items").unwrap(), [keys[0], keys[2]]);
    assert!(session.is_visible("items.1.value").unwrap());
    assert_eq!(
        session.registration_state("items.2.value").unwrap(),
        RegistrationState::Unregistered
    );
    assert_eq!(
        session.remove_item("items", 7).unwrap(),
        ArrayOutcome::Rejected(Rejection::IndexOutOfRange)
    );
}

#[test]
fn moving_swaps_values_and_keys() {
    let mut session = FormEngine::new(bounded())
        .with_values(json!({"items": [{"value": "a"}, {"value": "b"}]}))
        .start()
        .unwrap();
    let keys = session.item_keys("items").unwrap().to_vec();
    assert!(session.move_item("items", 0, 1).unwrap().is_applied());
    assert_eq!(session.values(), json!({"items": [{"value": "b"}, {"value": "a"}]}));
    assert_eq!(session.item_keys("items").unwrap(), [keys[1], keys[0]]);
}

#[test]
fn nested_arrays_resolve_per_item() {
    let lines = FieldArray::new(
        "lines",
        vec![
            FieldDeclaration::input("sku"),
            FieldDeclaration::conditional(
                "giftNote",
                Condition::depends_on("gift", true).unwrap(),
                FieldDeclaration::textarea("giftNote"),
            ),
        ],
    );
    let orders = FieldArray::new("orders", vec![lines.into()]);
    let config = FormConfig::new(vec![orders.into()]).unwrap();
    let session = FormEngine::new(config)
        .with_values(json!({
            "orders": [
                {"lines": [{"sku": "a", "gift": true}]},
                {"lines": [{"sku": "b"}, {"sku": "c", "gift": true}]}
            ]
        }))
        .start()
        .unwrap();
    assert!(session.is_visible("orders.0.lines.0.giftNote").unwrap());
    assert!(!session.is_visible("orders.1.lines.0.giftNote").unwrap());
    assert!(session.is_visible("orders.1.lines.1.giftNote").unwrap());
    assert_eq!(session.item_keys("orders.1.lines").unwrap().len(), 2);
}

fn gated_tags(always_registered: bool) -> FormConfig {
    let mut tags = FieldArray::new("tags", vec![FieldDeclaration::input("label")]);
    if always_registered {
        tags = tags.always_registered();
    }
    FormConfig::new(vec![
        FieldDeclaration::checkbox("show"),
        FieldDeclaration::conditional(
            "tagsGate",
            Condition::depends_on("show", true).unwrap(),
            tags.into(),
        ),
    ])
    .unwrap()
}

#[test]
fn gated_always_registered_array_keeps_items_while_hidden() {
    let mut session = FormEngine::new(gated_tags(true))
        .with_values(json!({"show": true, "tags": [{"label": "x"}]}))
        .start()
        .unwrap();
    session.set_value("show", json!(false)).unwrap();

    for path in ["tags", "tags.0.label"] {
        assert!(!session.is_visible(path).unwrap());
        assert_eq!(
            session.registration_state(path).unwrap(),
            RegistrationState::RegisteredHidden
        );
    }
    assert_eq!(
        session.values(),
        json!({"show": false, "tags": [{"label": "x"}]})
    );

    session.set_value("show", json!(true)).unwrap();
    assert_eq!(
        session.registration_state("tags.0.label").unwrap(),
        RegistrationState::RegisteredVisible
    );
    assert_eq!(session.value("tags.0.label").unwrap(), Some(json!("x")));
}

#[test]
fn gated_array_without_flag_is_dropped_when_hidden() {
    let mut session = FormEngine::new(gated_tags(false))
        .with_values(json!({"show": true, "tags": [{"label": "x"}]}))
        .start()
        .unwrap();
    session.set_value("show", json!(false)).unwrap();

    for path in ["tags", "tags.0.label"] {
        assert_eq!(
            session.registration_state(path).unwrap(),
            RegistrationState::Unregistered
        );
    }
    assert_eq!(session.values(), json!({"show": false}));
}
