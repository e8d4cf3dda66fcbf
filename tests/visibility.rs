use formgate::prelude::*;
use formgate::{EngineError, Rule, resolve};
use formgate::form::ResolveError;
use serde_json::json;

fn phone_form() -> FormConfig {
    FormConfig::new(vec![
        FieldDeclaration::checkbox("hasPhone"),
        FieldDeclaration::conditional(
            "phone",
            Condition::depends_on("hasPhone", true).unwrap(),
            FieldDeclaration::input("phone"),
        ),
    ])
    .unwrap()
}

#[test]
fn depends_on_is_strict() {
    let config = phone_form();
    for (value, visible) in [
        (json!(true), true),
        (json!("true"), false),
        (json!(1), false),
        (json!(null), false),
    ] {
        let resolution = resolve(&config, &json!({"hasPhone": value})).unwrap();
        assert_eq!(resolution.leaves()["phone"], visible, "hasPhone = {value}");
    }
}

#[test]
fn resolution_is_pure() {
    let config = phone_form();
    let values = json!({"hasPhone": true, "phone": "555"});
    let first = resolve(&config, &values).unwrap().leaves();
    let second = resolve(&config, &values).unwrap().leaves();
    assert_eq!(first, second);
    assert_eq!(values, json!({"hasPhone": true, "phone": "555"}));
}

#[test]
fn toggling_restores_defaults_not_old_values() {
    let mut session = FormEngine::new(phone_form()).start().unwrap();
    session.set_value("hasPhone", json!(true)).unwrap();
    session.set_value("phone", json!("555")).unwrap();
    session.set_value("hasPhone", json!(false)).unwrap();
    session.set_value("hasPhone", json!(true)).unwrap();
    assert_eq!(session.value("phone").unwrap(), Some(json!("")));
}

#[test]
fn kept_hidden_values_come_back() {
    let options = SessionOptions::default().with_discard_hidden_values(false);
    let mut session = FormEngine::new(phone_form())
        .with_options(options)
        .with_values(json!({"hasPhone": true, "phone": "555"}))
        .start()
        .unwrap();
    session.set_value("hasPhone", json!(false)).unwrap();
    assert_eq!(
        session.registration_state("phone").unwrap(),
        RegistrationState::Unregistered
    );
    session.set_value("hasPhone", json!(true)).unwrap();
    assert_eq!(session.value("phone").unwrap(), Some(json!("555")));
}

#[test]
fn sections_hide_as_a_unit() {
    let config = FormConfig::new(vec![
        FieldDeclaration::select("db", ["sqlite", "postgres"]),
        FieldDeclaration::dynamic_section(
            "connection",
            Condition::rule(Rule::equals("db", "postgres").unwrap()),
            vec![
                FieldDeclaration::input("host"),
                FieldDeclaration::input("port").with_default(5432),
            ],
        ),
    ])
    .unwrap();
    let mut session = FormEngine::new(config).start().unwrap();
    assert!(!session.is_visible("host").unwrap());
    session.set_value("db", json!("postgres")).unwrap();
    assert_eq!(
        session.values(),
        json!({"db": "postgres", "host": "", "port": 5432})
    );
    session.set_value("db", json!("sqlite")).unwrap();
    assert_eq!(session.values(), json!({"db": "sqlite"}));
}

#[test]
fn visible_collisions_surface_as_errors() {
    let config = FormConfig::new(vec![
        FieldDeclaration::conditional(
            "a",
            Condition::depends_on("mode", "x").unwrap(),
            FieldDeclaration::input("target"),
        ),
        FieldDeclaration::conditional(
            "b",
            Condition::when(|_| true),
            FieldDeclaration::input("target"),
        ),
    ])
    .unwrap();
    let mut session = FormEngine::new(config).start().unwrap();
    let err = session.set_value("mode", json!("x")).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Resolve(ResolveError::PathCollision { .. })
    ));
}

#[test]
fn teardown_stops_the_session() {
    let session = FormEngine::new(phone_form()).start().unwrap();
    let store = session.teardown();
    assert!(store.registered_paths().is_empty());
    assert_eq!(store.into_value(), json!({"hasPhone": false}));
}
