use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use assert_cmd::cargo::{self};
use predicates::prelude::*;
use predicates::str::contains;
use serde_json::Value;

const SLOTS_FORM: &str = r#"{
    "fields": [
        {
            "type": "fieldArray",
            "name": "slots",
            "max": 2,
            "fields": [
                {"type": "select", "name": "slotType"},
                {
                    "type": "conditional",
                    "name": "staticQuestionId",
                    "dependsOn": "slotType",
                    "dependsOnValue": "STATIC",
                    "field": {"type": "input", "name": "staticQuestionId"}
                }
            ]
        }
    ]
}"#;

fn temp_file(name: &str, contents: &str) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let path = std::env::temp_dir().join(format!("formgate-cli-{stamp}-{name}"));
    fs::write(&path, contents).unwrap();
    path
}

fn run_json(args: &[&str]) -> Value {
    let mut cmd = cargo::cargo_bin_cmd!("formgate");
    let output = cmd.args(args).assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

#[test]
fn resolves_form_from_file() {
    let form = temp_file("slots.json", SLOTS_FORM);
    let form_arg = form.to_string_lossy().to_string();
    let snapshot = run_json(&[
        "--form",
        &form_arg,
        "--append",
        "slots",
        "--set",
        "slots.0.slotType=\"STATIC\"",
    ]);
    let _ = fs::remove_file(&form);

    let paths: Vec<&str> = snapshot["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["path"].as_str().unwrap())
        .collect();
    assert_eq!(paths, ["slots", "slots.0.slotType", "slots.0.staticQuestionId"]);
    assert_eq!(snapshot["fields"][2]["visible"], Value::Bool(true));
    assert_eq!(
        snapshot["values"],
        serde_json::json!({"slots": [{"slotType": "STATIC", "staticQuestionId": ""}]})
    );
}

#[test]
fn hiding_a_field_drops_its_value() {
    let snapshot = run_json(&[
        "--form",
        SLOTS_FORM,
        "--values",
        r#"{"slots": [{"slotType": "STATIC", "staticQuestionId": "q1"}]}"#,
        "--set",
        "slots.0.slotType=DYNAMIC",
        "--no-pretty",
    ]);
    assert_eq!(
        snapshot["values"],
        serde_json::json!({"slots": [{"slotType": "DYNAMIC"}]})
    );
    assert_eq!(snapshot["fields"][2]["registration"], "unregistered");
}

#[test]
fn rejected_append_is_reported() {
    let mut cmd = cargo::cargo_bin_cmd!("formgate");
    cmd.args([
        "--form",
        SLOTS_FORM,
        "--append",
        "slots",
        "--append",
        "slots",
        "--append",
        "slots",
        "--output",
        "table",
    ])
    .assert()
    .success()
    .stderr(contains("cannot append to 'slots'"))
    .stdout(contains("slots.1.slotType").and(contains("slots.2").not()));
}

#[test]
fn failed_validation_exits_nonzero() {
    let schema = r#"{"type": "object", "required": ["owner"]}"#;
    let mut cmd = cargo::cargo_bin_cmd!("formgate");
    cmd.args(["--form", SLOTS_FORM, "--schema", schema, "--output", "table"])
        .assert()
        .failure()
        .stdout(contains("validation: 1 issue(s)"))
        .stderr(contains("validation failed"));
}

#[test]
fn invalid_declarations_fail() {
    let form = r#"[{"type": "conditional", "name": "x", "field": {"type": "input", "name": "x"}}]"#;
    let mut cmd = cargo::cargo_bin_cmd!("formgate");
    cmd.args(["--form", form])
        .assert()
        .failure()
        .stderr(contains("invalid form declaration"));
}
