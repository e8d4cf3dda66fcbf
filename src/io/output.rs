use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

use super::DocumentFormat;
use crate::{
    form::{EngineError, FormStore, ResolvedKind, SchemaValidator, ValidationReport},
    runtime::FormSession,
};

/// Destination for serialized output values.
#[derive(Debug, Clone)]
pub enum OutputDestination {
    Stdout,
    File(PathBuf),
}

impl OutputDestination {
    pub fn file(path: impl AsRef<Path>) -> Self {
        OutputDestination::File(path.as_ref().to_path_buf())
    }
}

/// Controls how a snapshot is serialized.
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub format: DocumentFormat,
    pub pretty: bool,
    pub destinations: Vec<OutputDestination>,
}

impl OutputOptions {
    pub fn new(format: DocumentFormat) -> Self {
        Self {
            format,
            pretty: true,
            destinations: vec![OutputDestination::Stdout],
        }
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn with_destinations(mut self, destinations: Vec<OutputDestination>) -> Self {
        self.destinations = destinations;
        self
    }
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self::new(DocumentFormat::Json)
    }
}

/// One resolved field as shown to a caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldRow {
    pub path: String,
    pub kind: String,
    pub visible: bool,
    pub registration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Resolution, registration and values of a session at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub fields: Vec<FieldRow>,
    pub values: Value,
    pub submission: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
}

impl SessionSnapshot {
    pub fn capture<S: FormStore>(
        session: &FormSession<S>,
        validator: Option<&SchemaValidator>,
    ) -> Result<Self, EngineError> {
        let values = session.values();
        let resolution = session.resolution()?;
        let fields = resolution
            .iter()
            .map(|entry| -> Result<FieldRow, EngineError> {
                let kind = match entry.kind {
                    ResolvedKind::Array => "fieldArray",
                    ResolvedKind::Leaf => entry.declaration.kind().as_str(),
                };
                let registration = session.registration_state(&entry.path.to_string())?;
                Ok(FieldRow {
                    path: entry.path.to_string(),
                    kind: kind.to_string(),
                    visible: entry.visible,
                    registration: registration.to_string(),
                    value: entry.path.lookup(&values).cloned(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let validation = match validator {
            Some(validator) => Some(session.validate(validator)?),
            None => None,
        };
        Ok(Self {
            fields,
            submission: session.submission_values()?,
            values,
            validation,
        })
    }

    /// Plain-text table of the resolved fields followed by any validation issues.
    pub fn render_table(&self) -> String {
        const HEADERS: [&str; 5] = ["PATH", "KIND", "VISIBLE", "STATE", "VALUE"];
        let rows: Vec<[String; 5]> = self
            .fields
            .iter()
            .map(|row| {
                [
                    row.path.clone(),
                    row.kind.clone(),
                    if row.visible { "yes" } else { "no" }.to_string(),
                    row.registration.clone(),
                    row.value
                        .as_ref()
                        .map(Value::to_string)
                        .unwrap_or_else(|| "-".to_string()),
                ]
            })
            .collect();

        let mut widths = HEADERS.map(|header| header.chars().count());
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut out = String::new();
        push_row(&mut out, &HEADERS.map(str::to_string), &widths);
        for row in &rows {
            push_row(&mut out, row, &widths);
        }
        if let Some(report) = &self.validation {
            if report.success {
                out.push_str("\nvalidation: ok\n");
            } else {
                let _ = writeln!(out, "\nvalidation: {} issue(s)", report.issue_count());
                for (path, messages) in &report.errors {
                    for message in messages {
                        let _ = writeln!(out, "  {path}: {message}");
                    }
                }
                for message in &report.global {
                    let _ = writeln!(out, "  {message}");
                }
            }
        }
        out
    }
}

fn push_row(out: &mut String, cells: &[String; 5], widths: &[usize; 5]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    out.push_str(line.trim_end());
    out.push('\n');
}

/// Serialize and write `value` according to the configured format and destinations.
pub fn emit(value: &Value, options: &OutputOptions) -> Result<()> {
    if options.destinations.is_empty() {
        return Ok(());
    }
    let payload = serialize_value(value, options)?;
    emit_text(&payload, &options.destinations)
}

/// Write an already rendered payload to every destination.
pub fn emit_text(payload: &str, destinations: &[OutputDestination]) -> Result<()> {
    for destination in destinations {
        write_payload(destination, payload).with_context(|| match destination {
            OutputDestination::Stdout => "failed to write to stdout".to_string(),
            OutputDestination::File(path) => {
                format!("failed to write to file {}", path.display())
            }
        })?;
    }
    Ok(())
}

fn serialize_value(value: &Value, options: &OutputOptions) -> Result<String> {
    match options.format {
        DocumentFormat::Json => {
            if options.pretty {
                serde_json::to_string_pretty(value).context("failed to serialize JSON")
            } else {
                serde_json::to_string(value).context("failed to serialize JSON")
            }
        }
        #[cfg(feature = "yaml")]
        DocumentFormat::Yaml => serde_yaml::to_string(value).context("failed to serialize YAML"),
        #[cfg(feature = "toml")]
        DocumentFormat::Toml => {
            if options.pretty {
                toml::to_string_pretty(value).context("failed to serialize TOML")
            } else {
                toml::to_string(value).context("failed to serialize TOML")
            }
        }
    }
}

fn write_payload(destination: &OutputDestination, payload: &str) -> Result<()> {
    match destination {
        OutputDestination::Stdout => {
            let mut stdout = io::stdout();
            stdout
                .write_all(payload.as_bytes())
                .and_then(|_| {
                    if payload.ends_with('\n') {
                        Ok(())
                    } else {
                        stdout.write_all(b"\n")
                    }
                })
                .context("failed to write stdout")?;
            stdout.flush().context("failed to flush stdout")
        }
        OutputDestination::File(path) => {
            let mut file = File::create(path)?;
            file.write_all(payload.as_bytes())?;
            if !payload.ends_with('\n') {
                file.write_all(b"\n")?;
            }
            file.flush()?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Condition, FieldDeclaration, FormConfig};
    use crate::runtime::FormEngine;
    use serde_json::json;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn session() -> FormSession {
        let config = FormConfig::new(vec![
            FieldDeclaration::checkbox("hasPhone"),
            FieldDeclaration::conditional(
                "phone",
                Condition::depends_on("hasPhone", true).unwrap(),
                FieldDeclaration::input("phone"),
            ),
        ])
        .unwrap();
        FormEngine::new(config).start().unwrap()
    }

    #[test]
    fn snapshot_lists_hidden_fields() {
        let snapshot = SessionSnapshot::capture(&session(), None).unwrap();
        assert_eq!(snapshot.fields.len(), 2);
        assert_eq!(
            snapshot.fields[1],
            FieldRow {
                path: "phone".into(),
                kind: "input".into(),
                visible: false,
                registration: "unregistered".into(),
                value: None,
            }
        );
        assert_eq!(snapshot.submission, json!({"hasPhone": false}));
    }

    #[test]
    fn table_aligns_columns() {
        let table = SessionSnapshot::capture(&session(), None)
            .unwrap()
            .render_table();
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[0].starts_with("PATH"));
        assert!(lines[1].starts_with("hasPhone  checkbox  yes"));
        assert!(lines[2].starts_with("phone     input     no"));
    }

    #[test]
    fn table_reports_validation() {
        let validator = SchemaValidator::new(&json!({"required": ["owner"]})).unwrap();
        let table = SessionSnapshot::capture(&session(), Some(&validator))
            .unwrap()
            .render_table();
        assert!(table.contains("validation: 1 issue(s)"));
    }

    #[test]
    fn writes_to_stdout_noop_when_not_configured() {
        let options = OutputOptions::default().with_destinations(Vec::new());
        emit(&json!({"ok": true}), &options).unwrap();
    }

    #[test]
    fn writes_to_file_destination() {
        let dir = std::env::temp_dir();
        let filename = format!(
            "formgate-test-{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        );
        let path = dir.join(filename);
        let options = OutputOptions::default()
            .with_pretty(false)
            .with_destinations(vec![OutputDestination::file(&path)]);
        emit(&json!({"ok": true}), &options).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "{\"ok\":true}\n");
        let _ = fs::remove_file(path);
    }
}
