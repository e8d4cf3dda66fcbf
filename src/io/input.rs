use anyhow::{Context, Result};
use schemars::schema_for;
use serde_json::Value;

use super::DocumentFormat;
use crate::domain::{FieldDeclaration, FormConfig};

/// Parse structured data in any supported format into a `serde_json::Value`.
pub fn parse_document_str(contents: &str, format: DocumentFormat) -> Result<Value> {
    match format {
        DocumentFormat::Json => {
            serde_json::from_str::<Value>(contents).with_context(|| "failed to parse JSON document")
        }
        #[cfg(feature = "yaml")]
        DocumentFormat::Yaml => {
            serde_yaml::from_str::<Value>(contents).with_context(|| "failed to parse YAML document")
        }
        #[cfg(feature = "toml")]
        DocumentFormat::Toml => contents
            .parse::<toml::Value>()
            .with_context(|| "failed to parse TOML document")
            .and_then(|value| {
                serde_json::to_value(value).context("failed to convert TOML to JSON")
            }),
    }
}

/// Parse and validate a declaration document.
///
/// The document is either a bare array of declarations or an object with a
/// `fields` array.
pub fn load_form_config(contents: &str, format: DocumentFormat) -> Result<FormConfig> {
    let document = parse_document_str(contents, format)?;
    FormConfig::from_value(&document).context("invalid form declaration")
}

/// JSON Schema describing declaration documents.
pub fn declaration_schema() -> Value {
    let schema = schema_for!(Vec<FieldDeclaration>);
    serde_json::to_value(schema).unwrap_or(Value::Null)
}
