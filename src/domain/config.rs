use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

use super::{
    condition::Condition,
    declaration::FieldDeclaration,
    path::FieldPath,
};

/// Programming mistakes in a form declaration, reported before any resolution.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("field name must not be empty")]
    EmptyName,

    #[error("malformed field path '{path}'")]
    MalformedPath { path: String },

    #[error("'{name}' declares no condition, dependsOn or rule")]
    MissingCondition { name: String },

    #[error("field array '{name}' has min {min} greater than max {max}")]
    InvalidBounds { name: String, min: usize, max: usize },

    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("'{path}' is declared more than once in the same scope")]
    DuplicateName { path: String },

    #[error("invalid field declarations: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Validated, immutable field declaration tree of one form.
#[derive(Debug, Clone)]
pub struct FormConfig {
    fields: Arc<[FieldDeclaration]>,
}

impl FormConfig {
    pub fn new(fields: Vec<FieldDeclaration>) -> Result<Self, ConfigError> {
        validate_scope(&fields)?;
        Ok(Self {
            fields: fields.into(),
        })
    }

    /// Accepts either a bare declaration array or an object with a `fields` array.
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let fields = match value {
            Value::Object(map) if map.contains_key("fields") => map["fields"].clone(),
            other => other.clone(),
        };
        let fields: Vec<FieldDeclaration> = serde_json::from_value(fields)?;
        Self::new(fields)
    }

    pub fn fields(&self) -> &[FieldDeclaration] {
        &self.fields
    }
}

fn validate_scope(fields: &[FieldDeclaration]) -> Result<(), ConfigError> {
    let mut seen: IndexMap<FieldPath, bool> = IndexMap::new();
    collect_scope(fields, false, &mut seen)
}

/// Walk one storage scope. Conditionals and sections share the scope of their
/// parent; array templates open a new one.
fn collect_scope(
    fields: &[FieldDeclaration],
    gated: bool,
    seen: &mut IndexMap<FieldPath, bool>,
) -> Result<(), ConfigError> {
    for field in fields {
        match field {
            FieldDeclaration::Conditional(conditional) => {
                check_group(&conditional.name, &conditional.condition)?;
                collect_scope(field.children(), true, seen)?;
            }
            FieldDeclaration::DynamicSection(section) => {
                check_group(&section.name, &section.condition)?;
                collect_scope(&section.fields, true, seen)?;
            }
            FieldDeclaration::FieldArray(array) => {
                let path = FieldPath::parse(&array.name)?;
                if let Some(max) = array.max
                    && array.min > max
                {
                    return Err(ConfigError::InvalidBounds {
                        name: array.name.clone(),
                        min: array.min,
                        max,
                    });
                }
                record(path, gated, seen)?;
                validate_scope(&array.fields)?;
            }
            leaf => {
                let path = FieldPath::parse(leaf.name())?;
                record(path, gated, seen)?;
            }
        }
    }
    Ok(())
}

fn check_group(name: &str, condition: &Condition) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::EmptyName);
    }
    if condition.is_empty() {
        return Err(ConfigError::MissingCondition {
            name: name.to_string(),
        });
    }
    if let Some(rule) = &condition.when {
        rule.check()?;
    }
    Ok(())
}

// Two gated declarations may share a path (mutually exclusive branches); the
// resolver rejects them only if both end up visible.
fn record(
    path: FieldPath,
    gated: bool,
    seen: &mut IndexMap<FieldPath, bool>,
) -> Result<(), ConfigError> {
    match seen.get(&path) {
        Some(previous_gated) if !previous_gated && !gated => Err(ConfigError::DuplicateName {
            path: path.to_string(),
        }),
        Some(_) => Ok(()),
        None => {
            seen.insert(path, gated);
            Ok(())
        }
    }
}
