use std::fmt;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use jsonschema::{Validator, validator_for};
use serde::Serialize;
use serde_json::Value;

use crate::domain::FieldPath;

use super::resolution::{ResolvedField, VisibilityResolution};

/// Schema errors grouped by owning field path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub success: bool,
    pub errors: IndexMap<String, Vec<String>>,
    /// Errors no declared field owns, prefixed with their pointer.
    pub global: Vec<String>,
}

impl ValidationReport {
    pub fn issue_count(&self) -> usize {
        self.errors.values().map(Vec::len).sum::<usize>() + self.global.len()
    }
}

pub struct SchemaValidator {
    validator: Validator,
}

impl fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaValidator").finish_non_exhaustive()
    }
}

impl SchemaValidator {
    pub fn new(schema: &Value) -> Result<Self> {
        let validator = validator_for(schema).context("failed to compile JSON schema")?;
        Ok(Self { validator })
    }

    /// Validate `values`, dropping errors that belong to hidden fields.
    pub fn validate(
        &self,
        values: &Value,
        resolution: &VisibilityResolution<'_>,
    ) -> ValidationReport {
        let collapsed = resolution.collapsed();
        let mut report = ValidationReport::default();
        for error in self.validator.iter_errors(values) {
            let pointer = error.instance_path.to_string();
            let message = error.to_string();
            let location = FieldPath::from_pointer(&pointer);
            match owner(&collapsed, &location) {
                Some(entry) if !entry.visible => continue,
                Some(entry) => report
                    .errors
                    .entry(entry.path.to_string())
                    .or_default()
                    .push(message),
                None => {
                    let prefix = if pointer.is_empty() {
                        "<root>".to_string()
                    } else {
                        pointer
                    };
                    report.global.push(format!("{prefix}: {message}"));
                }
            }
        }
        report.success = report.errors.is_empty() && report.global.is_empty();
        report
    }
}

// Deepest resolved entry at or above `location`.
fn owner<'r, 'a>(
    collapsed: &IndexMap<&FieldPath, &'r ResolvedField<'a>>,
    location: &FieldPath,
) -> Option<&'r ResolvedField<'a>> {
    let mut candidate = Some(location.clone());
    while let Some(path) = candidate {
        if path.is_root() {
            return None;
        }
        if let Some(entry) = collapsed.get(&path) {
            return Some(*entry);
        }
        candidate = path.parent();
    }
    None
}
