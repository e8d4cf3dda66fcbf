use std::fmt;
use std::sync::{Arc, OnceLock};

use anyhow::Result;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{config::ConfigError, path::FieldPath};

type PredicateFn = dyn Fn(&Value) -> Result<bool> + Send + Sync;

/// User supplied visibility predicate.
///
/// The closure receives the values of the scope it is declared in: the form
/// root for top-level declarations, the item object for field-array templates.
/// Fields that were never touched are simply absent from that value.
#[derive(Clone)]
pub struct Predicate {
    label: Option<String>,
    func: Arc<PredicateFn>,
}

impl Predicate {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            label: None,
            func: Arc::new(move |values: &Value| -> Result<bool> { Ok(func(values)) }),
        }
    }

    /// A predicate that may fail; failures hide the gated fields.
    pub fn fallible<F>(func: F) -> Self
    where
        F: Fn(&Value) -> Result<bool> + Send + Sync + 'static,
    {
        Self {
            label: None,
            func: Arc::new(func),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub(crate) fn call(&self, values: &Value) -> Result<bool> {
        (self.func)(values)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Visibility gate of a conditional field or dynamic section.
///
/// Every form that is present must hold. At least one is required.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<FieldPath>,
    /// Compared with strict equality; omitted means `null`.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub depends_on_value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Rule>,
    #[serde(skip)]
    pub predicate: Option<Predicate>,
}

impl Condition {
    /// `dependsOn` / `dependsOnValue` shorthand.
    pub fn depends_on(path: &str, value: impl Into<Value>) -> Result<Self, ConfigError> {
        Ok(Self {
            depends_on: Some(FieldPath::parse(path)?),
            depends_on_value: value.into(),
            ..Self::default()
        })
    }

    pub fn when<F>(func: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self::predicate(Predicate::new(func))
    }

    pub fn predicate(predicate: Predicate) -> Self {
        Self {
            predicate: Some(predicate),
            ..Self::default()
        }
    }

    pub fn rule(rule: Rule) -> Self {
        Self {
            when: Some(rule),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.depends_on.is_none() && self.when.is_none() && self.predicate.is_none()
    }
}

/// Declarative predicate that survives serialization.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Rule {
    Equals {
        path: FieldPath,
        value: Value,
    },
    NotEquals {
        path: FieldPath,
        value: Value,
    },
    In {
        path: FieldPath,
        values: Vec<Value>,
    },
    Present {
        path: FieldPath,
    },
    Truthy {
        path: FieldPath,
    },
    Matches {
        path: FieldPath,
        pattern: String,
        #[serde(skip)]
        #[schemars(skip)]
        compiled: Arc<OnceLock<Regex>>,
    },
    All {
        rules: Vec<Rule>,
    },
    Any {
        rules: Vec<Rule>,
    },
    Not {
        rule: Box<Rule>,
    },
}

impl Rule {
    pub fn equals(path: &str, value: impl Into<Value>) -> Result<Self, ConfigError> {
        Ok(Rule::Equals {
            path: FieldPath::parse(path)?,
            value: value.into(),
        })
    }

    pub fn truthy(path: &str) -> Result<Self, ConfigError> {
        Ok(Rule::Truthy {
            path: FieldPath::parse(path)?,
        })
    }

    pub fn matches(path: &str, pattern: impl Into<String>) -> Result<Self, ConfigError> {
        let rule = Rule::Matches {
            path: FieldPath::parse(path)?,
            pattern: pattern.into(),
            compiled: Arc::default(),
        };
        rule.check()?;
        Ok(rule)
    }

    /// Eagerly compile every regex in the tree.
    pub(crate) fn check(&self) -> Result<(), ConfigError> {
        match self {
            Rule::Matches {
                pattern, compiled, ..
            } => {
                if compiled.get().is_none() {
                    let regex = Regex::new(pattern).map_err(|err| ConfigError::InvalidPattern {
                        pattern: pattern.clone(),
                        message: err.to_string(),
                    })?;
                    let _ = compiled.set(regex);
                }
                Ok(())
            }
            Rule::All { rules } | Rule::Any { rules } => rules.iter().try_for_each(Rule::check),
            Rule::Not { rule } => rule.check(),
            _ => Ok(()),
        }
    }

    pub fn evaluate(&self, scope: &Value) -> bool {
        match self {
            Rule::Equals { path, value } => {
                path.lookup(scope).is_some_and(|found| strict_equals(found, value))
            }
            Rule::NotEquals { path, value } => {
                !path.lookup(scope).is_some_and(|found| strict_equals(found, value))
            }
            Rule::In { path, values } => path
                .lookup(scope)
                .is_some_and(|found| values.iter().any(|value| strict_equals(found, value))),
            Rule::Present { path } => path.lookup(scope).is_some_and(|found| !found.is_null()),
            Rule::Truthy { path } => path.lookup(scope).is_some_and(is_truthy),
            Rule::Matches {
                path,
                pattern,
                compiled,
            } => {
                let Some(Value::String(text)) = path.lookup(scope) else {
                    return false;
                };
                let regex = match compiled.get() {
                    Some(regex) => regex,
                    None => match Regex::new(pattern) {
                        Ok(regex) => compiled.get_or_init(|| regex),
                        Err(_) => return false,
                    },
                };
                regex.is_match(text)
            }
            Rule::All { rules } => rules.iter().all(|rule| rule.evaluate(scope)),
            Rule::Any { rules } => rules.iter().any(|rule| rule.evaluate(scope)),
            Rule::Not { rule } => !rule.evaluate(scope),
        }
    }
}

/// Strict equality over JSON values.
///
/// Primitives compare by value (numbers numerically, so `1` equals `1.0`).
/// Objects and arrays compare by identity, so a configured object never equals
/// a stored one.
pub fn strict_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                a == b
            } else if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
                a == b
            } else {
                match (a.as_f64(), b.as_f64()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            }
        }
        _ => false,
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(num) => num.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
