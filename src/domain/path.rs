//! Dot-delimited field paths.
//!
//! A path such as `slots.0.slotType` addresses a location in the form values.
//! Numeric segments index into arrays when the value at that point is an
//! array, and act as plain object keys otherwise.

use std::fmt;
use std::str::FromStr;

use schemars::{JsonSchema, r#gen::SchemaGenerator, schema::Schema};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::config::ConfigError;

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// The empty path, addressing the scope root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a dotted path. Empty segments are rejected.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        if raw.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        let mut segments = Vec::new();
        for segment in raw.split('.') {
            if segment.is_empty() {
                return Err(ConfigError::MalformedPath {
                    path: raw.to_string(),
                });
            }
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<FieldPath> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Append every segment of `other` to this path.
    pub fn join(&self, other: &FieldPath) -> FieldPath {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    pub fn child(&self, key: impl Into<String>) -> FieldPath {
        let mut segments = self.segments.clone();
        segments.push(key.into());
        Self { segments }
    }

    pub fn index(&self, index: usize) -> FieldPath {
        self.child(index.to_string())
    }

    pub fn starts_with(&self, prefix: &FieldPath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Read the value addressed by this path, if every segment resolves.
    pub fn lookup<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        let mut current = value;
        for segment in &self.segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn lookup_mut<'a>(&self, value: &'a mut Value) -> Option<&'a mut Value> {
        let mut current = value;
        for segment in &self.segments {
            current = match current {
                Value::Object(map) => map.get_mut(segment)?,
                Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// JSON pointer form (`/slots/0/slotType`), as reported by schema validators.
    pub fn to_pointer(&self) -> String {
        self.segments
            .iter()
            .map(|segment| format!("/{}", segment.replace('~', "~0").replace('/', "~1")))
            .collect()
    }

    pub fn from_pointer(pointer: &str) -> FieldPath {
        let segments = pointer
            .split('/')
            .skip(1)
            .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
            .collect();
        Self { segments }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl FromStr for FieldPath {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        FieldPath::parse(raw)
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        FieldPath::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl JsonSchema for FieldPath {
    fn schema_name() -> String {
        "FieldPath".to_string()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        String::json_schema(generator)
    }
}

/// Write `value` at `path`, creating intermediate objects as needed.
///
/// Returns `false` when the path runs through a scalar or past the end of an
/// array; existing arrays are only indexed, never grown.
pub(crate) fn insert_at(root: &mut Value, path: &[String], value: Value) -> bool {
    let Some((head, rest)) = path.split_first() else {
        *root = value;
        return true;
    };

    if root.is_null() {
        *root = Value::Object(Map::new());
    }

    match root {
        Value::Object(map) => {
            if rest.is_empty() {
                map.insert(head.clone(), value);
                return true;
            }
            let entry = map.entry(head.clone()).or_insert(Value::Null);
            insert_at(entry, rest, value)
        }
        Value::Array(items) => {
            let Some(slot) = head.parse::<usize>().ok().and_then(|idx| items.get_mut(idx)) else {
                return false;
            };
            insert_at(slot, rest, value)
        }
        _ => false,
    }
}

/// Remove the value at `path`, returning it when present.
pub(crate) fn remove_at(root: &mut Value, path: &FieldPath) -> Option<Value> {
    let (last, parent) = path.segments.split_last()?;
    let mut current = root;
    for segment in parent {
        current = match current {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    match current {
        Value::Object(map) => map.remove(last),
        // Array slots are nulled rather than removed so sibling indices stay stable.
        Value::Array(items) => {
            let slot = items.get_mut(last.parse::<usize>().ok()?)?;
            Some(std::mem::take(slot))
        }
        _ => None,
    }
}
