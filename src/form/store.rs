use indexmap::IndexMap;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::{FieldPath, insert_at, remove_at};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot write '{path}': it runs through a scalar or past the end of an array")]
    Unwritable { path: String },

    #[error("'{path}' does not hold an array")]
    NotAnArray { path: String },

    #[error("index {index} out of range for '{path}' (len {len})")]
    IndexOutOfRange {
        path: String,
        index: usize,
        len: usize,
    },
}

#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    /// Seeded only when the store holds nothing at the path yet.
    pub default_value: Option<Value>,
    pub disabled: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnregisterOptions {
    pub keep_value: bool,
}

/// The form-state library the engine drives.
///
/// The engine reads snapshots through [`FormStore::values`] and writes only
/// through the registration and array operations below.
pub trait FormStore {
    /// Snapshot of the current values.
    fn values(&self) -> Value;

    fn value(&self, path: &FieldPath) -> Option<Value> {
        path.lookup(&self.values()).cloned()
    }

    fn set_value(&mut self, path: &FieldPath, value: Value) -> Result<(), StoreError>;

    fn register(&mut self, path: &FieldPath, options: RegisterOptions) -> Result<(), StoreError>;

    fn unregister(&mut self, path: &FieldPath, options: UnregisterOptions);

    fn is_registered(&self, path: &FieldPath) -> bool;

    fn registered_paths(&self) -> Vec<FieldPath>;

    /// Append to the array at `array`, creating it when absent. Returns the new length.
    fn append(&mut self, array: &FieldPath, item: Value) -> Result<usize, StoreError>;

    fn remove(&mut self, array: &FieldPath, index: usize) -> Result<Value, StoreError>;

    fn swap(&mut self, array: &FieldPath, a: usize, b: usize) -> Result<(), StoreError>;

    /// Replace every value and drop all registrations.
    fn reset(&mut self, values: Value);
}

/// In-process store over a `serde_json::Value` tree.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    values: Value,
    registered: IndexMap<FieldPath, RegisterOptions>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Value::Object(Map::new()))
    }
}

impl MemoryStore {
    pub fn new(values: Value) -> Self {
        Self {
            values: normalize(values),
            registered: IndexMap::new(),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.values
    }

    pub fn into_value(self) -> Value {
        self.values
    }

    pub fn registration(&self, path: &FieldPath) -> Option<&RegisterOptions> {
        self.registered.get(path)
    }

    fn array_mut(&mut self, array: &FieldPath) -> Result<&mut Vec<Value>, StoreError> {
        match array.lookup_mut(&mut self.values) {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(StoreError::NotAnArray {
                path: array.to_string(),
            }),
        }
    }
}

impl FormStore for MemoryStore {
    fn values(&self) -> Value {
        self.values.clone()
    }

    fn value(&self, path: &FieldPath) -> Option<Value> {
        path.lookup(&self.values).cloned()
    }

    fn set_value(&mut self, path: &FieldPath, value: Value) -> Result<(), StoreError> {
        if insert_at(&mut self.values, path.segments(), value) {
            Ok(())
        } else {
            Err(StoreError::Unwritable {
                path: path.to_string(),
            })
        }
    }

    fn register(&mut self, path: &FieldPath, options: RegisterOptions) -> Result<(), StoreError> {
        if path.lookup(&self.values).is_none()
            && let Some(default) = options.default_value.clone()
        {
            self.set_value(path, default)?;
        }
        self.registered.insert(path.clone(), options);
        Ok(())
    }

    fn unregister(&mut self, path: &FieldPath, options: UnregisterOptions) {
        self.registered.shift_remove(path);
        if !options.keep_value {
            remove_at(&mut self.values, path);
        }
    }

    fn is_registered(&self, path: &FieldPath) -> bool {
        self.registered.contains_key(path)
    }

    fn registered_paths(&self) -> Vec<FieldPath> {
        self.registered.keys().cloned().collect()
    }

    fn append(&mut self, array: &FieldPath, item: Value) -> Result<usize, StoreError> {
        if array.lookup(&self.values).is_none_or(Value::is_null) {
            self.set_value(array, Value::Array(Vec::new()))?;
        }
        let items = self.array_mut(array)?;
        items.push(item);
        Ok(items.len())
    }

    fn remove(&mut self, array: &FieldPath, index: usize) -> Result<Value, StoreError> {
        let items = self.array_mut(array)?;
        if index >= items.len() {
            return Err(StoreError::IndexOutOfRange {
                path: array.to_string(),
                index,
                len: items.len(),
            });
        }
        Ok(items.remove(index))
    }

    fn swap(&mut self, array: &FieldPath, a: usize, b: usize) -> Result<(), StoreError> {
        let items = self.array_mut(array)?;
        let len = items.len();
        for index in [a, b] {
            if index >= len {
                return Err(StoreError::IndexOutOfRange {
                    path: array.to_string(),
                    index,
                    len,
                });
            }
        }
        items.swap(a, b);
        Ok(())
    }

    fn reset(&mut self, values: Value) {
        self.values = normalize(values);
        self.registered.clear();
    }
}

fn normalize(values: Value) -> Value {
    if values.is_null() {
        Value::Object(Map::new())
    } else {
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(raw: &str) -> FieldPath {
        FieldPath::parse(raw).unwrap()
    }

    #[test]
    fn register_seeds_default_only_when_absent() {
        let mut store = MemoryStore::new(json!({"email": "kept@example.com"}));
        let options = RegisterOptions {
            default_value: Some(json!("")),
            ..RegisterOptions::default()
        };
        store.register(&path("email"), options.clone()).unwrap();
        store.register(&path("name"), options).unwrap();
        assert_eq!(store.as_value(), &json!({"email": "kept@example.com", "name": ""}));
        assert_eq!(store.registered_paths(), [path("email"), path("name")]);
    }

    #[test]
    fn unregister_discards_value_unless_kept() {
        let mut store = MemoryStore::new(json!({"a": 1, "b": 2}));
        store.register(&path("a"), RegisterOptions::default()).unwrap();
        store.register(&path("b"), RegisterOptions::default()).unwrap();
        store.unregister(&path("a"), UnregisterOptions::default());
        store.unregister(&path("b"), UnregisterOptions { keep_value: true });
        assert_eq!(store.as_value(), &json!({"b": 2}));
        assert!(store.registered_paths().is_empty());
    }

    #[test]
    fn array_operations_shift_and_swap() {
        let mut store = MemoryStore::default();
        let items = path("items");
        assert_eq!(store.append(&items, json!({"v": 1})).unwrap(), 1);
        assert_eq!(store.append(&items, json!({"v": 2})).unwrap(), 2);
        assert_eq!(store.append(&items, json!({"v": 3})).unwrap(), 3);
        store.swap(&items, 0, 2).unwrap();
        assert_eq!(store.value(&path("items.0.v")), Some(json!(3)));
        let removed = store.remove(&items, 0).unwrap();
        assert_eq!(removed, json!({"v": 3}));
        assert_eq!(store.value(&items), Some(json!([{"v": 2}, {"v": 1}])));
    }

    #[test]
    fn reset_replaces_values_and_registrations() {
        let mut store = MemoryStore::new(json!({"a": 1}));
        store.register(&path("a"), RegisterOptions::default()).unwrap();
        store.reset(Value::Null);
        assert_eq!(store.as_value(), &json!({}));
        assert!(!store.is_registered(&path("a")));
    }

    #[test]
    fn array_operations_report_bad_targets() {
        let mut store = MemoryStore::new(json!({"name": "x", "items": []}));
        assert!(matches!(
            store.append(&path("name"), json!(1)),
            Err(StoreError::NotAnArray { .. })
        ));
        assert!(matches!(
            store.remove(&path("items"), 0),
            Err(StoreError::IndexOutOfRange { index: 0, len: 0, .. })
        ));
        assert!(matches!(
            store.set_value(&path("name.first"), json!("a")),
            Err(StoreError::Unwritable { .. })
        ));
    }
}
