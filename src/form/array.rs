use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::domain::{FieldArray, FieldDeclaration, FieldPath, insert_at};

/// Identity of a field-array item, stable across reorders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey(u64);

impl ItemKey {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    AtMaximum,
    AtMinimum,
    IndexOutOfRange,
    NotSortable,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Rejection::AtMaximum => "array is at its maximum item count",
            Rejection::AtMinimum => "array is at its minimum item count",
            Rejection::IndexOutOfRange => "item index out of range",
            Rejection::NotSortable => "array does not allow reordering",
        };
        f.write_str(text)
    }
}

/// Result of an add, remove or move request. Rejections are not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayOutcome {
    Applied { count: usize },
    Rejected(Rejection),
}

impl ArrayOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ArrayOutcome::Applied { .. })
    }
}

/// Per-array item keys, kept in step with the store's array lengths.
#[derive(Debug, Clone, Default)]
pub(crate) struct ItemLedger {
    arrays: HashMap<FieldPath, Vec<ItemKey>>,
    next: u64,
}

impl ItemLedger {
    pub fn keys(&self, array: &FieldPath) -> &[ItemKey] {
        self.arrays.get(array).map(Vec::as_slice).unwrap_or_default()
    }

    /// Grow with fresh keys or truncate so the ledger matches `len`.
    pub fn reconcile(&mut self, array: &FieldPath, len: usize) {
        let keys = self.arrays.entry(array.clone()).or_default();
        if keys.len() > len {
            keys.truncate(len);
        }
        while keys.len() < len {
            keys.push(ItemKey(self.next));
            self.next += 1;
        }
    }

    pub fn push(&mut self, array: &FieldPath) -> ItemKey {
        let key = ItemKey(self.next);
        self.next += 1;
        self.arrays.entry(array.clone()).or_default().push(key);
        key
    }

    pub fn remove(&mut self, array: &FieldPath, index: usize) {
        if let Some(keys) = self.arrays.get_mut(array)
            && index < keys.len()
        {
            keys.remove(index);
        }
    }

    pub fn swap(&mut self, array: &FieldPath, a: usize, b: usize) {
        if let Some(keys) = self.arrays.get_mut(array)
            && a < keys.len()
            && b < keys.len()
        {
            keys.swap(a, b);
        }
    }

    pub fn retain(&mut self, mut live: impl FnMut(&FieldPath) -> bool) {
        self.arrays.retain(|path, _| live(path));
    }

    pub fn clear(&mut self) {
        self.arrays.clear();
    }
}

/// Item appended when the caller supplies none.
///
/// Prefers the array's factory, then its `defaultItem` template, then a
/// zero-valued item holding every ungated template leaf with nested arrays
/// seeded to their minimum. Gated leaves get their value once they show.
pub fn blank_item(array: &FieldArray) -> Value {
    if let Some(factory) = &array.item_factory {
        return factory.make();
    }
    if let Some(item) = &array.default_item {
        return item.clone();
    }
    let mut item = Value::Object(Map::new());
    fill_blank(&array.fields, &mut item);
    item
}

fn fill_blank(fields: &[FieldDeclaration], item: &mut Value) {
    for field in fields {
        let Ok(path) = FieldPath::parse(field.name()) else {
            continue;
        };
        match field {
            FieldDeclaration::Conditional(_) | FieldDeclaration::DynamicSection(_) => {}
            FieldDeclaration::FieldArray(nested) => {
                let items = (0..nested.min).map(|_| blank_item(nested)).collect();
                insert_at(item, path.segments(), Value::Array(items));
            }
            leaf => {
                if let Some(value) = leaf.initial_value() {
                    insert_at(item, path.segments(), value);
                }
            }
        }
    }
}

pub(crate) fn item_count(values: &Value, array: &FieldPath) -> usize {
    array
        .lookup(values)
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0)
}
