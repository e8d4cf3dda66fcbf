use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::domain::{FieldArray, FieldPath};

use super::{
    array::{ArrayOutcome, ItemKey, ItemLedger, Rejection, blank_item, item_count},
    error::EngineError,
    resolution::{ResolvedField, ResolvedKind, VisibilityResolution},
    store::{FormStore, RegisterOptions, UnregisterOptions},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistrationState {
    #[default]
    Unregistered,
    RegisteredVisible,
    /// Still registered while hidden; only `alwaysRegistered` arrays get here.
    RegisteredHidden,
}

impl RegistrationState {
    pub fn is_registered(&self) -> bool {
        !matches!(self, RegistrationState::Unregistered)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationState::Unregistered => "unregistered",
            RegistrationState::RegisteredVisible => "registered",
            RegistrationState::RegisteredHidden => "registered-hidden",
        }
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transitions applied by one [`RegistrationController::apply`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub registered: Vec<FieldPath>,
    pub restored: Vec<FieldPath>,
    pub hidden: Vec<FieldPath>,
    pub unregistered: Vec<FieldPath>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
            && self.restored.is_empty()
            && self.hidden.is_empty()
            && self.unregistered.is_empty()
    }
}

/// Keeps a store's registered set in step with the latest resolution and
/// enforces field-array bounds.
#[derive(Debug, Clone)]
pub struct RegistrationController {
    states: IndexMap<FieldPath, RegistrationState>,
    ledger: ItemLedger,
    discard_hidden_values: bool,
}

impl Default for RegistrationController {
    fn default() -> Self {
        Self::new(true)
    }
}

impl RegistrationController {
    pub fn new(discard_hidden_values: bool) -> Self {
        Self {
            states: IndexMap::new(),
            ledger: ItemLedger::default(),
            discard_hidden_values,
        }
    }

    pub fn state(&self, path: &FieldPath) -> RegistrationState {
        self.states.get(path).copied().unwrap_or_default()
    }

    pub fn states(&self) -> impl Iterator<Item = (&FieldPath, RegistrationState)> {
        self.states.iter().map(|(path, state)| (path, *state))
    }

    pub fn item_keys(&self, array: &FieldPath) -> &[ItemKey] {
        self.ledger.keys(array)
    }

    /// Apply the registration effects of `resolution` to `store`.
    pub fn apply<S: FormStore + ?Sized>(
        &mut self,
        resolution: &VisibilityResolution<'_>,
        store: &mut S,
    ) -> Result<SyncReport, EngineError> {
        let mut report = SyncReport::default();
        let collapsed = resolution.collapsed();

        for (path, entry) in &collapsed {
            let path = *path;
            let current = self.state(path);
            match (entry.visible, current) {
                (true, RegistrationState::Unregistered) => {
                    store.register(path, register_options(entry))?;
                    debug!(path = %path, "registered field");
                    self.states
                        .insert(path.clone(), RegistrationState::RegisteredVisible);
                    report.registered.push(path.clone());
                }
                (true, RegistrationState::RegisteredHidden) => {
                    debug!(path = %path, "field visible again");
                    self.states
                        .insert(path.clone(), RegistrationState::RegisteredVisible);
                    report.restored.push(path.clone());
                }
                (false, RegistrationState::RegisteredVisible) if entry.always_registered => {
                    debug!(path = %path, "field hidden, registration kept");
                    self.states
                        .insert(path.clone(), RegistrationState::RegisteredHidden);
                    report.hidden.push(path.clone());
                }
                (false, RegistrationState::RegisteredVisible) => {
                    store.unregister(
                        path,
                        UnregisterOptions {
                            keep_value: !self.discard_hidden_values,
                        },
                    );
                    debug!(
                        path = %path,
                        discarded = self.discard_hidden_values,
                        "field hidden, unregistered"
                    );
                    self.states.shift_remove(path);
                    report.unregistered.push(path.clone());
                }
                _ => {}
            }
        }

        let vanished: Vec<FieldPath> = self
            .states
            .keys()
            .filter(|path| !collapsed.contains_key(path))
            .cloned()
            .collect();
        for path in vanished {
            store.unregister(&path, UnregisterOptions { keep_value: true });
            debug!(path = %path, "field no longer declared, unregistered");
            self.states.shift_remove(&path);
            report.unregistered.push(path);
        }

        let values = store.values();
        let arrays: Vec<&FieldPath> = resolution.arrays().map(|entry| &entry.path).collect();
        for array in &arrays {
            self.ledger.reconcile(array, item_count(&values, array));
        }
        self.ledger.retain(|path| arrays.contains(&path));

        Ok(report)
    }

    /// Unregister every tracked path. The controller is empty afterwards.
    pub fn teardown<S: FormStore + ?Sized>(&mut self, store: &mut S) -> Vec<FieldPath> {
        let paths: Vec<FieldPath> = self.states.drain(..).map(|(path, _)| path).collect();
        for path in &paths {
            store.unregister(path, UnregisterOptions { keep_value: true });
        }
        self.ledger.clear();
        debug!(count = paths.len(), "registration torn down");
        paths
    }

    pub fn can_append<S: FormStore + ?Sized>(
        &self,
        resolution: &VisibilityResolution<'_>,
        store: &S,
        array: &FieldPath,
    ) -> Result<bool, EngineError> {
        let declaration = lookup_array(resolution, array)?;
        Ok(declaration.can_grow(stored_len(store, array)))
    }

    pub fn can_remove<S: FormStore + ?Sized>(
        &self,
        resolution: &VisibilityResolution<'_>,
        store: &S,
        array: &FieldPath,
    ) -> Result<bool, EngineError> {
        let declaration = lookup_array(resolution, array)?;
        Ok(declaration.can_shrink(stored_len(store, array)))
    }

    /// Append `item`, or the array's blank item when `None`.
    pub fn append_item<S: FormStore + ?Sized>(
        &mut self,
        resolution: &VisibilityResolution<'_>,
        store: &mut S,
        array: &FieldPath,
        item: Option<Value>,
    ) -> Result<ArrayOutcome, EngineError> {
        let declaration = lookup_array(resolution, array)?;
        let count = stored_len(store, array);
        if !declaration.can_grow(count) {
            return Ok(reject(array, Rejection::AtMaximum));
        }
        let item = item.unwrap_or_else(|| blank_item(declaration));
        let len = store.append(array, item)?;
        self.ledger.reconcile(array, count);
        let key = self.ledger.push(array);
        debug!(array = %array, key = %key, count = len, "appended item");
        Ok(ArrayOutcome::Applied { count: len })
    }

    pub fn remove_item<S: FormStore + ?Sized>(
        &mut self,
        resolution: &VisibilityResolution<'_>,
        store: &mut S,
        array: &FieldPath,
        index: usize,
    ) -> Result<ArrayOutcome, EngineError> {
        let declaration = lookup_array(resolution, array)?;
        let count = stored_len(store, array);
        if index >= count {
            return Ok(reject(array, Rejection::IndexOutOfRange));
        }
        if !declaration.can_shrink(count) {
            return Ok(reject(array, Rejection::AtMinimum));
        }
        store.remove(array, index)?;
        self.ledger.reconcile(array, count);
        self.ledger.remove(array, index);
        debug!(array = %array, index, count = count - 1, "removed item");
        Ok(ArrayOutcome::Applied { count: count - 1 })
    }

    /// Swap the items at `from` and `to`; their keys travel with them.
    pub fn move_item<S: FormStore + ?Sized>(
        &mut self,
        resolution: &VisibilityResolution<'_>,
        store: &mut S,
        array: &FieldPath,
        from: usize,
        to: usize,
    ) -> Result<ArrayOutcome, EngineError> {
        let declaration = lookup_array(resolution, array)?;
        if !declaration.sortable {
            return Ok(reject(array, Rejection::NotSortable));
        }
        let count = stored_len(store, array);
        if from >= count || to >= count {
            return Ok(reject(array, Rejection::IndexOutOfRange));
        }
        if from != to {
            store.swap(array, from, to)?;
            self.ledger.reconcile(array, count);
            self.ledger.swap(array, from, to);
            debug!(array = %array, from, to, "moved item");
        }
        Ok(ArrayOutcome::Applied { count })
    }
}

fn register_options(entry: &ResolvedField<'_>) -> RegisterOptions {
    match entry.kind {
        ResolvedKind::Array => RegisterOptions {
            default_value: Some(Value::Array(Vec::new())),
            disabled: false,
        },
        ResolvedKind::Leaf => RegisterOptions {
            default_value: entry.declaration.initial_value(),
            disabled: entry
                .declaration
                .common()
                .is_some_and(|common| common.is_disabled),
        },
    }
}

// Bounds come from the declaration this pass picked for the path, so a visible
// twin wins over a hidden one.
fn lookup_array<'a>(
    resolution: &VisibilityResolution<'a>,
    array: &FieldPath,
) -> Result<&'a FieldArray, EngineError> {
    resolution
        .array(array)
        .ok_or_else(|| EngineError::UnknownArray {
            path: array.to_string(),
        })
}

fn stored_len<S: FormStore + ?Sized>(store: &S, array: &FieldPath) -> usize {
    store
        .value(array)
        .as_ref()
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0)
}

fn reject(array: &FieldPath, reason: Rejection) -> ArrayOutcome {
    debug!(array = %array, reason = %reason, "array operation rejected");
    ArrayOutcome::Rejected(reason)
}
