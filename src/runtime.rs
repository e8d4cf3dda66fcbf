use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::{
    domain::{FieldPath, FormConfig, remove_at},
    form::{
        ArrayOutcome, EngineError, FormStore, ItemKey, MemoryStore, RegistrationController,
        RegistrationState, ResolveOptions, SchemaValidator, SyncReport, ValidationReport,
        VisibilityResolution, resolve_with_options,
    },
};

const MAX_PADDING_PASSES: usize = 64;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Drop the stored value when a field is unregistered on hide.
    pub discard_hidden_values: bool,
    /// Append blank items until every visible array holds its `min`.
    pub pad_arrays_to_min: bool,
    pub strict_collisions: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            discard_hidden_values: true,
            pad_arrays_to_min: true,
            strict_collisions: true,
        }
    }
}

impl SessionOptions {
    pub fn with_discard_hidden_values(mut self, discard: bool) -> Self {
        self.discard_hidden_values = discard;
        self
    }

    pub fn with_pad_arrays_to_min(mut self, pad: bool) -> Self {
        self.pad_arrays_to_min = pad;
        self
    }

    pub fn with_strict_collisions(mut self, strict: bool) -> Self {
        self.strict_collisions = strict;
        self
    }

    fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            strict_collisions: self.strict_collisions,
        }
    }
}

/// Entry point: configure a form and start a session over a store.
#[derive(Debug)]
pub struct FormEngine {
    config: FormConfig,
    values: Value,
    options: SessionOptions,
}

impl FormEngine {
    pub fn new(config: FormConfig) -> Self {
        Self {
            config,
            values: Value::Object(Map::new()),
            options: SessionOptions::default(),
        }
    }

    /// Initial values for [`FormEngine::start`]; ignored by `start_with_store`.
    pub fn with_values(mut self, values: Value) -> Self {
        self.values = values;
        self
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn start(self) -> Result<FormSession<MemoryStore>, EngineError> {
        let store = MemoryStore::new(self.values);
        Self {
            values: Value::Null,
            ..self
        }
        .start_with_store(store)
    }

    /// Start over an existing store; runs the first resolution pass.
    pub fn start_with_store<S: FormStore>(self, store: S) -> Result<FormSession<S>, EngineError> {
        let FormEngine {
            config, options, ..
        } = self;
        let mut session = FormSession {
            controller: RegistrationController::new(options.discard_hidden_values),
            config,
            store,
            options,
            last_report: SyncReport::default(),
        };
        session.sync()?;
        debug!(
            registered = session.store.registered_paths().len(),
            "form session started"
        );
        Ok(session)
    }
}

/// A running form. Every mutation runs one resolution pass and applies its
/// registration effects before returning.
#[derive(Debug)]
pub struct FormSession<S: FormStore = MemoryStore> {
    config: FormConfig,
    store: S,
    controller: RegistrationController,
    options: SessionOptions,
    last_report: SyncReport,
}

impl<S: FormStore> FormSession<S> {
    pub fn config(&self) -> &FormConfig {
        &self.config
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn values(&self) -> Value {
        self.store.values()
    }

    pub fn value(&self, path: &str) -> Result<Option<Value>, EngineError> {
        Ok(self.store.value(&FieldPath::parse(path)?))
    }

    /// Transitions applied by the most recent pass.
    pub fn last_report(&self) -> &SyncReport {
        &self.last_report
    }

    /// Resolve against the current values without touching registration.
    pub fn resolution(&self) -> Result<VisibilityResolution<'_>, EngineError> {
        let values = self.store.values();
        Ok(resolve_with_options(
            &self.config,
            &values,
            self.options.resolve_options(),
        )?)
    }

    pub fn is_visible(&self, path: &str) -> Result<bool, EngineError> {
        let path = FieldPath::parse(path)?;
        Ok(self.resolution()?.is_visible(&path))
    }

    pub fn registration_state(&self, path: &str) -> Result<RegistrationState, EngineError> {
        Ok(self.controller.state(&FieldPath::parse(path)?))
    }

    pub fn item_keys(&self, array: &str) -> Result<&[ItemKey], EngineError> {
        Ok(self.controller.item_keys(&FieldPath::parse(array)?))
    }

    pub fn set_value(&mut self, path: &str, value: Value) -> Result<&SyncReport, EngineError> {
        let path = FieldPath::parse(path)?;
        self.store.set_value(&path, value)?;
        trace!(path = %path, "value changed");
        self.sync()
    }

    pub fn append_item(
        &mut self,
        array: &str,
        item: Option<Value>,
    ) -> Result<ArrayOutcome, EngineError> {
        let array = FieldPath::parse(array)?;
        let outcome = self.with_resolution(|controller, resolution, store| {
            controller.append_item(resolution, store, &array, item)
        })?;
        self.after_array_op(outcome)
    }

    pub fn remove_item(&mut self, array: &str, index: usize) -> Result<ArrayOutcome, EngineError> {
        let array = FieldPath::parse(array)?;
        let outcome = self.with_resolution(|controller, resolution, store| {
            controller.remove_item(resolution, store, &array, index)
        })?;
        self.after_array_op(outcome)
    }

    pub fn move_item(
        &mut self,
        array: &str,
        from: usize,
        to: usize,
    ) -> Result<ArrayOutcome, EngineError> {
        let array = FieldPath::parse(array)?;
        let outcome = self.with_resolution(|controller, resolution, store| {
            controller.move_item(resolution, store, &array, from, to)
        })?;
        self.after_array_op(outcome)
    }

    pub fn can_append(&self, array: &str) -> Result<bool, EngineError> {
        let array = FieldPath::parse(array)?;
        self.controller.can_append(&self.resolution()?, &self.store, &array)
    }

    pub fn can_remove(&self, array: &str) -> Result<bool, EngineError> {
        let array = FieldPath::parse(array)?;
        self.controller.can_remove(&self.resolution()?, &self.store, &array)
    }

    /// Drop every registration and start over from `values`.
    pub fn reset(&mut self, values: Value) -> Result<&SyncReport, EngineError> {
        self.controller.teardown(&mut self.store);
        self.store.reset(values);
        self.sync()
    }

    /// Current values with every hidden field stripped.
    pub fn submission_values(&self) -> Result<Value, EngineError> {
        let mut values = self.store.values();
        let resolution =
            resolve_with_options(&self.config, &values, self.options.resolve_options())?;
        let hidden: Vec<FieldPath> = resolution
            .collapsed()
            .into_iter()
            .filter(|(_, entry)| !entry.visible)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &hidden {
            if remove_at(&mut values, path).is_some() {
                prune_empty_parents(&mut values, path);
            }
        }
        Ok(values)
    }

    pub fn validate(&self, validator: &SchemaValidator) -> Result<ValidationReport, EngineError> {
        let values = self.store.values();
        let resolution =
            resolve_with_options(&self.config, &values, self.options.resolve_options())?;
        Ok(validator.validate(&values, &resolution))
    }

    /// End the session. No pass runs afterwards; the store is handed back.
    pub fn teardown(mut self) -> S {
        self.controller.teardown(&mut self.store);
        self.store
    }

    /// Run one resolution pass and apply its registration effects.
    ///
    /// Visible arrays short of their `min` are padded first and the pass is
    /// repeated. Padding stops once an append is rejected or nothing grew.
    pub fn sync(&mut self) -> Result<&SyncReport, EngineError> {
        let mut padding_passes = 0;
        loop {
            let values = self.store.values();
            let resolution =
                resolve_with_options(&self.config, &values, self.options.resolve_options())?;
            if self.options.pad_arrays_to_min && padding_passes < MAX_PADDING_PASSES {
                let short: Vec<(FieldPath, usize)> = resolution
                    .arrays()
                    .filter(|entry| entry.visible)
                    .filter_map(|entry| {
                        let min = entry.declaration.as_field_array()?.min;
                        let len = entry
                            .path
                            .lookup(&values)
                            .and_then(Value::as_array)
                            .map_or(0, Vec::len);
                        (len < min).then(|| (entry.path.clone(), min - len))
                    })
                    .collect();
                let mut grew = false;
                for (array, missing) in short {
                    for _ in 0..missing {
                        let outcome = self.controller.append_item(
                            &resolution,
                            &mut self.store,
                            &array,
                            None,
                        )?;
                        if !outcome.is_applied() {
                            warn!(array = %array, "cannot pad field array to its minimum");
                            break;
                        }
                        grew = true;
                    }
                }
                if grew {
                    padding_passes += 1;
                    continue;
                }
            }
            let report = self.controller.apply(&resolution, &mut self.store)?;
            trace!(
                registered = report.registered.len(),
                unregistered = report.unregistered.len(),
                "registration synced"
            );
            self.last_report = report;
            return Ok(&self.last_report);
        }
    }

    fn with_resolution<T>(
        &mut self,
        op: impl FnOnce(
            &mut RegistrationController,
            &VisibilityResolution<'_>,
            &mut S,
        ) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let values = self.store.values();
        let resolution =
            resolve_with_options(&self.config, &values, self.options.resolve_options())?;
        op(&mut self.controller, &resolution, &mut self.store)
    }

    fn after_array_op(&mut self, outcome: ArrayOutcome) -> Result<ArrayOutcome, EngineError> {
        if outcome.is_applied() {
            self.sync()?;
        }
        Ok(outcome)
    }
}

// Objects left empty by stripping a hidden field go too. Array items stay put.
fn prune_empty_parents(values: &mut Value, path: &FieldPath) {
    let mut current = path.parent();
    while let Some(parent) = current {
        let Some(holder) = parent.parent() else {
            return;
        };
        let emptied = parent
            .lookup(values)
            .and_then(Value::as_object)
            .is_some_and(Map::is_empty);
        let in_object = holder.lookup(values).is_some_and(Value::is_object);
        if !emptied || !in_object {
            return;
        }
        remove_at(values, &parent);
        current = Some(holder);
    }
}
