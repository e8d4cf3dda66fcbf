mod array;
mod error;
mod evaluator;
mod registration;
mod resolution;
mod store;
mod validation;

pub use array::{ArrayOutcome, ItemKey, Rejection, blank_item};
pub use error::EngineError;
pub use evaluator::{evaluate_condition, is_visible, silence_predicate_panics};
pub use registration::{RegistrationController, RegistrationState, SyncReport};
pub use resolution::{
    ResolveError, ResolveOptions, ResolvedField, ResolvedKind, VisibilityResolution, resolve,
    resolve_with_options,
};
pub use store::{FormStore, MemoryStore, RegisterOptions, StoreError, UnregisterOptions};
pub use validation::{SchemaValidator, ValidationReport};
