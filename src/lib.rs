#![deny(rust_2018_idioms)]
#![doc = include_str!("../README.md")]

pub mod domain;
pub mod form;
pub mod io;
mod runtime;

pub use domain::{
    Condition, ConfigError, FieldArray, FieldDeclaration, FieldKind, FieldPath, FormConfig,
    Predicate, Rule,
};
pub use form::{
    ArrayOutcome, EngineError, FormStore, ItemKey, MemoryStore, Rejection, RegistrationState,
    SchemaValidator, SyncReport, ValidationReport, VisibilityResolution, resolve,
    silence_predicate_panics,
};
pub use io::{
    DocumentFormat, OutputDestination, OutputOptions, SessionSnapshot, load_form_config,
    parse_document_str,
};
pub use runtime::{FormEngine, FormSession, SessionOptions};

pub mod prelude {
    pub use super::{
        ArrayOutcome, Condition, FieldArray, FieldDeclaration, FieldPath, FormConfig, FormEngine,
        FormSession, FormStore, MemoryStore, RegistrationState, SessionOptions,
    };
}
