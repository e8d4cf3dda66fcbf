use thiserror::Error;

use crate::domain::ConfigError;

use super::{resolution::ResolveError, store::StoreError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no field array is declared at '{path}'")]
    UnknownArray { path: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
