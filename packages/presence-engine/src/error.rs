//! Engine error type.
//!
//! Only configuration problems surface as errors. Transient collaborator
//! failures (a failed send, a presence write that didn't land) are logged
//! where they happen and never reach callers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Picking from a catalog with no conversations.
    #[error("conversation catalog is empty")]
    EmptyCatalog,

    /// A conversation names a participant the bot directory doesn't know.
    #[error("no bot profile for username '{username}'")]
    UnknownBot { username: String },

    #[error("invalid conversation catalog: {0}")]
    InvalidCatalog(String),

    #[error("failed to read conversation catalog: {0}")]
    CatalogLoad(#[from] std::io::Error),

    #[error("failed to parse conversation catalog: {0}")]
    CatalogParse(#[from] serde_json::Error),

    #[error("invalid engine configuration: {0}")]
    Config(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
