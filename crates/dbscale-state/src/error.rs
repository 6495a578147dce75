//! Error types for the dbscale state store.

use thiserror::Error;

use dbscale_core::ports::PersistError;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("state store {0} is held by another process (is the daemon running?)")]
    Locked(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),
}

impl From<StateError> for PersistError {
    fn from(e: StateError) -> Self {
        PersistError(e.to_string())
    }
}
