//! crates/pantry_core/src/error.rs
//!
//! Error taxonomy for the pantry facade, the lifecycle engine and the Auth Gateway.

use crate::ports::PortError;

/// An input that could not be coerced. Never surfaced to callers: the engine
/// logs it and substitutes a default.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PantryError {
    #[error("You must be signed in to do that")]
    NotAuthenticated,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Deleted {deleted} of {total} items; {failed} deletes failed")]
    PartialBatchFailure {
        deleted: usize,
        failed: usize,
        total: usize,
    },

    #[error("Storage is unavailable: {0}")]
    BackendUnavailable(String),
}

impl From<PortError> for PantryError {
    fn from(e: PortError) -> Self {
        match e {
            PortError::NotFound(what) => PantryError::NotFound(what),
            PortError::Unauthorized => PantryError::NotAuthenticated,
            PortError::Conflict(msg) => PantryError::InvalidOperation(msg),
            PortError::Unsupported(op) => {
                PantryError::BackendUnavailable(format!("{} is not supported", op))
            }
            PortError::Unexpected(msg) => PantryError::BackendUnavailable(msg),
        }
    }
}

/// A convenience type alias for `Result<T, PantryError>`.
pub type PantryResult<T> = Result<T, PantryError>;
