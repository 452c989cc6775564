//! Crate error types
//!
//! Every operation exposed to the administrative side returns a typed
//! result from this taxonomy; the HTTP layer maps variants to status codes.

use thiserror::Error;

use crate::store::StoreError;

/// Convenience result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for hub operations
#[derive(Debug, Error)]
pub enum Error {
    /// A location, device, or live connection was not found
    #[error("{what} not found")]
    NotFound { what: String },

    /// A precondition on device or location state was not met
    #[error("unavailable: {reason}")]
    Unavailable { reason: String },

    /// The operation conflicts with the device's current state
    #[error("conflict: {reason}")]
    Conflict { reason: String },

    /// The durable store failed or timed out
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Code generation exhausted its retry budget
    #[error("identity conflict: code generation failed after {attempts} attempts")]
    IdentityConflict { attempts: u32 },
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound { what: what.into() }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Error::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Error::Conflict {
            reason: reason.into(),
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Error::not_found("record"),
            StoreError::UniqueViolation { field } => Error::Conflict {
                reason: format!("unique constraint violated on {field}"),
            },
            StoreError::Unavailable(reason) => Error::StoreUnavailable(reason),
        }
    }
}
