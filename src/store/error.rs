//! Store error types

use thiserror::Error;

/// Error type for durable-store operations
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The referenced record does not exist
    #[error("record not found")]
    NotFound,

    /// A write violated a unique index
    #[error("unique constraint violated on {field}")]
    UniqueViolation { field: &'static str },

    /// The store is unreachable or failed internally
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
