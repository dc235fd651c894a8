//! Error types for queue storage.

use thiserror::Error;

/// Top-level store error type.
///
/// Any of these reaching the dispatcher means the store is unavailable for
/// the current polling cycle.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database rejected or failed a query.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Invalid store configuration.
    #[error("Store configuration error: {0}")]
    Configuration(String),

    /// Internal error (out of range durations, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
