//! Store error types

use common::{Symbol, ValidationError};
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// No instrument with this symbol
    #[error("instrument not found: {symbol}")]
    NotFound {
        /// Requested symbol
        symbol: Symbol,
    },

    /// The backing store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store refused a write for a reason other than a version conflict
    #[error("write to {symbol} rejected: {reason}")]
    Rejected {
        /// Target symbol
        symbol: Symbol,
        /// Why the write was refused
        reason: String,
    },

    /// A persisted row failed validation
    #[error("malformed row #{row}")]
    Malformed {
        /// Zero-based row index in the source
        row: usize,
        /// Validation failure
        #[source]
        source: ValidationError,
    },

    /// A record handed to the store failed validation
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// Seed data was not valid JSON
    #[error("failed to parse rows")]
    Json(#[from] serde_json::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
