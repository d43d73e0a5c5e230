//! Error types for query compilation

use thiserror::Error;

/// Error raised while compiling query parameters
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("Invalid value '{value}' for '{key}': expected an integer")]
    InvalidNumber { key: String, value: String },

    #[error("Invalid '~from' value {0}: must not be negative")]
    NegativeFrom(i64),

    #[error("Invalid '~size' value {0}: must not be negative")]
    NegativeSize(i64),

    #[error("Query key cannot be empty")]
    EmptyKey,
}
