//! Error types for chanfind
//!
//! One enum for the whole engine, grouped by how a caller should react:
//! bad input, missing records, partially applied batches, and backend
//! trouble. [`Error::kind`] gives that grouping without string matching.

use std::path::PathBuf;
use thiserror::Error;

use crate::bulk::BulkFailure;
use crate::storage::backend::BackendError;

/// The main error type for chanfind operations
#[derive(Debug, Error)]
pub enum Error {
    // ==========================================================================
    // Query Errors
    // ==========================================================================
    #[error("Invalid query: {0}")]
    Compile(#[from] cfql::CompileError),

    #[error("Result window is too large, ~from + ~size must be less than or equal to {max} but was {window}")]
    ResultWindowTooLarge { window: usize, max: usize },

    // ==========================================================================
    // Validation Errors
    // ==========================================================================
    #[error("{0}")]
    Validation(#[from] crate::validation::ValidationError),

    #[error("The {kind} name '{payload}' does not match the requested name '{requested}'")]
    NameMismatch {
        kind: &'static str,
        requested: String,
        payload: String,
    },

    // ==========================================================================
    // Not Found Errors
    // ==========================================================================
    #[error("Channel '{name}' does not exist")]
    ChannelNotFound { name: String },

    #[error("Tag '{name}' does not exist")]
    TagNotFound { name: String },

    #[error("Property '{name}' does not exist")]
    PropertyNotFound { name: String },

    // ==========================================================================
    // Bulk Errors
    // ==========================================================================
    #[error(
        "Bulk request failed: {} of {} operations could not be applied",
        .failures.len(),
        .applied + .failures.len()
    )]
    PartialBulkFailure {
        /// Operations the backend did apply
        applied: usize,
        failures: Vec<BulkFailure>,
    },

    // ==========================================================================
    // Backend Errors
    // ==========================================================================
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Document '{id}' in index '{index}' is malformed: {message}")]
    InvalidDocument {
        index: String,
        id: String,
        message: String,
    },

    // ==========================================================================
    // IO Errors
    // ==========================================================================
    #[error("Failed to read file '{path}': {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ==========================================================================
    // Serialization Errors
    // ==========================================================================
    #[error("Failed to parse YAML: {message}")]
    YamlParseError { message: String },

    #[error("Failed to parse JSON: {message}")]
    JsonParseError { message: String },

    // ==========================================================================
    // Catch-all
    // ==========================================================================
    #[error("{0}")]
    Other(String),
}

/// Result type alias for chanfind operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; retrying the same request will fail again
    Client,
    /// A referenced record does not exist
    NotFound,
    /// Some operations of a batch were applied, some were not
    PartialFailure,
    /// Transport, storage or backend failure
    Infrastructure,
}

// =============================================================================
// Conversions from external error types
// =============================================================================

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::YamlParseError {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonParseError {
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Error Display Helpers
// =============================================================================

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Compile(_)
            | Error::ResultWindowTooLarge { .. }
            | Error::Validation(_)
            | Error::NameMismatch { .. }
            | Error::YamlParseError { .. } => ErrorKind::Client,

            Error::ChannelNotFound { .. }
            | Error::TagNotFound { .. }
            | Error::PropertyNotFound { .. } => ErrorKind::NotFound,

            Error::PartialBulkFailure { .. } => ErrorKind::PartialFailure,

            Error::Backend(BackendError::Rejected(_)) => ErrorKind::Client,
            Error::Backend(BackendError::ScrollNotFound(_)) => ErrorKind::NotFound,
            Error::Backend(BackendError::Unavailable(_))
            | Error::InvalidDocument { .. }
            | Error::FileReadError { .. }
            | Error::FileWriteError { .. }
            | Error::JsonParseError { .. }
            | Error::Other(_) => ErrorKind::Infrastructure,
        }
    }

    /// Returns a user-friendly suggestion for fixing the error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ResultWindowTooLarge { .. } => {
                Some("Use the scroll API (`export`) to page through large result sets")
            }
            Error::Compile(_) => Some("~size and ~from take non-negative integers"),
            Error::ChannelNotFound { .. } => Some("Check the channel name or create the channel first"),
            Error::TagNotFound { .. } => Some("Create the tag before assigning it to channels"),
            Error::PropertyNotFound { .. } => {
                Some("Create the property before assigning it to channels")
            }
            Error::Backend(BackendError::ScrollNotFound(_)) => {
                Some("Scroll cursors expire; open a new scroll")
            }
            Error::PartialBulkFailure { .. } => {
                Some("Re-read the affected records; re-submitting the request is safe for additions")
            }
            _ => None,
        }
    }

    /// Returns true if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Client | ErrorKind::NotFound)
    }
}
