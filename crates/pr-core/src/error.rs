//! Error types for pr-core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pr-core
///
/// Every variant is scoped to the single upload or operation that raised it.
/// The reconciliation step itself never fails.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Payload could not be decoded as delimited text at all
    #[error("failed to parse '{source_name}': {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    /// CSV decoder failure on a record the parse cannot do without
    #[error("CSV error in '{source_name}': {source}")]
    Csv {
        source_name: String,
        #[source]
        source: csv::Error,
    },

    /// Operator input that does not make sense (bad rule index, unknown kind)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn parse(source_name: &str, message: impl Into<String>) -> Self {
        Error::Parse {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }
}
