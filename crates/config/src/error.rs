//! Configuration error types

use std::io;
use thiserror::Error;

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors from loading, parsing or persisting the rules document
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read or write the rules file
    #[error("failed to access rules file '{path}': {source}")]
    Io {
        /// Path to the file
        path: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// Rules document is not valid JSON of the expected shape
    #[error("invalid rules document: {0}")]
    InvalidDocument(#[from] serde_json::Error),

    /// A node spec string could not be parsed
    #[error("invalid node spec '{spec}': {reason}")]
    InvalidNodeSpec {
        /// The rejected input
        spec: String,
        /// Why it was rejected
        reason: &'static str,
    },
}

impl ConfigError {
    /// Create an Io error
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an InvalidNodeSpec error
    pub fn invalid_node_spec(spec: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidNodeSpec {
            spec: spec.into(),
            reason,
        }
    }
}
