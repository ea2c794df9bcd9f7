//! Routing error types

use shunt_backend::BackendError;
use shunt_config::NodeSpec;
use thiserror::Error;

/// Result type for routing operations
pub type Result<T> = std::result::Result<T, RoutingError>;

/// Errors from applying a desired configuration
#[derive(Debug, Error)]
pub enum RoutingError {
    /// A rule pattern is not a valid regex
    ///
    /// Patterns are compiled before anything is mutated, so this error
    /// always leaves the table untouched.
    #[error("failed to compile rule pattern '{pattern}': {source}")]
    RuleCompile {
        /// The rejected pattern
        pattern: String,
        /// Underlying regex error
        #[source]
        source: regex::Error,
    },

    /// A referenced backend could not be constructed
    ///
    /// Additions committed before the failing backend are retained.
    #[error("failed to open backend {node}: {source}")]
    BackendOpen {
        /// Identity of the failing backend
        node: NodeSpec,
        /// Underlying backend error
        #[source]
        source: BackendError,
    },
}
