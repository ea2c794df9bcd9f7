//! Wire format error types

use thiserror::Error;

/// Errors from parsing a single StatsD line
///
/// Parse errors are logged and the offending record dropped; they never
/// abort processing of the remaining lines in a packet.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Line contains bytes that are not valid UTF-8
    #[error("metric line is not valid UTF-8")]
    NotUtf8,

    /// Line has no `:` separating name from value
    #[error("metric line has no ':' separator")]
    MissingValue,

    /// Line starts with `:` - a metric without a name
    #[error("metric line has an empty name")]
    EmptyName,

    /// Value section has no `|` separating value from type
    #[error("metric '{name}' has no '|' type separator")]
    MissingType {
        /// Name of the offending metric
        name: String,
    },

    /// Value does not parse as a 64-bit float
    #[error("metric '{name}' has non-numeric value '{value}'")]
    InvalidValue {
        /// Name of the offending metric
        name: String,
        /// The rejected value token
        value: String,
    },

    /// Type token is not one of `c`, `ms`, `g`
    #[error("metric '{name}' has unknown type '{found}'")]
    UnknownType {
        /// Name of the offending metric
        name: String,
        /// The rejected type token
        found: String,
    },
}
