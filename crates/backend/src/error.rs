//! Backend error types

use std::io;

use shunt_config::NodeSpec;
use thiserror::Error;

/// Errors from constructing a backend
///
/// Construction failures abort the routing update that referenced the
/// backend. A refused management connection is not an error - the backend
/// starts not-live instead.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Data address did not resolve
    #[error("failed to resolve data address '{addr}': {source}")]
    Resolve {
        /// The unresolvable address
        addr: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// Data address resolved to nothing
    #[error("data address '{addr}' did not resolve to any socket address")]
    NoAddress {
        /// The empty-resolving address
        addr: String,
    },

    /// Could not open or connect the UDP send socket
    #[error("failed to open UDP send side for {node}: {source}")]
    DataSocket {
        /// The backend identity
        node: NodeSpec,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// Management dial failed with something other than connection refused
    #[error("failed to dial management port of {node}: {source}")]
    MgmtDial {
        /// The backend identity
        node: NodeSpec,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },
}
