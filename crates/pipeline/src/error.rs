//! Pipeline error types

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors from starting the pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Listen address did not resolve
    #[error("failed to resolve listen address '{addr}': {source}")]
    Resolve {
        /// The unresolvable address
        addr: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// Listen address resolved to nothing
    #[error("listen address '{addr}' did not resolve to any socket address")]
    NoAddress {
        /// The empty-resolving address
        addr: String,
    },

    /// Could not bind the UDP listener
    #[error("failed to bind UDP listener on {addr}: {source}")]
    Bind {
        /// The rejected socket address
        addr: SocketAddr,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },
}
