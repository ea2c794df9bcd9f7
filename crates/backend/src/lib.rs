//! Shunt - Backend
//!
//! One [`Backend`] per distinct downstream node, identified by the
//! (host, data port, management port) triple. A backend owns:
//!
//! - a connected UDP socket for metric payloads,
//! - a bounded send queue drained by a pool of sender workers,
//! - a long-lived TCP management connection probed with `health`
//!   round-trips, feeding a lock-free liveness flag.
//!
//! # Liveness
//!
//! Dispatch workers read [`Backend::is_alive`] without locking; the flag
//! is written only by the probe worker. Stale reads are acceptable - the
//! probe interval bounds the staleness.
//!
//! # Shutdown
//!
//! [`Backend::shutdown`] cancels the backend's token, joins the sender
//! and probe workers, and closes the management connection. Enqueues that
//! are blocked on a full queue during shutdown abandon their payload.

mod backend;
mod error;
mod probe;


pub use backend::Backend;
pub use error::BackendError;

use std::time::Duration;

/// Capacity of each backend's send queue
pub const SEND_QUEUE_CAPACITY: usize = 4;

/// Sender workers per backend
pub const SENDER_COUNT: usize = 4;

/// Deadline for each management connect, write and read
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
