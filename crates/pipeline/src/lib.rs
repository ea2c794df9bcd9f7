//! Shunt - Pipeline
//!
//! The dataplane: one receive worker owning the bound UDP socket, a pool
//! of parse workers and a pool of dispatch workers, connected by small
//! bounded queues.
//!
//! ```text
//! [UDP socket]                      [parse x4]                [dispatch x4]
//!     recv ──→ packet queue (4) ──→ split + parse ──→ metric queue (4) ──→ rules ──→ backend send queues
//!                                                                    └──→ master
//! ```
//!
//! # Design
//!
//! - Queues are multi-producer/multi-consumer and deliberately shallow -
//!   the pipeline exerts backpressure instead of buffering bursts
//! - Dispatch reads a lock-free routing table snapshot per record and
//!   forwards `record.raw` untouched
//! - Shutdown is cooperative through a single cancellation token; the
//!   pipeline joins its own workers, then terminates the master backend
//!   and every registered backend concurrently

mod error;
mod metrics;
mod pipeline;

#[cfg(test)]
mod pipeline_test;

pub use error::PipelineError;
pub use metrics::{PipelineMetrics, PipelineSnapshot};
pub use pipeline::{Pipeline, PipelineConfig};

/// Capacity of the packet and metric queues
pub const QUEUE_CAPACITY: usize = 4;

/// Parse and dispatch workers per pool
pub const WORKER_COUNT: usize = 4;
