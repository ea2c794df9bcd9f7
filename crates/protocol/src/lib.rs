//! Shunt - Protocol
//!
//! Types and parsing for the StatsD text wire format.
//!
//! # Wire Format
//!
//! One metric per newline-separated line:
//!
//! ```text
//! NAME:VALUE|TYPE[@SAMPLERATE]
//! ```
//!
//! Accepted types are counters (`c`), timings (`ms`) and gauges (`g`).
//! The sample-rate suffix is parsed but carries no routing semantics.
//!
//! # Zero-Copy Guarantees
//!
//! - [`MetricRecord::raw`] is a [`bytes::Bytes`] slice of the original
//!   datagram - forwarding never re-serializes a metric
//! - [`packet_lines`] yields `Bytes` slices sharing the packet allocation
//!
//! # Example
//!
//! ```
//! use shunt_protocol::{parse_line, MetricKind};
//! use bytes::Bytes;
//!
//! let record = parse_line(Bytes::from_static(b"api.latency:320|ms@0.1")).unwrap();
//! assert_eq!(record.name, "api.latency");
//! assert_eq!(record.kind, MetricKind::Timing);
//! assert_eq!(record.raw.as_ref(), b"api.latency:320|ms@0.1");
//! ```

mod error;
mod record;


pub use error::ParseError;
pub use record::{MetricKind, MetricRecord, packet_lines, parse_line};

/// Maximum datagram payload accepted on the wire
///
/// Datagrams larger than this are truncated by the OS before we ever see
/// them; the truncated bytes are parsed as received.
pub const MAX_DATAGRAM_SIZE: usize = 1024;
