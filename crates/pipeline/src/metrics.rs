//! Pipeline counters
//!
//! Best-effort atomics off the hot path's critical sections; readable at
//! any time through [`PipelineMetrics::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the receive, parse and dispatch stages
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Datagrams read off the socket
    pub packets_received: AtomicU64,

    /// Payload bytes read off the socket
    pub bytes_received: AtomicU64,

    /// Failed socket reads
    pub recv_errors: AtomicU64,

    /// Lines parsed into accepted records
    pub records_parsed: AtomicU64,

    /// Lines dropped by the parser
    pub records_malformed: AtomicU64,

    /// Records that went through dispatch
    pub records_dispatched: AtomicU64,

    /// Copies placed on backend send queues (rule matches plus master)
    pub copies_enqueued: AtomicU64,
}

impl PipelineMetrics {
    /// Create a zeroed metrics instance
    pub const fn new() -> Self {
        Self {
            packets_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            recv_errors: AtomicU64::new(0),
            records_parsed: AtomicU64::new(0),
            records_malformed: AtomicU64::new(0),
            records_dispatched: AtomicU64::new(0),
            copies_enqueued: AtomicU64::new(0),
        }
    }

    /// Record a received datagram
    #[inline]
    pub fn record_packet(&self, bytes: u64) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a failed socket read
    #[inline]
    pub fn record_recv_error(&self) {
        self.recv_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an accepted record
    #[inline]
    pub fn record_parsed(&self) {
        self.records_parsed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dropped line
    #[inline]
    pub fn record_malformed(&self) {
        self.records_malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dispatched record and the copies it produced
    #[inline]
    pub fn record_dispatched(&self, copies: u64) {
        self.records_dispatched.fetch_add(1, Ordering::Relaxed);
        self.copies_enqueued.fetch_add(copies, Ordering::Relaxed);
    }

    /// Point-in-time snapshot of all counters
    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            recv_errors: self.recv_errors.load(Ordering::Relaxed),
            records_parsed: self.records_parsed.load(Ordering::Relaxed),
            records_malformed: self.records_malformed.load(Ordering::Relaxed),
            records_dispatched: self.records_dispatched.load(Ordering::Relaxed),
            copies_enqueued: self.copies_enqueued.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`PipelineMetrics`]
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineSnapshot {
    pub packets_received: u64,
    pub bytes_received: u64,
    pub recv_errors: u64,
    pub records_parsed: u64,
    pub records_malformed: u64,
    pub records_dispatched: u64,
    pub copies_enqueued: u64,
}
