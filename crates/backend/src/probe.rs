//! Health probing over the management connection
//!
//! A probe is one `health` request/reply round-trip on the long-lived TCP
//! management connection. The reply is live iff it contains `up` after
//! trailing NUL padding is trimmed; anything else, including `down`, means
//! not-live.
//!
//! `check_alive` is expressed as a small state machine with a per-call
//! retry budget of one: a failed open, write or read tears the connection
//! down and re-enters `NeedOpen` exactly once before giving up.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use shunt_config::NodeSpec;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::PROBE_TIMEOUT;

/// Probe request payload
const HEALTH_REQUEST: &[u8] = b"health";

/// Maximum probe reply we look at
const REPLY_BUFFER_SIZE: usize = 1024;

/// Steps of one `check_alive` invocation
enum ProbeStep {
    /// Ensure the management connection is open
    NeedOpen,
    /// Write the `health` request
    WriteHealth,
    /// Read and classify the reply
    ReadReply,
}

/// Probe-side state of a backend
///
/// Shares the management connection and liveness flag with the owning
/// [`Backend`](crate::Backend).
pub(crate) struct Prober {
    node: NodeSpec,
    mgmt: Arc<Mutex<Option<TcpStream>>>,
    alive: Arc<AtomicBool>,
}

impl Prober {
    pub(crate) fn new(
        node: NodeSpec,
        mgmt: Arc<Mutex<Option<TcpStream>>>,
        alive: Arc<AtomicBool>,
    ) -> Self {
        Self { node, mgmt, alive }
    }

    /// Run one probe and store the result in the liveness flag
    pub(crate) async fn probe_once(&self) {
        let alive = self.check_alive().await;
        let was_alive = self.alive.swap(alive, Ordering::Relaxed);
        if was_alive != alive {
            info!(backend = %self.node, alive, "backend liveness changed");
        }
    }

    /// Probe loop: one `check_alive` per tick until shutdown
    ///
    /// The first tick is consumed immediately - liveness was already
    /// seeded by the synchronous probe at construction.
    pub(crate) async fn run(self, probe_interval: Duration, cancel: CancellationToken) {
        let mut ticker = interval(probe_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(backend = %self.node, "probe worker stopped");
                    return;
                }

                _ = ticker.tick() => {
                    self.probe_once().await;
                }
            }
        }
    }

    /// One full health check round-trip
    ///
    /// Holds the management lock for the duration of the call so probe
    /// traffic on the connection is never interleaved.
    pub(crate) async fn check_alive(&self) -> bool {
        let mut mgmt = self.mgmt.lock().await;
        let mut reply = [0u8; REPLY_BUFFER_SIZE];
        let mut retried = false;
        let mut step = ProbeStep::NeedOpen;

        loop {
            match step {
                ProbeStep::NeedOpen => {
                    if mgmt.is_none() {
                        match self.open_mgmt().await {
                            Ok(stream) => *mgmt = Some(stream),
                            Err(e) => {
                                debug!(backend = %self.node, error = %e, "management reconnect failed");
                                if retried {
                                    return false;
                                }
                                retried = true;
                                continue;
                            }
                        }
                    }
                    step = ProbeStep::WriteHealth;
                }

                ProbeStep::WriteHealth => {
                    let Some(stream) = mgmt.as_mut() else {
                        step = ProbeStep::NeedOpen;
                        continue;
                    };
                    match timed_io(stream.write_all(HEALTH_REQUEST)).await {
                        Ok(()) => step = ProbeStep::ReadReply,
                        Err(e) => {
                            debug!(backend = %self.node, error = %e, "health write failed");
                            *mgmt = None;
                            if retried {
                                return false;
                            }
                            retried = true;
                            step = ProbeStep::NeedOpen;
                        }
                    }
                }

                ProbeStep::ReadReply => {
                    let Some(stream) = mgmt.as_mut() else {
                        step = ProbeStep::NeedOpen;
                        continue;
                    };
                    match timed_io(stream.read(&mut reply)).await {
                        Ok(0) => {
                            // Peer closed the connection
                            debug!(backend = %self.node, "management connection closed by peer");
                            *mgmt = None;
                            if retried {
                                return false;
                            }
                            retried = true;
                            step = ProbeStep::NeedOpen;
                        }
                        Ok(n) => {
                            let status = trim_trailing_nuls(&reply[..n]);
                            let alive = contains_up(status);
                            trace!(
                                backend = %self.node,
                                reply = %String::from_utf8_lossy(status),
                                alive,
                                "probe reply"
                            );
                            return alive;
                        }
                        Err(e) => {
                            debug!(backend = %self.node, error = %e, "health read failed");
                            *mgmt = None;
                            if retried {
                                return false;
                            }
                            retried = true;
                            step = ProbeStep::NeedOpen;
                        }
                    }
                }
            }
        }
    }

    /// Dial the management port with the probe deadline
    async fn open_mgmt(&self) -> io::Result<TcpStream> {
        match timeout(PROBE_TIMEOUT, TcpStream::connect(self.node.mgmt_addr())).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "management connect timed out",
            )),
        }
    }
}

/// Apply the probe deadline to a single read or write
async fn timed_io<T>(
    op: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    match timeout(PROBE_TIMEOUT, op).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "management I/O timed out",
        )),
    }
}

/// Strip trailing NUL padding from a probe reply
fn trim_trailing_nuls(reply: &[u8]) -> &[u8] {
    let end = reply
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |pos| pos + 1);
    &reply[..end]
}

/// Substring search for the literal `up`
fn contains_up(status: &[u8]) -> bool {
    status.windows(2).any(|window| window == b"up")
}
