//! Backend construction, send path and shutdown

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use crossfire::{MAsyncRx, MAsyncTx};
use shunt_config::NodeSpec;
use tokio::net::{TcpStream, UdpSocket, lookup_host};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::BackendError;
use crate::probe::Prober;
use crate::{SEND_QUEUE_CAPACITY, SENDER_COUNT};

/// One downstream StatsD node
///
/// Cheap to share behind an `Arc`; the routing table hands the same
/// instance to every rule referencing the identity triple.
pub struct Backend {
    node: NodeSpec,
    alive: Arc<AtomicBool>,
    mgmt: Arc<Mutex<Option<TcpStream>>>,
    queue: MAsyncTx<Bytes>,
    cancel: CancellationToken,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl Backend {
    /// Construct a backend and start its workers
    ///
    /// Resolves and connects the UDP data side, dials the management
    /// port (`ECONNREFUSED` degrades to a null handle instead of
    /// failing), seeds the liveness flag with one synchronous probe, then
    /// spawns the sender pool and the probe worker.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the data address does not resolve,
    /// the UDP socket cannot be opened, or the management dial fails with
    /// anything other than connection refused.
    pub async fn connect(
        node: NodeSpec,
        probe_interval: Duration,
        shutdown: &CancellationToken,
    ) -> Result<Self, BackendError> {
        let socket = open_data_socket(&node).await?;

        let mgmt_stream = match TcpStream::connect(node.mgmt_addr()).await {
            Ok(stream) => Some(stream),
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                info!(backend = %node, "management port refused connection, starting not-live");
                None
            }
            Err(e) => {
                return Err(BackendError::MgmtDial {
                    node,
                    source: e,
                });
            }
        };

        let (queue_tx, queue_rx) = crossfire::mpmc::bounded_async::<Bytes>(SEND_QUEUE_CAPACITY);
        let cancel = shutdown.child_token();
        let socket = Arc::new(socket);
        let mgmt = Arc::new(Mutex::new(mgmt_stream));
        let alive = Arc::new(AtomicBool::new(false));

        let prober = Prober::new(node.clone(), Arc::clone(&mgmt), Arc::clone(&alive));
        prober.probe_once().await;
        if !alive.load(Ordering::Relaxed) {
            info!(backend = %node, "freshly created backend is not alive");
        }

        let mut workers = Vec::with_capacity(SENDER_COUNT + 1);
        for worker_id in 0..SENDER_COUNT {
            workers.push(tokio::spawn(sender_loop(
                worker_id,
                node.clone(),
                Arc::clone(&socket),
                queue_rx.clone(),
                cancel.clone(),
            )));
        }
        workers.push(tokio::spawn(prober.run(probe_interval, cancel.clone())));

        debug!(backend = %node, senders = SENDER_COUNT, "backend started");

        Ok(Self {
            node,
            alive,
            mgmt,
            queue: queue_tx,
            cancel,
            workers: parking_lot::Mutex::new(workers),
        })
    }

    /// The backend's identity triple
    pub fn node(&self) -> &NodeSpec {
        &self.node
    }

    /// Current liveness as last observed by the probe worker
    ///
    /// Lock-free; may lag the true state by up to one probe interval plus
    /// one probe duration.
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// Queue a payload for delivery
    ///
    /// Blocks while the send queue is full; a shutdown signalled in the
    /// meantime abandons the payload silently.
    pub async fn enqueue(&self, payload: Bytes) {
        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => {
                trace!(backend = %self.node, "enqueue abandoned, backend shutting down");
            }

            result = self.queue.send(payload) => {
                if result.is_err() {
                    trace!(backend = %self.node, "send queue closed");
                }
            }
        }
    }

    /// Stop workers and close connections
    ///
    /// Signals the backend's token, joins every sender and the probe
    /// worker, then drops the management connection. The UDP socket
    /// closes with the last sender.
    pub async fn shutdown(&self) {
        debug!(backend = %self.node, "terminating backend");
        self.cancel.cancel();

        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for worker in workers {
            let _ = worker.await;
        }

        self.mgmt.lock().await.take();
        debug!(backend = %self.node, "backend terminated");
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("node", &self.node)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Resolve the data address and open a connected UDP socket for it
async fn open_data_socket(node: &NodeSpec) -> Result<UdpSocket, BackendError> {
    let addr = node.data_addr();
    let addrs: Vec<SocketAddr> = lookup_host(&addr)
        .await
        .map_err(|e| BackendError::Resolve {
            addr: addr.clone(),
            source: e,
        })?
        .collect();
    let resolved: SocketAddr = match addrs.into_iter().next() {
        Some(a) => a,
        None => return Err(BackendError::NoAddress { addr }),
    };

    let bind_addr: SocketAddr = if resolved.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
    };

    let socket = UdpSocket::bind(bind_addr)
        .await
        .map_err(|e| BackendError::DataSocket {
            node: node.clone(),
            source: e,
        })?;
    socket
        .connect(resolved)
        .await
        .map_err(|e| BackendError::DataSocket {
            node: node.clone(),
            source: e,
        })?;

    Ok(socket)
}

/// Drain the send queue into the UDP socket
///
/// A failed write drops the datagram - no retry, no buffering beyond the
/// queue itself.
async fn sender_loop(
    worker_id: usize,
    node: NodeSpec,
    socket: Arc<UdpSocket>,
    queue: MAsyncRx<Bytes>,
    cancel: CancellationToken,
) {
    trace!(backend = %node, worker_id, "sender started");

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            received = queue.recv() => {
                match received {
                    Ok(payload) => {
                        if let Err(e) = socket.send(&payload).await {
                            warn!(backend = %node, error = %e, "UDP send failed, dropping datagram");
                        }
                    }
                    // Queue closed - producer side is gone
                    Err(_) => break,
                }
            }
        }
    }

    trace!(backend = %node, worker_id, "sender stopped");
}
