//! Pipeline wiring, worker loops and supervised shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use crossfire::{MAsyncRx, MAsyncTx};
use shunt_backend::Backend;
use shunt_protocol::{MAX_DATAGRAM_SIZE, MetricRecord, packet_lines, parse_line};
use shunt_routing::RoutingTable;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{UdpSocket, lookup_host};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::PipelineError;
use crate::metrics::PipelineMetrics;
use crate::{QUEUE_CAPACITY, WORKER_COUNT};

/// Receive buffer requested for the listen socket
const SOCKET_RECV_BUFFER_SIZE: usize = 256 * 1024;

/// Cadence of the debug packet-rate report
const STATS_INTERVAL: Duration = Duration::from_secs(10);

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bind address for the StatsD listener
    pub bind_address: String,

    /// Listen port; 0 picks an ephemeral port
    pub port: u16,

    /// Log a packet-rate report every 10 seconds
    pub debug_stats: bool,
}

impl PipelineConfig {
    /// The listen address to resolve
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            port: 48125,
            debug_stats: false,
        }
    }
}

/// The running dataplane
///
/// Holds the worker join handles plus the routing table and master
/// backend it supervises. [`Pipeline::shutdown`] tears the whole
/// dataplane down in order: workers first, backends second.
pub struct Pipeline {
    table: Arc<RoutingTable>,
    master: Arc<Backend>,
    metrics: Arc<PipelineMetrics>,
    cancel: CancellationToken,
    local_addr: SocketAddr,
    workers: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Bind the listen socket and start all workers
    pub async fn start(
        config: PipelineConfig,
        table: Arc<RoutingTable>,
        master: Arc<Backend>,
        cancel: CancellationToken,
    ) -> Result<Self, PipelineError> {
        let listen_addr = config.listen_addr();
        let resolved_addrs: Vec<SocketAddr> = lookup_host(&listen_addr)
            .await
            .map_err(|e| PipelineError::Resolve {
                addr: listen_addr.clone(),
                source: e,
            })?
            .collect();
        let resolved: SocketAddr = match resolved_addrs.into_iter().next() {
            Some(a) => a,
            None => return Err(PipelineError::NoAddress { addr: listen_addr }),
        };

        let socket = bind_listen_socket(resolved)
            .map_err(|e| PipelineError::Bind {
                addr: resolved,
                source: e,
            })?;
        let local_addr = socket.local_addr().map_err(|e| PipelineError::Bind {
            addr: resolved,
            source: e,
        })?;

        info!(addr = %local_addr, "StatsD listener started");

        let (packet_tx, packet_rx) = crossfire::mpmc::bounded_async::<Bytes>(QUEUE_CAPACITY);
        let (record_tx, record_rx) =
            crossfire::mpmc::bounded_async::<MetricRecord>(QUEUE_CAPACITY);

        let metrics = Arc::new(PipelineMetrics::new());
        let mut workers = Vec::with_capacity(2 * WORKER_COUNT + 2);

        workers.push(tokio::spawn(receive_loop(
            socket,
            packet_tx,
            Arc::clone(&metrics),
            cancel.clone(),
        )));

        for worker_id in 0..WORKER_COUNT {
            workers.push(tokio::spawn(parse_worker(
                worker_id,
                packet_rx.clone(),
                record_tx.clone(),
                Arc::clone(&metrics),
                cancel.clone(),
            )));
        }

        for worker_id in 0..WORKER_COUNT {
            workers.push(tokio::spawn(dispatch_worker(
                worker_id,
                record_rx.clone(),
                Arc::clone(&table),
                Arc::clone(&master),
                Arc::clone(&metrics),
                cancel.clone(),
            )));
        }

        if config.debug_stats {
            workers.push(tokio::spawn(stats_reporter(
                Arc::clone(&metrics),
                cancel.clone(),
            )));
        }

        Ok(Self {
            table,
            master,
            metrics,
            cancel,
            local_addr,
            workers,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Pipeline counters
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Stop the dataplane
    ///
    /// Signals shutdown, joins the receive/parse/dispatch workers, then
    /// shuts down the master backend and every registered backend
    /// concurrently and joins them too.
    pub async fn shutdown(self) {
        info!("pipeline shutting down");
        self.cancel.cancel();

        for worker in self.workers {
            let _ = worker.await;
        }

        let master = Arc::clone(&self.master);
        let master_task = tokio::spawn(async move { master.shutdown().await });
        self.table.shutdown().await;
        let _ = master_task.await;

        let snapshot = self.metrics.snapshot();
        info!(
            packets = snapshot.packets_received,
            records = snapshot.records_parsed,
            malformed = snapshot.records_malformed,
            copies = snapshot.copies_enqueued,
            "pipeline shutdown complete"
        );
    }
}

/// Bind the UDP listen socket with a widened receive buffer
fn bind_listen_socket(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    // UDP bursts arrive faster than the pipeline drains; a larger kernel
    // buffer absorbs them. Not fatal when the kernel refuses.
    if let Err(e) = socket.set_recv_buffer_size(SOCKET_RECV_BUFFER_SIZE) {
        warn!(error = %e, requested = SOCKET_RECV_BUFFER_SIZE, "failed to set SO_RCVBUF");
    }

    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;

    UdpSocket::from_std(socket.into())
}

/// Receive worker: socket reads into the packet queue
///
/// Each datagram gets a fresh maximum-size buffer; whatever the OS
/// delivers (including a truncated oversize datagram) is processed as
/// received. Read errors are logged and reading continues.
async fn receive_loop(
    socket: UdpSocket,
    packets: MAsyncTx<Bytes>,
    metrics: Arc<PipelineMetrics>,
    cancel: CancellationToken,
) {
    loop {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            received = socket.recv_from(&mut buf) => {
                match received {
                    Ok((len, peer)) => {
                        metrics.record_packet(len as u64);
                        trace!(peer = %peer, len, "received datagram");
                        buf.truncate(len);

                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            result = packets.send(Bytes::from(buf)) => {
                                if result.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        metrics.record_recv_error();
                        warn!(error = %e, "UDP receive failed");
                    }
                }
            }
        }
    }

    debug!("receive worker stopped");
}

/// Parse worker: packets off the queue, records onto the queue
///
/// Splits each packet on newlines and parses every line; malformed lines
/// are logged and dropped, the rest of the packet is still processed.
async fn parse_worker(
    worker_id: usize,
    packets: MAsyncRx<Bytes>,
    records: MAsyncTx<MetricRecord>,
    metrics: Arc<PipelineMetrics>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            received = packets.recv() => {
                let Ok(packet) = received else { break };

                for line in packet_lines(&packet) {
                    match parse_line(line) {
                        Ok(record) => {
                            metrics.record_parsed();
                            tokio::select! {
                                biased;
                                _ = cancel.cancelled() => return,
                                result = records.send(record) => {
                                    if result.is_err() {
                                        return;
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            metrics.record_malformed();
                            debug!(worker_id, error = %e, "dropping malformed metric");
                        }
                    }
                }
            }
        }
    }

    debug!(worker_id, "parse worker stopped");
}

/// Dispatch worker: fan records out to matching live backends
///
/// Takes a routing snapshot per record. Every live backend of every
/// matching rule gets one copy of the raw line; the master backend gets
/// one copy for every record when it is live.
async fn dispatch_worker(
    worker_id: usize,
    records: MAsyncRx<MetricRecord>,
    table: Arc<RoutingTable>,
    master: Arc<Backend>,
    metrics: Arc<PipelineMetrics>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            received = records.recv() => {
                let Ok(record) = received else { break };

                let snapshot = table.snapshot();
                let mut copies: u64 = 0;

                for rule in snapshot.rules() {
                    if rule.matches(&record.name) {
                        for backend in rule.backends() {
                            if backend.is_alive() {
                                backend.enqueue(record.raw.clone()).await;
                                copies += 1;
                            }
                        }
                    }
                }

                if master.is_alive() {
                    master.enqueue(record.raw.clone()).await;
                    copies += 1;
                }

                metrics.record_dispatched(copies);
            }
        }
    }

    debug!(worker_id, "dispatch worker stopped");
}

/// Debug-mode packet-rate report
async fn stats_reporter(metrics: Arc<PipelineMetrics>, cancel: CancellationToken) {
    let mut ticker = interval(STATS_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    let mut last_count = metrics.snapshot().packets_received;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => return,

            _ = ticker.tick() => {
                let count = metrics.snapshot().packets_received;
                let delta = count.saturating_sub(last_count);
                last_count = count;
                info!(
                    packets_total = count,
                    packets_per_sec = delta as f64 / STATS_INTERVAL.as_secs_f64(),
                    "packet counter"
                );
            }
        }
    }
}
