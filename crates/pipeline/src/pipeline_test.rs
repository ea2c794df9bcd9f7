//! End-to-end pipeline tests
//!
//! Each test stands up the real dataplane on ephemeral localhost ports:
//! scripted management servers drive backend liveness, UDP receivers
//! stand in for downstream StatsD nodes, and assertions are made on the
//! exact datagram bytes that arrive (or don't).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use shunt_backend::Backend;
use shunt_config::{NodeSpec, RulesDocument};
use shunt_routing::RoutingTable;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::{Pipeline, PipelineConfig};

const SLOW_PROBE: Duration = Duration::from_secs(60);
const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const SILENCE_WINDOW: Duration = Duration::from_millis(300);

/// Management server answering every request with a fixed reply
async fn spawn_mgmt_server(reply: &'static [u8]) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 64];
                while let Ok(n) = stream.read(&mut buf).await {
                    if n == 0 || stream.write_all(reply).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    port
}

/// A localhost port with nothing listening on it
async fn refused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// Downstream node fixture: a UDP receiver plus its management side
struct TestNode {
    spec: NodeSpec,
    receiver: UdpSocket,
}

impl TestNode {
    async fn healthy() -> Self {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mgmt_port = spawn_mgmt_server(b"up").await;
        let spec = NodeSpec::new(
            "127.0.0.1",
            receiver.local_addr().unwrap().port(),
            mgmt_port,
        );
        Self { spec, receiver }
    }

    async fn dead() -> Self {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mgmt_port = refused_port().await;
        let spec = NodeSpec::new(
            "127.0.0.1",
            receiver.local_addr().unwrap().port(),
            mgmt_port,
        );
        Self { spec, receiver }
    }

    /// Wait for one datagram and assert its exact bytes
    async fn expect(&self, expected: &[u8]) {
        let mut buf = [0u8; 1024];
        let (n, _) = timeout(RECV_TIMEOUT, self.receiver.recv_from(&mut buf))
            .await
            .unwrap_or_else(|_| panic!("{}: expected a datagram", self.spec))
            .unwrap();
        assert_eq!(&buf[..n], expected);
    }

    /// Collect `count` datagrams, sorted for order-independent comparison
    async fn collect(&self, count: usize) -> Vec<Vec<u8>> {
        let mut datagrams = Vec::with_capacity(count);
        let mut buf = [0u8; 1024];
        for _ in 0..count {
            let (n, _) = timeout(RECV_TIMEOUT, self.receiver.recv_from(&mut buf))
                .await
                .unwrap_or_else(|_| panic!("{}: expected {} datagrams", self.spec, count))
                .unwrap();
            datagrams.push(buf[..n].to_vec());
        }
        datagrams.sort();
        datagrams
    }

    /// Assert that nothing arrives within the silence window
    async fn expect_silence(&self) {
        let mut buf = [0u8; 1024];
        let outcome = timeout(SILENCE_WINDOW, self.receiver.recv_from(&mut buf)).await;
        assert!(outcome.is_err(), "{}: unexpected datagram", self.spec);
    }
}

fn doc(entries: &[(&str, &[&TestNode])]) -> RulesDocument {
    let mut rules = BTreeMap::new();
    for (pattern, nodes) in entries {
        rules.insert(
            pattern.to_string(),
            nodes.iter().map(|n| n.spec.clone()).collect(),
        );
    }
    RulesDocument { rules }
}

/// Stand up a router with the given rules and master
async fn start_router(
    rules: &[(&str, &[&TestNode])],
    master: &TestNode,
) -> (Pipeline, Arc<RoutingTable>) {
    let cancel = CancellationToken::new();
    let table = Arc::new(RoutingTable::new(SLOW_PROBE, cancel.clone()));
    table.update(&doc(rules)).await.unwrap();

    let master_backend = Arc::new(
        Backend::connect(master.spec.clone(), SLOW_PROBE, &cancel)
            .await
            .unwrap(),
    );

    let config = PipelineConfig {
        bind_address: "127.0.0.1".into(),
        port: 0,
        debug_stats: false,
    };
    let pipeline = Pipeline::start(config, Arc::clone(&table), master_backend, cancel)
        .await
        .unwrap();

    (pipeline, table)
}

async fn send(pipeline: &Pipeline, payload: &[u8]) {
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(payload, pipeline.local_addr()).await.unwrap();
}

// =============================================================================
// Fan-out scenarios
// =============================================================================

#[tokio::test]
async fn test_single_rule_match() {
    let b1 = TestNode::healthy().await;
    let master = TestNode::healthy().await;
    let (pipeline, _table) = start_router(&[("^foo\\.", &[&b1])], &master).await;

    send(&pipeline, b"foo.bar:1|c\nbaz:2|c").await;

    b1.expect(b"foo.bar:1|c").await;
    b1.expect_silence().await;

    let received = master.collect(2).await;
    assert_eq!(received, vec![b"baz:2|c".to_vec(), b"foo.bar:1|c".to_vec()]);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_multi_rule_fan_out() {
    let b1 = TestNode::healthy().await;
    let b2 = TestNode::healthy().await;
    let master = TestNode::healthy().await;
    let (pipeline, _table) =
        start_router(&[("^foo", &[&b1, &b2]), ("bar$", &[&b2])], &master).await;

    send(&pipeline, b"foobar:1|g").await;

    // One copy per matching rule per backend
    b1.expect(b"foobar:1|g").await;
    b1.expect_silence().await;

    let b2_received = b2.collect(2).await;
    assert_eq!(
        b2_received,
        vec![b"foobar:1|g".to_vec(), b"foobar:1|g".to_vec()]
    );

    master.expect(b"foobar:1|g").await;
    master.expect_silence().await;

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_dead_backend_skipped() {
    let b1 = TestNode::dead().await;
    let b2 = TestNode::healthy().await;
    let master = TestNode::healthy().await;
    let (pipeline, _table) = start_router(&[(".*", &[&b1, &b2])], &master).await;

    send(&pipeline, b"x:1|c").await;

    b2.expect(b"x:1|c").await;
    master.expect(b"x:1|c").await;
    b1.expect_silence().await;

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_dead_master_no_egress() {
    let master = TestNode::dead().await;
    let (pipeline, _table) = start_router(&[], &master).await;

    send(&pipeline, b"x:1|c").await;

    master.expect_silence().await;

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_unknown_type_dropped_everywhere() {
    let b1 = TestNode::healthy().await;
    let master = TestNode::healthy().await;
    let (pipeline, _table) = start_router(&[(".*", &[&b1])], &master).await;

    send(&pipeline, b"x:1|xyz").await;

    b1.expect_silence().await;
    master.expect_silence().await;

    pipeline.shutdown().await;
}

// =============================================================================
// Packet boundaries
// =============================================================================

#[tokio::test]
async fn test_malformed_line_does_not_poison_packet() {
    let master = TestNode::healthy().await;
    let (pipeline, _table) = start_router(&[], &master).await;

    send(&pipeline, b"a:1|c\nbad:1|xyz\nb:2|g").await;

    let received = master.collect(2).await;
    assert_eq!(received, vec![b"a:1|c".to_vec(), b"b:2|g".to_vec()]);
    master.expect_silence().await;

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_trailing_newline_dispatches_no_empty_record() {
    let master = TestNode::healthy().await;
    let (pipeline, _table) = start_router(&[], &master).await;

    send(&pipeline, b"a:1|c\n").await;

    master.expect(b"a:1|c").await;
    master.expect_silence().await;

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_empty_packet_yields_no_records() {
    let master = TestNode::healthy().await;
    let (pipeline, _table) = start_router(&[], &master).await;

    send(&pipeline, b"").await;

    master.expect_silence().await;

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_full_size_datagram_processed_whole() {
    let master = TestNode::healthy().await;
    let (pipeline, _table) = start_router(&[], &master).await;

    let mut payload = b"padded:1|c".to_vec();
    let filler = 1024 - payload.len() - "tail:2|c".len();
    payload.extend(std::iter::repeat_n(b'\n', filler));
    payload.extend_from_slice(b"tail:2|c");
    assert_eq!(payload.len(), 1024);

    send(&pipeline, &payload).await;

    let received = master.collect(2).await;
    assert_eq!(received, vec![b"padded:1|c".to_vec(), b"tail:2|c".to_vec()]);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_sample_rate_suffix_forwarded_untouched() {
    let b1 = TestNode::healthy().await;
    let master = TestNode::healthy().await;
    let (pipeline, _table) = start_router(&[(".*", &[&b1])], &master).await;

    send(&pipeline, b"api.latency:320|ms@0.1").await;

    b1.expect(b"api.latency:320|ms@0.1").await;
    master.expect(b"api.latency:320|ms@0.1").await;

    pipeline.shutdown().await;
}

// =============================================================================
// Live reconfiguration and shutdown
// =============================================================================

#[tokio::test]
async fn test_update_takes_effect_without_restart() {
    let b1 = TestNode::healthy().await;
    let b2 = TestNode::healthy().await;
    let master = TestNode::healthy().await;
    let (pipeline, table) = start_router(&[("^alpha", &[&b1])], &master).await;

    send(&pipeline, b"alpha.one:1|c").await;
    b1.expect(b"alpha.one:1|c").await;

    // Extend the table while traffic keeps flowing
    table.update(&doc(&[("^beta", &[&b2])])).await.unwrap();

    send(&pipeline, b"beta.one:1|c").await;
    b2.expect(b"beta.one:1|c").await;
    b1.expect_silence().await;

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_completes() {
    let b1 = TestNode::healthy().await;
    let master = TestNode::healthy().await;
    let (pipeline, _table) = start_router(&[(".*", &[&b1])], &master).await;

    send(&pipeline, b"x:1|c").await;
    b1.expect(b"x:1|c").await;

    timeout(Duration::from_secs(5), pipeline.shutdown())
        .await
        .expect("pipeline shutdown did not complete");
}

#[tokio::test]
async fn test_metrics_count_packets_and_records() {
    let master = TestNode::healthy().await;
    let (pipeline, _table) = start_router(&[], &master).await;

    send(&pipeline, b"a:1|c\nbad-line\nb:2|g").await;
    master.collect(2).await;

    let snapshot = pipeline.metrics().snapshot();
    assert_eq!(snapshot.packets_received, 1);
    assert_eq!(snapshot.records_parsed, 2);
    assert_eq!(snapshot.records_malformed, 1);

    pipeline.shutdown().await;
}
