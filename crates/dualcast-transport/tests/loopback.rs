//! Integration tests: ConnectionManager over the in-process loopback network.

use std::sync::Arc;
use std::time::Duration;

use dualcast_transport::loopback::{LoopbackNetwork, PeerBehavior};
use dualcast_transport::{
    ConnectError, ConnectOptions, ConnectOutcome, ConnectionManager, DirectLink, EndpointConfig,
    EndpointState, FaultKind, LinkError, LinkState, RecipientId, SignalingFault,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();
}

fn id(s: &str) -> RecipientId {
    s.parse().unwrap()
}

fn fast_config() -> EndpointConfig {
    EndpointConfig::new()
        .endpoint_id("test-endpoint")
        .connect_timeout(Duration::from_secs(5))
        .reconnect_delay(Duration::from_millis(10))
}

fn manager(network: &Arc<LoopbackNetwork>) -> Arc<ConnectionManager> {
    Arc::new(ConnectionManager::new(network.clone(), fast_config()))
}

/// Poll `check` until it holds or two seconds pass.
async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn connect_opens_and_registers_link() {
    init_tracing();
    let network = Arc::new(LoopbackNetwork::new());
    network.add_peer(id("bob"), PeerBehavior::Accept);
    let manager = manager(&network);

    assert_eq!(manager.endpoint_state(), EndpointState::Uninitialized);
    assert_eq!(manager.state(&id("bob")).await, LinkState::Idle);

    let metadata = serde_json::json!({ "name": "alice" });
    let outcome = manager
        .connect(&id("bob"), &ConnectOptions::with_metadata(metadata.clone()))
        .await
        .unwrap();

    assert_eq!(outcome, ConnectOutcome::Opened);
    assert_eq!(manager.endpoint_state(), EndpointState::Ready);
    assert_eq!(manager.state(&id("bob")).await, LinkState::Open);
    assert_eq!(manager.connected_recipients().await, vec![id("bob")]);
    assert_eq!(network.endpoint_id().as_deref(), Some("test-endpoint"));

    // Metadata travels with the connection request
    assert_eq!(network.link(&id("bob")).unwrap().metadata(), &metadata);
}

#[tokio::test]
async fn reuse_open_link_without_new_handshake() {
    init_tracing();
    let network = Arc::new(LoopbackNetwork::new());
    network.add_peer(id("bob"), PeerBehavior::Accept);
    let manager = manager(&network);
    let opts = ConnectOptions::default();

    assert_eq!(manager.connect(&id("bob"), &opts).await.unwrap(), ConnectOutcome::Opened);
    assert_eq!(manager.connect(&id("bob"), &opts).await.unwrap(), ConnectOutcome::Reused);
    assert_eq!(manager.connect(&id("bob"), &opts).await.unwrap(), ConnectOutcome::Reused);

    assert_eq!(network.connect_requests(), 1);
    assert_eq!(network.opens(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_connects_share_one_attempt() {
    init_tracing();
    let network = Arc::new(LoopbackNetwork::with_open_delay(Duration::from_millis(50)));
    network.add_peer(id("bob"), PeerBehavior::Accept);
    let manager = manager(&network);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager.connect(&id("bob"), &ConnectOptions::default()).await
        }));
    }

    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert!(matches!(outcome, ConnectOutcome::Opened | ConnectOutcome::Reused));
    }

    assert_eq!(network.connect_requests(), 1);
    assert_eq!(network.opens(), 1);
    assert_eq!(manager.connected_recipients().await.len(), 1);
}

#[tokio::test]
async fn endpoint_is_opened_once_for_many_recipients() {
    init_tracing();
    let network = Arc::new(LoopbackNetwork::new());
    for name in ["a", "b", "c"] {
        network.add_peer(id(name), PeerBehavior::Accept);
    }
    let manager = manager(&network);

    for name in ["a", "b", "c"] {
        manager.connect(&id(name), &ConnectOptions::default()).await.unwrap();
    }

    assert_eq!(network.opens(), 1);
    let mut connected = manager.connected_recipients().await;
    connected.sort();
    assert_eq!(connected, vec![id("a"), id("b"), id("c")]);
}

#[tokio::test]
async fn remote_close_cleans_registry_and_next_connect_reopens() {
    init_tracing();
    let network = Arc::new(LoopbackNetwork::new());
    network.add_peer(id("bob"), PeerBehavior::Accept);
    let manager = manager(&network);
    let opts = ConnectOptions::default();

    manager.connect(&id("bob"), &opts).await.unwrap();
    assert!(network.close_remote(&id("bob")));

    let m = manager.clone();
    assert!(wait_until(|| { let m = m.clone(); async move { m.link(&id("bob")).await.is_none() } }).await);
    assert_eq!(manager.state(&id("bob")).await, LinkState::Closed);

    assert_eq!(manager.connect(&id("bob"), &opts).await.unwrap(), ConnectOutcome::Opened);
    assert_eq!(network.connect_requests(), 2);
    assert_eq!(manager.state(&id("bob")).await, LinkState::Open);

    // The fresh link carries data
    manager.send(&id("bob"), b"after reconnect").await.unwrap();
    assert_eq!(network.received(&id("bob")), vec![b"after reconnect".to_vec()]);
}

#[tokio::test]
async fn close_before_open_resolves_without_registering() {
    init_tracing();
    let network = Arc::new(LoopbackNetwork::new());
    network.add_peer(id("bob"), PeerBehavior::CloseBeforeOpen);
    let manager = manager(&network);

    let outcome = manager.connect(&id("bob"), &ConnectOptions::default()).await.unwrap();
    assert_eq!(outcome, ConnectOutcome::ClosedBeforeOpen);
    assert!(manager.link(&id("bob")).await.is_none());
    assert_eq!(manager.state(&id("bob")).await, LinkState::Closed);

    let err = manager.send(&id("bob"), b"hello").await.unwrap_err();
    assert!(matches!(err, LinkError::NoConnection(ref r) if *r == id("bob")));
}

#[tokio::test]
async fn transport_error_rejects_attempt() {
    init_tracing();
    let network = Arc::new(LoopbackNetwork::new());
    network.add_peer(id("bob"), PeerBehavior::Error);
    let manager = manager(&network);

    let err = manager.connect(&id("bob"), &ConnectOptions::default()).await.unwrap_err();
    assert_eq!(
        err,
        ConnectError::Transport {
            recipient: id("bob"),
            detail: "ice negotiation failed".into(),
        }
    );
    assert_eq!(manager.state(&id("bob")).await, LinkState::Failed(err));
}

#[tokio::test]
async fn unknown_peer_is_unavailable_and_endpoint_stays_usable() {
    init_tracing();
    let network = Arc::new(LoopbackNetwork::new());
    network.add_peer(id("bob"), PeerBehavior::Accept);
    let manager = manager(&network);

    let err = manager.connect(&id("ghost"), &ConnectOptions::default()).await.unwrap_err();
    assert_eq!(err, ConnectError::RecipientUnavailable(id("ghost")));

    // Same endpoint, next attempt works
    let outcome = manager.connect(&id("bob"), &ConnectOptions::default()).await.unwrap();
    assert_eq!(outcome, ConnectOutcome::Opened);
    assert_eq!(network.opens(), 1);
}

#[tokio::test]
async fn other_fault_surfaces_as_signaling_error() {
    init_tracing();
    let network = Arc::new(LoopbackNetwork::new());
    network.add_peer(id("bob"), PeerBehavior::Accept);
    network.fail_next_connect(SignalingFault::new(FaultKind::Other, "server overloaded"));
    let manager = manager(&network);

    let err = manager.connect(&id("bob"), &ConnectOptions::default()).await.unwrap_err();
    assert_eq!(err, ConnectError::Signaling("server overloaded".into()));
}

#[tokio::test]
async fn network_fault_reconnects_and_retries() {
    init_tracing();
    let network = Arc::new(LoopbackNetwork::new());
    network.add_peer(id("bob"), PeerBehavior::Accept);
    network.fail_next_connect(SignalingFault::new(FaultKind::Network, "socket reset"));
    let manager = manager(&network);

    let outcome = manager.connect(&id("bob"), &ConnectOptions::default()).await.unwrap();
    assert_eq!(outcome, ConnectOutcome::Opened);
    assert_eq!(network.reconnects(), 1);
    assert_eq!(network.connect_requests(), 2);
    assert_eq!(manager.endpoint().await.unwrap().reconnect_count(), 1);
}

#[tokio::test]
async fn endpoint_fault_stream_triggers_reconnect() {
    init_tracing();
    let network = Arc::new(LoopbackNetwork::new());
    let manager = manager(&network);
    manager.endpoint().await.unwrap();

    assert!(
        network
            .emit_fault(SignalingFault::new(FaultKind::Disconnected, "lost server"))
            .await
    );
    let n = network.clone();
    assert!(wait_until(|| { let n = n.clone(); async move { n.reconnects() == 1 } }).await);

    // Peer faults on the endpoint stream do not reconnect
    network
        .emit_fault(SignalingFault::new(FaultKind::PeerUnavailable, "x"))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(network.reconnects(), 1);
}

#[tokio::test]
async fn stalled_link_times_out() {
    init_tracing();
    let network = Arc::new(LoopbackNetwork::new());
    network.add_peer(id("bob"), PeerBehavior::Stall);
    let config = fast_config().connect_timeout(Duration::from_millis(100));
    let manager = ConnectionManager::new(network.clone(), config);

    let err = manager.connect(&id("bob"), &ConnectOptions::default()).await.unwrap_err();
    assert_eq!(
        err,
        ConnectError::Timeout {
            recipient: id("bob"),
            after: Duration::from_millis(100),
        }
    );
    assert_eq!(manager.state(&id("bob")).await, LinkState::Failed(err));
}

#[tokio::test]
async fn inbound_frames_are_forwarded() {
    init_tracing();
    let network = Arc::new(LoopbackNetwork::new());
    network.add_peer(id("bob"), PeerBehavior::Accept);
    let manager = manager(&network);
    let mut inbound = manager.take_inbound().unwrap();
    assert!(manager.take_inbound().is_none());

    manager.connect(&id("bob"), &ConnectOptions::default()).await.unwrap();
    assert!(network.deliver(&id("bob"), b"pong"));

    let (from, data) = tokio::time::timeout(Duration::from_secs(2), inbound.recv())
        .await
        .expect("inbound timed out")
        .unwrap();
    assert_eq!(from, id("bob"));
    assert_eq!(data, b"pong");
}

#[tokio::test]
async fn failed_send_on_closed_link_evicts_it() {
    init_tracing();
    let network = Arc::new(LoopbackNetwork::new());
    network.add_peer(id("bob"), PeerBehavior::Accept);
    let manager = manager(&network);

    manager.connect(&id("bob"), &ConnectOptions::default()).await.unwrap();
    let link = manager.link(&id("bob")).await.unwrap();
    link.close().await;

    // Either the send finds the closed link and evicts it, or the close
    // event already did
    let err = manager.send(&id("bob"), b"late").await.unwrap_err();
    assert!(matches!(err, LinkError::Closed | LinkError::NoConnection(_)));
    assert!(manager.link(&id("bob")).await.is_none());
}

#[tokio::test]
async fn send_failure_on_open_link_keeps_it() {
    init_tracing();
    let network = Arc::new(LoopbackNetwork::new());
    network.add_peer(id("bob"), PeerBehavior::Accept);
    let manager = manager(&network);

    manager.connect(&id("bob"), &ConnectOptions::default()).await.unwrap();
    network.link(&id("bob")).unwrap().set_fail_sends(true);

    let err = manager.send(&id("bob"), b"x").await.unwrap_err();
    assert!(matches!(err, LinkError::Send { .. }));
    assert!(manager.link(&id("bob")).await.is_some());
}

#[tokio::test]
async fn disconnect_closes_link() {
    init_tracing();
    let network = Arc::new(LoopbackNetwork::new());
    network.add_peer(id("bob"), PeerBehavior::Accept);
    let manager = manager(&network);

    manager.connect(&id("bob"), &ConnectOptions::default()).await.unwrap();
    assert!(manager.disconnect(&id("bob")).await);
    assert!(!manager.disconnect(&id("bob")).await);
    assert!(!network.link(&id("bob")).unwrap().is_open());
    assert_eq!(manager.state(&id("bob")).await, LinkState::Closed);
}

#[tokio::test]
async fn failed_state_clears_when_next_attempt_starts() {
    init_tracing();
    let network = Arc::new(LoopbackNetwork::new());
    let manager = manager(&network);

    manager.connect(&id("bob"), &ConnectOptions::default()).await.unwrap_err();
    assert!(matches!(manager.state(&id("bob")).await, LinkState::Failed(_)));

    network.add_peer(id("bob"), PeerBehavior::Accept);
    manager.connect(&id("bob"), &ConnectOptions::default()).await.unwrap();
    assert_eq!(manager.state(&id("bob")).await, LinkState::Open);
}

#[tokio::test]
async fn registered_link_reporting_closed_is_closed() {
    init_tracing();
    let network = Arc::new(LoopbackNetwork::new());
    network.add_peer(id("bob"), PeerBehavior::Accept);
    let manager = manager(&network);

    manager.connect(&id("bob"), &ConnectOptions::default()).await.unwrap();
    let link = manager.link(&id("bob")).await.unwrap();
    link.close().await;

    // Closed whether or not the close event has been processed yet
    assert_eq!(manager.state(&id("bob")).await, LinkState::Closed);
}
