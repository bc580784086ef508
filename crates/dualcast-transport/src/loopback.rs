//! In-process signaling network.
//!
//! Recipients are registered with a scripted [`PeerBehavior`]; links are
//! in-memory and record what was sent on them. Used by the test suites and
//! for local development without a rendezvous service.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::EndpointConfig;
use crate::error::{FaultKind, LinkError, SignalingFault};
use crate::network::{ConnectOptions, DirectLink, LinkEvent, PendingLink, SignalingNetwork};
use crate::RecipientId;

/// How a registered recipient answers a connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerBehavior {
    /// Open the link after the network's open delay.
    Accept,
    /// Close the link without ever opening it.
    CloseBeforeOpen,
    /// Fail the link with a transport error.
    Error,
    /// Never answer.
    Stall,
}

#[derive(Default)]
struct State {
    registered: bool,
    endpoint_id: Option<String>,
    opens: usize,
    reconnects: usize,
    connect_requests: usize,
    peers: HashMap<RecipientId, PeerBehavior>,
    scripted: VecDeque<SignalingFault>,
    links: HashMap<RecipientId, Arc<LoopbackLink>>,
    faults: Option<mpsc::Sender<SignalingFault>>,
    open_delay: Duration,
}

/// Scriptable in-memory [`SignalingNetwork`].
#[derive(Default)]
pub struct LoopbackNetwork {
    state: Mutex<State>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay between a connect request and the `Open` event of accepted links.
    pub fn with_open_delay(delay: Duration) -> Self {
        let network = Self::new();
        network.lock().open_delay = delay;
        network
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `id` reachable with the given behavior.
    pub fn add_peer(&self, id: RecipientId, behavior: PeerBehavior) {
        self.lock().peers.insert(id, behavior);
    }

    /// Make `id` unreachable (future requests fail with `PeerUnavailable`).
    pub fn remove_peer(&self, id: &RecipientId) {
        self.lock().peers.remove(id);
    }

    /// Fail the next connect request with `fault`, before any peer lookup.
    pub fn fail_next_connect(&self, fault: SignalingFault) {
        self.lock().scripted.push_back(fault);
    }

    /// Push a fault onto the endpoint's fault stream.
    pub async fn emit_fault(&self, fault: SignalingFault) -> bool {
        let tx = self.lock().faults.clone();
        match tx {
            Some(tx) => tx.send(fault).await.is_ok(),
            None => false,
        }
    }

    /// Close the latest link to `id` from the remote side.
    pub fn close_remote(&self, id: &RecipientId) -> bool {
        let link = self.lock().links.get(id).cloned();
        match link {
            Some(link) => {
                link.shut();
                true
            }
            None => false,
        }
    }

    /// Deliver a frame from `id` over its latest link.
    pub fn deliver(&self, id: &RecipientId, data: &[u8]) -> bool {
        let link = self.lock().links.get(id).cloned();
        match link {
            Some(link) => link.events.try_send(LinkEvent::Data(data.to_vec())).is_ok(),
            None => false,
        }
    }

    /// The latest link created toward `id`.
    pub fn link(&self, id: &RecipientId) -> Option<Arc<LoopbackLink>> {
        self.lock().links.get(id).cloned()
    }

    /// Frames sent to `id` on its latest link.
    pub fn received(&self, id: &RecipientId) -> Vec<Vec<u8>> {
        self.link(id).map(|link| link.sent()).unwrap_or_default()
    }

    /// Number of `open` calls (endpoint registrations).
    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    pub fn reconnects(&self) -> usize {
        self.lock().reconnects
    }

    /// Number of connect requests that reached the network.
    pub fn connect_requests(&self) -> usize {
        self.lock().connect_requests
    }

    /// The id the endpoint registered under, once open.
    pub fn endpoint_id(&self) -> Option<String> {
        self.lock().endpoint_id.clone()
    }
}

#[async_trait::async_trait]
impl SignalingNetwork for LoopbackNetwork {
    async fn open(
        &self,
        config: &EndpointConfig,
    ) -> Result<mpsc::Receiver<SignalingFault>, SignalingFault> {
        let (tx, rx) = mpsc::channel(16);
        let mut state = self.lock();
        state.opens += 1;
        state.registered = true;
        state.endpoint_id = Some(config.id().to_string());
        state.faults = Some(tx);
        Ok(rx)
    }

    async fn reconnect(&self) -> Result<(), SignalingFault> {
        let mut state = self.lock();
        state.reconnects += 1;
        state.registered = true;
        Ok(())
    }

    async fn connect(
        &self,
        target: &RecipientId,
        options: &ConnectOptions,
    ) -> Result<PendingLink, SignalingFault> {
        let (link, events, behavior, delay) = {
            let mut state = self.lock();
            state.connect_requests += 1;

            if let Some(fault) = state.scripted.pop_front() {
                if fault.kind.is_retryable() {
                    state.registered = false;
                }
                return Err(fault);
            }
            if !state.registered {
                return Err(SignalingFault::new(
                    FaultKind::Disconnected,
                    "endpoint is not registered",
                ));
            }
            let Some(behavior) = state.peers.get(target).copied() else {
                return Err(SignalingFault::new(
                    FaultKind::PeerUnavailable,
                    format!("could not connect to peer {target}"),
                ));
            };

            let (events_tx, events_rx) = mpsc::channel(64);
            let link = Arc::new(LoopbackLink {
                recipient: target.clone(),
                metadata: options.metadata.clone(),
                open: AtomicBool::new(false),
                fail_sends: AtomicBool::new(false),
                sent: Mutex::new(Vec::new()),
                events: events_tx,
            });
            state.links.insert(target.clone(), link.clone());
            (link, events_rx, behavior, state.open_delay)
        };

        let driver = link.clone();
        tokio::spawn(async move {
            match behavior {
                PeerBehavior::Accept => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    driver.open.store(true, Ordering::SeqCst);
                    let _ = driver.events.send(LinkEvent::Open).await;
                }
                PeerBehavior::CloseBeforeOpen => {
                    let _ = driver.events.send(LinkEvent::Close).await;
                }
                PeerBehavior::Error => {
                    let _ = driver
                        .events
                        .send(LinkEvent::Error("ice negotiation failed".into()))
                        .await;
                }
                PeerBehavior::Stall => {}
            }
        });

        Ok(PendingLink { link, events })
    }
}

/// In-memory direct link created by [`LoopbackNetwork`].
pub struct LoopbackLink {
    recipient: RecipientId,
    metadata: serde_json::Value,
    open: AtomicBool,
    fail_sends: AtomicBool,
    sent: Mutex<Vec<Vec<u8>>>,
    events: mpsc::Sender<LinkEvent>,
}

impl LoopbackLink {
    /// Metadata announced by the connecting side.
    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }

    /// Frames sent on this link, in order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make subsequent sends fail while the link stays open.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    fn shut(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.events.try_send(LinkEvent::Close);
        }
    }
}

#[async_trait::async_trait]
impl DirectLink for LoopbackLink {
    fn recipient(&self) -> &RecipientId {
        &self.recipient
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send(&self, data: &[u8]) -> Result<(), LinkError> {
        if !self.is_open() {
            return Err(LinkError::Closed);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(LinkError::Send {
                recipient: self.recipient.clone(),
                detail: "loopback: send failed".into(),
            });
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(data.to_vec());
        Ok(())
    }

    async fn close(&self) {
        self.shut();
    }
}
