use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex, OnceCell};
use tokio::time::Instant;

use crate::config::EndpointConfig;
use crate::endpoint::{EndpointState, SignalingEndpoint};
use crate::error::{ConnectError, LinkError};
use crate::network::{ConnectOptions, DirectLink, LinkEvent, PendingLink, SignalingNetwork};
use crate::registry::ConnectionRegistry;
use crate::RecipientId;

/// Lifecycle of the connection toward one recipient.
///
/// `Idle → Connecting → Open | Failed | Closed`, then `Open → Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Connecting,
    Open,
    Closed,
    Failed(ConnectError),
}

/// How a successful [`ConnectionManager::connect`] completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// An open link was already registered; nothing was sent on the network.
    Reused,
    /// A new link opened and was registered.
    Opened,
    /// The link closed before it opened. Nothing was registered.
    ClosedBeforeOpen,
}

/// Frame received on an open link.
pub type InboundFrame = (RecipientId, Vec<u8>);

type OpenedLink = (Arc<dyn DirectLink>, mpsc::Receiver<LinkEvent>);

/// Registry plus in-flight attempts, always mutated together so that
/// "check registry, then join or start an attempt" is atomic.
#[derive(Default)]
struct Links {
    registry: ConnectionRegistry,
    connecting: HashMap<RecipientId, watch::Receiver<LinkState>>,
    /// Terminal state of the last attempt or link, until the next attempt.
    last: HashMap<RecipientId, LinkState>,
}

impl Links {
    /// Drop the registered link for `id` and remember it as closed.
    fn evict(&mut self, id: &RecipientId) -> Option<Arc<dyn DirectLink>> {
        let removed = self.registry.remove(id);
        if removed.is_some() {
            self.last.insert(id.clone(), LinkState::Closed);
        }
        removed
    }

    fn evict_if_same(&mut self, id: &RecipientId, link: &Arc<dyn DirectLink>) -> bool {
        let removed = self.registry.remove_if_same(id, link);
        if removed {
            self.last.insert(id.clone(), LinkState::Closed);
        }
        removed
    }
}

static SHARED: OnceLock<Arc<ConnectionManager>> = OnceLock::new();

/// Opens, reuses and tracks direct links, one per recipient.
///
/// Owns the signaling endpoint (opened lazily on first use) and the
/// connection registry. Every mutation of either goes through this type.
pub struct ConnectionManager {
    network: Arc<dyn SignalingNetwork>,
    config: EndpointConfig,
    endpoint: OnceCell<Arc<SignalingEndpoint>>,
    links: Arc<Mutex<Links>>,
    inbound_tx: mpsc::Sender<InboundFrame>,
    inbound_rx: std::sync::Mutex<Option<mpsc::Receiver<InboundFrame>>>,
}

impl ConnectionManager {
    pub fn new(network: Arc<dyn SignalingNetwork>, config: EndpointConfig) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_buffer);
        Self {
            network,
            config,
            endpoint: OnceCell::new(),
            links: Arc::new(Mutex::new(Links::default())),
            inbound_tx,
            inbound_rx: std::sync::Mutex::new(Some(inbound_rx)),
        }
    }

    /// The process-wide manager.
    ///
    /// The first call creates it from `network` and `config`; later calls
    /// return the same instance and ignore their arguments.
    pub fn shared(network: Arc<dyn SignalingNetwork>, config: EndpointConfig) -> Arc<Self> {
        SHARED
            .get_or_init(|| Arc::new(Self::new(network, config)))
            .clone()
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// The signaling endpoint, opened on first call.
    ///
    /// Concurrent first callers share one open. A failed open leaves the
    /// endpoint uninitialized so the next call tries again.
    pub async fn endpoint(&self) -> Result<Arc<SignalingEndpoint>, ConnectError> {
        self.endpoint
            .get_or_try_init(|| SignalingEndpoint::open(self.network.clone(), self.config.clone()))
            .await
            .cloned()
            .map_err(|fault| {
                tracing::warn!(%fault, "signaling endpoint failed to open");
                ConnectError::Signaling(fault.to_string())
            })
    }

    pub fn endpoint_state(&self) -> EndpointState {
        if self.endpoint.initialized() {
            EndpointState::Ready
        } else {
            EndpointState::Uninitialized
        }
    }

    /// Open a direct link to `target`, or reuse the one already open.
    ///
    /// Callers racing on the same recipient all await a single attempt.
    pub async fn connect(
        &self,
        target: &RecipientId,
        options: &ConnectOptions,
    ) -> Result<ConnectOutcome, ConnectError> {
        let endpoint = self.endpoint().await?;

        let mut state_rx = {
            let mut links = self.links.lock().await;

            if let Some(link) = links.registry.get(target) {
                if link.is_open() {
                    tracing::debug!(%target, "reusing open direct link");
                    return Ok(ConnectOutcome::Reused);
                }
                links.evict(target);
                tracing::debug!(%target, "evicted stale direct link");
            }

            match links.connecting.get(target) {
                Some(rx) => {
                    tracing::debug!(%target, "joining in-flight connection attempt");
                    rx.clone()
                }
                None => {
                    let (state_tx, state_rx) = watch::channel(LinkState::Connecting);
                    links.last.remove(target);
                    links.connecting.insert(target.clone(), state_rx.clone());
                    let attempt = Attempt {
                        endpoint,
                        links: self.links.clone(),
                        inbound: self.inbound_tx.clone(),
                        target: target.clone(),
                        options: options.clone(),
                    };
                    tokio::spawn(attempt.run(state_tx));
                    state_rx
                }
            }
        };

        let state = state_rx
            .wait_for(|s| *s != LinkState::Connecting)
            .await
            .map(|s| (*s).clone())
            .map_err(|_| ConnectError::Signaling("connection attempt abandoned".into()))?;

        match state {
            LinkState::Open => Ok(ConnectOutcome::Opened),
            LinkState::Closed => Ok(ConnectOutcome::ClosedBeforeOpen),
            LinkState::Failed(e) => Err(e),
            LinkState::Idle | LinkState::Connecting => Err(ConnectError::Signaling(
                "connection attempt ended without an outcome".into(),
            )),
        }
    }

    /// The open link registered for `id`, if any.
    pub async fn link(&self, id: &RecipientId) -> Option<Arc<dyn DirectLink>> {
        self.links.lock().await.registry.get(id)
    }

    /// Send one frame on the registered link for `id`.
    ///
    /// Never connects. A link that reports closed after a failed send is
    /// evicted so the next `connect` starts fresh.
    pub async fn send(&self, id: &RecipientId, data: &[u8]) -> Result<(), LinkError> {
        let link = self
            .link(id)
            .await
            .ok_or_else(|| LinkError::NoConnection(id.clone()))?;

        if let Err(e) = link.send(data).await {
            if !link.is_open() && self.links.lock().await.evict_if_same(id, &link) {
                tracing::debug!(recipient = %id, "evicted closed direct link after failed send");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Close and forget the link to `id`. Returns whether one was open.
    pub async fn disconnect(&self, id: &RecipientId) -> bool {
        let removed = self.links.lock().await.evict(id);
        match removed {
            Some(link) => {
                link.close().await;
                tracing::info!(recipient = %id, "direct link disconnected");
                true
            }
            None => false,
        }
    }

    /// Current state toward `id`.
    ///
    /// `Failed` and `Closed` persist until the next attempt starts. A
    /// registered link that reports closed is `Closed`.
    pub async fn state(&self, id: &RecipientId) -> LinkState {
        let links = self.links.lock().await;
        if let Some(link) = links.registry.get(id) {
            if link.is_open() {
                LinkState::Open
            } else {
                LinkState::Closed
            }
        } else if let Some(rx) = links.connecting.get(id) {
            rx.borrow().clone()
        } else {
            links.last.get(id).cloned().unwrap_or(LinkState::Idle)
        }
    }

    /// Recipients with a registered link.
    pub async fn connected_recipients(&self) -> Vec<RecipientId> {
        self.links.lock().await.registry.recipients()
    }

    /// Take the stream of frames received on open links. Only the first
    /// call gets it.
    pub fn take_inbound(&self) -> Option<mpsc::Receiver<InboundFrame>> {
        self.inbound_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// One connection attempt, driven by its own task.
struct Attempt {
    endpoint: Arc<SignalingEndpoint>,
    links: Arc<Mutex<Links>>,
    inbound: mpsc::Sender<InboundFrame>,
    target: RecipientId,
    options: ConnectOptions,
}

impl Attempt {
    async fn run(self, state_tx: watch::Sender<LinkState>) {
        let timeout = self.endpoint.config().connect_timeout;
        let deadline = Instant::now() + timeout;

        let opened = match tokio::time::timeout_at(
            deadline,
            self.endpoint.connect(&self.target, &self.options),
        )
        .await
        {
            Ok(Ok(pending)) => await_open(&self.target, pending, deadline, timeout).await,
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ConnectError::Timeout {
                recipient: self.target.clone(),
                after: timeout,
            }),
        };

        let target = self.target;
        let mut links = self.links.lock().await;
        links.connecting.remove(&target);

        match opened {
            Ok(Some((link, events))) => {
                links.registry.put(target.clone(), link.clone());
                state_tx.send_replace(LinkState::Open);
                drop(links);
                tracing::info!(%target, "direct link open");
                watch_link(self.links, self.inbound, target, link, events).await;
            }
            Ok(None) => {
                links.last.insert(target.clone(), LinkState::Closed);
                state_tx.send_replace(LinkState::Closed);
                drop(links);
                tracing::info!(%target, "direct link closed before opening");
            }
            Err(e) => {
                links.last.insert(target.clone(), LinkState::Failed(e.clone()));
                state_tx.send_replace(LinkState::Failed(e.clone()));
                drop(links);
                tracing::warn!(%target, error = %e, "direct link failed to open");
            }
        }
    }
}

/// Wait for the first lifecycle event of a pending link.
///
/// `Ok(None)` means the link closed before opening.
async fn await_open(
    target: &RecipientId,
    pending: PendingLink,
    deadline: Instant,
    timeout: Duration,
) -> Result<Option<OpenedLink>, ConnectError> {
    let PendingLink { link, mut events } = pending;

    let first = tokio::time::timeout_at(deadline, async {
        loop {
            match events.recv().await {
                Some(LinkEvent::Open) => return Ok(true),
                Some(LinkEvent::Data(_)) => {
                    tracing::trace!(%target, "dropping frame received before open");
                }
                Some(LinkEvent::Error(detail)) => {
                    return Err(ConnectError::Transport {
                        recipient: target.clone(),
                        detail,
                    })
                }
                Some(LinkEvent::Close) | None => return Ok(false),
            }
        }
    })
    .await;

    match first {
        Ok(Ok(true)) => Ok(Some((link, events))),
        Ok(Ok(false)) => Ok(None),
        Ok(Err(e)) => {
            link.close().await;
            Err(e)
        }
        Err(_) => {
            link.close().await;
            Err(ConnectError::Timeout {
                recipient: target.clone(),
                after: timeout,
            })
        }
    }
}

/// Follow an open link until it closes, forwarding its frames.
async fn watch_link(
    links: Arc<Mutex<Links>>,
    inbound: mpsc::Sender<InboundFrame>,
    target: RecipientId,
    link: Arc<dyn DirectLink>,
    mut events: mpsc::Receiver<LinkEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            LinkEvent::Data(data) => {
                // try_send: a slow consumer must not stall close handling
                if let Err(e) = inbound.try_send((target.clone(), data)) {
                    tracing::warn!(%target, "dropping inbound frame: {e}");
                }
            }
            LinkEvent::Error(detail) => {
                tracing::warn!(%target, %detail, "direct link error");
            }
            LinkEvent::Close => break,
            LinkEvent::Open => {}
        }
    }

    if links.lock().await.evict_if_same(&target, &link) {
        tracing::info!(%target, "direct link closed");
    }
}
