use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::EndpointConfig;
use crate::error::{LinkError, SignalingFault};
use crate::RecipientId;

/// Lifecycle events a direct link emits, in transport order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Handshake completed; the link can carry data.
    Open,
    /// A frame arrived from the remote side.
    Data(Vec<u8>),
    /// Transport-level error on this link.
    Error(String),
    /// The link closed, from either side.
    Close,
}

/// Options carried by a connection request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// Context announced to the remote side (the caller's metadata).
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Transport-specific options passed through untouched.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ConnectOptions {
    pub fn with_metadata(metadata: serde_json::Value) -> Self {
        Self {
            metadata,
            extra: serde_json::Map::new(),
        }
    }
}

/// One direct link to a remote recipient.
///
/// Frames are delivered verbatim and in order.
#[async_trait::async_trait]
pub trait DirectLink: Send + Sync {
    /// The recipient on the other end.
    fn recipient(&self) -> &RecipientId;

    /// Whether the link can still carry data.
    fn is_open(&self) -> bool;

    /// Send one frame.
    async fn send(&self, data: &[u8]) -> Result<(), LinkError>;

    /// Close the link. Idempotent.
    async fn close(&self);
}

/// A link requested from the network that has not reported `Open` yet.
pub struct PendingLink {
    pub link: Arc<dyn DirectLink>,
    /// Event stream for this link. The stream ending counts as `Close`.
    pub events: mpsc::Receiver<LinkEvent>,
}

/// The signaling network direct links are negotiated through.
///
/// In production: a WebRTC/QUIC rendezvous service.
/// In tests: [`LoopbackNetwork`](crate::loopback::LoopbackNetwork).
#[async_trait::async_trait]
pub trait SignalingNetwork: Send + Sync {
    /// Register this process on the network under `config.id()`.
    ///
    /// Returns the endpoint-level fault stream, drained by the endpoint
    /// supervisor for the endpoint's lifetime.
    async fn open(
        &self,
        config: &EndpointConfig,
    ) -> Result<mpsc::Receiver<SignalingFault>, SignalingFault>;

    /// Re-establish the registration after a network fault, keeping the id.
    async fn reconnect(&self) -> Result<(), SignalingFault>;

    /// Ask the network for a new direct link toward `target`.
    async fn connect(
        &self,
        target: &RecipientId,
        options: &ConnectOptions,
    ) -> Result<PendingLink, SignalingFault>;
}
