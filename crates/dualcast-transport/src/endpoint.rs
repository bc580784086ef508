use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::mpsc;

use crate::config::EndpointConfig;
use crate::error::{ConnectError, FaultKind, SignalingFault};
use crate::network::{ConnectOptions, PendingLink, SignalingNetwork};
use crate::RecipientId;

/// Whether the endpoint has completed its first open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Uninitialized,
    Ready,
}

/// Handle to the signaling network, registered under one well-known id.
///
/// Created once by [`ConnectionManager`](crate::ConnectionManager) and
/// shared by every connection it opens. Retryable faults are healed by
/// reconnecting; the endpoint's identity never changes.
pub struct SignalingEndpoint {
    network: Arc<dyn SignalingNetwork>,
    config: EndpointConfig,
    reconnects: AtomicU64,
}

impl SignalingEndpoint {
    /// Register on the network and start supervising its fault stream.
    pub async fn open(
        network: Arc<dyn SignalingNetwork>,
        config: EndpointConfig,
    ) -> Result<Arc<Self>, SignalingFault> {
        let faults = network.open(&config).await?;

        tracing::info!(
            endpoint_id = %config.endpoint_id,
            relays = config.relays.len(),
            "signaling endpoint open"
        );

        let endpoint = Arc::new(Self {
            network,
            config,
            reconnects: AtomicU64::new(0),
        });
        spawn_fault_supervisor(Arc::downgrade(&endpoint), faults);
        Ok(endpoint)
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Number of reconnects triggered so far.
    pub fn reconnect_count(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Request a new direct link toward `target`.
    ///
    /// Retryable faults reconnect the endpoint and retry after
    /// `reconnect_delay`, without bound; the caller enforces the deadline.
    pub async fn connect(
        &self,
        target: &RecipientId,
        options: &ConnectOptions,
    ) -> Result<PendingLink, ConnectError> {
        loop {
            match self.network.connect(target, options).await {
                Ok(pending) => return Ok(pending),
                Err(fault) if fault.kind.is_retryable() => {
                    tracing::warn!(%target, %fault, "signaling fault during connect, reconnecting");
                    self.reconnect().await;
                    tokio::time::sleep(self.config.reconnect_delay).await;
                }
                Err(fault) => return Err(classify(target, fault)),
            }
        }
    }

    /// React to an endpoint-level fault.
    pub(crate) async fn handle_fault(&self, fault: SignalingFault) {
        if fault.kind.is_retryable() {
            tracing::warn!(%fault, "signaling endpoint fault, reconnecting");
            self.reconnect().await;
        } else {
            // Peer and other faults belong to a specific attempt, which
            // sees them through its own connect result.
            tracing::debug!(%fault, "signaling endpoint fault");
        }
    }

    async fn reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        match self.network.reconnect().await {
            Ok(()) => tracing::info!(endpoint_id = %self.config.endpoint_id, "signaling endpoint reconnected"),
            Err(e) => tracing::warn!(error = %e, "signaling reconnect failed"),
        }
    }
}

/// Map a non-retryable fault to the error a pending attempt rejects with.
fn classify(target: &RecipientId, fault: SignalingFault) -> ConnectError {
    match fault.kind {
        FaultKind::PeerUnavailable => ConnectError::RecipientUnavailable(target.clone()),
        _ => ConnectError::Signaling(fault.message),
    }
}

/// Drain the endpoint's fault stream until the endpoint is dropped or the
/// network closes the stream.
fn spawn_fault_supervisor(endpoint: Weak<SignalingEndpoint>, mut faults: mpsc::Receiver<SignalingFault>) {
    tokio::spawn(async move {
        while let Some(fault) = faults.recv().await {
            let Some(endpoint) = endpoint.upgrade() else {
                break;
            };
            endpoint.handle_fault(fault).await;
        }
        tracing::debug!("signaling fault stream ended");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bob() -> RecipientId {
        "bob".parse().unwrap()
    }

    #[test]
    fn classify_peer_unavailable() {
        let err = classify(&bob(), SignalingFault::new(FaultKind::PeerUnavailable, "gone"));
        assert_eq!(err, ConnectError::RecipientUnavailable(bob()));
    }

    #[test]
    fn classify_other_as_signaling() {
        let err = classify(&bob(), SignalingFault::new(FaultKind::Other, "server down"));
        assert_eq!(err, ConnectError::Signaling("server down".into()));
    }
}
