use std::time::Duration;

use crate::RecipientId;

/// Class of a fault reported by the signaling network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Connectivity to the signaling service was lost or degraded.
    Network,
    /// The endpoint was disconnected from the signaling service.
    Disconnected,
    /// The requested recipient is not registered on the network.
    PeerUnavailable,
    /// Anything else the network reports.
    Other,
}

impl FaultKind {
    /// Faults the endpoint heals itself by reconnecting.
    pub fn is_retryable(self) -> bool {
        matches!(self, FaultKind::Network | FaultKind::Disconnected)
    }
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultKind::Network => write!(f, "network"),
            FaultKind::Disconnected => write!(f, "disconnected"),
            FaultKind::PeerUnavailable => write!(f, "peer-unavailable"),
            FaultKind::Other => write!(f, "other"),
        }
    }
}

/// A fault raised by a [`SignalingNetwork`](crate::SignalingNetwork).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} fault: {message}")]
pub struct SignalingFault {
    pub kind: FaultKind,
    pub message: String,
}

impl SignalingFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Why a connection attempt toward a recipient did not open.
///
/// `Clone` because every caller awaiting the same in-flight attempt
/// receives its own copy of the outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("recipient {0} is not available yet, try again")]
    RecipientUnavailable(RecipientId),

    #[error("signaling endpoint error: {0}")]
    Signaling(String),

    #[error("direct link to {recipient} failed: {detail}")]
    Transport {
        recipient: RecipientId,
        detail: String,
    },

    #[error("direct link to {recipient} did not open within {after:?}")]
    Timeout {
        recipient: RecipientId,
        after: Duration,
    },
}

/// Errors returned by link-level operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("invalid recipient id: {0:?}")]
    InvalidRecipient(String),

    #[error("no direct link established to {0}")]
    NoConnection(RecipientId),

    #[error("send to {recipient} failed: {detail}")]
    Send {
        recipient: RecipientId,
        detail: String,
    },

    #[error("direct link is closed")]
    Closed,
}
