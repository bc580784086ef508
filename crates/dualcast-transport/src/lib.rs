//! dualcast direct-link layer.
//!
//! Owns the signaling endpoint, the registry of open direct links (at most
//! one per recipient) and the controller that opens or reuses them. The
//! network itself is pluggable through [`SignalingNetwork`].
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dualcast_transport::{ConnectOptions, ConnectionManager, EndpointConfig, RecipientId};
//! use dualcast_transport::loopback::{LoopbackNetwork, PeerBehavior};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let network = Arc::new(LoopbackNetwork::new());
//! let bob: RecipientId = "bob".parse()?;
//! network.add_peer(bob.clone(), PeerBehavior::Accept);
//!
//! let manager = ConnectionManager::new(network, EndpointConfig::new());
//! manager.connect(&bob, &ConnectOptions::default()).await?;
//! manager.send(&bob, b"hello").await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod controller;
mod endpoint;
mod error;
pub mod loopback;
mod network;
mod registry;

pub use config::{EndpointConfig, RelayServer};
pub use controller::{ConnectOutcome, ConnectionManager, InboundFrame, LinkState};
pub use endpoint::{EndpointState, SignalingEndpoint};
pub use error::{ConnectError, FaultKind, LinkError, SignalingFault};
pub use network::{ConnectOptions, DirectLink, LinkEvent, PendingLink, SignalingNetwork};
pub use registry::ConnectionRegistry;

use std::fmt;
use std::str::FromStr;

/// Well-known identifier the signaling endpoint registers under.
pub const ENDPOINT_ID: &str = "dualcast-endpoint-7f3c9a";

/// Address of a recipient on the direct-link network.
///
/// Any non-empty string without surrounding whitespace.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecipientId(String);

impl RecipientId {
    /// Validate and wrap a recipient id.
    pub fn new(id: impl Into<String>) -> Result<Self, LinkError> {
        let id = id.into();
        if id.is_empty() || id.trim() != id {
            return Err(LinkError::InvalidRecipient(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecipientId({})", self.0)
    }
}

impl FromStr for RecipientId {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl serde::Serialize for RecipientId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for RecipientId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
