use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A STUN/TURN relay handed to the network for NAT traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayServer {
    pub urls: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl RelayServer {
    /// A relay that needs no credentials (typically STUN).
    pub fn open(urls: impl Into<String>) -> Self {
        Self {
            urls: urls.into(),
            username: None,
            credential: None,
        }
    }

    /// A relay with embedded credentials (typically TURN).
    pub fn with_credentials(
        urls: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            urls: urls.into(),
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }
}

/// Built-in relay set used when neither the caller nor the environment
/// provides one.
fn default_relays() -> Vec<RelayServer> {
    vec![
        RelayServer::open("stun:stun.l.google.com:19302"),
        RelayServer::open("stun:stun1.l.google.com:19302"),
        RelayServer::open("stun:stun.cloudflare.com:3478"),
    ]
}

/// Configuration for the signaling endpoint and the connections it opens.
///
/// All fields have defaults. Use the builder pattern:
///
/// ```rust
/// use std::time::Duration;
/// use dualcast_transport::{EndpointConfig, RelayServer};
///
/// let config = EndpointConfig::new()
///     .relays(vec![RelayServer::open("stun:stun.example.org:3478")])
///     .connect_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub(crate) endpoint_id: String,
    pub(crate) relays: Vec<RelayServer>,
    /// Upper bound for one connect attempt, signaling retries included.
    pub(crate) connect_timeout: Duration,
    /// Pause between a reconnect and the retried signaling request.
    pub(crate) reconnect_delay: Duration,
    /// Channel capacity for data received on open links.
    pub(crate) inbound_buffer: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointConfig {
    /// Create a config with defaults.
    ///
    /// `DUALCAST_ENDPOINT_ID` overrides the well-known endpoint id and
    /// `DUALCAST_RELAY_URLS` (comma-separated, credential-free) replaces the
    /// default relay set. Both can be overridden again with the builder.
    pub fn new() -> Self {
        let endpoint_id = std::env::var("DUALCAST_ENDPOINT_ID")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| crate::ENDPOINT_ID.to_string());

        let relays = std::env::var("DUALCAST_RELAY_URLS")
            .ok()
            .map(|s| parse_relay_urls(&s))
            .filter(|relays| !relays.is_empty())
            .unwrap_or_else(default_relays);

        Self {
            endpoint_id,
            relays,
            connect_timeout: Duration::from_secs(15),
            reconnect_delay: Duration::from_millis(500),
            inbound_buffer: 256,
        }
    }

    /// Set the well-known id the endpoint registers under.
    pub fn endpoint_id(mut self, id: impl Into<String>) -> Self {
        self.endpoint_id = id.into();
        self
    }

    /// Replace the relay set.
    pub fn relays(mut self, relays: Vec<RelayServer>) -> Self {
        self.relays = relays;
        self
    }

    /// Append one relay to the current set.
    pub fn add_relay(mut self, relay: RelayServer) -> Self {
        self.relays.push(relay);
        self
    }

    /// Set the per-attempt connect timeout (default: 15 s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the delay between a reconnect and the retried request (default: 500 ms).
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the inbound data channel capacity (default: 256).
    pub fn inbound_buffer(mut self, capacity: usize) -> Self {
        self.inbound_buffer = capacity.max(1);
        self
    }

    pub fn id(&self) -> &str {
        &self.endpoint_id
    }

    pub fn relay_servers(&self) -> &[RelayServer] {
        &self.relays
    }

    pub fn timeout(&self) -> Duration {
        self.connect_timeout
    }
}

fn parse_relay_urls(s: &str) -> Vec<RelayServer> {
    s.split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(RelayServer::open)
        .collect()
}
