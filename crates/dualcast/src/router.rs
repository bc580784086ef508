//! Send-time channel selection.
//!
//! Push goes first when the identity has a live token and a gateway is
//! installed. A failed push blacklists the token for the rest of the
//! process and the message falls back to the direct link.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use dualcast_transport::ConnectionManager;
use tokio::sync::RwLock;

use crate::client::ClientIdentity;
use crate::error::{DeliveryError, PushError};
use crate::push::{PushData, PushGateway, PushPayload};
use crate::stats::DeliveryStats;
use crate::types::{DeliveryReceipt, Message};

pub const DEFAULT_PUSH_TITLE: &str = "New Message";
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Router settings.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub(crate) push_title: String,
    pub(crate) push_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            push_title: DEFAULT_PUSH_TITLE.to_string(),
            push_timeout: DEFAULT_PUSH_TIMEOUT,
        }
    }
}

impl RouterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Title shown on push notifications.
    pub fn push_title(mut self, title: impl Into<String>) -> Self {
        self.push_title = title.into();
        self
    }

    /// Upper bound on a single push request.
    pub fn push_timeout(mut self, timeout: Duration) -> Self {
        self.push_timeout = timeout;
        self
    }
}

/// Chooses between push and direct link for each message.
pub struct DeliveryRouter {
    links: Arc<ConnectionManager>,
    push: OnceLock<Arc<dyn PushGateway>>,
    dead_tokens: RwLock<HashSet<String>>,
    config: RouterConfig,
    stats: DeliveryStats,
}

impl DeliveryRouter {
    pub fn new(links: Arc<ConnectionManager>, config: RouterConfig) -> Self {
        Self {
            links,
            push: OnceLock::new(),
            dead_tokens: RwLock::new(HashSet::new()),
            config,
            stats: DeliveryStats::default(),
        }
    }

    /// Install the push gateway. Only the first call has an effect;
    /// returns whether this one did.
    pub fn install_push_gateway(&self, gateway: Arc<dyn PushGateway>) -> bool {
        self.push.set(gateway).is_ok()
    }

    pub fn has_push_gateway(&self) -> bool {
        self.push.get().is_some()
    }

    pub fn links(&self) -> &Arc<ConnectionManager> {
        &self.links
    }

    pub fn stats(&self) -> &DeliveryStats {
        &self.stats
    }

    /// Whether `token` has failed before.
    pub async fn is_dead(&self, token: &str) -> bool {
        self.dead_tokens.read().await.contains(token)
    }

    pub async fn dead_token_count(&self) -> usize {
        self.dead_tokens.read().await.len()
    }

    /// Deliver `message` for `identity`.
    ///
    /// Push failures are absorbed; only the direct-link outcome is
    /// reported when push is skipped or fails.
    pub async fn send(
        &self,
        identity: &ClientIdentity,
        message: &Message,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let text = message.to_text()?;

        if let Some(receipt) = self.try_push(identity, &text).await {
            return Ok(receipt);
        }

        let Some(recipient) = identity.recipient_id() else {
            return Err(DeliveryError::NoRoute);
        };

        // The send below reports NoConnection if this did not leave an open link.
        if let Err(e) = self.links.connect(recipient, identity.connect_options()).await {
            self.stats.connect_failed.inc();
            tracing::warn!(%recipient, error = %e, "direct link connect failed");
        }

        match self.links.send(recipient, text.as_bytes()).await {
            Ok(()) => {
                self.stats.direct_sent.inc();
                tracing::debug!(%recipient, "delivered over direct link");
                Ok(DeliveryReceipt::Direct {
                    recipient: recipient.clone(),
                })
            }
            Err(e) => {
                self.stats.direct_failed.inc();
                Err(e.into())
            }
        }
    }

    /// `None` when push was not attempted or failed.
    async fn try_push(&self, identity: &ClientIdentity, text: &str) -> Option<DeliveryReceipt> {
        let token = identity.push_token()?;
        let gateway = self.push.get()?;

        if self.is_dead(token).await {
            self.stats.push_skipped.inc();
            tracing::debug!(%token, "skipping push to dead token");
            return None;
        }

        let payload = PushPayload {
            data: PushData {
                title: self.config.push_title.clone(),
                body: text.to_string(),
            },
            token: token.to_string(),
        };

        let result = match tokio::time::timeout(self.config.push_timeout, gateway.send(&payload)).await {
            Ok(result) => result,
            Err(_) => Err(PushError::Timeout(self.config.push_timeout)),
        };

        match result {
            Ok(receipt) => {
                self.stats.push_sent.inc();
                tracing::debug!(%token, %receipt, "delivered over push");
                Some(DeliveryReceipt::Push { receipt })
            }
            Err(e) => {
                self.stats.push_failed.inc();
                self.dead_tokens.write().await.insert(token.to_string());
                tracing::warn!(%token, error = %e, "push failed, token blacklisted");
                None
            }
        }
    }
}
