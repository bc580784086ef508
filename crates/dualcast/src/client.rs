use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use dualcast_transport::{
    ConnectOptions, ConnectOutcome, ConnectionManager, EndpointConfig, RecipientId,
    SignalingNetwork,
};
use serde::Deserialize;

use crate::error::{ConfigError, DeliveryError};
use crate::push::{FcmGateway, PushGateway};
use crate::router::{DeliveryRouter, RouterConfig};
use crate::types::{DeliveryReceipt, Message};

/// Options a [`Client`] is built from.
///
/// At least one of `recipient_id` and `push_token` is required.
/// `metadata` is required with `recipient_id`; `credentials_path` is
/// required with `push_token` unless the courier already has a gateway.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    recipient_id: Option<String>,
    metadata: Option<serde_json::Value>,
    push_token: Option<String>,
    credentials_path: Option<PathBuf>,
    connect_options: ConnectOptions,
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recipient_id(mut self, id: impl Into<String>) -> Self {
        self.recipient_id = Some(id.into());
        self
    }

    /// Context announced to the recipient when a direct link is opened.
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn push_token(mut self, token: impl Into<String>) -> Self {
        self.push_token = Some(token.into());
        self
    }

    /// FCM credentials file used to initialise the courier's push gateway.
    pub fn credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = Some(path.into());
        self
    }

    /// Transport options passed through on connect.
    pub fn connect_options(mut self, options: ConnectOptions) -> Self {
        self.connect_options = options;
        self
    }

    /// Check the identity rules and freeze the result.
    ///
    /// Credential handling needs the courier and is done by [`Client::new`].
    pub(crate) fn validate(self) -> Result<ClientIdentity, ConfigError> {
        if self.recipient_id.is_none() && self.push_token.is_none() {
            return Err(ConfigError::MissingIdentity);
        }

        let recipient_id = match self.recipient_id {
            Some(raw) => {
                if self.metadata.is_none() {
                    return Err(ConfigError::MissingMetadata);
                }
                Some(RecipientId::new(raw.clone()).map_err(|_| ConfigError::InvalidRecipient(raw))?)
            }
            None => None,
        };

        let metadata = self.metadata.unwrap_or(serde_json::Value::Null);
        let mut connect_options = self.connect_options;
        connect_options.metadata = metadata.clone();

        Ok(ClientIdentity {
            recipient_id,
            metadata,
            push_token: self.push_token,
            connect_options,
        })
    }
}

/// Validated, immutable client identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientIdentity {
    recipient_id: Option<RecipientId>,
    metadata: serde_json::Value,
    push_token: Option<String>,
    connect_options: ConnectOptions,
}

impl ClientIdentity {
    pub fn recipient_id(&self) -> Option<&RecipientId> {
        self.recipient_id.as_ref()
    }

    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }

    pub fn push_token(&self) -> Option<&str> {
        self.push_token.as_deref()
    }

    /// Connect options with the metadata filled in.
    pub fn connect_options(&self) -> &ConnectOptions {
        &self.connect_options
    }
}

static SHARED: OnceLock<Arc<Courier>> = OnceLock::new();

/// Shared delivery context: one connection manager and one router.
///
/// Clients built against the same courier share the signaling endpoint,
/// the open links, the push gateway and the dead-token set.
pub struct Courier {
    router: DeliveryRouter,
}

impl Courier {
    pub fn new(links: Arc<ConnectionManager>, config: RouterConfig) -> Self {
        Self {
            router: DeliveryRouter::new(links, config),
        }
    }

    /// The process-wide courier, built on [`ConnectionManager::shared`].
    ///
    /// The first call creates it; later calls return the same instance and
    /// ignore their arguments. Its dead-token set lives as long as the process.
    pub fn shared(
        network: Arc<dyn SignalingNetwork>,
        endpoint: EndpointConfig,
        config: RouterConfig,
    ) -> Arc<Self> {
        SHARED
            .get_or_init(|| {
                Arc::new(Self::new(ConnectionManager::shared(network, endpoint), config))
            })
            .clone()
    }

    /// Install a push gateway up front. Clients with a push token then
    /// need no credentials file.
    pub fn with_push_gateway(self, gateway: Arc<dyn PushGateway>) -> Self {
        self.router.install_push_gateway(gateway);
        self
    }

    pub fn router(&self) -> &DeliveryRouter {
        &self.router
    }

    pub fn links(&self) -> &Arc<ConnectionManager> {
        self.router.links()
    }
}

/// A sender bound to one identity.
pub struct Client {
    courier: Arc<Courier>,
    identity: ClientIdentity,
}

impl Client {
    /// Validate `options` and bind them to `courier`.
    ///
    /// The first client with a push token and a credentials path
    /// initialises the courier's push gateway; later ones reuse it.
    pub fn new(courier: Arc<Courier>, options: ClientOptions) -> Result<Self, ConfigError> {
        let credentials_path = options.credentials_path.clone();
        let identity = options.validate()?;

        if identity.push_token.is_some() && !courier.router.has_push_gateway() {
            let path = credentials_path.ok_or(ConfigError::MissingCredentials)?;
            let gateway = FcmGateway::from_credentials_file(&path)?;
            if !courier.router.install_push_gateway(Arc::new(gateway)) {
                tracing::debug!("push gateway already initialised by another client");
            }
        }

        tracing::debug!(
            recipient = ?identity.recipient_id,
            push = identity.push_token.is_some(),
            "client created"
        );
        Ok(Self { courier, identity })
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    pub fn courier(&self) -> &Arc<Courier> {
        &self.courier
    }

    /// Deliver a message over push or the direct link.
    pub async fn send(&self, message: impl Into<Message>) -> Result<DeliveryReceipt, DeliveryError> {
        self.courier.router.send(&self.identity, &message.into()).await
    }

    /// Open (or reuse) the direct link to this client's recipient.
    pub async fn connect(&self) -> Result<ConnectOutcome, DeliveryError> {
        let recipient = self.identity.recipient_id().ok_or(DeliveryError::NoRoute)?;
        Ok(self
            .courier
            .links()
            .connect(recipient, self.identity.connect_options())
            .await?)
    }

    /// Close the direct link to this client's recipient, if open.
    pub async fn disconnect(&self) -> bool {
        match self.identity.recipient_id() {
            Some(recipient) => self.courier.links().disconnect(recipient).await,
            None => false,
        }
    }
}
