use std::time::Duration;

use dualcast_transport::{ConnectError, LinkError, RecipientId};

/// Invalid [`ClientOptions`](crate::ClientOptions), reported by `Client::new`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("either recipient_id or push_token must be provided")]
    MissingIdentity,

    #[error("metadata is required when recipient_id is set")]
    MissingMetadata,

    #[error("credentials_path is required when push_token is set")]
    MissingCredentials,

    #[error("invalid recipient id: {0:?}")]
    InvalidRecipient(String),

    #[error("push credentials: {0}")]
    Credentials(String),
}

/// Why a message could not be delivered on any channel.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("no delivery route: push unavailable and no recipient id")]
    NoRoute,

    #[error("no direct link established to {0}")]
    NoConnection(RecipientId),

    #[error("connect failed: {0}")]
    Connect(#[from] ConnectError),

    #[error("direct link error: {0}")]
    Link(LinkError),

    #[error("message encoding failed: {0}")]
    Encode(String),
}

impl From<LinkError> for DeliveryError {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::NoConnection(id) => DeliveryError::NoConnection(id),
            other => DeliveryError::Link(other),
        }
    }
}

impl From<serde_json::Error> for DeliveryError {
    fn from(e: serde_json::Error) -> Self {
        DeliveryError::Encode(e.to_string())
    }
}

/// A failed push attempt. Absorbed by the router's fallback.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("push gateway http error: {0}")]
    Http(String),

    #[error("push gateway rejected message ({status}): {reason}")]
    Rejected { status: u16, reason: String },

    #[error("push gateway did not answer within {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for PushError {
    fn from(e: reqwest::Error) -> Self {
        PushError::Http(e.to_string())
    }
}

/// Field covered by a uniqueness constraint in the identity directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    RecipientId,
    DirectLinkAddress,
}

impl UniqueField {
    pub fn as_str(self) -> &'static str {
        match self {
            UniqueField::RecipientId => "recipient_id",
            UniqueField::DirectLinkAddress => "direct_link_address",
        }
    }
}

impl std::fmt::Display for UniqueField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors reported by a [`DocumentStore`](crate::directory::DocumentStore).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated on {0}")]
    Conflict(UniqueField),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Errors returned by the [`IdentityDirectory`](crate::IdentityDirectory).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("duplicate key: {0}")]
    DuplicateKey(UniqueField),

    #[error("no identity record for {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for DirectoryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(field) => DirectoryError::DuplicateKey(field),
            other => DirectoryError::Store(other),
        }
    }
}
