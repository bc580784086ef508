//! dualcast delivery layer.
//!
//! Sends a message to a recipient over push or a direct link, falling back
//! from one to the other, and keeps the identity directory that maps
//! recipients to their push token and direct-link address.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dualcast::{Client, ClientOptions, Courier, RouterConfig};
//! use dualcast_transport::{ConnectionManager, EndpointConfig};
//! use dualcast_transport::loopback::LoopbackNetwork;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let links = Arc::new(ConnectionManager::new(
//!     Arc::new(LoopbackNetwork::new()),
//!     EndpointConfig::new(),
//! ));
//! let courier = Arc::new(Courier::new(links, RouterConfig::default()));
//!
//! let client = Client::new(
//!     courier,
//!     ClientOptions::new()
//!         .recipient_id("bob")
//!         .metadata(serde_json::json!({ "from": "alice" })),
//! )?;
//! client.send("hello").await?;
//! # Ok(())
//! # }
//! ```

mod client;
pub mod directory;
mod error;
pub mod push;
mod router;
mod stats;
mod types;

pub use client::{Client, ClientIdentity, ClientOptions, Courier};
pub use directory::{IdentityDirectory, Upsert, UpsertOutcome};
pub use error::{ConfigError, DeliveryError, DirectoryError, PushError, StoreError, UniqueField};
pub use push::{FcmGateway, PushGateway, PushPayload};
pub use router::{DeliveryRouter, RouterConfig, DEFAULT_PUSH_TIMEOUT, DEFAULT_PUSH_TITLE};
pub use stats::{DeliveryStats, StatsSnapshot};
pub use types::{DeliveryReceipt, Message};
