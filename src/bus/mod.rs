//! Cluster bus integration
//!
//! Other nodes create and destroy sessions on this node by publishing to two
//! subjects. The manager subscribes a handler to each; the handlers decode
//! the payload and translate it into registry mutations.
//!
//! ```text
//!   node A ──publish──► [bus] ──► SessionCreateHandler ──► session_create()
//!                             └─► SessionCloseHandler  ──► session_close()
//!                                                              │
//!                                                   RwLock<RegistryTables>
//! ```
//!
//! Delivery is best effort. Handlers tolerate duplicates and replays: a
//! repeated create tears the previous session down before installing the new
//! one, and a close for an unknown id does nothing.

pub mod handlers;
pub mod local;
pub mod messages;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use handlers::{SessionCloseHandler, SessionCreateHandler};
pub use local::LocalBus;
pub use messages::{RoomDescriptor, SessionCreateRequest, SessionStatusPayload};

/// Bus errors
#[derive(Debug, Clone, Error)]
pub enum BusError {
    /// The transport refused the subscription
    #[error("Failed to subscribe to {subject}: {reason}")]
    Subscribe { subject: String, reason: String },

    /// Payload could not be decoded
    #[error("Malformed bus payload: {0}")]
    Malformed(String),
}

/// Handler invoked for every message on a subscribed subject
#[async_trait]
pub trait BusHandler: Send + Sync {
    async fn handle(&self, subject: &str, reply: Option<&str>, payload: Bytes);
}

/// Cluster message bus
#[async_trait]
pub trait Bus: Send + Sync {
    /// Register `handler` for every message published on `subject`
    async fn subscribe(&self, subject: &str, handler: Arc<dyn BusHandler>) -> Result<(), BusError>;
}
