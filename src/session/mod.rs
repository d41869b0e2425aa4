//! Session capabilities consumed by the registry
//!
//! The registry never implements session behavior itself. Room membership,
//! status broadcast and identity resolution belong to the signaling server;
//! the registry only needs the handful of operations declared here.
//!
//! # Reentrancy
//!
//! The registry never calls into a collaborator while holding its lock, but
//! collaborators must still avoid calling back into the registry from
//! `SessionCreator::create_session` or `SinkFactory::create_sink`, which run
//! on the handler task right before the registry takes its write lock.

pub mod sink;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use crate::bus::RoomDescriptor;
use crate::registry::CollaboratorError;

pub use sink::{Sink, SinkFactory};

/// A participant handle owned by the registry once inserted
#[async_trait]
pub trait Session: Send + Sync {
    /// Locally generated session id, unique within the registry
    fn id(&self) -> &str;

    /// Current status blob broadcast to peers
    fn status(&self) -> Value;

    /// Replace the status blob
    fn set_status(&self, status: Value);

    /// Attach a user id without authentication (bus-created sessions)
    fn set_userid_fake(&self, userid: &str);

    /// Join a room, returning the joined room's id
    async fn join_room(&self, room: &RoomDescriptor) -> Result<String, CollaboratorError>;

    /// Push the current status to interested peers
    async fn broadcast_status(&self);

    /// Tear the session down
    async fn close(&self);
}

/// Creates sessions on behalf of the registry
pub trait SessionCreator: Send + Sync {
    /// Create a new session, optionally derived from a parent session
    fn create_session(&self, parent: Option<&Arc<dyn Session>>, name: &str) -> Arc<dyn Session>;
}

/// Server-wide session lookup
pub trait SessionStore: Send + Sync {
    fn get_session(&self, id: &str) -> Option<Arc<dyn Session>>;
}

/// Server-wide identity lookup
pub trait UserStore: Send + Sync {
    /// User id bound to a session, if any
    fn user_id(&self, session_id: &str) -> Option<String>;
}

/// Outgoing channel of the peer that opened a pipeline
pub trait Sender: Send + Sync {
    fn send(&self, payload: Bytes) -> Result<(), CollaboratorError>;
}
