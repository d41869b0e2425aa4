//! Sink capability
//!
//! A sink is the delivery path back to a session's transport. The registry
//! keys sinks by local session id.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::registry::CollaboratorError;

/// Output channel towards a session
#[async_trait]
pub trait Sink: Send + Sync {
    /// Whether the sink currently accepts writes
    fn enabled(&self) -> bool;

    /// Push a payload towards the session
    fn write(&self, payload: Bytes) -> Result<(), CollaboratorError>;

    async fn close(&self);
}

/// Creates sinks for bus-created sessions
pub trait SinkFactory: Send + Sync {
    /// Create a sink delivering back over the bus to `external_id`
    fn create_sink(&self, external_id: &str) -> Arc<dyn Sink>;
}
