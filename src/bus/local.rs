//! In-process bus
//!
//! Delivers published messages straight to the subscribed handlers. Used to
//! run a single node without a cluster transport, and in tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use super::{Bus, BusError, BusHandler};

/// In-process [`Bus`] implementation
#[derive(Default)]
pub struct LocalBus {
    subscriptions: RwLock<HashMap<String, Vec<Arc<dyn BusHandler>>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a message to every handler of `subject`, in subscription order
    ///
    /// Returns the number of handlers that received it.
    pub async fn publish(&self, subject: &str, reply: Option<&str>, payload: Bytes) -> usize {
        // Clone the handler list so no guard is held across an await.
        let handlers = self
            .subscriptions
            .read()
            .get(subject)
            .cloned()
            .unwrap_or_default();

        if handlers.is_empty() {
            tracing::debug!(subject = subject, "No subscribers for bus message");
            return 0;
        }

        for handler in &handlers {
            handler.handle(subject, reply, payload.clone()).await;
        }
        handlers.len()
    }

    /// Number of handlers subscribed to `subject`
    pub fn subscriber_count(&self, subject: &str) -> usize {
        self.subscriptions
            .read()
            .get(subject)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl Bus for LocalBus {
    async fn subscribe(&self, subject: &str, handler: Arc<dyn BusHandler>) -> Result<(), BusError> {
        self.subscriptions
            .write()
            .entry(subject.to_string())
            .or_default()
            .push(handler);

        tracing::debug!(subject = subject, "Subscribed to bus subject");
        Ok(())
    }
}
