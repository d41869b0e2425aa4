//! Routed interaction channels between sessions
//!
//! A pipeline is keyed by a composite id `namespace.session.to` and lives as
//! long as it keeps being looked up. Every successful lookup through
//! [`PipelineManager::get_pipeline`] pushes its deadline forward; the sweeper
//! is the only path that evicts it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::registry::{PipelineManager, RegistryError};
use crate::session::{Sender, Session};

/// Namespace for call signaling pipelines
pub const PIPELINE_NAMESPACE_CALL: &str = "call";

/// Composite pipeline identifier (namespace + session id + target)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineId {
    /// Namespace (e.g., "call")
    pub namespace: String,
    /// Local id of the originating session
    pub session_id: String,
    /// Target identifier
    pub to: String,
}

impl PipelineId {
    /// Create a new pipeline id
    pub fn new(
        namespace: impl Into<String>,
        session_id: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            session_id: session_id.into(),
            to: to.into(),
        }
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.namespace, self.session_id, self.to)
    }
}

type CloseListener = Box<dyn FnOnce(&Pipeline) + Send>;

/// A routed interaction channel
pub struct Pipeline {
    /// Back-reference used for sink resolution; the manager owns the pipeline
    manager: Weak<PipelineManager>,
    id: PipelineId,
    key: String,
    session: Arc<dyn Session>,
    sender: Option<Arc<dyn Sender>>,
    created_at: Instant,
    expires_at: Mutex<Instant>,
    closed: AtomicBool,
    close_listeners: Mutex<Vec<CloseListener>>,
}

impl Pipeline {
    /// Create a pipeline expiring `expiry` from now
    pub fn new(
        manager: Weak<PipelineManager>,
        id: PipelineId,
        session: Arc<dyn Session>,
        sender: Option<Arc<dyn Sender>>,
        expiry: Duration,
    ) -> Self {
        let now = Instant::now();
        Self {
            manager,
            key: id.to_string(),
            id,
            session,
            sender,
            created_at: now,
            expires_at: Mutex::new(now + expiry),
            closed: AtomicBool::new(false),
            close_listeners: Mutex::new(Vec::new()),
        }
    }

    /// Composite id rendered as `namespace.session.to`
    pub fn id(&self) -> &str {
        &self.key
    }

    /// Structured id
    pub fn pipeline_id(&self) -> &PipelineId {
        &self.id
    }

    pub fn namespace(&self) -> &str {
        &self.id.namespace
    }

    /// Target this pipeline routes to
    pub fn to(&self) -> &str {
        &self.id.to
    }

    /// Session that opened the pipeline
    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    pub fn sender(&self) -> Option<&Arc<dyn Sender>> {
        self.sender.as_ref()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Current expiry deadline
    pub fn expires_at(&self) -> Instant {
        *self.expires_at.lock()
    }

    /// Push the expiry deadline to `duration` from now
    pub fn refresh(&self, duration: Duration) {
        *self.expires_at.lock() = Instant::now() + duration;
    }

    /// Whether the expiry deadline has passed
    pub fn expired(&self) -> bool {
        Instant::now() >= *self.expires_at.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the pipeline
    ///
    /// Returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        tracing::info!(
            pipeline = %self.key,
            age_secs = self.created_at.elapsed().as_secs(),
            "Pipeline closed"
        );

        let listeners = std::mem::take(&mut *self.close_listeners.lock());
        for listener in listeners {
            listener(self);
        }
        true
    }

    /// Run `listener` once when the pipeline closes
    ///
    /// Runs immediately if the pipeline is already closed. Listeners run on
    /// the closing task with no registry lock held.
    pub fn on_close<F>(&self, listener: F)
    where
        F: FnOnce(&Pipeline) + Send + 'static,
    {
        {
            let mut listeners = self.close_listeners.lock();
            if !self.is_closed() {
                listeners.push(Box::new(listener));
                return;
            }
        }
        listener(self);
    }

    /// Deliver a payload to the pipeline's target sink
    pub async fn deliver(&self, payload: Bytes) -> Result<(), RegistryError> {
        if self.is_closed() {
            return Err(RegistryError::PipelineClosed(self.key.clone()));
        }

        let manager = self.manager.upgrade().ok_or(RegistryError::ManagerGone)?;
        let sink = manager
            .find_sink(&self.id.to)
            .await
            .ok_or_else(|| RegistryError::SinkNotFound(self.id.to.clone()))?;

        sink.write(payload)?;
        Ok(())
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.key)
            .field("session", &self.session.id())
            .field("has_sender", &self.sender.is_some())
            .field("closed", &self.is_closed())
            .finish()
    }
}
