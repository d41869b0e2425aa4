//! Pipeline manager
//!
//! The registry core plus the lookup API consumed by the rest of the
//! signaling server.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

use crate::bus::{Bus, SessionCloseHandler, SessionCreateHandler};
use crate::pipeline::{Pipeline, PipelineId};
use crate::session::{Sender, Session, SessionCreator, SessionStore, Sink, SinkFactory, UserStore};
use crate::stats::{RegistryMetrics, RegistryStats};

use super::config::RegistryConfig;
use super::error::RegistryError;
use super::store::{Detached, RegistryTables};

/// External capabilities the manager is wired to
#[derive(Clone)]
pub struct Collaborators {
    pub bus: Arc<dyn Bus>,
    pub session_store: Arc<dyn SessionStore>,
    pub user_store: Arc<dyn UserStore>,
    pub session_creator: Arc<dyn SessionCreator>,
    pub sink_factory: Arc<dyn SinkFactory>,
}

/// Handle to the running sweeper
struct SweeperHandle {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

/// Lifecycle of a [`PipelineManager`]
///
/// A manager starts at most once: `Idle -> Running -> Stopped`, or straight
/// from `Idle` to `Stopped` when shut down before starting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ManagerState {
    Idle = 0,
    Running = 1,
    Stopped = 2,
}

impl ManagerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

/// Session/pipeline registry kept in sync with the cluster bus
///
/// Always held in an `Arc`: pipelines keep a weak back-reference for sink
/// resolution and the bus handlers keep a weak reference for dispatch.
pub struct PipelineManager {
    pub(crate) tables: RwLock<RegistryTables>,
    pub(crate) collaborators: Collaborators,
    pub(crate) config: RegistryConfig,
    pub(crate) metrics: RegistryMetrics,
    self_ref: Weak<PipelineManager>,
    state: AtomicU8,
    sweeper: Mutex<Option<SweeperHandle>>,
}

impl PipelineManager {
    /// Create a manager with default configuration
    pub fn new(collaborators: Collaborators) -> Arc<Self> {
        Self::with_config(collaborators, RegistryConfig::default())
    }

    /// Create a manager with custom configuration
    ///
    /// The manager is inert until [`start`](Self::start) is called.
    pub fn with_config(collaborators: Collaborators, config: RegistryConfig) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            tables: RwLock::new(RegistryTables::new()),
            collaborators,
            config,
            metrics: RegistryMetrics::new(),
            self_ref: self_ref.clone(),
            state: AtomicU8::new(ManagerState::Idle as u8),
            sweeper: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn state(&self) -> ManagerState {
        ManagerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether bus messages are currently applied
    pub fn is_running(&self) -> bool {
        self.state() == ManagerState::Running
    }

    /// Subscribe the bus handlers and spawn the expiry sweeper
    ///
    /// Succeeds once per manager. A second call fails with
    /// [`RegistryError::AlreadyStarted`], a call after [`shutdown`](Self::shutdown)
    /// with [`RegistryError::Stopped`].
    pub async fn start(self: &Arc<Self>) -> Result<(), RegistryError> {
        // Claim the transition before subscribing so concurrent starts
        // cannot register the handlers twice.
        if let Err(current) = self.state.compare_exchange(
            ManagerState::Idle as u8,
            ManagerState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return Err(match ManagerState::from_u8(current) {
                ManagerState::Stopped => RegistryError::Stopped,
                _ => RegistryError::AlreadyStarted,
            });
        }

        if let Err(e) = self.subscribe_handlers().await {
            // Some handlers may already be registered; never subscribe again.
            self.state.store(ManagerState::Stopped as u8, Ordering::Release);
            tracing::error!(error = %e, "Pipeline manager failed to subscribe to the bus");
            return Err(e);
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = self.spawn_sweeper(shutdown_rx);

        {
            let mut sweeper = self.sweeper.lock();
            if !self.is_running() {
                // Shut down while subscribing.
                task.abort();
                return Err(RegistryError::Stopped);
            }
            *sweeper = Some(SweeperHandle { shutdown_tx, task });
        }

        tracing::info!(
            create_subject = %self.config.create_subject,
            close_subject = %self.config.close_subject,
            sweep_interval_secs = self.config.sweep_interval.as_secs(),
            "Pipeline manager started"
        );
        Ok(())
    }

    async fn subscribe_handlers(self: &Arc<Self>) -> Result<(), RegistryError> {
        let bus = &self.collaborators.bus;
        bus.subscribe(
            &self.config.create_subject,
            Arc::new(SessionCreateHandler::new(Arc::downgrade(self))),
        )
        .await?;
        bus.subscribe(
            &self.config.close_subject,
            Arc::new(SessionCloseHandler::new(Arc::downgrade(self))),
        )
        .await?;
        Ok(())
    }

    /// Stop the sweeper and close everything the registry still owns
    ///
    /// The bus handlers stay subscribed but ignore every message from here
    /// on. Calling this more than once is harmless.
    pub async fn shutdown(&self) {
        let previous = ManagerState::from_u8(
            self.state.swap(ManagerState::Stopped as u8, Ordering::AcqRel),
        );

        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            let _ = handle.shutdown_tx.send(());
            if let Err(e) = handle.task.await {
                tracing::warn!(error = %e, "Sweeper task ended abnormally");
            }
        }

        let (pipelines, detached) = self.tables.write().await.drain();
        let pipeline_count = pipelines.len();
        let session_count = detached.len();

        for pipeline in pipelines {
            pipeline.close();
        }
        for entry in detached {
            entry.close().await;
        }

        tracing::info!(
            previous_state = ?previous,
            pipelines = pipeline_count,
            sessions = session_count,
            "Pipeline manager shut down"
        );
    }

    /// Get or create the pipeline for `(namespace, session, to)`
    ///
    /// An existing pipeline is refreshed and returned even if its deadline
    /// already passed; only the sweeper evicts.
    pub async fn get_pipeline(
        &self,
        namespace: &str,
        sender: Option<Arc<dyn Sender>>,
        session: &Arc<dyn Session>,
        to: &str,
    ) -> Arc<Pipeline> {
        let pipeline_id = PipelineId::new(namespace, session.id(), to);
        let key = pipeline_id.to_string();
        let expiry = self.config.pipeline_expiry;

        let (pipeline, created) = self.tables.write().await.get_or_create_pipeline(
            &key,
            expiry,
            || {
                Pipeline::new(
                    self.self_ref.clone(),
                    pipeline_id,
                    Arc::clone(session),
                    sender,
                    expiry,
                )
            },
        );

        if created {
            self.metrics.pipeline_created();
            tracing::info!(namespace = namespace, pipeline = %key, "Pipeline created");
        } else {
            tracing::debug!(pipeline = %key, "Pipeline refreshed");
        }

        pipeline
    }

    /// Look up a pipeline by its composite id
    pub async fn get_pipeline_by_id(&self, id: &str) -> Result<Arc<Pipeline>, RegistryError> {
        let tables = self.tables.read().await;

        if let Some(pipeline) = tables.lookup_pipeline(id) {
            return Ok(pipeline);
        }

        if self.config.dev_pipeline_fallback {
            if let Some(pipeline) = tables.any_pipeline() {
                tracing::warn!(
                    requested = id,
                    pipeline = %pipeline.id(),
                    "Pipeline lookup missed, returning arbitrary pipeline (dev fallback)"
                );
                return Ok(pipeline);
            }
        }

        Err(RegistryError::PipelineNotFound(id.to_string()))
    }

    /// Resolve a local session id to an enabled sink
    pub async fn find_sink(&self, to: &str) -> Option<Arc<dyn Sink>> {
        let sink = self.tables.read().await.lookup_sink(to);
        if sink.is_some() {
            tracing::debug!(to = to, "Pipeline sink found via manager");
        }
        sink
    }

    /// Remove a session and its sink by local id, closing both
    ///
    /// Returns `false` when nothing was registered under `id`.
    pub async fn remove_session(&self, id: &str) -> bool {
        let detached = self.tables.write().await.remove_session_by_id(id);
        if detached.is_empty() {
            return false;
        }

        tracing::info!(session_id = id, "Session removed");
        detached.close().await;
        true
    }

    /// Find a session, checking the registry before the server-wide store
    pub async fn get_session(&self, id: &str) -> Option<Arc<dyn Session>> {
        if let Some(session) = self.tables.read().await.lookup_session(id) {
            return Some(session);
        }
        self.collaborators.session_store.get_session(id)
    }

    /// Session currently mapped to an external bus id
    pub async fn session_for_external_id(&self, external_id: &str) -> Option<Arc<dyn Session>> {
        self.tables.read().await.lookup_by_external_id(external_id)
    }

    /// User id bound to a session
    pub fn user_id(&self, session_id: &str) -> Option<String> {
        self.collaborators.user_store.user_id(session_id)
    }

    /// Table sizes and lifetime counters
    pub async fn stats(&self) -> RegistryStats {
        let tables = self.tables.read().await;
        RegistryStats {
            pipelines: tables.pipeline_count(),
            sessions: tables.session_count(),
            bus_sessions: tables.bus_session_count(),
            sinks: tables.sink_count(),
            counters: self.metrics.snapshot(),
        }
    }

    /// Detach entries under the write lock; the caller closes them afterwards
    pub(crate) async fn detach_external(&self, external_id: &str) -> Detached {
        self.tables.write().await.remove_by_external_id(external_id)
    }
}
