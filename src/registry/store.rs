//! Registry tables
//!
//! The four maps guarded by the manager's `RwLock`. Every method here runs
//! inside a single critical section and never calls into a session, sink or
//! pipeline teardown path; detached entries are handed back to the caller so
//! they can be closed after the guard is dropped.

use std::collections::HashMap;
use std::sync::Arc;

use crate::pipeline::Pipeline;
use crate::session::{Session, Sink};

/// Entries removed from the tables, to be closed outside the lock
#[derive(Default)]
pub struct Detached {
    pub session: Option<Arc<dyn Session>>,
    pub sink: Option<Arc<dyn Sink>>,
}

impl Detached {
    /// Whether nothing was removed
    pub fn is_empty(&self) -> bool {
        self.session.is_none() && self.sink.is_none()
    }

    /// Close the detached sink, then the detached session
    pub async fn close(self) {
        if let Some(sink) = self.sink {
            sink.close().await;
        }
        if let Some(session) = self.session {
            session.close().await;
        }
    }
}

fn same_session(a: &Arc<dyn Session>, b: &Arc<dyn Session>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Registry state: pipelines, local sessions, bus-mapped sessions and sinks
#[derive(Default)]
pub struct RegistryTables {
    /// Pipelines by composite id
    pipelines: HashMap<String, Arc<Pipeline>>,
    /// Sessions by local id
    sessions: HashMap<String, Arc<dyn Session>>,
    /// Sessions by external bus id
    sessions_by_bus_id: HashMap<String, Arc<dyn Session>>,
    /// Sinks by local session id
    sinks: HashMap<String, Arc<dyn Sink>>,
}

impl RegistryTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session with its sink and optional external mapping
    ///
    /// Whatever already occupied the external id or the session's local id
    /// is removed and returned, so the tables never hold a stale mapping or
    /// an orphaned sink. Re-inserting the same session object does not
    /// hand that session back for closing.
    pub fn insert_session(
        &mut self,
        session: Arc<dyn Session>,
        sink: Arc<dyn Sink>,
        external_id: Option<&str>,
    ) -> Vec<Detached> {
        let id = session.id().to_string();
        let mut displaced = Vec::new();

        if let Some(external_id) = external_id {
            displaced.push(self.remove_by_external_id(external_id));
        }
        displaced.push(self.remove_session_by_id(&id));

        for entry in displaced.iter_mut() {
            if entry
                .session
                .as_ref()
                .is_some_and(|old| same_session(old, &session))
            {
                entry.session = None;
            }
        }
        displaced.retain(|entry| !entry.is_empty());

        if let Some(external_id) = external_id {
            self.sessions_by_bus_id
                .insert(external_id.to_string(), Arc::clone(&session));
        }
        self.sinks.insert(id.clone(), sink);
        self.sessions.insert(id, session);
        displaced
    }

    /// Remove a session and its sink by local id
    ///
    /// Any external mapping pointing at the session is dropped as well.
    pub fn remove_session_by_id(&mut self, id: &str) -> Detached {
        let session = self.sessions.remove(id);
        let sink = self.sinks.remove(id);
        if session.is_some() {
            self.sessions_by_bus_id.retain(|_, s| s.id() != id);
        }
        Detached { session, sink }
    }

    /// Remove the mapping, session and sink for an external id
    ///
    /// Unmapped ids yield an empty [`Detached`].
    pub fn remove_by_external_id(&mut self, external_id: &str) -> Detached {
        let Some(session) = self.sessions_by_bus_id.remove(external_id) else {
            return Detached::default();
        };

        let id = session.id();
        self.sessions.remove(id);
        let sink = self.sinks.remove(id);
        Detached {
            session: Some(session),
            sink,
        }
    }

    /// Return the pipeline for `id`, refreshed, or insert one built by `factory`
    ///
    /// The second element is `true` when the pipeline was created.
    pub fn get_or_create_pipeline<F>(
        &mut self,
        id: &str,
        expiry: std::time::Duration,
        factory: F,
    ) -> (Arc<Pipeline>, bool)
    where
        F: FnOnce() -> Pipeline,
    {
        if let Some(pipeline) = self.pipelines.get(id) {
            // Refresh even if already past its deadline; eviction is the sweeper's job.
            pipeline.refresh(expiry);
            return (Arc::clone(pipeline), false);
        }

        let pipeline = Arc::new(factory());
        self.pipelines.insert(id.to_string(), Arc::clone(&pipeline));
        (pipeline, true)
    }

    /// Exact pipeline lookup
    pub fn lookup_pipeline(&self, id: &str) -> Option<Arc<Pipeline>> {
        self.pipelines.get(id).cloned()
    }

    /// Any pipeline at all (development fallback)
    pub fn any_pipeline(&self) -> Option<Arc<Pipeline>> {
        self.pipelines.values().next().cloned()
    }

    /// Sink for a local session id, only if enabled
    pub fn lookup_sink(&self, to: &str) -> Option<Arc<dyn Sink>> {
        self.sinks.get(to).filter(|sink| sink.enabled()).cloned()
    }

    pub fn lookup_session(&self, id: &str) -> Option<Arc<dyn Session>> {
        self.sessions.get(id).cloned()
    }

    pub fn lookup_by_external_id(&self, external_id: &str) -> Option<Arc<dyn Session>> {
        self.sessions_by_bus_id.get(external_id).cloned()
    }

    /// Remove every expired pipeline, returning them unclosed
    pub fn take_expired_pipelines(&mut self) -> Vec<Arc<Pipeline>> {
        let expired: Vec<String> = self
            .pipelines
            .iter()
            .filter(|(_, pipeline)| pipeline.expired())
            .map(|(id, _)| id.clone())
            .collect();

        expired
            .iter()
            .filter_map(|id| self.pipelines.remove(id))
            .collect()
    }

    /// Empty all tables, returning pipelines and detached sessions
    pub fn drain(&mut self) -> (Vec<Arc<Pipeline>>, Vec<Detached>) {
        let Self {
            pipelines,
            sessions,
            sessions_by_bus_id,
            sinks,
        } = self;

        let pipelines: Vec<Arc<Pipeline>> = pipelines.drain().map(|(_, p)| p).collect();
        sessions_by_bus_id.clear();

        let mut detached: Vec<Detached> = sessions
            .drain()
            .map(|(id, session)| Detached {
                sink: sinks.remove(&id),
                session: Some(session),
            })
            .collect();
        detached.extend(sinks.drain().map(|(_, sink)| Detached {
            session: None,
            sink: Some(sink),
        }));

        (pipelines, detached)
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn bus_session_count(&self) -> usize {
        self.sessions_by_bus_id.len()
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}
