//! Mock collaborators shared by the unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;

use crate::bus::messages::encode_close_request;
use crate::bus::{LocalBus, RoomDescriptor, SessionCreateRequest};
use crate::registry::{Collaborators, CollaboratorError, PipelineManager, RegistryConfig};
use crate::session::{Session, SessionCreator, SessionStore, Sink, SinkFactory, UserStore};

pub struct MockSession {
    id: String,
    status: Mutex<Value>,
    userid: Mutex<Option<String>>,
    room: Mutex<Option<String>>,
    fail_join: AtomicBool,
    join_attempts: Mutex<Vec<String>>,
    broadcasts: AtomicUsize,
    closes: AtomicUsize,
    reenter: Mutex<Weak<PipelineManager>>,
    reentered: AtomicUsize,
}

/// Calls back into the manager the way a real collaborator might on close
async fn reenter_manager(manager: &Mutex<Weak<PipelineManager>>, id: &str) -> bool {
    let manager = manager.lock().upgrade();
    let Some(manager) = manager else {
        return false;
    };
    manager.stats().await;
    manager.find_sink(id).await;
    manager.session_for_external_id(id).await;
    true
}

impl MockSession {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            status: Mutex::new(Value::Null),
            userid: Mutex::new(None),
            room: Mutex::new(None),
            fail_join: AtomicBool::new(false),
            join_attempts: Mutex::new(Vec::new()),
            broadcasts: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            reenter: Mutex::new(Weak::new()),
            reentered: AtomicUsize::new(0),
        })
    }

    /// Make `close` query `manager` before returning
    pub fn reenter_on_close(&self, manager: &Arc<PipelineManager>) {
        *self.reenter.lock() = Arc::downgrade(manager);
    }

    /// Number of closes that called back into the manager
    pub fn reentered(&self) -> usize {
        self.reentered.load(Ordering::SeqCst)
    }

    pub fn userid(&self) -> Option<String> {
        self.userid.lock().clone()
    }

    pub fn room(&self) -> Option<String> {
        self.room.lock().clone()
    }

    pub fn join_attempts(&self) -> Vec<String> {
        self.join_attempts.lock().clone()
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Session for MockSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> Value {
        self.status.lock().clone()
    }

    fn set_status(&self, status: Value) {
        *self.status.lock() = status;
    }

    fn set_userid_fake(&self, userid: &str) {
        *self.userid.lock() = Some(userid.to_string());
    }

    async fn join_room(&self, room: &RoomDescriptor) -> Result<String, CollaboratorError> {
        self.join_attempts.lock().push(room.name.clone());
        if self.fail_join.load(Ordering::SeqCst) {
            return Err(CollaboratorError::RoomJoin {
                room: room.name.clone(),
                reason: "forbidden".to_string(),
            });
        }
        *self.room.lock() = Some(room.name.clone());
        Ok(room.name.clone())
    }

    async fn broadcast_status(&self) {
        self.broadcasts.fetch_add(1, Ordering::SeqCst);
    }

    async fn close(&self) {
        if reenter_manager(&self.reenter, &self.id).await {
            self.reentered.fetch_add(1, Ordering::SeqCst);
        }
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MockSink {
    enabled: AtomicBool,
    closes: AtomicUsize,
    written: Mutex<Vec<Bytes>>,
    reenter: Mutex<Weak<PipelineManager>>,
    reentered: AtomicUsize,
}

impl MockSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            enabled: AtomicBool::new(true),
            closes: AtomicUsize::new(0),
            written: Mutex::new(Vec::new()),
            reenter: Mutex::new(Weak::new()),
            reentered: AtomicUsize::new(0),
        })
    }

    pub fn reenter_on_close(&self, manager: &Arc<PipelineManager>) {
        *self.reenter.lock() = Arc::downgrade(manager);
    }

    pub fn reentered(&self) -> usize {
        self.reentered.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> Vec<Bytes> {
        self.written.lock().clone()
    }
}

#[async_trait]
impl Sink for MockSink {
    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn write(&self, payload: Bytes) -> Result<(), CollaboratorError> {
        if !self.enabled() {
            return Err(CollaboratorError::SinkWrite("disabled".to_string()));
        }
        self.written.lock().push(payload);
        Ok(())
    }

    async fn close(&self) {
        if reenter_manager(&self.reenter, "sink").await {
            self.reentered.fetch_add(1, Ordering::SeqCst);
        }
        self.enabled.store(false, Ordering::SeqCst);
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockCreator {
    next_id: AtomicU64,
    fail_room_joins: AtomicBool,
    fixed_id: Mutex<Option<String>>,
    reenter: Mutex<Weak<PipelineManager>>,
    created: Mutex<Vec<Arc<MockSession>>>,
}

impl MockCreator {
    /// Hand out `id` for every new session instead of `local-{n}`
    pub fn reuse_id(&self, id: &str) {
        *self.fixed_id.lock() = Some(id.to_string());
    }

    /// Sessions created from now on call back into `manager` when closed
    pub fn reenter_on_close(&self, manager: &Arc<PipelineManager>) {
        *self.reenter.lock() = Arc::downgrade(manager);
    }

    pub fn fail_room_joins(&self, fail: bool) {
        self.fail_room_joins.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self, index: usize) -> Arc<MockSession> {
        Arc::clone(&self.created.lock()[index])
    }

    pub fn count(&self) -> usize {
        self.created.lock().len()
    }
}

impl SessionCreator for MockCreator {
    fn create_session(&self, _parent: Option<&Arc<dyn Session>>, _name: &str) -> Arc<dyn Session> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = self
            .fixed_id
            .lock()
            .clone()
            .unwrap_or_else(|| format!("local-{n}"));
        let session = MockSession::new(&id);
        session
            .fail_join
            .store(self.fail_room_joins.load(Ordering::SeqCst), Ordering::SeqCst);
        *session.reenter.lock() = self.reenter.lock().clone();
        self.created.lock().push(Arc::clone(&session));
        session
    }
}

#[derive(Default)]
pub struct MockSinkFactory {
    reenter: Mutex<Weak<PipelineManager>>,
    created: Mutex<Vec<Arc<MockSink>>>,
}

impl MockSinkFactory {
    pub fn reenter_on_close(&self, manager: &Arc<PipelineManager>) {
        *self.reenter.lock() = Arc::downgrade(manager);
    }

    pub fn created(&self, index: usize) -> Arc<MockSink> {
        Arc::clone(&self.created.lock()[index])
    }
}

impl SinkFactory for MockSinkFactory {
    fn create_sink(&self, _external_id: &str) -> Arc<dyn Sink> {
        let sink = MockSink::new();
        *sink.reenter.lock() = self.reenter.lock().clone();
        self.created.lock().push(Arc::clone(&sink));
        sink
    }
}

#[derive(Default)]
pub struct MockSessionStore {
    sessions: Mutex<HashMap<String, Arc<dyn Session>>>,
}

impl MockSessionStore {
    pub fn insert(&self, session: Arc<MockSession>) {
        self.sessions.lock().insert(session.id().to_string(), session);
    }
}

impl SessionStore for MockSessionStore {
    fn get_session(&self, id: &str) -> Option<Arc<dyn Session>> {
        self.sessions.lock().get(id).cloned()
    }
}

#[derive(Default)]
pub struct MockUserStore {
    users: Mutex<HashMap<String, String>>,
}

impl MockUserStore {
    pub fn bind(&self, session_id: &str, userid: &str) {
        self.users
            .lock()
            .insert(session_id.to_string(), userid.to_string());
    }
}

impl UserStore for MockUserStore {
    fn user_id(&self, session_id: &str) -> Option<String> {
        self.users.lock().get(session_id).cloned()
    }
}

/// A manager wired to mocks and an in-process bus
pub struct Harness {
    pub manager: Arc<PipelineManager>,
    pub bus: Arc<LocalBus>,
    pub creator: Arc<MockCreator>,
    pub sinks: Arc<MockSinkFactory>,
    pub session_store: Arc<MockSessionStore>,
    pub user_store: Arc<MockUserStore>,
}

impl Harness {
    pub async fn publish_create(&self, msg: &SessionCreateRequest) {
        let payload = msg.encode().unwrap();
        self.bus
            .publish(&self.manager.config().create_subject, None, payload)
            .await;
    }

    pub async fn publish_close(&self, id: &str) {
        self.bus
            .publish(&self.manager.config().close_subject, None, encode_close_request(id))
            .await;
    }
}

pub fn harness(config: RegistryConfig) -> Harness {
    let bus = Arc::new(LocalBus::new());
    let creator = Arc::new(MockCreator::default());
    let sinks = Arc::new(MockSinkFactory::default());
    let session_store = Arc::new(MockSessionStore::default());
    let user_store = Arc::new(MockUserStore::default());

    let collaborators = Collaborators {
        bus: bus.clone(),
        session_store: session_store.clone(),
        user_store: user_store.clone(),
        session_creator: creator.clone(),
        sink_factory: sinks.clone(),
    };

    Harness {
        manager: PipelineManager::with_config(collaborators, config),
        bus,
        creator,
        sinks,
        session_store,
        user_store,
    }
}
