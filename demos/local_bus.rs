//! Single-node demo driving the registry over the in-process bus
//!
//! Run with: cargo run --example local_bus
//!
//! Set `RUST_LOG=channelling=debug` to see lookups and ignored messages.
//!
//! The demo:
//! - creates a session for external id "ext-1" as a remote node would
//! - replaces it with a second create for the same id
//! - opens a call pipeline from a local caller to that session and delivers
//!   a payload through it
//! - closes the session over the bus and shuts the registry down

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{json, Value};

use channelling::bus::messages::encode_close_request;
use channelling::bus::{RoomDescriptor, SessionCreateRequest, SessionStatusPayload};
use channelling::{
    CollaboratorError, Collaborators, LocalBus, PipelineManager, RegistryConfig, Session,
    SessionCreator, SessionStore, Sink, SinkFactory, UserStore, PIPELINE_NAMESPACE_CALL,
};

/// Session that just logs what happens to it
struct DemoSession {
    id: String,
    status: Mutex<Value>,
    userid: Mutex<String>,
}

#[async_trait]
impl Session for DemoSession {
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
        *self.userid.lock() = userid.to_string();
    }

    async fn join_room(&self, room: &RoomDescriptor) -> Result<String, CollaboratorError> {
        if room.name.is_empty() {
            return Err(CollaboratorError::RoomJoin {
                room: room.name.clone(),
                reason: "empty room name".to_string(),
            });
        }
        Ok(format!("{}:{}", room.kind, room.name))
    }

    async fn broadcast_status(&self) {
        tracing::info!(session_id = %self.id, status = %self.status(), "Broadcasting status");
    }

    async fn close(&self) {
        tracing::info!(session_id = %self.id, "Session closed");
    }
}

#[derive(Default)]
struct DemoCreator {
    next_id: AtomicU64,
}

impl SessionCreator for DemoCreator {
    fn create_session(&self, _parent: Option<&Arc<dyn Session>>, name: &str) -> Arc<dyn Session> {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        Arc::new(DemoSession {
            id: format!("session-{n}"),
            status: Mutex::new(Value::Null),
            userid: Mutex::new(name.to_string()),
        })
    }
}

/// Sink that would publish back over the bus to the external id
struct BusSink {
    external_id: String,
    enabled: AtomicBool,
}

#[async_trait]
impl Sink for BusSink {
    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn write(&self, payload: Bytes) -> Result<(), CollaboratorError> {
        tracing::info!(
            external_id = %self.external_id,
            bytes = payload.len(),
            "Forwarding payload to remote session"
        );
        Ok(())
    }

    async fn close(&self) {
        self.enabled.store(false, Ordering::Release);
    }
}

struct BusSinkFactory;

impl SinkFactory for BusSinkFactory {
    fn create_sink(&self, external_id: &str) -> Arc<dyn Sink> {
        Arc::new(BusSink {
            external_id: external_id.to_string(),
            enabled: AtomicBool::new(true),
        })
    }
}

#[derive(Default)]
struct Directory {
    sessions: Mutex<HashMap<String, Arc<dyn Session>>>,
}

impl SessionStore for Directory {
    fn get_session(&self, id: &str) -> Option<Arc<dyn Session>> {
        self.sessions.lock().get(id).cloned()
    }
}

impl UserStore for Directory {
    fn user_id(&self, _session_id: &str) -> Option<String> {
        None
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "channelling=info,local_bus=info".into()),
        )
        .init();

    let bus = Arc::new(LocalBus::new());
    let directory = Arc::new(Directory::default());
    let collaborators = Collaborators {
        bus: bus.clone(),
        session_store: directory.clone(),
        user_store: directory.clone(),
        session_creator: Arc::new(DemoCreator::default()),
        sink_factory: Arc::new(BusSinkFactory),
    };

    let config = RegistryConfig::default();
    let create_subject = config.create_subject.clone();
    let close_subject = config.close_subject.clone();

    let manager = PipelineManager::with_config(collaborators, config);
    manager.start().await?;

    // A remote node announces a session, then re-announces it.
    let away = SessionCreateRequest::new(
        "ext-1",
        SessionStatusPayload::new(json!({ "Status": "away" }), "alice"),
    )
    .with_room(RoomDescriptor::new("lobby", "Room"));
    bus.publish(&create_subject, None, away.encode()?).await;

    let online = SessionCreateRequest::new(
        "ext-1",
        SessionStatusPayload::new(json!({ "Status": "online" }), "alice"),
    );
    bus.publish(&create_subject, None, online.encode()?).await;

    let remote = manager
        .session_for_external_id("ext-1")
        .await
        .ok_or("remote session missing")?;
    tracing::info!(session_id = %remote.id(), status = %remote.status(), "Remote session live");

    // A local caller opens a call pipeline towards it.
    let caller: Arc<dyn Session> = Arc::new(DemoSession {
        id: "local-caller".to_string(),
        status: Mutex::new(Value::Null),
        userid: Mutex::new("bob".to_string()),
    });
    directory
        .sessions
        .lock()
        .insert(caller.id().to_string(), Arc::clone(&caller));

    let pipeline = manager
        .get_pipeline(PIPELINE_NAMESPACE_CALL, None, &caller, remote.id())
        .await;
    pipeline.deliver(Bytes::from_static(b"{\"Type\":\"Offer\"}")).await?;

    let same = manager.get_pipeline_by_id(pipeline.id()).await?;
    tracing::info!(pipeline = %same.id(), "Pipeline resolved by id");

    bus.publish(&close_subject, None, encode_close_request("ext-1")).await;
    if let Err(e) = pipeline.deliver(Bytes::from_static(b"{}")).await {
        tracing::info!(error = %e, "Delivery after close rejected");
    }

    let stats = manager.stats().await;
    tracing::info!(stats = ?stats, "Registry stats");
    manager.shutdown().await;

    Ok(())
}
