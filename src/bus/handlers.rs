//! Session create/close handlers
//!
//! Remote lifecycle events become registry mutations here. Replacement is a
//! single critical section: the old session for an external id is detached
//! and the new one inserted under one write lock, so no reader ever sees two
//! sessions for the same external id. Closing the retired entries, applying
//! status, joining rooms and broadcasting all happen after the lock is
//! released.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;

use crate::registry::PipelineManager;

use super::messages::{decode_close_request, SessionCreateRequest};
use super::BusHandler;

impl PipelineManager {
    /// Create (or replace) the local session for an external id
    ///
    /// Ignored unless the manager is running.
    pub async fn session_create(&self, subject: &str, reply: Option<&str>, msg: SessionCreateRequest) {
        tracing::debug!(
            subject = subject,
            reply = ?reply,
            external_id = %msg.id,
            "Session create via bus"
        );

        if !self.is_running() {
            tracing::debug!(
                external_id = %msg.id,
                state = ?self.state(),
                "Session create while not running, ignored"
            );
            return;
        }

        let Some(payload) = msg.session else {
            tracing::debug!(external_id = %msg.id, "Session create without session payload, ignored");
            self.metrics.bus_message_dropped();
            return;
        };
        if msg.id.is_empty() {
            tracing::debug!("Session create without external id, ignored");
            self.metrics.bus_message_dropped();
            return;
        }

        let session = self.collaborators.session_creator.create_session(None, "");
        let sink = self.collaborators.sink_factory.create_sink(&msg.id);

        let inserted = {
            let mut tables = self.tables.write().await;
            // Re-checked under the lock: shutdown flips the state before it
            // drains, so nothing inserted here can outlive the drain.
            if self.is_running() {
                let retired = tables.remove_by_external_id(&msg.id);
                let displaced =
                    tables.insert_session(Arc::clone(&session), Arc::clone(&sink), Some(&msg.id));
                Some((retired, displaced))
            } else {
                None
            }
        };

        let Some((retired, displaced)) = inserted else {
            tracing::debug!(
                external_id = %msg.id,
                "Manager stopped during session create, discarding"
            );
            sink.close().await;
            session.close().await;
            return;
        };

        for entry in displaced {
            tracing::warn!(
                external_id = %msg.id,
                session_id = %session.id(),
                displaced_session_id = ?entry.session.as_ref().map(|s| s.id().to_string()),
                "Session id collided with a registered session, closing the old entry"
            );
            entry.close().await;
        }

        self.metrics.session_created();
        if let Some(old) = retired.session.as_ref() {
            self.metrics.session_replaced();
            tracing::info!(
                external_id = %msg.id,
                old_session_id = %old.id(),
                session_id = %session.id(),
                "Bus session replaced"
            );
        } else {
            tracing::info!(
                external_id = %msg.id,
                session_id = %session.id(),
                "Bus session created"
            );
        }
        retired.close().await;

        session.set_status(payload.status);
        session.set_userid_fake(&payload.userid);

        if let Some(room) = msg.room.as_ref() {
            match session.join_room(room).await {
                Ok(room_id) => {
                    tracing::info!(session_id = %session.id(), room = %room_id, "Joined bus session to room");
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = %session.id(),
                        room = %room.name,
                        error = %e,
                        "Failed to join bus session to room"
                    );
                }
            }
        }

        session.broadcast_status().await;
    }

    /// Tear down the local session for an external id
    ///
    /// Unknown ids are a no-op, as is any close while the manager is not
    /// running.
    pub async fn session_close(&self, subject: &str, reply: Option<&str>, id: &str) {
        tracing::debug!(subject = subject, reply = ?reply, external_id = id, "Session close via bus");

        if !self.is_running() {
            tracing::debug!(
                external_id = id,
                state = ?self.state(),
                "Session close while not running, ignored"
            );
            return;
        }

        if id.is_empty() {
            self.metrics.bus_message_dropped();
            return;
        }

        let detached = self.detach_external(id).await;
        if detached.is_empty() {
            tracing::debug!(external_id = id, "Session close for unknown external id");
            return;
        }

        self.metrics.session_closed();
        tracing::info!(external_id = id, "Bus session closed");
        detached.close().await;
    }
}

/// Decodes create requests and forwards them to the manager
pub struct SessionCreateHandler {
    manager: Weak<PipelineManager>,
}

impl SessionCreateHandler {
    pub fn new(manager: Weak<PipelineManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl BusHandler for SessionCreateHandler {
    async fn handle(&self, subject: &str, reply: Option<&str>, payload: Bytes) {
        let Some(manager) = self.manager.upgrade() else {
            return;
        };
        if !manager.is_running() {
            tracing::debug!(
                subject = subject,
                state = ?manager.state(),
                "Manager not running, session create message ignored"
            );
            return;
        }

        match SessionCreateRequest::decode(&payload) {
            Ok(msg) => manager.session_create(subject, reply, msg).await,
            Err(e) => {
                tracing::warn!(subject = subject, error = %e, "Dropping session create message");
                manager.metrics.bus_message_dropped();
            }
        }
    }
}

/// Decodes close requests and forwards them to the manager
pub struct SessionCloseHandler {
    manager: Weak<PipelineManager>,
}

impl SessionCloseHandler {
    pub fn new(manager: Weak<PipelineManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl BusHandler for SessionCloseHandler {
    async fn handle(&self, subject: &str, reply: Option<&str>, payload: Bytes) {
        let Some(manager) = self.manager.upgrade() else {
            return;
        };
        if !manager.is_running() {
            tracing::debug!(
                subject = subject,
                state = ?manager.state(),
                "Manager not running, session close message ignored"
            );
            return;
        }

        match decode_close_request(&payload) {
            Ok(id) => manager.session_close(subject, reply, &id).await,
            Err(e) => {
                tracing::warn!(subject = subject, error = %e, "Dropping session close message");
                manager.metrics.bus_message_dropped();
            }
        }
    }
}
