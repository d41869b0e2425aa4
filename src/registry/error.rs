//! Registry error types

use thiserror::Error;

use crate::bus::BusError;

/// Error type for registry operations
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// No pipeline registered under the id
    #[error("Pipeline not found: {0}")]
    PipelineNotFound(String),

    /// Pipeline was closed by the sweeper or explicitly
    #[error("Pipeline closed: {0}")]
    PipelineClosed(String),

    /// No enabled sink for the target
    #[error("Sink not found: {0}")]
    SinkNotFound(String),

    /// The owning manager was dropped while a pipeline still referenced it
    #[error("Pipeline manager is gone")]
    ManagerGone,

    /// `start` was called twice
    #[error("Pipeline manager already started")]
    AlreadyStarted,

    /// `start` was called after `shutdown`
    #[error("Pipeline manager has been shut down")]
    Stopped,

    /// Sink rejected a write
    #[error("Delivery failed: {0}")]
    Delivery(#[from] CollaboratorError),

    /// Bus subscription failed
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Failure reported by an external collaborator (session, sink)
#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    /// Room join was refused or failed
    #[error("Failed to join room {room}: {reason}")]
    RoomJoin { room: String, reason: String },

    /// Sink refused the payload
    #[error("Sink write failed: {0}")]
    SinkWrite(String),
}
