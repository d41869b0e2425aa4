//! Session and pipeline registry for a clustered signaling server
//!
//! Tracks short-lived sessions, the routed pipelines between them and the
//! sinks that deliver back to them, while following session create/close
//! events published by other nodes on the cluster bus.
//!
//! # Example
//!
//! ```no_run
//! use channelling::{Collaborators, PipelineManager, RegistryConfig};
//!
//! # async fn run(collaborators: Collaborators) -> Result<(), channelling::RegistryError> {
//! let manager = PipelineManager::with_config(collaborators, RegistryConfig::default());
//! manager.start().await?;
//!
//! if let Some(sink) = manager.find_sink("session-id").await {
//!     sink.write(bytes::Bytes::from_static(b"{}"))?;
//! }
//!
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod pipeline;
pub mod registry;
pub mod session;
pub mod stats;

#[cfg(test)]
pub(crate) mod test_support;

pub use bus::{Bus, BusError, BusHandler, LocalBus};
pub use pipeline::{Pipeline, PipelineId, PIPELINE_NAMESPACE_CALL};
pub use registry::{
    CollaboratorError, Collaborators, ManagerState, PipelineManager, RegistryConfig,
    RegistryError,
};
pub use session::{Sender, Session, SessionCreator, SessionStore, Sink, SinkFactory, UserStore};
pub use stats::RegistryStats;
