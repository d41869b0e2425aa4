//! Session/pipeline registry
//!
//! The registry tracks pipelines, sessions and sinks on this node and keeps
//! them consistent with session lifecycle events arriving from the cluster
//! bus.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<PipelineManager>
//!                     ┌──────────────────────────────┐
//!                     │ RwLock<RegistryTables {      │
//!                     │   pipelines:          id ──► Pipeline
//!                     │   sessions:     local id ──► Session
//!                     │   sessions_by_bus_id: ext ──► Session
//!                     │   sinks:        local id ──► Sink
//!                     │ }>                           │
//!                     └──────────────┬───────────────┘
//!                                    │
//!         ┌──────────────────────────┼──────────────────────────┐
//!         │                          │                          │
//!         ▼                          ▼                          ▼
//!   [bus handlers]             [lookup API]                [sweeper]
//!   session_create()           get_pipeline()              sweep() every
//!   session_close()            get_pipeline_by_id()        sweep_interval
//!                              find_sink()
//! ```
//!
//! # Locking
//!
//! One `tokio::sync::RwLock` guards all four tables. Pure lookups take the
//! read side; inserts, removals and refresh-or-create take the write side,
//! each compound operation in a single critical section. Session, sink and
//! pipeline teardown always runs after the guard is dropped, so a collaborator
//! whose `close` calls back into the registry cannot deadlock it.
//!
//! # Lifecycle
//!
//! `Idle -> Running -> Stopped`. Bus messages are applied only while
//! `Running`; a stopped manager cannot be started again.

pub mod config;
pub mod error;
pub mod manager;
pub mod store;
pub mod sweeper;

pub use config::RegistryConfig;
pub use error::{CollaboratorError, RegistryError};
pub use manager::{Collaborators, ManagerState, PipelineManager};
pub use store::{Detached, RegistryTables};
