//! Registry counters and snapshots

use std::sync::atomic::{AtomicU64, Ordering};

/// Lifetime counters, updated without taking the registry lock
#[derive(Debug, Default)]
pub struct RegistryMetrics {
    pipelines_created: AtomicU64,
    pipelines_swept: AtomicU64,
    sessions_created: AtomicU64,
    sessions_replaced: AtomicU64,
    sessions_closed: AtomicU64,
    bus_messages_dropped: AtomicU64,
}

impl RegistryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn pipeline_created(&self) {
        self.pipelines_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn pipelines_swept(&self, count: usize) {
        self.pipelines_swept.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn session_created(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn session_replaced(&self) {
        self.sessions_replaced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bus_message_dropped(&self) {
        self.bus_messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pipelines_created: self.pipelines_created.load(Ordering::Relaxed),
            pipelines_swept: self.pipelines_swept.load(Ordering::Relaxed),
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            sessions_replaced: self.sessions_replaced.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            bus_messages_dropped: self.bus_messages_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RegistryMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Pipelines created by `get_pipeline`
    pub pipelines_created: u64,
    /// Pipelines evicted by the sweeper
    pub pipelines_swept: u64,
    /// Sessions created from bus requests
    pub sessions_created: u64,
    /// Bus sessions retired by a create for the same external id
    pub sessions_replaced: u64,
    /// Bus sessions torn down by a close request
    pub sessions_closed: u64,
    /// Bus messages ignored as incomplete or undecodable
    pub bus_messages_dropped: u64,
}

/// Registry statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Live pipelines
    pub pipelines: usize,
    /// Sessions by local id
    pub sessions: usize,
    /// Sessions mapped to an external bus id
    pub bus_sessions: usize,
    /// Registered sinks (enabled or not)
    pub sinks: usize,
    /// Lifetime counters
    pub counters: MetricsSnapshot,
}
