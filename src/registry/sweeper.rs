//! Expiry sweeper
//!
//! Expired pipelines are removed under the write lock and closed only after
//! the lock is released, so a slow `close` never stalls lookups. A pipeline
//! refreshed before the sweep takes the lock is not expired and survives;
//! once removed, a concurrent `get_pipeline` for the same id builds a fresh
//! instance.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::manager::PipelineManager;

impl PipelineManager {
    /// Run one sweep, returning the number of pipelines evicted
    pub async fn sweep(&self) -> usize {
        let expired = self.tables.write().await.take_expired_pipelines();
        if expired.is_empty() {
            return 0;
        }

        for pipeline in &expired {
            pipeline.close();
            tracing::info!(pipeline = %pipeline.id(), "Pipeline removed by sweep");
        }

        self.metrics.pipelines_swept(expired.len());
        expired.len()
    }

    /// Spawn the background sweep task
    ///
    /// The task holds only a weak reference and exits when the manager is
    /// dropped or `shutdown_rx` fires.
    pub(crate) fn spawn_sweeper(
        self: &Arc<Self>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let manager = Arc::downgrade(self);
        let interval = self.config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::debug!("Sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(manager) = manager.upgrade() else {
                            break;
                        };
                        let evicted = manager.sweep().await;
                        if evicted > 0 {
                            tracing::debug!(evicted = evicted, "Sweep finished");
                        }
                    }
                }
            }
        })
    }
}
