//! Periodic metrics persistence.
//!
//! The persister copies the aggregator's snapshot into the configured
//! [`MetricsStore`] on a fixed interval and once more when shutdown is
//! triggered. Store failures are logged and never reach request handling.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use vinyl_telemetry::{MetricsAggregator, MetricsStore, StoreError};

use crate::shutdown::ShutdownSignal;

/// Saves aggregate snapshots to a store.
#[derive(Debug, Clone)]
pub struct SnapshotPersister {
    aggregator: Arc<MetricsAggregator>,
    store: Arc<dyn MetricsStore>,
    interval: Option<Duration>,
}

impl SnapshotPersister {
    /// Creates a persister. `interval` of `None` disables periodic saves; the
    /// final save on shutdown still happens.
    #[must_use]
    pub fn new(
        aggregator: Arc<MetricsAggregator>,
        store: Arc<dyn MetricsStore>,
        interval: Option<Duration>,
    ) -> Self {
        Self {
            aggregator,
            store,
            interval: interval.filter(|d| !d.is_zero()),
        }
    }

    /// Saves the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn save_now(&self) -> Result<(), StoreError> {
        let snapshot = self.aggregator.snapshot();
        self.store.save(&snapshot)?;
        tracing::debug!(
            total_requests = snapshot.total_requests,
            "metrics snapshot saved"
        );
        Ok(())
    }

    /// Spawns the save loop. The task exits after the final save that follows
    /// `shutdown`.
    #[must_use]
    pub fn spawn(self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn run(self, shutdown: ShutdownSignal) {
        if let Some(period) = self.interval {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.save_logged(),
                    () = shutdown.recv() => break,
                }
            }
        } else {
            shutdown.recv().await;
        }

        self.save_logged();
        tracing::info!("final metrics snapshot saved");
    }

    fn save_logged(&self) {
        if let Err(e) = self.save_now() {
            tracing::warn!(error = %e, "failed to save metrics snapshot");
        }
    }
}
