//! Periodic sync scheduling.
//!
//! Runs `sync_all` on a fixed interval in a background task. Shutdown
//! goes through a watch channel so a stop request interrupts the wait
//! between runs instead of letting one more run start.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

use crate::engine::SyncEngine;

/// Periodic driver for a [`SyncEngine`].
pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    interval: Duration,
}

impl SyncScheduler {
    #[must_use]
    pub fn new(engine: Arc<SyncEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Spawn the scheduling loop. The first run happens after one full
    /// interval, not immediately.
    #[must_use]
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run_loop(shutdown_rx));
        SchedulerHandle { shutdown_tx, task }
    }

    #[instrument(skip(self, shutdown), fields(interval_secs = self.interval.as_secs()))]
    async fn run_loop(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick of a tokio interval fires immediately.
        ticker.tick().await;

        info!("scheduler started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.engine.sync_all().await {
                        Ok(results) => {
                            info!(runs = results.len(), "scheduled sync finished");
                        }
                        Err(e) => {
                            error!(error = %e, "scheduled sync failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("scheduler stopping");
                    break;
                }
            }
        }
    }
}

/// Handle to a running scheduler.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the loop and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }

    /// Whether the loop is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}
