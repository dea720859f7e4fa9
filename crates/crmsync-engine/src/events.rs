//! Sync event broadcasting.
//!
//! The engine publishes progress events on a bounded broadcast channel.
//! Slow subscribers lose the oldest events and observe a `Lagged`
//! recv error; publishing never blocks the sync loop and never fails
//! when nobody is listening.

use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crmsync_adapter::{CrmPlatform, EntityKind};

use crate::types::SyncResult;

const DEFAULT_CAPACITY: usize = 256;

/// Progress events published during sync runs.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A (connection, kind) run started.
    RunStarted {
        connection_id: Uuid,
        platform: CrmPlatform,
        kind: EntityKind,
    },
    /// A run finished, successfully or not.
    RunCompleted { result: SyncResult },
    /// One record failed inside a run.
    RecordErrored {
        connection_id: Uuid,
        external_id: String,
        message: String,
    },
    /// A connection was disabled after repeated auth failures.
    ConnectionDisabled {
        connection_id: Uuid,
        platform: CrmPlatform,
    },
    /// A run was rejected by the local rate limiter.
    Throttled {
        connection_id: Uuid,
        platform: CrmPlatform,
        wait_ms: u64,
    },
}

/// Broadcast bus for [`SyncEvent`]s.
#[derive(Debug, Clone)]
pub struct SyncEventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl SyncEventBus {
    /// Create a bus holding up to `capacity` undelivered events per
    /// subscriber before the oldest are dropped.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. A bus with no subscribers drops it silently.
    pub fn publish(&self, event: SyncEvent) {
        if self.sender.send(event).is_err() {
            debug!("sync event dropped, no subscribers");
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SyncEventBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}
