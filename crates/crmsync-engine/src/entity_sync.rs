//! Per-kind synchronization loop.
//!
//! One run pulls a batch of records for a (connection, kind) pair,
//! normalizes each record, and reconciles it against the store. Record
//! failures are isolated: a record that cannot be mapped or persisted
//! is counted and the loop moves on. Run-level failures (rate limit,
//! fetch, auth) abort the run and surface as errors to the engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use crmsync_adapter::{CrmAdapter, EntityKind};

use crate::conflict::ConflictResolver;
use crate::connection::Connection;
use crate::entity::{NaturalKey, StandardEntity};
use crate::error::Result;
use crate::events::{SyncEvent, SyncEventBus};
use crate::mapper::FieldMapper;
use crate::rate_limiter::RateLimiterRegistry;
use crate::store::{EntityStore, StoredEntity};
use crate::types::{RecordSyncStatus, SyncResult};

/// Executes one sync run for a connection and kind.
pub struct EntitySync {
    adapter: Arc<dyn CrmAdapter>,
    store: Arc<dyn EntityStore>,
    mapper: FieldMapper,
    resolver: ConflictResolver,
    limiters: Arc<RateLimiterRegistry>,
    events: SyncEventBus,
    cancel: Arc<AtomicBool>,
}

impl EntitySync {
    pub fn new(
        adapter: Arc<dyn CrmAdapter>,
        store: Arc<dyn EntityStore>,
        mapper: FieldMapper,
        resolver: ConflictResolver,
        limiters: Arc<RateLimiterRegistry>,
        events: SyncEventBus,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            adapter,
            store,
            mapper,
            resolver,
            limiters,
            events,
            cancel,
        }
    }

    /// Run one sync for `kind` on `connection`.
    ///
    /// Returns an error only for run-level failures; per-record
    /// failures are folded into the result.
    #[instrument(skip(self, connection), fields(connection_id = %connection.id, platform = %connection.platform, kind = %kind))]
    pub async fn run(&self, connection: &Connection, kind: EntityKind) -> Result<SyncResult> {
        let platform = connection.platform;
        let mut result = SyncResult::started(connection.id, platform, kind);

        self.limiters.check(platform)?;

        let raw_records = self
            .adapter
            .list_records(
                &connection.tokens.access_token,
                kind,
                connection.settings.batch_size,
            )
            .await?;

        if raw_records.is_empty() {
            info!("no records to sync");
            return Ok(result.finalize());
        }

        // Normalize up front so the store lookup can be batched.
        let mut incoming: Vec<StandardEntity> = Vec::with_capacity(raw_records.len());
        for raw in &raw_records {
            result.records_processed += 1;
            match self
                .mapper
                .map_from_platform(platform, kind, connection.user_id, raw)
            {
                Ok(entity) => incoming.push(entity),
                Err(e) => {
                    let external_id = raw
                        .get("id")
                        .and_then(|v| v.as_str())
                        .unwrap_or("<unknown>");
                    warn!(external_id, error = %e, "record failed to map");
                    result.record_error(external_id, e.to_string());
                    self.events.publish(SyncEvent::RecordErrored {
                        connection_id: connection.id,
                        external_id: external_id.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let keys: Vec<NaturalKey> = incoming.iter().map(StandardEntity::natural_key).collect();
        let existing: HashMap<String, StoredEntity> = self
            .store
            .find_by_natural_keys(&keys)
            .await?
            .into_iter()
            .map(|stored| (stored.entity.external_id.clone(), stored))
            .collect();

        for entity in incoming {
            if self.cancel.load(Ordering::Relaxed) {
                info!("sync run cancelled");
                break;
            }
            let external_id = entity.external_id.clone();
            let outcome = match existing.get(&external_id) {
                Some(stored) => self.reconcile(connection, entity, stored).await,
                None => self.create(entity).await,
            };
            match outcome {
                Ok(Outcome::Created) => result.records_created += 1,
                Ok(Outcome::Updated) => result.records_updated += 1,
                Ok(Outcome::Skipped) => result.records_skipped += 1,
                Err(e) => {
                    warn!(external_id = %external_id, error = %e, "record failed to persist");
                    result.record_error(&external_id, e.to_string());
                    self.events.publish(SyncEvent::RecordErrored {
                        connection_id: connection.id,
                        external_id,
                        message: e.to_string(),
                    });
                }
            }
        }

        let result = result.finalize();
        info!(
            status = %result.status,
            processed = result.records_processed,
            created = result.records_created,
            updated = result.records_updated,
            skipped = result.records_skipped,
            errored = result.records_errored,
            "sync run finished"
        );
        Ok(result)
    }

    async fn create(&self, mut entity: StandardEntity) -> Result<Outcome> {
        entity.sync_status = RecordSyncStatus::Synced;
        entity.sync_error = None;
        entity.last_sync_at = Some(Utc::now());
        self.store.insert(&entity).await?;
        Ok(Outcome::Created)
    }

    async fn reconcile(
        &self,
        connection: &Connection,
        entity: StandardEntity,
        stored: &StoredEntity,
    ) -> Result<Outcome> {
        if !needs_update(&entity, &stored.entity) {
            return Ok(Outcome::Skipped);
        }

        let resolution = self.resolver.resolve(
            &entity,
            &stored.entity,
            connection.settings.conflict_strategy,
        );
        let mut resolved = resolution.resolved;
        resolved.last_sync_at = Some(Utc::now());
        if resolution.requires_manual_review {
            resolved.sync_status = RecordSyncStatus::Pending;
            resolved.sync_error = Some(format!(
                "manual review: {} field conflict(s)",
                resolution.conflicts.len()
            ));
        } else {
            resolved.sync_status = RecordSyncStatus::Synced;
            resolved.sync_error = None;
        }
        self.store.update(stored.id, &resolved).await?;
        Ok(Outcome::Updated)
    }
}

enum Outcome {
    Created,
    Updated,
    Skipped,
}

/// A record is stale when the incoming version is strictly newer.
/// Missing timestamps on either side fail open and force the update,
/// trading a redundant write for never missing a change.
fn needs_update(incoming: &StandardEntity, stored: &StandardEntity) -> bool {
    match (incoming.effective_timestamp(), stored.effective_timestamp()) {
        (Some(remote), Some(local)) => remote > local,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crmsync_adapter::CrmPlatform;
    use uuid::Uuid;

    fn entity_with_updated(offset_hours: i64) -> StandardEntity {
        let mut e = StandardEntity::new(
            "r1",
            CrmPlatform::HubSpot,
            Uuid::nil(),
            EntityKind::Contact,
        );
        e.updated_at = Some(Utc::now() + Duration::hours(offset_hours));
        e
    }

    #[test]
    fn test_needs_update_when_incoming_newer() {
        assert!(needs_update(&entity_with_updated(0), &entity_with_updated(-1)));
        assert!(!needs_update(&entity_with_updated(-1), &entity_with_updated(0)));
    }

    #[test]
    fn test_equal_timestamps_skip() {
        let a = entity_with_updated(0);
        let b = a.clone();
        assert!(!needs_update(&a, &b));
    }

    #[test]
    fn test_missing_timestamp_fails_open() {
        let mut no_ts = entity_with_updated(0);
        no_ts.updated_at = None;
        assert!(needs_update(&no_ts, &entity_with_updated(0)));
        assert!(needs_update(&entity_with_updated(0), &no_ts));
    }
}
