//! Persistent storage for standardized entities.
//!
//! The engine talks to a [`EntityStore`] trait object so the sync loop
//! is testable against an in-memory store; production deployments use
//! the Postgres store. Uniqueness is enforced on the natural key
//! (user, platform, external id) in both implementations.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crmsync_adapter::CrmPlatform;

use crate::entity::{EntityAttributes, NaturalKey, StandardEntity};
use crate::error::{Result, SyncError};
use crate::types::RecordSyncStatus;

/// Keys per `= ANY` batch when looking up by natural key.
const KEY_BATCH_SIZE: usize = 10;

/// An entity with its storage identity.
#[derive(Debug, Clone)]
pub struct StoredEntity {
    /// Storage row id.
    pub id: Uuid,
    pub entity: StandardEntity,
}

/// Storage operations the sync loop needs.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Look up entities by natural key. Missing keys are simply absent
    /// from the result.
    async fn find_by_natural_keys(&self, keys: &[NaturalKey]) -> Result<Vec<StoredEntity>>;

    /// Fetch one entity by row id.
    async fn get(&self, id: Uuid) -> Result<Option<StoredEntity>>;

    /// Insert a new entity. Fails with a validation error when the
    /// natural key is already taken.
    async fn insert(&self, entity: &StandardEntity) -> Result<StoredEntity>;

    /// Replace an existing entity.
    async fn update(&self, id: Uuid, entity: &StandardEntity) -> Result<StoredEntity>;

    /// Delete an entity. Returns whether a row existed.
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// In-memory store for tests and single-process setups.
#[derive(Debug, Default)]
pub struct MemoryEntityStore {
    rows: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    by_id: HashMap<Uuid, StoredEntity>,
    by_key: HashMap<NaturalKey, Uuid>,
}

impl MemoryEntityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entities.
    pub fn len(&self) -> usize {
        self.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        match self.rows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn find_by_natural_keys(&self, keys: &[NaturalKey]) -> Result<Vec<StoredEntity>> {
        let state = self.lock();
        Ok(keys
            .iter()
            .filter_map(|key| state.by_key.get(key))
            .filter_map(|id| state.by_id.get(id))
            .cloned()
            .collect())
    }

    async fn get(&self, id: Uuid) -> Result<Option<StoredEntity>> {
        Ok(self.lock().by_id.get(&id).cloned())
    }

    async fn insert(&self, entity: &StandardEntity) -> Result<StoredEntity> {
        let mut state = self.lock();
        let key = entity.natural_key();
        if state.by_key.contains_key(&key) {
            return Err(SyncError::validation(format!(
                "duplicate natural key {}:{}",
                key.platform, key.external_id
            )));
        }
        let stored = StoredEntity {
            id: Uuid::new_v4(),
            entity: entity.clone(),
        };
        state.by_key.insert(key, stored.id);
        state.by_id.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, id: Uuid, entity: &StandardEntity) -> Result<StoredEntity> {
        let mut state = self.lock();
        let existing = state
            .by_id
            .get(&id)
            .ok_or_else(|| SyncError::validation(format!("no entity with id {id}")))?;
        let old_key = existing.entity.natural_key();
        let new_key = entity.natural_key();
        if old_key != new_key {
            state.by_key.remove(&old_key);
            state.by_key.insert(new_key, id);
        }
        let stored = StoredEntity {
            id,
            entity: entity.clone(),
        };
        state.by_id.insert(id, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut state = self.lock();
        match state.by_id.remove(&id) {
            Some(stored) => {
                state.by_key.remove(&stored.entity.natural_key());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Postgres-backed store over the `crm_entities` table.
///
/// The table carries a unique constraint on
/// `(user_id, platform, external_id)`.
#[derive(Debug, Clone)]
pub struct PgEntityStore {
    pool: PgPool,
}

impl PgEntityStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ENTITY_COLUMNS: &str = "id, user_id, platform, external_id, kind, attributes, \
     custom_fields, sync_status, sync_error, last_sync_at, \
     remote_created_at, remote_updated_at";

#[async_trait]
impl EntityStore for PgEntityStore {
    #[instrument(skip(self, keys), fields(key_count = keys.len()))]
    async fn find_by_natural_keys(&self, keys: &[NaturalKey]) -> Result<Vec<StoredEntity>> {
        let mut found = Vec::new();
        // Keys in one batch share user and platform during a sync run,
        // but group defensively anyway.
        let mut grouped: HashMap<(Uuid, CrmPlatform), Vec<String>> = HashMap::new();
        for key in keys {
            grouped
                .entry((key.user_id, key.platform))
                .or_default()
                .push(key.external_id.clone());
        }
        for ((user_id, platform), external_ids) in grouped {
            for batch in external_ids.chunks(KEY_BATCH_SIZE) {
                let rows = sqlx::query_as::<_, EntityRow>(&format!(
                    r"
                    SELECT {ENTITY_COLUMNS}
                    FROM crm_entities
                    WHERE user_id = $1 AND platform = $2 AND external_id = ANY($3)
                    "
                ))
                .bind(user_id)
                .bind(platform.as_str())
                .bind(batch)
                .fetch_all(&self.pool)
                .await?;
                for row in rows {
                    found.push(row.into_stored()?);
                }
            }
        }
        Ok(found)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<StoredEntity>> {
        let row = sqlx::query_as::<_, EntityRow>(&format!(
            r"
            SELECT {ENTITY_COLUMNS}
            FROM crm_entities
            WHERE id = $1
            "
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(EntityRow::into_stored).transpose()
    }

    #[instrument(skip(self, entity), fields(external_id = %entity.external_id))]
    async fn insert(&self, entity: &StandardEntity) -> Result<StoredEntity> {
        let row = sqlx::query_as::<_, EntityRow>(&format!(
            r"
            INSERT INTO crm_entities (
                user_id, platform, external_id, kind, attributes, custom_fields,
                sync_status, sync_error, last_sync_at, remote_created_at, remote_updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {ENTITY_COLUMNS}
            "
        ))
        .bind(entity.user_id)
        .bind(entity.platform.as_str())
        .bind(&entity.external_id)
        .bind(entity.kind().as_str())
        .bind(serde_json::to_value(&entity.attributes)?)
        .bind(serde_json::Value::Object(entity.custom_fields.clone()))
        .bind(entity.sync_status.as_str())
        .bind(entity.sync_error.as_deref())
        .bind(entity.last_sync_at)
        .bind(entity.created_at)
        .bind(entity.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => SyncError::validation(
                format!("duplicate natural key for record '{}'", entity.external_id),
            ),
            other => other.into(),
        })?;

        row.into_stored()
    }

    #[instrument(skip(self, entity))]
    async fn update(&self, id: Uuid, entity: &StandardEntity) -> Result<StoredEntity> {
        let row = sqlx::query_as::<_, EntityRow>(&format!(
            r"
            UPDATE crm_entities SET
                attributes = $2,
                custom_fields = $3,
                sync_status = $4,
                sync_error = $5,
                last_sync_at = $6,
                remote_created_at = $7,
                remote_updated_at = $8,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ENTITY_COLUMNS}
            "
        ))
        .bind(id)
        .bind(serde_json::to_value(&entity.attributes)?)
        .bind(serde_json::Value::Object(entity.custom_fields.clone()))
        .bind(entity.sync_status.as_str())
        .bind(entity.sync_error.as_deref())
        .bind(entity.last_sync_at)
        .bind(entity.created_at)
        .bind(entity.updated_at)
        .fetch_one(&self.pool)
        .await?;

        row.into_stored()
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM crm_entities WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EntityRow {
    id: Uuid,
    user_id: Uuid,
    platform: String,
    external_id: String,
    #[allow(dead_code)]
    kind: String,
    attributes: serde_json::Value,
    custom_fields: serde_json::Value,
    sync_status: String,
    sync_error: Option<String>,
    last_sync_at: Option<DateTime<Utc>>,
    remote_created_at: Option<DateTime<Utc>>,
    remote_updated_at: Option<DateTime<Utc>>,
}

impl EntityRow {
    fn into_stored(self) -> Result<StoredEntity> {
        let platform: CrmPlatform = self
            .platform
            .parse()
            .map_err(|e: crmsync_adapter::ParsePlatformError| SyncError::sync(e.to_string()))?;
        let attributes: EntityAttributes = serde_json::from_value(self.attributes)?;
        let custom_fields = match self.custom_fields {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        let sync_status = self
            .sync_status
            .parse::<RecordSyncStatus>()
            .unwrap_or_default();
        Ok(StoredEntity {
            id: self.id,
            entity: StandardEntity {
                external_id: self.external_id,
                platform,
                user_id: self.user_id,
                attributes,
                custom_fields,
                last_sync_at: self.last_sync_at,
                sync_status,
                sync_error: self.sync_error,
                created_at: self.remote_created_at,
                updated_at: self.remote_updated_at,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmsync_adapter::EntityKind;
    use serde_json::json;

    fn entity(external_id: &str, user_id: Uuid) -> StandardEntity {
        let mut e = StandardEntity::new(
            external_id,
            CrmPlatform::HubSpot,
            user_id,
            EntityKind::Contact,
        );
        e.set_field("firstName", json!("Ada"));
        e
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let store = MemoryEntityStore::new();
        let user = Uuid::new_v4();
        let stored = store.insert(&entity("c1", user)).await.unwrap();

        let found = store
            .find_by_natural_keys(&[NaturalKey::new(user, CrmPlatform::HubSpot, "c1")])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, stored.id);
    }

    #[tokio::test]
    async fn test_duplicate_natural_key_rejected() {
        let store = MemoryEntityStore::new();
        let user = Uuid::new_v4();
        store.insert(&entity("c1", user)).await.unwrap();
        let err = store.insert(&entity("c1", user)).await.unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_same_external_id_different_user_allowed() {
        let store = MemoryEntityStore::new();
        store.insert(&entity("c1", Uuid::new_v4())).await.unwrap();
        store.insert(&entity("c1", Uuid::new_v4())).await.unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_update_replaces_entity() {
        let store = MemoryEntityStore::new();
        let user = Uuid::new_v4();
        let stored = store.insert(&entity("c1", user)).await.unwrap();

        let mut changed = stored.entity.clone();
        changed.set_field("firstName", json!("Adeline"));
        let updated = store.update(stored.id, &changed).await.unwrap();
        assert_eq!(updated.entity.field("firstName"), Some(json!("Adeline")));

        let fetched = store.get(stored.id).await.unwrap().unwrap();
        assert_eq!(fetched.entity.field("firstName"), Some(json!("Adeline")));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryEntityStore::new();
        let user = Uuid::new_v4();
        let stored = store.insert(&entity("c1", user)).await.unwrap();
        assert!(store.delete(stored.id).await.unwrap());
        assert!(!store.delete(stored.id).await.unwrap());
        // The key frees up after a delete.
        store.insert(&entity("c1", user)).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_keys_absent_from_result() {
        let store = MemoryEntityStore::new();
        let user = Uuid::new_v4();
        store.insert(&entity("c1", user)).await.unwrap();
        let found = store
            .find_by_natural_keys(&[
                NaturalKey::new(user, CrmPlatform::HubSpot, "c1"),
                NaturalKey::new(user, CrmPlatform::HubSpot, "ghost"),
            ])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }
}
