//! Stored platform connections.
//!
//! A connection is one user's authorization against one platform:
//! tokens, sync settings, and health bookkeeping. Connections are soft
//! disabled after repeated authentication failures rather than deleted,
//! so the user can reauthorize without losing settings.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crmsync_adapter::{ConnectionStatus, CrmPlatform, EntityKind, TokenSet};

use crate::conflict::ConflictStrategy;
use crate::error::{Result, SyncError};

/// Consecutive authentication failures before a connection is disabled.
pub const MAX_AUTH_FAILURES: u32 = 3;

/// Refresh tokens expiring within this window before a run.
const TOKEN_REFRESH_GRACE_MINUTES: i64 = 5;

fn default_batch_size() -> u32 {
    100
}

fn default_retry_count() -> u32 {
    3
}

fn default_sync_interval_secs() -> u64 {
    900
}

fn default_enabled_kinds() -> Vec<EntityKind> {
    EntityKind::all().to_vec()
}

/// Per-connection sync settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Entity kinds this connection syncs.
    #[serde(default = "default_enabled_kinds")]
    pub enabled_kinds: Vec<EntityKind>,
    /// Seconds between scheduled runs.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    /// Strategy applied when versions disagree.
    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,
    /// Records requested per list call.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Retries for transient per-run failures.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            enabled_kinds: default_enabled_kinds(),
            sync_interval_secs: default_sync_interval_secs(),
            conflict_strategy: ConflictStrategy::default(),
            batch_size: default_batch_size(),
            retry_count: default_retry_count(),
        }
    }
}

/// One user's authorization against one platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    pub user_id: Uuid,
    pub platform: CrmPlatform,
    pub tokens: TokenSet,
    pub settings: ConnectionSettings,
    pub status: ConnectionStatus,
    /// Consecutive authentication failures since the last success.
    pub auth_failures: u32,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    /// Create a connected connection with default settings.
    #[must_use]
    pub fn new(user_id: Uuid, platform: CrmPlatform, tokens: TokenSet) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            platform,
            tokens,
            settings: ConnectionSettings::default(),
            status: ConnectionStatus::Connected,
            auth_failures: 0,
            last_sync_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this connection participates in sync runs.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status.is_syncable()
    }

    /// Whether the access token should be refreshed before use.
    #[must_use]
    pub fn needs_token_refresh(&self) -> bool {
        self.tokens
            .expires_within(Duration::minutes(TOKEN_REFRESH_GRACE_MINUTES))
    }

    /// Install freshly issued tokens, keeping the old refresh token if
    /// the platform did not rotate it.
    pub fn apply_tokens(&mut self, mut tokens: TokenSet) {
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = self.tokens.refresh_token.take();
        }
        self.tokens = tokens;
        self.auth_failures = 0;
        self.status = ConnectionStatus::Connected;
        self.updated_at = Utc::now();
    }

    /// Count an authentication failure. Returns true when the failure
    /// crossed the threshold and the connection was disabled.
    pub fn record_auth_failure(&mut self) -> bool {
        self.auth_failures += 1;
        self.updated_at = Utc::now();
        if self.auth_failures >= MAX_AUTH_FAILURES {
            self.status = ConnectionStatus::Error;
            true
        } else {
            false
        }
    }

    /// Record a completed sync run.
    pub fn mark_synced(&mut self) {
        self.last_sync_at = Some(Utc::now());
        self.auth_failures = 0;
        self.updated_at = Utc::now();
    }

    /// Record a revocation; the connection stops syncing until
    /// reauthorized.
    pub fn mark_revoked(&mut self) {
        self.status = ConnectionStatus::Disconnected;
        self.updated_at = Utc::now();
    }
}

/// Storage operations for connections.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Connection>>;

    /// Connections currently eligible for sync runs.
    async fn list_active(&self) -> Result<Vec<Connection>>;

    async fn upsert(&self, connection: &Connection) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// In-memory registry for tests and single-process setups.
#[derive(Debug, Default)]
pub struct MemoryConnectionRegistry {
    connections: Mutex<HashMap<Uuid, Connection>>,
}

impl MemoryConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Connection>> {
        match self.connections.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl ConnectionRegistry for MemoryConnectionRegistry {
    async fn get(&self, id: Uuid) -> Result<Option<Connection>> {
        Ok(self.lock().get(&id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<Connection>> {
        let mut active: Vec<Connection> = self
            .lock()
            .values()
            .filter(|c| c.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|c| c.created_at);
        Ok(active)
    }

    async fn upsert(&self, connection: &Connection) -> Result<()> {
        self.lock().insert(connection.id, connection.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.lock().remove(&id).is_some())
    }
}

/// Postgres-backed registry over the `crm_connections` table.
#[derive(Debug, Clone)]
pub struct PgConnectionRegistry {
    pool: PgPool,
}

impl PgConnectionRegistry {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const CONNECTION_COLUMNS: &str = "id, user_id, platform, tokens, settings, status, \
     auth_failures, last_sync_at, created_at, updated_at";

#[async_trait]
impl ConnectionRegistry for PgConnectionRegistry {
    #[instrument(skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<Connection>> {
        let row = sqlx::query_as::<_, ConnectionRow>(&format!(
            r"
            SELECT {CONNECTION_COLUMNS}
            FROM crm_connections
            WHERE id = $1
            "
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ConnectionRow::into_connection).transpose()
    }

    #[instrument(skip(self))]
    async fn list_active(&self) -> Result<Vec<Connection>> {
        let rows = sqlx::query_as::<_, ConnectionRow>(&format!(
            r"
            SELECT {CONNECTION_COLUMNS}
            FROM crm_connections
            WHERE status = 'connected'
            ORDER BY created_at
            "
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(ConnectionRow::into_connection)
            .collect()
    }

    #[instrument(skip(self, connection), fields(connection_id = %connection.id))]
    async fn upsert(&self, connection: &Connection) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO crm_connections (
                id, user_id, platform, tokens, settings, status,
                auth_failures, last_sync_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            ON CONFLICT (id) DO UPDATE SET
                tokens = EXCLUDED.tokens,
                settings = EXCLUDED.settings,
                status = EXCLUDED.status,
                auth_failures = EXCLUDED.auth_failures,
                last_sync_at = EXCLUDED.last_sync_at,
                updated_at = NOW()
            ",
        )
        .bind(connection.id)
        .bind(connection.user_id)
        .bind(connection.platform.as_str())
        .bind(serde_json::to_value(&connection.tokens)?)
        .bind(serde_json::to_value(&connection.settings)?)
        .bind(connection.status.as_str())
        .bind(i32::try_from(connection.auth_failures).unwrap_or(i32::MAX))
        .bind(connection.last_sync_at)
        .bind(connection.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM crm_connections WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ConnectionRow {
    id: Uuid,
    user_id: Uuid,
    platform: String,
    tokens: serde_json::Value,
    settings: serde_json::Value,
    status: String,
    auth_failures: i32,
    last_sync_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ConnectionRow {
    fn into_connection(self) -> Result<Connection> {
        let platform: CrmPlatform = self
            .platform
            .parse()
            .map_err(|e: crmsync_adapter::ParsePlatformError| SyncError::sync(e.to_string()))?;
        let status = self
            .status
            .parse::<ConnectionStatus>()
            .unwrap_or(ConnectionStatus::Pending);
        Ok(Connection {
            id: self.id,
            user_id: self.user_id,
            platform,
            tokens: serde_json::from_value(self.tokens)?,
            settings: serde_json::from_value(self.settings)?,
            status,
            auth_failures: u32::try_from(self.auth_failures).unwrap_or(0),
            last_sync_at: self.last_sync_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
