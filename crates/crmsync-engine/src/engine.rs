//! Sync orchestration across connections, kinds, and platforms.
//!
//! The engine owns nothing global: every collaborator (adapters,
//! connection registry, entity store, limiter, event bus, notifier)
//! is injected at construction, so tests wire in-memory fakes and
//! production wires Postgres and real HTTP adapters through the same
//! type.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crmsync_adapter::{AdapterRegistry, EntityKind};

use crate::conflict::ConflictResolver;
use crate::connection::{Connection, ConnectionRegistry};
use crate::entity_sync::EntitySync;
use crate::error::{Result, SyncError};
use crate::events::{SyncEvent, SyncEventBus};
use crate::mapper::FieldMapper;
use crate::notify::{send_detached, Notification, Notifier};
use crate::rate_limiter::RateLimiterRegistry;
use crate::store::EntityStore;
use crate::types::SyncResult;

/// Multi-platform CRM sync engine.
pub struct SyncEngine {
    adapters: AdapterRegistry,
    connections: Arc<dyn ConnectionRegistry>,
    store: Arc<dyn EntityStore>,
    mapper: FieldMapper,
    resolver: ConflictResolver,
    limiters: Arc<RateLimiterRegistry>,
    events: SyncEventBus,
    notifier: Option<Arc<dyn Notifier>>,
    cancel: Arc<AtomicBool>,
}

impl SyncEngine {
    /// Start building an engine.
    #[must_use]
    pub fn builder() -> SyncEngineBuilder {
        SyncEngineBuilder::default()
    }

    /// Event bus for subscribing to sync progress.
    #[must_use]
    pub fn events(&self) -> &SyncEventBus {
        &self.events
    }

    /// Ask in-flight runs to stop at the next record boundary.
    pub fn shutdown(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Sync one entity kind for one connection.
    #[instrument(skip(self), fields(connection_id = %connection_id, kind = %kind))]
    pub async fn sync_data(&self, connection_id: Uuid, kind: EntityKind) -> Result<SyncResult> {
        let mut connection = self.load_active(connection_id).await?;
        let result = self.run_kind(&mut connection, kind).await;
        self.connections.upsert(&connection).await?;
        result
    }

    /// Sync several kinds for one connection. Each kind gets its own
    /// result; a failure in one kind never aborts the others.
    #[instrument(skip(self, kinds), fields(connection_id = %connection_id))]
    pub async fn sync_multiple(
        &self,
        connection_id: Uuid,
        kinds: &[EntityKind],
    ) -> Result<Vec<SyncResult>> {
        let mut connection = self.load_active(connection_id).await?;
        let mut results = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            if !connection.is_active() {
                // Disabled mid-run, e.g. by repeated auth failures.
                results.push(
                    SyncResult::started(connection.id, connection.platform, kind)
                        .failed("connection disabled"),
                );
                continue;
            }
            match self.run_kind(&mut connection, kind).await {
                Ok(result) => results.push(result),
                Err(e) => results.push(
                    SyncResult::started(connection.id, connection.platform, kind)
                        .failed(e.to_string()),
                ),
            }
        }
        self.connections.upsert(&connection).await?;
        Ok(results)
    }

    /// Sync every active connection over its enabled kinds, serially.
    #[instrument(skip(self))]
    pub async fn sync_all(&self) -> Result<Vec<SyncResult>> {
        let active = self.connections.list_active().await?;
        info!(connections = active.len(), "starting full sync");
        let mut results = Vec::new();
        for connection in active {
            if self.cancel.load(Ordering::Relaxed) {
                break;
            }
            let kinds = connection.settings.enabled_kinds.clone();
            match self.sync_multiple(connection.id, &kinds).await {
                Ok(mut batch) => results.append(&mut batch),
                Err(e) => {
                    warn!(connection_id = %connection.id, error = %e, "connection sync failed");
                }
            }
        }
        Ok(results)
    }

    async fn load_active(&self, connection_id: Uuid) -> Result<Connection> {
        let connection = self
            .connections
            .get(connection_id)
            .await?
            .ok_or_else(|| SyncError::validation(format!("no connection {connection_id}")))?;
        if !connection.is_active() {
            return Err(SyncError::ConnectionInactive { connection_id });
        }
        Ok(connection)
    }

    /// One (connection, kind) run, including token refresh and failure
    /// bookkeeping. Run-level failures come back as Error results so
    /// callers always get a report; only setup problems are errors.
    async fn run_kind(
        &self,
        connection: &mut Connection,
        kind: EntityKind,
    ) -> Result<SyncResult> {
        let adapter = self.adapters.resolve(connection.platform)?;
        if !adapter.supports(kind) {
            return Ok(
                SyncResult::started(connection.id, connection.platform, kind)
                    .failed(format!("{} does not support {kind}", connection.platform)),
            );
        }

        if connection.needs_token_refresh() {
            if let Err(e) = self.refresh_tokens(connection, adapter.as_ref()).await {
                return Ok(
                    SyncResult::started(connection.id, connection.platform, kind)
                        .failed(e.to_string()),
                );
            }
        }

        self.events.publish(SyncEvent::RunStarted {
            connection_id: connection.id,
            platform: connection.platform,
            kind,
        });

        let syncer = EntitySync::new(
            adapter,
            self.store.clone(),
            self.mapper,
            self.resolver,
            self.limiters.clone(),
            self.events.clone(),
            self.cancel.clone(),
        );

        let result = match syncer.run(connection, kind).await {
            Ok(result) => {
                connection.mark_synced();
                result
            }
            Err(e) => {
                match &e {
                    SyncError::RateLimit { wait_ms, .. } => {
                        self.events.publish(SyncEvent::Throttled {
                            connection_id: connection.id,
                            platform: connection.platform,
                            wait_ms: wait_ms.unwrap_or(0),
                        });
                    }
                    SyncError::Authentication { .. } => {
                        self.count_auth_failure(connection);
                    }
                    _ => {}
                }
                SyncResult::started(connection.id, connection.platform, kind)
                    .failed(e.to_string())
            }
        };

        self.events.publish(SyncEvent::RunCompleted {
            result: result.clone(),
        });
        Ok(result)
    }

    async fn refresh_tokens(
        &self,
        connection: &mut Connection,
        adapter: &dyn crmsync_adapter::CrmAdapter,
    ) -> Result<()> {
        let refresh_token = connection
            .tokens
            .refresh_token
            .clone()
            .ok_or_else(|| SyncError::authentication("no refresh token on file"))?;
        match adapter.refresh_token(&refresh_token).await {
            Ok(tokens) => {
                connection.apply_tokens(tokens);
                Ok(())
            }
            Err(e) => {
                warn!(connection_id = %connection.id, error = %e, "token refresh failed");
                self.count_auth_failure(connection);
                Err(e.into())
            }
        }
    }

    fn count_auth_failure(&self, connection: &mut Connection) {
        if connection.record_auth_failure() {
            warn!(
                connection_id = %connection.id,
                platform = %connection.platform,
                "connection disabled after repeated auth failures"
            );
            self.events.publish(SyncEvent::ConnectionDisabled {
                connection_id: connection.id,
                platform: connection.platform,
            });
            if let Some(notifier) = &self.notifier {
                send_detached(
                    notifier.clone(),
                    Notification::new(
                        vec![connection.user_id.to_string()],
                        format!("{} sync disabled", connection.platform),
                        format!(
                            "Connection {} was disabled after {} authentication failures. \
                             Please reauthorize.",
                            connection.id, connection.auth_failures
                        ),
                    ),
                );
            }
        }
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("adapters", &self.adapters)
            .field("has_notifier", &self.notifier.is_some())
            .finish()
    }
}

/// Builder for [`SyncEngine`].
#[derive(Default)]
pub struct SyncEngineBuilder {
    adapters: Option<AdapterRegistry>,
    connections: Option<Arc<dyn ConnectionRegistry>>,
    store: Option<Arc<dyn EntityStore>>,
    limiters: Option<Arc<RateLimiterRegistry>>,
    events: Option<SyncEventBus>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl SyncEngineBuilder {
    #[must_use]
    pub fn adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = Some(adapters);
        self
    }

    #[must_use]
    pub fn connections(mut self, connections: Arc<dyn ConnectionRegistry>) -> Self {
        self.connections = Some(connections);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn EntityStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn limiters(mut self, limiters: Arc<RateLimiterRegistry>) -> Self {
        self.limiters = Some(limiters);
        self
    }

    #[must_use]
    pub fn events(mut self, events: SyncEventBus) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Build the engine. Adapters, connections, and a store are
    /// required; everything else has working defaults.
    pub fn build(self) -> Result<SyncEngine> {
        let adapters = self
            .adapters
            .ok_or_else(|| SyncError::validation("engine requires an adapter registry"))?;
        let connections = self
            .connections
            .ok_or_else(|| SyncError::validation("engine requires a connection registry"))?;
        let store = self
            .store
            .ok_or_else(|| SyncError::validation("engine requires an entity store"))?;
        Ok(SyncEngine {
            adapters,
            connections,
            store,
            mapper: FieldMapper::new(),
            resolver: ConflictResolver::new(),
            limiters: self
                .limiters
                .unwrap_or_else(|| Arc::new(RateLimiterRegistry::with_defaults())),
            events: self.events.unwrap_or_default(),
            notifier: self.notifier,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MemoryConnectionRegistry;
    use crate::store::MemoryEntityStore;

    #[test]
    fn test_builder_requires_components() {
        let err = SyncEngine::builder().build().unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        let err = SyncEngine::builder()
            .adapters(AdapterRegistry::new())
            .connections(Arc::new(MemoryConnectionRegistry::new()))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("entity store"));
    }

    #[test]
    fn test_builder_with_required_components() {
        let engine = SyncEngine::builder()
            .adapters(AdapterRegistry::new())
            .connections(Arc::new(MemoryConnectionRegistry::new()))
            .store(Arc::new(MemoryEntityStore::new()))
            .build()
            .unwrap();
        assert_eq!(engine.events().subscriber_count(), 0);
        assert!(format!("{engine:?}").starts_with("SyncEngine"));
    }
}
