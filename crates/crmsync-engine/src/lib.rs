//! Multi-platform CRM synchronization engine.
//!
//! Pulls records from connected CRM platforms through the adapter
//! layer, normalizes them into [`StandardEntity`] values, reconciles
//! them against the local store with configurable conflict strategies,
//! and reports each run as a [`SyncResult`].
//!
//! The [`SyncEngine`] is assembled by injection: adapters, connection
//! registry, entity store, rate limiters, event bus, and notifier all
//! arrive through the builder, so the whole pipeline runs against
//! in-memory fakes in tests and Postgres-backed stores in production.

pub mod config;
pub mod conflict;
pub mod connection;
pub mod engine;
pub mod entity;
pub mod entity_sync;
pub mod error;
pub mod events;
pub mod mapper;
pub mod notify;
pub mod rate_limiter;
pub mod scheduler;
pub mod store;
pub mod types;

pub use config::EngineConfig;
pub use conflict::{
    ConflictKind, ConflictResolution, ConflictResolver, ConflictStrategy, FieldConflict,
};
pub use connection::{
    Connection, ConnectionRegistry, ConnectionSettings, MemoryConnectionRegistry,
    PgConnectionRegistry,
};
pub use engine::{SyncEngine, SyncEngineBuilder};
pub use entity::{
    ContactFields, DealFields, EntityAttributes, LeadFields, NaturalKey, StandardEntity,
};
pub use entity_sync::EntitySync;
pub use error::{Result, SyncError};
pub use events::{SyncEvent, SyncEventBus};
pub use mapper::FieldMapper;
pub use notify::{Notification, Notifier, TracingNotifier};
pub use rate_limiter::{
    PlatformLimiter, RateLimitConfig, RateLimitExceeded, RateLimiterRegistry,
};
pub use scheduler::{SchedulerHandle, SyncScheduler};
pub use store::{EntityStore, MemoryEntityStore, PgEntityStore, StoredEntity};
pub use types::{RecordError, RecordSyncStatus, SyncResult, SyncRunStatus};
