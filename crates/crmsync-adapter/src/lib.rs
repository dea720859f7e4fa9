//! Adapter framework for the crmsync engine.
//!
//! Each external CRM vendor is integrated through one implementation of the
//! [`CrmAdapter`] trait. The trait presents a uniform operation set (OAuth
//! URL construction, code exchange, token refresh, per-kind record listing
//! and creation, connection test) and returns platform-native records as
//! [`RawRecord`] values; everything vendor-specific is abstracted away at
//! this boundary.
//!
//! Adapters are resolved through an [`AdapterRegistry`] built once at
//! startup, replacing string-keyed dispatch with a typed table.

pub mod error;
pub mod registry;
pub mod traits;
pub mod types;

pub use error::{AdapterError, AdapterResult};
pub use registry::AdapterRegistry;
pub use traits::CrmAdapter;
pub use types::{
    ConnectionStatus, CrmPlatform, EntityKind, ParsePlatformError, RawRecord, TokenSet,
};
