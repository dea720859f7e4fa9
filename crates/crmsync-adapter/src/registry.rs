//! Adapter registry resolved once at startup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AdapterError, AdapterResult};
use crate::traits::CrmAdapter;
use crate::types::CrmPlatform;

/// Typed table from platform to adapter instance.
///
/// Built once by the process entry point and shared by reference; lookups
/// after construction never mutate the table.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<CrmPlatform, Arc<dyn CrmAdapter>>,
}

impl AdapterRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Register an adapter, replacing any previous one for its platform.
    pub fn register(&mut self, adapter: Arc<dyn CrmAdapter>) {
        self.adapters.insert(adapter.platform(), adapter);
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with(mut self, adapter: Arc<dyn CrmAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Look up the adapter for a platform.
    #[must_use]
    pub fn get(&self, platform: CrmPlatform) -> Option<Arc<dyn CrmAdapter>> {
        self.adapters.get(&platform).cloned()
    }

    /// Look up the adapter for a platform, failing if none is registered.
    pub fn resolve(&self, platform: CrmPlatform) -> AdapterResult<Arc<dyn CrmAdapter>> {
        self.get(platform).ok_or_else(|| {
            AdapterError::validation(platform, format!("no adapter registered for {platform}"))
        })
    }

    /// Platforms with a registered adapter.
    #[must_use]
    pub fn platforms(&self) -> Vec<CrmPlatform> {
        self.adapters.keys().copied().collect()
    }

    /// Number of registered adapters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("platforms", &self.platforms())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterResult;
    use crate::types::{EntityKind, RawRecord, TokenSet};
    use async_trait::async_trait;
    use url::Url;

    struct NamedAdapter {
        platform: CrmPlatform,
        name: String,
    }

    #[async_trait]
    impl CrmAdapter for NamedAdapter {
        fn platform(&self) -> CrmPlatform {
            self.platform
        }

        fn display_name(&self) -> &str {
            &self.name
        }

        fn auth_url(&self, _state: &str) -> AdapterResult<Url> {
            Ok(Url::parse("https://example.com").unwrap())
        }

        async fn exchange_code(&self, _code: &str) -> AdapterResult<TokenSet> {
            Ok(TokenSet::new("t".to_string(), None, None, "bearer".to_string()))
        }

        async fn refresh_token(&self, _refresh_token: &str) -> AdapterResult<TokenSet> {
            Ok(TokenSet::new("t".to_string(), None, None, "bearer".to_string()))
        }

        async fn list_records(
            &self,
            _access_token: &str,
            _kind: EntityKind,
            _limit: u32,
        ) -> AdapterResult<Vec<RawRecord>> {
            Ok(Vec::new())
        }

        async fn create_record(
            &self,
            _access_token: &str,
            _kind: EntityKind,
            data: &RawRecord,
        ) -> AdapterResult<RawRecord> {
            Ok(data.clone())
        }

        async fn test_connection(&self, _access_token: &str) -> AdapterResult<bool> {
            Ok(true)
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = AdapterRegistry::new()
            .with(Arc::new(NamedAdapter {
                platform: CrmPlatform::HubSpot,
                name: "HubSpot".to_string(),
            }))
            .with(Arc::new(NamedAdapter {
                platform: CrmPlatform::Zoho,
                name: "Zoho".to_string(),
            }));

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.resolve(CrmPlatform::HubSpot).unwrap().display_name(),
            "HubSpot"
        );
        assert!(registry.get(CrmPlatform::Salesforce).is_none());
    }

    #[test]
    fn test_resolve_unregistered_fails() {
        let registry = AdapterRegistry::new();
        let err = registry.resolve(CrmPlatform::Dynamics).err().unwrap();
        assert_eq!(err.kind(), "validation_error");
        assert!(err.to_string().contains("dynamics"));
    }

    #[test]
    fn test_replacement_keeps_last() {
        let registry = AdapterRegistry::new()
            .with(Arc::new(NamedAdapter {
                platform: CrmPlatform::HubSpot,
                name: "first".to_string(),
            }))
            .with(Arc::new(NamedAdapter {
                platform: CrmPlatform::HubSpot,
                name: "second".to_string(),
            }));

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.resolve(CrmPlatform::HubSpot).unwrap().display_name(),
            "second"
        );
    }
}
