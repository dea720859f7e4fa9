//! The uniform adapter operation set.

use async_trait::async_trait;
use url::Url;

use crate::error::AdapterResult;
use crate::types::{CrmPlatform, EntityKind, RawRecord, TokenSet};

/// A platform adapter: one implementation per external CRM vendor.
///
/// All operations take the bearer access token explicitly; adapters hold no
/// per-connection state, so one instance serves every connection for its
/// platform.
#[async_trait]
pub trait CrmAdapter: Send + Sync {
    /// The platform this adapter integrates.
    fn platform(&self) -> CrmPlatform;

    /// Human-readable name for logs and diagnostics.
    fn display_name(&self) -> &str;

    /// Build the OAuth authorization URL carrying the given CSRF state.
    fn auth_url(&self, state: &str) -> AdapterResult<Url>;

    /// Exchange an OAuth authorization code for a token set.
    async fn exchange_code(&self, code: &str) -> AdapterResult<TokenSet>;

    /// Refresh an access token from a refresh token.
    async fn refresh_token(&self, refresh_token: &str) -> AdapterResult<TokenSet>;

    /// List up to `limit` records of the given kind.
    ///
    /// Records are returned in the platform's native shape; the field
    /// mapper owns all translation to standardized entities.
    async fn list_records(
        &self,
        access_token: &str,
        kind: EntityKind,
        limit: u32,
    ) -> AdapterResult<Vec<RawRecord>>;

    /// Create a record of the given kind from platform-native data.
    async fn create_record(
        &self,
        access_token: &str,
        kind: EntityKind,
        data: &RawRecord,
    ) -> AdapterResult<RawRecord>;

    /// Probe the platform with the given token.
    ///
    /// Returns `Ok(false)` when the platform answered but rejected the
    /// token; transport failures surface as errors.
    async fn test_connection(&self, access_token: &str) -> AdapterResult<bool>;

    /// Check if the platform exposes the given entity kind.
    fn supports(&self, kind: EntityKind) -> bool {
        let _ = kind;
        true
    }

    /// List contacts. Convenience for [`CrmAdapter::list_records`].
    async fn list_contacts(&self, access_token: &str, limit: u32) -> AdapterResult<Vec<RawRecord>> {
        self.list_records(access_token, EntityKind::Contact, limit)
            .await
    }

    /// List deals. Convenience for [`CrmAdapter::list_records`].
    async fn list_deals(&self, access_token: &str, limit: u32) -> AdapterResult<Vec<RawRecord>> {
        self.list_records(access_token, EntityKind::Deal, limit).await
    }

    /// List leads. Convenience for [`CrmAdapter::list_records`].
    async fn list_leads(&self, access_token: &str, limit: u32) -> AdapterResult<Vec<RawRecord>> {
        self.list_records(access_token, EntityKind::Lead, limit).await
    }

    /// Create a contact. Convenience for [`CrmAdapter::create_record`].
    async fn create_contact(
        &self,
        access_token: &str,
        data: &RawRecord,
    ) -> AdapterResult<RawRecord> {
        self.create_record(access_token, EntityKind::Contact, data)
            .await
    }

    /// Create a deal. Convenience for [`CrmAdapter::create_record`].
    async fn create_deal(&self, access_token: &str, data: &RawRecord) -> AdapterResult<RawRecord> {
        self.create_record(access_token, EntityKind::Deal, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterError;
    use serde_json::json;

    struct StubAdapter;

    #[async_trait]
    impl CrmAdapter for StubAdapter {
        fn platform(&self) -> CrmPlatform {
            CrmPlatform::HubSpot
        }

        fn display_name(&self) -> &str {
            "stub"
        }

        fn auth_url(&self, state: &str) -> AdapterResult<Url> {
            Url::parse(&format!("https://example.com/oauth?state={state}")).map_err(|e| {
                AdapterError::validation(CrmPlatform::HubSpot, e.to_string())
            })
        }

        async fn exchange_code(&self, _code: &str) -> AdapterResult<TokenSet> {
            Ok(TokenSet::new(
                "access".to_string(),
                Some("refresh".to_string()),
                Some(3600),
                "bearer".to_string(),
            ))
        }

        async fn refresh_token(&self, _refresh_token: &str) -> AdapterResult<TokenSet> {
            self.exchange_code("").await
        }

        async fn list_records(
            &self,
            _access_token: &str,
            kind: EntityKind,
            _limit: u32,
        ) -> AdapterResult<Vec<RawRecord>> {
            Ok(vec![json!({ "id": "1", "kind": kind.as_str() })])
        }

        async fn create_record(
            &self,
            _access_token: &str,
            _kind: EntityKind,
            data: &RawRecord,
        ) -> AdapterResult<RawRecord> {
            Ok(data.clone())
        }

        async fn test_connection(&self, access_token: &str) -> AdapterResult<bool> {
            Ok(access_token == "access")
        }
    }

    #[tokio::test]
    async fn test_convenience_methods_delegate() {
        let adapter = StubAdapter;
        let contacts = adapter.list_contacts("access", 10).await.unwrap();
        assert_eq!(contacts[0]["kind"], "contact");

        let deals = adapter.list_deals("access", 10).await.unwrap();
        assert_eq!(deals[0]["kind"], "deal");

        let leads = adapter.list_leads("access", 10).await.unwrap();
        assert_eq!(leads[0]["kind"], "lead");
    }

    #[tokio::test]
    async fn test_connection_probe() {
        let adapter = StubAdapter;
        assert!(adapter.test_connection("access").await.unwrap());
        assert!(!adapter.test_connection("stale").await.unwrap());
    }

    #[test]
    fn test_auth_url_carries_state() {
        let adapter = StubAdapter;
        let url = adapter.auth_url("xyz").unwrap();
        assert!(url.as_str().contains("state=xyz"));
    }
}
