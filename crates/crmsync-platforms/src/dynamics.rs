//! Microsoft Dynamics 365 adapter.
//!
//! Web API (OData v4): records arrive under `value`, paging uses `$top`,
//! and tokens come from the Microsoft identity platform per tenant.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use url::Url;

use crmsync_adapter::{
    AdapterError, AdapterResult, CrmAdapter, CrmPlatform, EntityKind, RawRecord, TokenSet,
};

use crate::client::RestClient;
use crate::OAuthSettings;

const LOGIN_BASE: &str = "https://login.microsoftonline.com";
const API_VERSION: &str = "v9.2";

/// Adapter for Dynamics 365.
pub struct DynamicsAdapter {
    client: RestClient,
    settings: OAuthSettings,
    /// Org resource URL, e.g. `https://org.crm.dynamics.com`.
    resource_url: String,
    /// Azure AD tenant id or domain.
    tenant: String,
    login_base: String,
}

impl DynamicsAdapter {
    /// Create a Dynamics adapter for one org and tenant.
    pub fn new(
        settings: OAuthSettings,
        resource_url: impl Into<String>,
        tenant: impl Into<String>,
    ) -> AdapterResult<Self> {
        Ok(Self {
            client: RestClient::new(CrmPlatform::Dynamics)?,
            settings,
            resource_url: resource_url.into(),
            tenant: tenant.into(),
            login_base: LOGIN_BASE.to_string(),
        })
    }

    /// Override the login host. Intended for sovereign clouds and tests.
    #[must_use]
    pub fn with_login_base(mut self, base: impl Into<String>) -> Self {
        self.login_base = base.into();
        self
    }

    fn entity_set(kind: EntityKind) -> &'static str {
        match kind {
            EntityKind::Contact => "contacts",
            EntityKind::Deal => "opportunities",
            EntityKind::Lead => "leads",
        }
    }

    fn token_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.login_base, self.tenant)
    }

    fn scope(&self) -> String {
        format!("{}/.default offline_access", self.resource_url)
    }
}

#[async_trait]
impl CrmAdapter for DynamicsAdapter {
    fn platform(&self) -> CrmPlatform {
        CrmPlatform::Dynamics
    }

    fn display_name(&self) -> &str {
        "Dynamics 365"
    }

    fn auth_url(&self, state: &str) -> AdapterResult<Url> {
        Url::parse_with_params(
            &format!(
                "{}/{}/oauth2/v2.0/authorize",
                self.login_base, self.tenant
            ),
            &[
                ("response_type", "code"),
                ("client_id", self.settings.client_id.as_str()),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("scope", self.scope().as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| AdapterError::validation(CrmPlatform::Dynamics, e.to_string()))
    }

    async fn exchange_code(&self, code: &str) -> AdapterResult<TokenSet> {
        let scope = self.scope();
        self.client
            .post_token_form(
                &self.token_url(),
                &[
                    ("grant_type", "authorization_code"),
                    ("client_id", &self.settings.client_id),
                    ("client_secret", self.settings.client_secret.expose_secret()),
                    ("redirect_uri", &self.settings.redirect_uri),
                    ("scope", &scope),
                    ("code", code),
                ],
            )
            .await
    }

    async fn refresh_token(&self, refresh_token: &str) -> AdapterResult<TokenSet> {
        let scope = self.scope();
        self.client
            .post_token_form(
                &self.token_url(),
                &[
                    ("grant_type", "refresh_token"),
                    ("client_id", &self.settings.client_id),
                    ("client_secret", self.settings.client_secret.expose_secret()),
                    ("scope", &scope),
                    ("refresh_token", refresh_token),
                ],
            )
            .await
    }

    async fn list_records(
        &self,
        access_token: &str,
        kind: EntityKind,
        limit: u32,
    ) -> AdapterResult<Vec<RawRecord>> {
        let url = format!(
            "{}/api/data/{}/{}?$top={}",
            self.resource_url,
            API_VERSION,
            Self::entity_set(kind),
            limit
        );
        let body = self.client.get_json(&url, access_token).await?;
        let value = body.get("value").and_then(|v| v.as_array()).ok_or_else(|| {
            AdapterError::api(CrmPlatform::Dynamics, "missing value array in list response")
        })?;
        Ok(value.to_vec())
    }

    async fn create_record(
        &self,
        access_token: &str,
        kind: EntityKind,
        data: &RawRecord,
    ) -> AdapterResult<RawRecord> {
        let url = format!(
            "{}/api/data/{}/{}",
            self.resource_url,
            API_VERSION,
            Self::entity_set(kind)
        );
        self.client.post_json(&url, access_token, data).await
    }

    async fn test_connection(&self, access_token: &str) -> AdapterResult<bool> {
        let url = format!("{}/api/data/{}/WhoAmI", self.resource_url, API_VERSION);
        self.client.probe(&url, access_token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> DynamicsAdapter {
        DynamicsAdapter::new(
            OAuthSettings::new("cid", "secret", "https://app.example.com/cb"),
            "https://acme.crm.dynamics.com",
            "acme.onmicrosoft.com",
        )
        .unwrap()
    }

    #[test]
    fn test_auth_url_is_tenant_scoped() {
        let url = adapter().auth_url("s").unwrap();
        assert_eq!(url.host_str(), Some("login.microsoftonline.com"));
        assert!(url.path().contains("acme.onmicrosoft.com"));
    }

    #[test]
    fn test_scope_targets_resource() {
        assert!(adapter().scope().starts_with("https://acme.crm.dynamics.com/.default"));
    }

    #[test]
    fn test_entity_sets() {
        assert_eq!(DynamicsAdapter::entity_set(EntityKind::Contact), "contacts");
        assert_eq!(DynamicsAdapter::entity_set(EntityKind::Deal), "opportunities");
        assert_eq!(DynamicsAdapter::entity_set(EntityKind::Lead), "leads");
    }
}
