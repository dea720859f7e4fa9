//! Zoho CRM adapter.
//!
//! Uses the v2 module API; list responses carry records under `data`.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use url::Url;

use crmsync_adapter::{
    AdapterError, AdapterResult, CrmAdapter, CrmPlatform, EntityKind, RawRecord, TokenSet,
};

use crate::client::RestClient;
use crate::OAuthSettings;

const API_BASE: &str = "https://www.zohoapis.com/crm/v2";
const ACCOUNTS_BASE: &str = "https://accounts.zoho.com";
const DEFAULT_SCOPES: &str = "ZohoCRM.modules.ALL";

/// Adapter for Zoho CRM.
pub struct ZohoAdapter {
    client: RestClient,
    settings: OAuthSettings,
    api_base: String,
    accounts_base: String,
}

impl ZohoAdapter {
    /// Create a Zoho adapter.
    pub fn new(settings: OAuthSettings) -> AdapterResult<Self> {
        Ok(Self {
            client: RestClient::new(CrmPlatform::Zoho)?,
            settings,
            api_base: API_BASE.to_string(),
            accounts_base: ACCOUNTS_BASE.to_string(),
        })
    }

    /// Override both base URLs for a non-US data center or a test stub.
    #[must_use]
    pub fn with_bases(mut self, api: impl Into<String>, accounts: impl Into<String>) -> Self {
        self.api_base = api.into();
        self.accounts_base = accounts.into();
        self
    }

    fn module(kind: EntityKind) -> &'static str {
        match kind {
            EntityKind::Contact => "Contacts",
            EntityKind::Deal => "Deals",
            EntityKind::Lead => "Leads",
        }
    }
}

#[async_trait]
impl CrmAdapter for ZohoAdapter {
    fn platform(&self) -> CrmPlatform {
        CrmPlatform::Zoho
    }

    fn display_name(&self) -> &str {
        "Zoho CRM"
    }

    fn auth_url(&self, state: &str) -> AdapterResult<Url> {
        Url::parse_with_params(
            &format!("{}/oauth/v2/auth", self.accounts_base),
            &[
                ("response_type", "code"),
                ("client_id", self.settings.client_id.as_str()),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("scope", DEFAULT_SCOPES),
                ("access_type", "offline"),
                ("state", state),
            ],
        )
        .map_err(|e| AdapterError::validation(CrmPlatform::Zoho, e.to_string()))
    }

    async fn exchange_code(&self, code: &str) -> AdapterResult<TokenSet> {
        self.client
            .post_token_form(
                &format!("{}/oauth/v2/token", self.accounts_base),
                &[
                    ("grant_type", "authorization_code"),
                    ("client_id", &self.settings.client_id),
                    ("client_secret", self.settings.client_secret.expose_secret()),
                    ("redirect_uri", &self.settings.redirect_uri),
                    ("code", code),
                ],
            )
            .await
    }

    async fn refresh_token(&self, refresh_token: &str) -> AdapterResult<TokenSet> {
        self.client
            .post_token_form(
                &format!("{}/oauth/v2/token", self.accounts_base),
                &[
                    ("grant_type", "refresh_token"),
                    ("client_id", &self.settings.client_id),
                    ("client_secret", self.settings.client_secret.expose_secret()),
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
        // Zoho caps per_page at 200.
        let per_page = limit.min(200);
        let url = format!(
            "{}/{}?per_page={}",
            self.api_base,
            Self::module(kind),
            per_page
        );
        let body = self.client.get_json(&url, access_token).await?;
        let data = body.get("data").and_then(|d| d.as_array()).ok_or_else(|| {
            AdapterError::api(CrmPlatform::Zoho, "missing data array in list response")
        })?;
        Ok(data.to_vec())
    }

    async fn create_record(
        &self,
        access_token: &str,
        kind: EntityKind,
        data: &RawRecord,
    ) -> AdapterResult<RawRecord> {
        let url = format!("{}/{}", self.api_base, Self::module(kind));
        let body = serde_json::json!({ "data": [data] });
        let response = self.client.post_json(&url, access_token, &body).await?;
        response
            .get("data")
            .and_then(|d| d.as_array())
            .and_then(|a| a.first())
            .cloned()
            .ok_or_else(|| {
                AdapterError::api(CrmPlatform::Zoho, "missing data array in create response")
            })
    }

    async fn test_connection(&self, access_token: &str) -> AdapterResult<bool> {
        let url = format!("{}/Contacts?per_page=1", self.api_base);
        self.client.probe(&url, access_token).await
    }
}
