//! Pipedrive adapter.
//!
//! v1 API; persons stand in for contacts. Responses carry records under
//! `data`, which may be `null` instead of an empty array when the account
//! holds no records of the kind.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use url::Url;

use crmsync_adapter::{
    AdapterError, AdapterResult, CrmAdapter, CrmPlatform, EntityKind, RawRecord, TokenSet,
};

use crate::client::RestClient;
use crate::OAuthSettings;

const API_BASE: &str = "https://api.pipedrive.com/v1";
const OAUTH_BASE: &str = "https://oauth.pipedrive.com";

/// Adapter for Pipedrive.
pub struct PipedriveAdapter {
    client: RestClient,
    settings: OAuthSettings,
    api_base: String,
    oauth_base: String,
}

impl PipedriveAdapter {
    /// Create a Pipedrive adapter.
    pub fn new(settings: OAuthSettings) -> AdapterResult<Self> {
        Ok(Self {
            client: RestClient::new(CrmPlatform::Pipedrive)?,
            settings,
            api_base: API_BASE.to_string(),
            oauth_base: OAUTH_BASE.to_string(),
        })
    }

    /// Override both base URLs. Intended for tests against a local stub.
    #[must_use]
    pub fn with_bases(mut self, api: impl Into<String>, oauth: impl Into<String>) -> Self {
        self.api_base = api.into();
        self.oauth_base = oauth.into();
        self
    }

    fn resource(kind: EntityKind) -> &'static str {
        match kind {
            EntityKind::Contact => "persons",
            EntityKind::Deal => "deals",
            EntityKind::Lead => "leads",
        }
    }
}

#[async_trait]
impl CrmAdapter for PipedriveAdapter {
    fn platform(&self) -> CrmPlatform {
        CrmPlatform::Pipedrive
    }

    fn display_name(&self) -> &str {
        "Pipedrive"
    }

    fn auth_url(&self, state: &str) -> AdapterResult<Url> {
        Url::parse_with_params(
            &format!("{}/oauth/authorize", self.oauth_base),
            &[
                ("client_id", self.settings.client_id.as_str()),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| AdapterError::validation(CrmPlatform::Pipedrive, e.to_string()))
    }

    async fn exchange_code(&self, code: &str) -> AdapterResult<TokenSet> {
        self.client
            .post_token_form(
                &format!("{}/oauth/token", self.oauth_base),
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
                &format!("{}/oauth/token", self.oauth_base),
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
        let url = format!(
            "{}/{}?limit={}",
            self.api_base,
            Self::resource(kind),
            limit
        );
        let body = self.client.get_json(&url, access_token).await?;
        match body.get("data") {
            Some(serde_json::Value::Array(records)) => Ok(records.clone()),
            Some(serde_json::Value::Null) | None => Ok(Vec::new()),
            Some(_) => Err(AdapterError::api(
                CrmPlatform::Pipedrive,
                "unexpected data shape in list response",
            )),
        }
    }

    async fn create_record(
        &self,
        access_token: &str,
        kind: EntityKind,
        data: &RawRecord,
    ) -> AdapterResult<RawRecord> {
        let url = format!("{}/{}", self.api_base, Self::resource(kind));
        let response = self.client.post_json(&url, access_token, data).await?;
        response.get("data").cloned().ok_or_else(|| {
            AdapterError::api(CrmPlatform::Pipedrive, "missing data in create response")
        })
    }

    async fn test_connection(&self, access_token: &str) -> AdapterResult<bool> {
        let url = format!("{}/users/me", self.api_base);
        self.client.probe(&url, access_token).await
    }
}
