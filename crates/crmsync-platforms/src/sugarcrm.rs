//! SugarCRM adapter.
//!
//! v11 REST API against a customer-hosted site URL; records arrive under
//! `records`, paging uses `max_num`. SugarCRM's OAuth token endpoint takes
//! a JSON body rather than form encoding, so token calls go through the
//! shared JSON path and are parsed here.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use url::Url;

use crmsync_adapter::{
    AdapterError, AdapterResult, CrmAdapter, CrmPlatform, EntityKind, RawRecord, TokenSet,
};

use crate::client::RestClient;
use crate::OAuthSettings;

/// Adapter for SugarCRM.
pub struct SugarCrmAdapter {
    client: RestClient,
    settings: OAuthSettings,
    /// Site base, e.g. `https://crm.acme.com`.
    site_url: String,
}

impl SugarCrmAdapter {
    /// Create a SugarCRM adapter for one hosted site.
    pub fn new(settings: OAuthSettings, site_url: impl Into<String>) -> AdapterResult<Self> {
        Ok(Self {
            client: RestClient::new(CrmPlatform::SugarCrm)?,
            settings,
            site_url: site_url.into(),
        })
    }

    fn module(kind: EntityKind) -> &'static str {
        match kind {
            EntityKind::Contact => "Contacts",
            EntityKind::Deal => "Opportunities",
            EntityKind::Lead => "Leads",
        }
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v11/{}", self.site_url, path)
    }

    async fn token_request(&self, grant: serde_json::Value) -> AdapterResult<TokenSet> {
        // The token endpoint ignores the bearer header; pass an empty token.
        let response = self
            .client
            .post_json(&self.rest_url("oauth2/token"), "", &grant)
            .await?;

        let access_token = response
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AdapterError::api(CrmPlatform::SugarCrm, "missing access_token in response")
            })?
            .to_string();
        let refresh_token = response
            .get("refresh_token")
            .and_then(|v| v.as_str())
            .map(ToString::to_string);
        let expires_in = response.get("expires_in").and_then(serde_json::Value::as_i64);

        Ok(TokenSet::new(
            access_token,
            refresh_token,
            expires_in,
            "bearer".to_string(),
        ))
    }
}

#[async_trait]
impl CrmAdapter for SugarCrmAdapter {
    fn platform(&self) -> CrmPlatform {
        CrmPlatform::SugarCrm
    }

    fn display_name(&self) -> &str {
        "SugarCRM"
    }

    fn auth_url(&self, state: &str) -> AdapterResult<Url> {
        Url::parse_with_params(
            &format!("{}/oauth2/authorize", self.site_url),
            &[
                ("response_type", "code"),
                ("client_id", self.settings.client_id.as_str()),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| AdapterError::validation(CrmPlatform::SugarCrm, e.to_string()))
    }

    async fn exchange_code(&self, code: &str) -> AdapterResult<TokenSet> {
        self.token_request(serde_json::json!({
            "grant_type": "authorization_code",
            "client_id": self.settings.client_id,
            "client_secret": self.settings.client_secret.expose_secret(),
            "redirect_uri": self.settings.redirect_uri,
            "code": code,
            "platform": "base",
        }))
        .await
    }

    async fn refresh_token(&self, refresh_token: &str) -> AdapterResult<TokenSet> {
        self.token_request(serde_json::json!({
            "grant_type": "refresh_token",
            "client_id": self.settings.client_id,
            "client_secret": self.settings.client_secret.expose_secret(),
            "refresh_token": refresh_token,
            "platform": "base",
        }))
        .await
    }

    async fn list_records(
        &self,
        access_token: &str,
        kind: EntityKind,
        limit: u32,
    ) -> AdapterResult<Vec<RawRecord>> {
        let url = format!(
            "{}?max_num={}",
            self.rest_url(Self::module(kind)),
            limit
        );
        let body = self.client.get_json(&url, access_token).await?;
        let records = body
            .get("records")
            .and_then(|r| r.as_array())
            .ok_or_else(|| {
                AdapterError::api(
                    CrmPlatform::SugarCrm,
                    "missing records array in list response",
                )
            })?;
        Ok(records.to_vec())
    }

    async fn create_record(
        &self,
        access_token: &str,
        kind: EntityKind,
        data: &RawRecord,
    ) -> AdapterResult<RawRecord> {
        self.client
            .post_json(&self.rest_url(Self::module(kind)), access_token, data)
            .await
    }

    async fn test_connection(&self, access_token: &str) -> AdapterResult<bool> {
        self.client.probe(&self.rest_url("me"), access_token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> SugarCrmAdapter {
        SugarCrmAdapter::new(
            OAuthSettings::new("cid", "secret", "https://app.example.com/cb"),
            "https://crm.acme.com",
        )
        .unwrap()
    }

    #[test]
    fn test_auth_url_uses_site() {
        let url = adapter().auth_url("st").unwrap();
        assert_eq!(url.host_str(), Some("crm.acme.com"));
        assert!(url.query().unwrap().contains("state=st"));
    }

    #[test]
    fn test_rest_url_layout() {
        assert_eq!(
            adapter().rest_url("Contacts"),
            "https://crm.acme.com/rest/v11/Contacts"
        );
    }

    #[test]
    fn test_modules() {
        assert_eq!(SugarCrmAdapter::module(EntityKind::Deal), "Opportunities");
    }
}
