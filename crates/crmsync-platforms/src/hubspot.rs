//! HubSpot adapter.
//!
//! Uses the CRM v3 objects API. List responses arrive as
//! `{ "results": [ { "id", "properties": {..}, "createdAt", "updatedAt" } ] }`;
//! records are flattened so the natural id, the property bag, and the audit
//! timestamps sit on one level for the field mapper.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use url::Url;

use crmsync_adapter::{
    AdapterError, AdapterResult, CrmAdapter, CrmPlatform, EntityKind, RawRecord, TokenSet,
};

use crate::client::RestClient;
use crate::OAuthSettings;

const API_BASE: &str = "https://api.hubapi.com";
const AUTHORIZE_URL: &str = "https://app.hubspot.com/oauth/authorize";
const TOKEN_URL: &str = "https://api.hubapi.com/oauth/v1/token";
const DEFAULT_SCOPES: &str = "crm.objects.contacts.read crm.objects.contacts.write crm.objects.deals.read crm.objects.deals.write";

/// Adapter for HubSpot CRM.
pub struct HubSpotAdapter {
    client: RestClient,
    settings: OAuthSettings,
    api_base: String,
}

impl HubSpotAdapter {
    /// Create a HubSpot adapter.
    pub fn new(settings: OAuthSettings) -> AdapterResult<Self> {
        Ok(Self {
            client: RestClient::new(CrmPlatform::HubSpot)?,
            settings,
            api_base: API_BASE.to_string(),
        })
    }

    /// Override the API base URL. Intended for tests against a local stub.
    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    fn object_path(kind: EntityKind) -> &'static str {
        match kind {
            EntityKind::Contact => "contacts",
            EntityKind::Deal => "deals",
            EntityKind::Lead => "leads",
        }
    }
}

/// Flatten a v3 object into one level: id and audit timestamps joined with
/// the property bag. Properties never legitimately collide with `id`.
fn flatten_object(object: &serde_json::Value) -> RawRecord {
    let mut record = serde_json::Map::new();
    if let Some(props) = object.get("properties").and_then(|p| p.as_object()) {
        record.extend(props.clone());
    }
    for key in ["id", "createdAt", "updatedAt"] {
        if let Some(value) = object.get(key) {
            record.insert(key.to_string(), value.clone());
        }
    }
    serde_json::Value::Object(record)
}

#[async_trait]
impl CrmAdapter for HubSpotAdapter {
    fn platform(&self) -> CrmPlatform {
        CrmPlatform::HubSpot
    }

    fn display_name(&self) -> &str {
        "HubSpot"
    }

    fn auth_url(&self, state: &str) -> AdapterResult<Url> {
        Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_id", self.settings.client_id.as_str()),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("scope", DEFAULT_SCOPES),
                ("state", state),
            ],
        )
        .map_err(|e| AdapterError::validation(CrmPlatform::HubSpot, e.to_string()))
    }

    async fn exchange_code(&self, code: &str) -> AdapterResult<TokenSet> {
        self.client
            .post_token_form(
                TOKEN_URL,
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
                TOKEN_URL,
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
            "{}/crm/v3/objects/{}?limit={}&archived=false",
            self.api_base,
            Self::object_path(kind),
            limit
        );
        let body = self.client.get_json(&url, access_token).await?;
        let results = body
            .get("results")
            .and_then(|r| r.as_array())
            .ok_or_else(|| {
                AdapterError::api(CrmPlatform::HubSpot, "missing results array in list response")
            })?;
        Ok(results.iter().map(flatten_object).collect())
    }

    async fn create_record(
        &self,
        access_token: &str,
        kind: EntityKind,
        data: &RawRecord,
    ) -> AdapterResult<RawRecord> {
        let url = format!("{}/crm/v3/objects/{}", self.api_base, Self::object_path(kind));
        let body = serde_json::json!({ "properties": data });
        let created = self.client.post_json(&url, access_token, &body).await?;
        Ok(flatten_object(&created))
    }

    async fn test_connection(&self, access_token: &str) -> AdapterResult<bool> {
        let url = format!("{}/crm/v3/objects/contacts?limit=1", self.api_base);
        self.client.probe(&url, access_token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adapter() -> HubSpotAdapter {
        HubSpotAdapter::new(OAuthSettings::new(
            "client-id",
            "client-secret",
            "https://app.example.com/oauth/callback",
        ))
        .unwrap()
    }

    #[test]
    fn test_auth_url() {
        let url = adapter().auth_url("csrf-state").unwrap();
        assert_eq!(url.host_str(), Some("app.hubspot.com"));
        let query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert!(query.contains(&("client_id".to_string(), "client-id".to_string())));
        assert!(query.contains(&("state".to_string(), "csrf-state".to_string())));
    }

    #[test]
    fn test_flatten_object() {
        let object = json!({
            "id": "d1",
            "properties": {
                "dealname": "Acme Deal",
                "amount": "5000",
                "dealstage": "negotiation"
            },
            "createdAt": "2024-03-01T10:00:00Z",
            "updatedAt": "2024-03-02T10:00:00Z"
        });

        let flat = flatten_object(&object);
        assert_eq!(flat["id"], "d1");
        assert_eq!(flat["dealname"], "Acme Deal");
        assert_eq!(flat["amount"], "5000");
        assert_eq!(flat["updatedAt"], "2024-03-02T10:00:00Z");
    }

    #[test]
    fn test_flatten_object_without_properties() {
        let flat = flatten_object(&json!({ "id": "x" }));
        assert_eq!(flat["id"], "x");
        assert_eq!(flat.as_object().unwrap().len(), 1);
    }

    #[test]
    fn test_object_paths() {
        assert_eq!(HubSpotAdapter::object_path(EntityKind::Contact), "contacts");
        assert_eq!(HubSpotAdapter::object_path(EntityKind::Deal), "deals");
        assert_eq!(HubSpotAdapter::object_path(EntityKind::Lead), "leads");
    }
}
