//! Salesforce adapter.
//!
//! Record listing goes through the SOQL query endpoint; the instance URL is
//! per-org and supplied at construction. Responses carry records under
//! `records` with an `attributes` envelope that is stripped before the
//! records leave the adapter.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use url::Url;

use crmsync_adapter::{
    AdapterError, AdapterResult, CrmAdapter, CrmPlatform, EntityKind, RawRecord, TokenSet,
};

use crate::client::RestClient;
use crate::OAuthSettings;

const LOGIN_BASE: &str = "https://login.salesforce.com";
const API_VERSION: &str = "v59.0";

/// Adapter for Salesforce.
pub struct SalesforceAdapter {
    client: RestClient,
    settings: OAuthSettings,
    instance_url: String,
    login_base: String,
}

impl SalesforceAdapter {
    /// Create a Salesforce adapter bound to one org's instance URL.
    pub fn new(settings: OAuthSettings, instance_url: impl Into<String>) -> AdapterResult<Self> {
        Ok(Self {
            client: RestClient::new(CrmPlatform::Salesforce)?,
            settings,
            instance_url: instance_url.into(),
            login_base: LOGIN_BASE.to_string(),
        })
    }

    /// Override the login host. Intended for sandbox orgs and tests.
    #[must_use]
    pub fn with_login_base(mut self, base: impl Into<String>) -> Self {
        self.login_base = base.into();
        self
    }

    fn sobject(kind: EntityKind) -> &'static str {
        match kind {
            EntityKind::Contact => "Contact",
            EntityKind::Deal => "Opportunity",
            EntityKind::Lead => "Lead",
        }
    }

    fn list_query(kind: EntityKind, limit: u32) -> String {
        let fields = match kind {
            EntityKind::Contact => {
                "Id, FirstName, LastName, Email, Phone, Title, Account.Name, CreatedDate, LastModifiedDate"
            }
            EntityKind::Deal => {
                "Id, Name, Amount, StageName, CloseDate, Probability, Description, CreatedDate, LastModifiedDate"
            }
            EntityKind::Lead => {
                "Id, FirstName, LastName, Email, Company, Status, LeadSource, CreatedDate, LastModifiedDate"
            }
        };
        format!("SELECT {fields} FROM {} LIMIT {limit}", Self::sobject(kind))
    }
}

/// Drop the SOQL `attributes` envelope from a record.
fn strip_attributes(record: &serde_json::Value) -> RawRecord {
    match record.as_object() {
        Some(object) => {
            let mut cleaned = object.clone();
            cleaned.remove("attributes");
            serde_json::Value::Object(cleaned)
        }
        None => record.clone(),
    }
}

#[async_trait]
impl CrmAdapter for SalesforceAdapter {
    fn platform(&self) -> CrmPlatform {
        CrmPlatform::Salesforce
    }

    fn display_name(&self) -> &str {
        "Salesforce"
    }

    fn auth_url(&self, state: &str) -> AdapterResult<Url> {
        Url::parse_with_params(
            &format!("{}/services/oauth2/authorize", self.login_base),
            &[
                ("response_type", "code"),
                ("client_id", self.settings.client_id.as_str()),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| AdapterError::validation(CrmPlatform::Salesforce, e.to_string()))
    }

    async fn exchange_code(&self, code: &str) -> AdapterResult<TokenSet> {
        self.client
            .post_token_form(
                &format!("{}/services/oauth2/token", self.login_base),
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
                &format!("{}/services/oauth2/token", self.login_base),
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
        let query = Self::list_query(kind, limit);
        let url = Url::parse_with_params(
            &format!(
                "{}/services/data/{}/query",
                self.instance_url, API_VERSION
            ),
            &[("q", query.as_str())],
        )
        .map_err(|e| AdapterError::validation(CrmPlatform::Salesforce, e.to_string()))?;

        let body = self.client.get_json(url.as_str(), access_token).await?;
        let records = body
            .get("records")
            .and_then(|r| r.as_array())
            .ok_or_else(|| {
                AdapterError::api(
                    CrmPlatform::Salesforce,
                    "missing records array in query response",
                )
            })?;
        Ok(records.iter().map(strip_attributes).collect())
    }

    async fn create_record(
        &self,
        access_token: &str,
        kind: EntityKind,
        data: &RawRecord,
    ) -> AdapterResult<RawRecord> {
        let url = format!(
            "{}/services/data/{}/sobjects/{}",
            self.instance_url,
            API_VERSION,
            Self::sobject(kind)
        );
        self.client.post_json(&url, access_token, data).await
    }

    async fn test_connection(&self, access_token: &str) -> AdapterResult<bool> {
        let url = format!("{}/services/data/{}", self.instance_url, API_VERSION);
        self.client.probe(&url, access_token).await
    }
}
