//! Shared REST client for vendor adapters.
//!
//! Wraps `reqwest` with bearer-token JSON requests, form-encoded OAuth
//! token posts, and HTTP-status → [`AdapterError`] classification so the
//! vendor modules only describe endpoints and payload shapes.

use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use crmsync_adapter::{AdapterError, AdapterResult, CrmPlatform, TokenSet};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// OAuth token response body shared by all supported vendors.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    #[serde(default = "default_token_type")]
    token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// HTTP client bound to one platform for error attribution.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    platform: CrmPlatform,
}

impl RestClient {
    /// Create a client for the given platform.
    pub fn new(platform: CrmPlatform) -> AdapterResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                AdapterError::network_with_source(platform, "failed to build HTTP client", e)
            })?;
        Ok(Self { http, platform })
    }

    /// The platform this client reports errors against.
    #[must_use]
    pub fn platform(&self) -> CrmPlatform {
        self.platform
    }

    /// GET a JSON document with a bearer token.
    #[instrument(skip(self, access_token))]
    pub async fn get_json(
        &self,
        url: &str,
        access_token: &str,
    ) -> AdapterResult<serde_json::Value> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AdapterError::network_with_source(self.platform, "request failed", e))?;
        self.parse_json(response).await
    }

    /// POST a JSON body with a bearer token and parse a JSON response.
    #[instrument(skip(self, access_token, body))]
    pub async fn post_json(
        &self,
        url: &str,
        access_token: &str,
        body: &serde_json::Value,
    ) -> AdapterResult<serde_json::Value> {
        let response = self
            .http
            .post(url)
            .bearer_auth(access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| AdapterError::network_with_source(self.platform, "request failed", e))?;
        self.parse_json(response).await
    }

    /// GET with a bearer token, reporting only whether the endpoint
    /// accepted the credentials. Used for connection tests.
    #[instrument(skip(self, access_token))]
    pub async fn probe(&self, url: &str, access_token: &str) -> AdapterResult<bool> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AdapterError::network_with_source(self.platform, "probe failed", e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            debug!(platform = %self.platform, status = status.as_u16(), "probe rejected");
            return Ok(false);
        }
        Err(AdapterError::from_status(
            self.platform,
            status.as_u16(),
            "unexpected probe response",
            None,
        ))
    }

    /// POST form-encoded parameters to an OAuth token endpoint.
    #[instrument(skip(self, params))]
    pub async fn post_token_form(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> AdapterResult<TokenSet> {
        let response = self
            .http
            .post(url)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                AdapterError::network_with_source(self.platform, "token request failed", e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let details = response.json::<serde_json::Value>().await.ok();
            return Err(AdapterError::from_status(
                self.platform,
                status.as_u16(),
                "token endpoint rejected request",
                details,
            ));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            AdapterError::network_with_source(self.platform, "malformed token response", e)
        })?;

        Ok(TokenSet::new(
            token.access_token,
            token.refresh_token,
            token.expires_in,
            token.token_type,
        ))
    }

    /// Turn a response into JSON, classifying failure statuses.
    async fn parse_json(&self, response: reqwest::Response) -> AdapterResult<serde_json::Value> {
        let status = response.status();
        if !status.is_success() {
            let details = response.json::<serde_json::Value>().await.ok();
            let message = details
                .as_ref()
                .and_then(extract_api_message)
                .unwrap_or_else(|| format!("request failed with status {status}"));
            return Err(AdapterError::from_status(
                self.platform,
                status.as_u16(),
                message,
                details,
            ));
        }

        response.json().await.map_err(|e| {
            AdapterError::network_with_source(self.platform, "malformed JSON response", e)
        })
    }
}

/// Pull a human-readable message out of a vendor error payload.
///
/// Vendors disagree on the envelope: HubSpot and Zoho use `message`,
/// Dynamics nests `error.message`, Salesforce returns an array of
/// `{message, errorCode}` objects.
fn extract_api_message(details: &serde_json::Value) -> Option<String> {
    if let Some(msg) = details.get("message").and_then(|v| v.as_str()) {
        return Some(msg.to_string());
    }
    if let Some(msg) = details
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|v| v.as_str())
    {
        return Some(msg.to_string());
    }
    if let Some(first) = details.as_array().and_then(|a| a.first()) {
        if let Some(msg) = first.get("message").and_then(|v| v.as_str()) {
            return Some(msg.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_flat_message() {
        let details = json!({"message": "Invalid property name"});
        assert_eq!(
            extract_api_message(&details).as_deref(),
            Some("Invalid property name")
        );
    }

    #[test]
    fn test_extract_nested_odata_message() {
        let details = json!({"error": {"code": "0x80040217", "message": "entity not found"}});
        assert_eq!(
            extract_api_message(&details).as_deref(),
            Some("entity not found")
        );
    }

    #[test]
    fn test_extract_salesforce_array_message() {
        let details = json!([{"message": "Session expired", "errorCode": "INVALID_SESSION_ID"}]);
        assert_eq!(
            extract_api_message(&details).as_deref(),
            Some("Session expired")
        );
    }

    #[test]
    fn test_extract_unknown_shape() {
        assert!(extract_api_message(&json!({"oops": true})).is_none());
    }
}
