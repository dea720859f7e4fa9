//! Platform and entity type definitions shared across the workspace.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A platform-native record, exactly as returned by the vendor API
/// (after any adapter-level flattening).
pub type RawRecord = serde_json::Value;

/// External CRM platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrmPlatform {
    /// HubSpot CRM.
    HubSpot,
    /// Salesforce.
    Salesforce,
    /// Zoho CRM.
    Zoho,
    /// Pipedrive.
    Pipedrive,
    /// Microsoft Dynamics 365.
    Dynamics,
    /// SugarCRM.
    SugarCrm,
}

impl CrmPlatform {
    /// Get all supported platforms.
    #[must_use]
    pub fn all() -> &'static [CrmPlatform] {
        &[
            CrmPlatform::HubSpot,
            CrmPlatform::Salesforce,
            CrmPlatform::Zoho,
            CrmPlatform::Pipedrive,
            CrmPlatform::Dynamics,
            CrmPlatform::SugarCrm,
        ]
    }

    /// Get the string representation used in storage and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CrmPlatform::HubSpot => "hubspot",
            CrmPlatform::Salesforce => "salesforce",
            CrmPlatform::Zoho => "zoho",
            CrmPlatform::Pipedrive => "pipedrive",
            CrmPlatform::Dynamics => "dynamics",
            CrmPlatform::SugarCrm => "sugarcrm",
        }
    }
}

impl fmt::Display for CrmPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CrmPlatform {
    type Err = ParsePlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hubspot" => Ok(CrmPlatform::HubSpot),
            "salesforce" => Ok(CrmPlatform::Salesforce),
            "zoho" => Ok(CrmPlatform::Zoho),
            "pipedrive" => Ok(CrmPlatform::Pipedrive),
            "dynamics" => Ok(CrmPlatform::Dynamics),
            "sugarcrm" => Ok(CrmPlatform::SugarCrm),
            _ => Err(ParsePlatformError(s.to_string())),
        }
    }
}

/// Error parsing a platform from a string.
#[derive(Debug, Clone)]
pub struct ParsePlatformError(String);

impl fmt::Display for ParsePlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid platform '{}', expected one of: hubspot, salesforce, zoho, pipedrive, dynamics, sugarcrm",
            self.0
        )
    }
}

impl std::error::Error for ParsePlatformError {}

/// Kind of synchronized entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A person record.
    Contact,
    /// A sales opportunity.
    Deal,
    /// An unqualified prospect.
    Lead,
}

impl EntityKind {
    /// Get all entity kinds.
    #[must_use]
    pub fn all() -> &'static [EntityKind] {
        &[EntityKind::Contact, EntityKind::Deal, EntityKind::Lead]
    }

    /// Get the string representation used in storage and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Contact => "contact",
            EntityKind::Deal => "deal",
            EntityKind::Lead => "lead",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contact" => Ok(EntityKind::Contact),
            "deal" => Ok(EntityKind::Deal),
            "lead" => Ok(EntityKind::Lead),
            _ => Err(format!("Unknown entity kind: {s}")),
        }
    }
}

/// Status of a stored OAuth connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Authorized and usable for sync runs.
    Connected,
    /// Explicitly disabled or revoked.
    Disconnected,
    /// Soft-disabled after repeated authentication failures.
    Error,
    /// Tokens expired and refresh failed.
    Expired,
    /// OAuth flow started but not completed.
    #[default]
    Pending,
}

impl ConnectionStatus {
    /// Get the string representation used in storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Error => "error",
            ConnectionStatus::Expired => "expired",
            ConnectionStatus::Pending => "pending",
        }
    }

    /// Check if a connection in this status participates in sync runs.
    #[must_use]
    pub fn is_syncable(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConnectionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "connected" => Ok(ConnectionStatus::Connected),
            "disconnected" => Ok(ConnectionStatus::Disconnected),
            "error" => Ok(ConnectionStatus::Error),
            "expired" => Ok(ConnectionStatus::Expired),
            "pending" => Ok(ConnectionStatus::Pending),
            _ => Err(format!("Unknown connection status: {s}")),
        }
    }
}

/// OAuth token set for one connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    /// Bearer access token.
    pub access_token: String,
    /// Refresh token, if the platform issued one.
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds, as reported by the platform.
    pub expires_in: Option<i64>,
    /// Absolute expiry time of the access token.
    pub expires_at: Option<DateTime<Utc>>,
    /// Token type, normally "bearer".
    pub token_type: String,
}

impl TokenSet {
    /// Create a token set from an OAuth response, computing the absolute
    /// expiry from `expires_in`.
    #[must_use]
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_in: Option<i64>,
        token_type: String,
    ) -> Self {
        let expires_at = expires_in.map(|secs| Utc::now() + Duration::seconds(secs));
        Self {
            access_token,
            refresh_token,
            expires_in,
            expires_at,
            token_type,
        }
    }

    /// Check if the access token expires within the given grace period.
    ///
    /// Tokens with no known expiry are treated as non-expiring.
    #[must_use]
    pub fn expires_within(&self, grace: Duration) -> bool {
        match self.expires_at {
            Some(at) => Utc::now() + grace >= at,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_roundtrip() {
        for platform in CrmPlatform::all() {
            let parsed: CrmPlatform = platform.as_str().parse().unwrap();
            assert_eq!(*platform, parsed);
        }
    }

    #[test]
    fn test_platform_invalid() {
        let result: Result<CrmPlatform, _> = "siebel".parse();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("siebel"));
    }

    #[test]
    fn test_entity_kind_roundtrip() {
        for kind in EntityKind::all() {
            let parsed: EntityKind = kind.as_str().parse().unwrap();
            assert_eq!(*kind, parsed);
        }
    }

    #[test]
    fn test_connection_status_roundtrip() {
        for status in [
            ConnectionStatus::Connected,
            ConnectionStatus::Disconnected,
            ConnectionStatus::Error,
            ConnectionStatus::Expired,
            ConnectionStatus::Pending,
        ] {
            let parsed: ConnectionStatus = status.as_str().parse().unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn test_only_connected_is_syncable() {
        assert!(ConnectionStatus::Connected.is_syncable());
        assert!(!ConnectionStatus::Disconnected.is_syncable());
        assert!(!ConnectionStatus::Error.is_syncable());
        assert!(!ConnectionStatus::Expired.is_syncable());
        assert!(!ConnectionStatus::Pending.is_syncable());
    }

    #[test]
    fn test_token_set_expiry() {
        let fresh = TokenSet::new("tok".to_string(), None, Some(3600), "bearer".to_string());
        assert!(!fresh.expires_within(Duration::minutes(5)));
        assert!(fresh.expires_within(Duration::hours(2)));

        let expiring = TokenSet::new("tok".to_string(), None, Some(60), "bearer".to_string());
        assert!(expiring.expires_within(Duration::minutes(5)));

        let no_expiry = TokenSet::new("tok".to_string(), None, None, "bearer".to_string());
        assert!(!no_expiry.expires_within(Duration::days(365)));
    }
}
