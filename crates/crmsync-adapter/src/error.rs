//! Adapter error types.
//!
//! Every network-level failure from a vendor API is wrapped into
//! [`AdapterError`], carrying the platform, the HTTP status where one
//! exists, and any structured detail payload the vendor returned.

use thiserror::Error;

use crate::types::CrmPlatform;

/// Error raised by a platform adapter.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The platform rejected the credentials (HTTP 401).
    #[error("{platform}: authentication failed: {message}")]
    Authentication {
        platform: CrmPlatform,
        message: String,
    },

    /// The credentials lack permission for the operation (HTTP 403).
    #[error("{platform}: authorization failed: {message}")]
    Authorization {
        platform: CrmPlatform,
        message: String,
    },

    /// The platform throttled the request (HTTP 429).
    #[error("{platform}: rate limited: {message}")]
    RateLimit {
        platform: CrmPlatform,
        message: String,
        /// Suggested wait before retrying, in milliseconds.
        retry_after_ms: Option<u64>,
    },

    /// The request payload was rejected (HTTP 400).
    #[error("{platform}: validation failed: {message}")]
    Validation {
        platform: CrmPlatform,
        message: String,
    },

    /// Transport-level failure before an HTTP status was obtained.
    #[error("{platform}: network error: {message}")]
    Network {
        platform: CrmPlatform,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Any other API failure.
    #[error("{platform}: api error: {message}")]
    Api {
        platform: CrmPlatform,
        message: String,
        http_status: Option<u16>,
        details: Option<serde_json::Value>,
    },
}

impl AdapterError {
    /// Classify an HTTP failure status into the matching error variant.
    ///
    /// 401 → authentication, 403 → authorization, 429 → rate limit,
    /// 400 → validation, anything else → generic API error.
    #[must_use]
    pub fn from_status(
        platform: CrmPlatform,
        status: u16,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> Self {
        let message = message.into();
        match status {
            401 => AdapterError::Authentication { platform, message },
            403 => AdapterError::Authorization { platform, message },
            429 => AdapterError::RateLimit {
                platform,
                message,
                retry_after_ms: None,
            },
            400 => AdapterError::Validation { platform, message },
            _ => AdapterError::Api {
                platform,
                message,
                http_status: Some(status),
                details,
            },
        }
    }

    /// Create a network error without an underlying source.
    pub fn network(platform: CrmPlatform, message: impl Into<String>) -> Self {
        AdapterError::Network {
            platform,
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error wrapping the transport failure.
    pub fn network_with_source(
        platform: CrmPlatform,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AdapterError::Network {
            platform,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a validation error.
    pub fn validation(platform: CrmPlatform, message: impl Into<String>) -> Self {
        AdapterError::Validation {
            platform,
            message: message.into(),
        }
    }

    /// Create a generic API error without an HTTP status.
    pub fn api(platform: CrmPlatform, message: impl Into<String>) -> Self {
        AdapterError::Api {
            platform,
            message: message.into(),
            http_status: None,
            details: None,
        }
    }

    /// The platform this error originated from.
    #[must_use]
    pub fn platform(&self) -> CrmPlatform {
        match self {
            AdapterError::Authentication { platform, .. }
            | AdapterError::Authorization { platform, .. }
            | AdapterError::RateLimit { platform, .. }
            | AdapterError::Validation { platform, .. }
            | AdapterError::Network { platform, .. }
            | AdapterError::Api { platform, .. } => *platform,
        }
    }

    /// The HTTP status carried by this error, if any.
    #[must_use]
    pub fn http_status(&self) -> Option<u16> {
        match self {
            AdapterError::Authentication { .. } => Some(401),
            AdapterError::Authorization { .. } => Some(403),
            AdapterError::RateLimit { .. } => Some(429),
            AdapterError::Validation { .. } => Some(400),
            AdapterError::Network { .. } => None,
            AdapterError::Api { http_status, .. } => *http_status,
        }
    }

    /// Get the taxonomy string for this error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterError::Authentication { .. } => "authentication_error",
            AdapterError::Authorization { .. } => "authorization_error",
            AdapterError::RateLimit { .. } => "rate_limit_error",
            AdapterError::Validation { .. } => "validation_error",
            AdapterError::Network { .. } => "network_error",
            AdapterError::Api { .. } => "api_error",
        }
    }

    /// Check if the operation may succeed on retry.
    ///
    /// Rate limits and transport failures are transient; credential and
    /// payload problems need intervention first.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AdapterError::RateLimit { .. } | AdapterError::Network { .. }
        )
    }
}

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let platform = CrmPlatform::HubSpot;
        assert_eq!(
            AdapterError::from_status(platform, 401, "bad token", None).kind(),
            "authentication_error"
        );
        assert_eq!(
            AdapterError::from_status(platform, 403, "forbidden", None).kind(),
            "authorization_error"
        );
        assert_eq!(
            AdapterError::from_status(platform, 429, "slow down", None).kind(),
            "rate_limit_error"
        );
        assert_eq!(
            AdapterError::from_status(platform, 400, "bad body", None).kind(),
            "validation_error"
        );
        assert_eq!(
            AdapterError::from_status(platform, 500, "boom", None).kind(),
            "api_error"
        );
    }

    #[test]
    fn test_http_status_carried() {
        let err = AdapterError::from_status(CrmPlatform::Zoho, 503, "maintenance", None);
        assert_eq!(err.http_status(), Some(503));
        assert_eq!(err.platform(), CrmPlatform::Zoho);
    }

    #[test]
    fn test_transient_classification() {
        assert!(AdapterError::network(CrmPlatform::Salesforce, "timeout").is_transient());
        assert!(AdapterError::from_status(CrmPlatform::Salesforce, 429, "throttled", None)
            .is_transient());
        assert!(
            !AdapterError::from_status(CrmPlatform::Salesforce, 401, "expired", None)
                .is_transient()
        );
        assert!(!AdapterError::validation(CrmPlatform::Salesforce, "bad field").is_transient());
    }

    #[test]
    fn test_display_includes_platform() {
        let err = AdapterError::network(CrmPlatform::Pipedrive, "connection refused");
        let text = err.to_string();
        assert!(text.contains("pipedrive"));
        assert!(text.contains("connection refused"));
    }
}
