//! Sync error types.

use thiserror::Error;
use uuid::Uuid;

use crmsync_adapter::{AdapterError, CrmPlatform};

/// Errors that can occur during synchronization.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Credentials rejected by a platform.
    #[error("authentication error: {message}")]
    Authentication { message: String },

    /// Insufficient permissions on a platform.
    #[error("authorization error: {message}")]
    Authorization { message: String },

    /// A platform quota was hit, either locally or remotely.
    #[error("rate limit error on {platform}: {message}")]
    RateLimit {
        platform: CrmPlatform,
        message: String,
        /// Suggested wait before retrying, in milliseconds.
        wait_ms: Option<u64>,
    },

    /// Malformed or rejected data.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Transport-level failure.
    #[error("network error: {message}")]
    Network { message: String },

    /// Generic platform API failure.
    #[error("api error: {message}")]
    Api { message: String },

    /// Failure in the sync workflow itself.
    #[error("sync error: {message}")]
    Sync { message: String },

    /// A conflict that could not be resolved automatically.
    #[error("conflict error: {message}")]
    Conflict { message: String },

    /// Mapping failure for a specific record.
    #[error("mapping error for record '{external_id}': {message}")]
    Mapping {
        external_id: String,
        message: String,
    },

    /// Connection is not in a syncable state.
    #[error("connection {connection_id} is not active")]
    ConnectionInactive { connection_id: Uuid },

    /// Persistent store error.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a sync workflow error.
    pub fn sync(message: impl Into<String>) -> Self {
        Self::Sync {
            message: message.into(),
        }
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a mapping error for one record.
    pub fn mapping(external_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Mapping {
            external_id: external_id.into(),
            message: message.into(),
        }
    }

    /// Create a rate limit error.
    pub fn rate_limited(
        platform: CrmPlatform,
        message: impl Into<String>,
        wait_ms: Option<u64>,
    ) -> Self {
        Self::RateLimit {
            platform,
            message: message.into(),
            wait_ms,
        }
    }

    /// Get the taxonomy string for this error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Authentication { .. } => "authentication_error",
            SyncError::Authorization { .. } => "authorization_error",
            SyncError::RateLimit { .. } => "rate_limit_error",
            SyncError::Validation { .. } | SyncError::Mapping { .. } => "validation_error",
            SyncError::Network { .. } => "network_error",
            SyncError::Api { .. } => "api_error",
            SyncError::Sync { .. } | SyncError::ConnectionInactive { .. } => "sync_error",
            SyncError::Conflict { .. } => "conflict_error",
            SyncError::Store(_) => "api_error",
            SyncError::Serialization(_) => "validation_error",
        }
    }

    /// Check if this error is worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::RateLimit { .. } | SyncError::Network { .. } | SyncError::Store(_)
        )
    }
}

impl From<AdapterError> for SyncError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Authentication { message, .. } => SyncError::Authentication { message },
            AdapterError::Authorization { message, .. } => SyncError::Authorization { message },
            AdapterError::RateLimit {
                platform,
                message,
                retry_after_ms,
            } => SyncError::RateLimit {
                platform,
                message,
                wait_ms: retry_after_ms,
            },
            AdapterError::Validation { message, .. } => SyncError::Validation { message },
            AdapterError::Network { message, .. } => SyncError::Network { message },
            AdapterError::Api { message, .. } => SyncError::Api { message },
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
