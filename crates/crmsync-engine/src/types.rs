//! Common types for sync runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crmsync_adapter::{CrmPlatform, EntityKind};

/// Rollup status of one sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    /// Every record processed cleanly.
    Success,
    /// Some records errored, some succeeded.
    Partial,
    /// The run failed outright or every record errored.
    Error,
}

impl SyncRunStatus {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncRunStatus::Success => "success",
            SyncRunStatus::Partial => "partial",
            SyncRunStatus::Error => "error",
        }
    }
}

impl fmt::Display for SyncRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SyncRunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "success" => Ok(SyncRunStatus::Success),
            "partial" => Ok(SyncRunStatus::Partial),
            "error" => Ok(SyncRunStatus::Error),
            _ => Err(format!("Unknown sync run status: {s}")),
        }
    }
}

/// Per-record sync bookkeeping status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordSyncStatus {
    /// In step with the remote platform.
    Synced,
    /// Awaiting action, e.g. manual conflict review.
    #[default]
    Pending,
    /// Last sync attempt for this record failed.
    Error,
}

impl RecordSyncStatus {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordSyncStatus::Synced => "synced",
            RecordSyncStatus::Pending => "pending",
            RecordSyncStatus::Error => "error",
        }
    }
}

impl fmt::Display for RecordSyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RecordSyncStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "synced" => Ok(RecordSyncStatus::Synced),
            "pending" => Ok(RecordSyncStatus::Pending),
            "error" => Ok(RecordSyncStatus::Error),
            _ => Err(format!("Unknown record sync status: {s}")),
        }
    }
}

/// One record's failure within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordError {
    /// Platform-native key of the failing record, when known.
    pub external_id: String,
    /// What went wrong.
    pub message: String,
}

impl RecordError {
    /// Create a record error.
    pub fn new(external_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            message: message.into(),
        }
    }
}

/// Result of one (connection, kind) sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    /// Connection the run belongs to.
    pub connection_id: Uuid,
    /// Platform synced against.
    pub platform: CrmPlatform,
    /// Entity kind synced.
    pub kind: EntityKind,
    /// Rollup status.
    pub status: SyncRunStatus,
    /// Remote records examined.
    pub records_processed: usize,
    /// Records newly created locally.
    pub records_created: usize,
    /// Records updated locally.
    pub records_updated: usize,
    /// Records already in step and left alone.
    pub records_skipped: usize,
    /// Records that failed individually.
    pub records_errored: usize,
    /// Per-record failures.
    pub errors: Vec<RecordError>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncResult {
    /// Start an empty result for a run.
    #[must_use]
    pub fn started(connection_id: Uuid, platform: CrmPlatform, kind: EntityKind) -> Self {
        Self {
            connection_id,
            platform,
            kind,
            status: SyncRunStatus::Success,
            records_processed: 0,
            records_created: 0,
            records_updated: 0,
            records_skipped: 0,
            records_errored: 0,
            errors: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Record one per-record failure.
    pub fn record_error(&mut self, external_id: impl Into<String>, message: impl Into<String>) {
        self.records_errored += 1;
        self.errors.push(RecordError::new(external_id, message));
    }

    /// Close the run, computing the rollup status: success with zero
    /// errors, error when every processed record errored, partial
    /// otherwise.
    #[must_use]
    pub fn finalize(mut self) -> Self {
        self.status = if self.records_errored == 0 {
            SyncRunStatus::Success
        } else if self.records_errored >= self.records_processed && self.records_processed > 0 {
            SyncRunStatus::Error
        } else {
            SyncRunStatus::Partial
        };
        self.finished_at = Some(Utc::now());
        self
    }

    /// Close the run as failed outright with one run-level error.
    #[must_use]
    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.status = SyncRunStatus::Error;
        self.errors.push(RecordError::new("", message));
        self.records_errored = self.errors.len();
        self.finished_at = Some(Utc::now());
        self
    }

    /// Check if the run completed with zero errors.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == SyncRunStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> SyncResult {
        SyncResult::started(Uuid::new_v4(), CrmPlatform::HubSpot, EntityKind::Deal)
    }

    #[test]
    fn test_run_status_roundtrip() {
        for status in [
            SyncRunStatus::Success,
            SyncRunStatus::Partial,
            SyncRunStatus::Error,
        ] {
            let parsed: SyncRunStatus = status.as_str().parse().unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn test_record_status_roundtrip() {
        for status in [
            RecordSyncStatus::Synced,
            RecordSyncStatus::Pending,
            RecordSyncStatus::Error,
        ] {
            let parsed: RecordSyncStatus = status.as_str().parse().unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn test_finalize_success() {
        let mut r = result();
        r.records_processed = 3;
        r.records_created = 3;
        let r = r.finalize();
        assert_eq!(r.status, SyncRunStatus::Success);
        assert!(r.finished_at.is_some());
    }

    #[test]
    fn test_finalize_partial() {
        let mut r = result();
        r.records_processed = 3;
        r.records_created = 2;
        r.record_error("d2", "mapping failed");
        let r = r.finalize();
        assert_eq!(r.status, SyncRunStatus::Partial);
        assert_eq!(r.errors.len(), 1);
    }

    #[test]
    fn test_finalize_all_errored() {
        let mut r = result();
        r.records_processed = 2;
        r.record_error("a", "boom");
        r.record_error("b", "boom");
        assert_eq!(r.finalize().status, SyncRunStatus::Error);
    }

    #[test]
    fn test_empty_run_is_success() {
        assert_eq!(result().finalize().status, SyncRunStatus::Success);
    }

    #[test]
    fn test_failed_run() {
        let r = result().failed("fetch exploded");
        assert_eq!(r.status, SyncRunStatus::Error);
        assert_eq!(r.errors.len(), 1);
        assert!(r.errors[0].message.contains("fetch exploded"));
    }
}
