//! Core types for bucketsync

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User metadata attached to an object
pub type Metadata = HashMap<String, String>;

/// Sync state recorded on a source object's metadata
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncStatus {
    /// A sync attempt is in progress; destination content not yet confirmed
    #[serde(rename = "pending")]
    Pending,
    /// Destination content verified identical to source by fingerprint
    #[serde(rename = "true")]
    Synced,
    /// Never synced, or the last attempt failed
    #[default]
    #[serde(rename = "false")]
    NotSynced,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "true",
            SyncStatus::NotSynced => "false",
        }
    }

    /// Decode a stored value. Anything unrecognized reads as not synced.
    pub fn from_metadata_value(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(SyncStatus::Pending),
            "true" => Ok(SyncStatus::Synced),
            "false" => Ok(SyncStatus::NotSynced),
            _ => Err(format!("Unknown sync status: {}", s)),
        }
    }
}

/// Head metadata of a stored object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectHead {
    pub key: String,
    /// Content fingerprint as returned by the store (may be quoted)
    pub etag: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// One entry of an object listing page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub key: String,
    pub etag: Option<String>,
    pub size: u64,
}

/// One page of an object listing
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub objects: Vec<ObjectSummary>,
    /// Token for the next page; `None` when the listing is exhausted
    pub next_token: Option<String>,
}

/// Outcome of a single-object sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Copied to a destination that had no such key
    Synced,
    /// Overwrote a destination object with different content
    Updated,
    /// Destination already matched
    Skipped,
    Failed,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Synced => "synced",
            SyncOutcome::Updated => "updated",
            SyncOutcome::Skipped => "skipped",
            SyncOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure classification carried next to the error text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    SourceNotFound,
    AccessDenied,
    DestinationUnavailable,
    TransferFailure,
    MetadataAnnotation,
    ListingFailure,
    StoreError,
    Cancelled,
    Config,
}

/// Result of syncing one object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub status: SyncOutcome,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
}

impl SyncResult {
    pub fn success(status: SyncOutcome, key: impl Into<String>) -> Self {
        Self {
            status,
            key: key.into(),
            error: None,
            error_kind: None,
        }
    }

    pub fn failed(key: impl Into<String>, error: &crate::error::SyncError) -> Self {
        Self {
            status: SyncOutcome::Failed,
            key: key.into(),
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == SyncOutcome::Failed
    }
}

/// A file that failed within a bucket sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedFile {
    pub key: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
}

/// Aggregated result of syncing one bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketSyncSummary {
    pub bucket: String,
    pub destination_bucket: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    pub files_synced: u64,
    pub files_updated: u64,
    pub files_skipped: u64,
    pub failed_files: Vec<FailedFile>,
    /// Bucket-level failure (readiness or listing)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
}

impl BucketSyncSummary {
    pub fn new(bucket: impl Into<String>, destination_bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            destination_bucket: destination_bucket.into(),
            prefix: None,
            files_synced: 0,
            files_updated: 0,
            files_skipped: 0,
            failed_files: Vec::new(),
            error: None,
            error_kind: None,
        }
    }

    /// Fold a single-object result into the running counts
    pub fn record(&mut self, result: SyncResult) {
        match result.status {
            SyncOutcome::Synced => self.files_synced += 1,
            SyncOutcome::Updated => self.files_updated += 1,
            SyncOutcome::Skipped => self.files_skipped += 1,
            SyncOutcome::Failed => self.failed_files.push(FailedFile {
                key: result.key,
                error: result.error.unwrap_or_else(|| "Unknown error".to_string()),
                error_kind: result.error_kind,
            }),
        }
    }

    /// Record a bucket-level failure
    pub fn set_error(&mut self, error: &crate::error::SyncError) {
        self.error = Some(error.to_string());
        self.error_kind = Some(error.kind());
    }

    /// Number of objects that finished without failure
    pub fn succeeded(&self) -> u64 {
        self.files_synced + self.files_updated + self.files_skipped
    }

    pub fn has_failures(&self) -> bool {
        self.error.is_some() || !self.failed_files.is_empty()
    }
}

/// A bucket that failed, wholly or partially, within a fleet sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedBucket {
    pub bucket: String,
    pub error: String,
}

/// Aggregated result of syncing every source bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetSyncSummary {
    pub total_buckets_scanned: u64,
    pub total_files_synced: u64,
    pub total_files_updated: u64,
    pub total_files_skipped: u64,
    pub failed_buckets: Vec<FailedBucket>,
    pub bucket_summaries: Vec<BucketSyncSummary>,
}

impl FleetSyncSummary {
    /// Fold a bucket summary into the fleet totals
    pub fn record(&mut self, summary: BucketSyncSummary) {
        self.total_files_synced += summary.files_synced;
        self.total_files_updated += summary.files_updated;
        self.total_files_skipped += summary.files_skipped;

        if let Some(ref error) = summary.error {
            self.failed_buckets.push(FailedBucket {
                bucket: summary.bucket.clone(),
                error: error.clone(),
            });
        } else if !summary.failed_files.is_empty() {
            self.failed_buckets.push(FailedBucket {
                bucket: summary.bucket.clone(),
                error: format!("{} file(s) failed to sync", summary.failed_files.len()),
            });
        }

        self.bucket_summaries.push(summary);
    }
}

/// Sync state of one object as read from its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatusView {
    pub bucket: String,
    pub key: String,
    pub synced: SyncStatus,
    pub last_synced: Option<String>,
    pub aws_bucket: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreError, SyncError};

    #[test]
    fn test_sync_status_roundtrip_strings() {
        assert_eq!(SyncStatus::from_metadata_value("pending"), SyncStatus::Pending);
        assert_eq!(SyncStatus::from_metadata_value("true"), SyncStatus::Synced);
        assert_eq!(SyncStatus::from_metadata_value("False"), SyncStatus::NotSynced);
        assert_eq!(SyncStatus::from_metadata_value("yes"), SyncStatus::NotSynced);
        assert_eq!(SyncStatus::Synced.to_string(), "true");
    }

    #[test]
    fn test_sync_status_serde_matches_metadata() {
        let json = serde_json::to_string(&SyncStatus::Pending).unwrap();
        assert_eq!(json, "\"pending\"");
        let json = serde_json::to_string(&SyncStatus::Synced).unwrap();
        assert_eq!(json, "\"true\"");
    }

    #[test]
    fn test_bucket_summary_record() {
        let mut summary = BucketSyncSummary::new("docs", "docs");
        summary.record(SyncResult::success(SyncOutcome::Synced, "a.txt"));
        summary.record(SyncResult::success(SyncOutcome::Skipped, "b.txt"));
        summary.record(SyncResult::success(SyncOutcome::Updated, "c.txt"));
        summary.record(SyncResult::failed(
            "d.txt",
            &SyncError::Store(StoreError::unavailable("reset")),
        ));

        assert_eq!(summary.files_synced, 1);
        assert_eq!(summary.files_skipped, 1);
        assert_eq!(summary.files_updated, 1);
        assert_eq!(summary.succeeded(), 3);
        assert_eq!(summary.failed_files.len(), 1);
        assert_eq!(summary.failed_files[0].key, "d.txt");
        assert!(summary.has_failures());
    }

    #[test]
    fn test_fleet_records_partial_bucket_failure() {
        let mut fleet = FleetSyncSummary::default();

        let mut ok = BucketSyncSummary::new("a", "a");
        ok.files_synced = 2;
        fleet.record(ok);

        let mut partial = BucketSyncSummary::new("b", "b");
        partial.files_skipped = 1;
        partial.failed_files.push(FailedFile {
            key: "x".to_string(),
            error: "boom".to_string(),
            error_kind: None,
        });
        fleet.record(partial);

        assert_eq!(fleet.total_files_synced, 2);
        assert_eq!(fleet.total_files_skipped, 1);
        assert_eq!(fleet.failed_buckets.len(), 1);
        assert_eq!(fleet.failed_buckets[0].error, "1 file(s) failed to sync");
        assert_eq!(fleet.bucket_summaries.len(), 2);
    }

    #[test]
    fn test_result_serialization_omits_empty_error() {
        let value = serde_json::to_value(SyncResult::success(SyncOutcome::Skipped, "k")).unwrap();
        assert_eq!(value, serde_json::json!({"status": "skipped", "key": "k"}));
    }
}
