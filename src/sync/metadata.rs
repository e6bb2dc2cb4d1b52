//! Sync-state metadata codec
//!
//! The sync state of a source object lives in its own user metadata:
//! `synced` (`pending`/`true`/`false`), `last_synced` (RFC 3339 or empty)
//! and `aws_bucket` (destination bucket or empty). Writes go through a
//! same-object metadata replace and always carry every key already present.

use chrono::{DateTime, Utc};

use super::SyncEngine;
use crate::error::{Result, StoreResult, SyncError};
use crate::store::ObjectStore;
use crate::types::{Metadata, ObjectHead, SyncStatus, SyncStatusView};

pub const SYNCED_KEY: &str = "synced";
pub const LAST_SYNCED_KEY: &str = "last_synced";
pub const AWS_BUCKET_KEY: &str = "aws_bucket";

/// Sync status recorded on an object; missing key reads as not synced
pub fn read_status(head: &ObjectHead) -> SyncStatus {
    head.metadata
        .get(SYNCED_KEY)
        .map(|v| SyncStatus::from_metadata_value(v))
        .unwrap_or_default()
}

/// Sync status from a head lookup.
///
/// An absent object reads as not synced; the two conditions are
/// indistinguishable at this layer.
pub fn status_from_head(head: StoreResult<ObjectHead>) -> StoreResult<SyncStatus> {
    match head {
        Ok(head) => Ok(read_status(&head)),
        Err(e) if e.is_not_found() => Ok(SyncStatus::NotSynced),
        Err(e) => Err(e),
    }
}

/// Metadata for a freshly uploaded object that has never been synced
pub fn initial_metadata(mut metadata: Metadata) -> Metadata {
    metadata.insert(SYNCED_KEY.to_string(), SyncStatus::NotSynced.to_string());
    metadata.insert(LAST_SYNCED_KEY.to_string(), String::new());
    metadata.insert(AWS_BUCKET_KEY.to_string(), String::new());
    metadata
}

/// Merge sync-state keys (and any `extra` keys) over existing metadata
pub fn annotate(
    existing: &Metadata,
    status: SyncStatus,
    timestamp: DateTime<Utc>,
    dest_bucket: &str,
    extra: &Metadata,
) -> Metadata {
    let mut merged = existing.clone();
    merged.insert(SYNCED_KEY.to_string(), status.to_string());
    merged.insert(LAST_SYNCED_KEY.to_string(), timestamp.to_rfc3339());
    merged.insert(AWS_BUCKET_KEY.to_string(), dest_bucket.to_string());
    for (key, value) in extra {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Best-effort metadata write; failures are logged and swallowed.
///
/// Returns whether the write landed.
pub async fn write_status(
    store: &dyn ObjectStore,
    bucket: &str,
    head: &ObjectHead,
    status: SyncStatus,
    timestamp: DateTime<Utc>,
    dest_bucket: &str,
    extra: &Metadata,
) -> bool {
    let metadata = annotate(&head.metadata, status, timestamp, dest_bucket, extra);
    match try_replace(store, bucket, head, &metadata).await {
        Ok(()) => {
            tracing::debug!("Annotated {}/{} as synced={}", bucket, head.key, status);
            true
        }
        Err(e) => {
            tracing::warn!("{}", e);
            false
        }
    }
}

/// Replace an object's metadata with a fully merged map
pub async fn write_metadata(
    store: &dyn ObjectStore,
    bucket: &str,
    head: &ObjectHead,
    metadata: &Metadata,
) -> bool {
    match try_replace(store, bucket, head, metadata).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("{}", e);
            false
        }
    }
}

async fn try_replace(
    store: &dyn ObjectStore,
    bucket: &str,
    head: &ObjectHead,
    metadata: &Metadata,
) -> Result<()> {
    store
        .replace_metadata(bucket, &head.key, metadata, head.content_type.as_deref())
        .await
        .map_err(|e| SyncError::MetadataAnnotation {
            bucket: bucket.to_string(),
            key: head.key.clone(),
            source: e,
        })
}

impl SyncEngine {
    /// Read the sync state recorded on a source object
    pub async fn sync_status(&self, bucket: &str, key: &str) -> Result<SyncStatusView> {
        let head = match self.source.head_object(bucket, key).await {
            Ok(head) => Some(head),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                return Err(SyncError::HeadFailed {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    source: e,
                })
            }
        };

        let non_empty = |k: &str| {
            head.as_ref()
                .and_then(|h| h.metadata.get(k))
                .filter(|v| !v.is_empty())
                .cloned()
        };

        Ok(SyncStatusView {
            bucket: bucket.to_string(),
            key: key.to_string(),
            synced: head.as_ref().map(read_status).unwrap_or_default(),
            last_synced: non_empty(LAST_SYNCED_KEY),
            aws_bucket: non_empty(AWS_BUCKET_KEY),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::{Fault, InMemoryStore, StoreOp};

    fn head_with(metadata: Metadata) -> ObjectHead {
        ObjectHead {
            key: "report.pdf".to_string(),
            etag: "\"abc\"".to_string(),
            size: 3,
            content_type: Some("application/pdf".to_string()),
            last_modified: None,
            metadata,
        }
    }

    fn app_metadata() -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("user_id".to_string(), "42".to_string());
        metadata.insert("bucket".to_string(), "docs".to_string());
        metadata
    }

    #[test]
    fn test_read_status_defaults_to_not_synced() {
        assert_eq!(read_status(&head_with(Metadata::new())), SyncStatus::NotSynced);

        let mut metadata = Metadata::new();
        metadata.insert(SYNCED_KEY.to_string(), "pending".to_string());
        assert_eq!(read_status(&head_with(metadata)), SyncStatus::Pending);
    }

    #[test]
    fn test_status_from_head_conflates_absent_with_not_synced() {
        let absent = Err(StoreError::not_found("NoSuchKey", "gone"));
        assert_eq!(status_from_head(absent).unwrap(), SyncStatus::NotSynced);

        let broken = Err(StoreError::unavailable("down"));
        assert!(status_from_head(broken).is_err());
    }

    #[test]
    fn test_annotate_preserves_unrelated_keys() {
        let now = Utc::now();
        let merged = annotate(&app_metadata(), SyncStatus::Synced, now, "backup", &Metadata::new());

        assert_eq!(merged.get("user_id").map(String::as_str), Some("42"));
        assert_eq!(merged.get("bucket").map(String::as_str), Some("docs"));
        assert_eq!(merged.get(SYNCED_KEY).map(String::as_str), Some("true"));
        assert_eq!(merged.get(AWS_BUCKET_KEY).map(String::as_str), Some("backup"));
        assert_eq!(merged.get(LAST_SYNCED_KEY), Some(&now.to_rfc3339()));
    }

    #[test]
    fn test_annotate_extra_keys_win() {
        let mut extra = Metadata::new();
        extra.insert("sync_error".to_string(), "timeout".to_string());
        let merged = annotate(&app_metadata(), SyncStatus::NotSynced, Utc::now(), "b", &extra);
        assert_eq!(merged.get("sync_error").map(String::as_str), Some("timeout"));
        assert_eq!(merged.len(), 6);
    }

    #[test]
    fn test_initial_metadata() {
        let metadata = initial_metadata(app_metadata());
        assert_eq!(metadata.get(SYNCED_KEY).map(String::as_str), Some("false"));
        assert_eq!(metadata.get(LAST_SYNCED_KEY).map(String::as_str), Some(""));
        assert_eq!(metadata.get("user_id").map(String::as_str), Some("42"));
    }

    #[tokio::test]
    async fn test_write_status_swallows_failures() {
        let store = InMemoryStore::new("minio");
        store.insert_object("docs", "report.pdf", "abc", app_metadata());
        store.inject(Fault::new(
            StoreOp::ReplaceMetadata,
            StoreError::unavailable("read-only"),
        ));

        let head = head_with(app_metadata());
        let ok = write_status(&store, "docs", &head, SyncStatus::Pending, Utc::now(), "b", &Metadata::new()).await;
        assert!(!ok);
        assert_eq!(store.object_metadata("docs", "report.pdf").unwrap(), app_metadata());
    }
}
