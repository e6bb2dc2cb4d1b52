//! Fingerprint comparison between source and destination objects
//!
//! Fingerprints are ETags. Equal ETags are taken to mean equal content. This
//! is a heuristic: objects uploaded in parts carry `<hash>-<parts>` ETags that
//! are not content hashes, so the same bytes uploaded differently compare as
//! different and get copied again.

use super::SyncEngine;
use crate::error::{Result, StoreResult, SyncError};
use crate::store::ObjectStore;
use crate::types::ObjectHead;

/// Strip surrounding whitespace and quote characters from an ETag
pub fn normalize_etag(etag: &str) -> &str {
    etag.trim().trim_matches('"')
}

/// Whether an ETag was produced by a multipart upload
pub fn is_multipart_etag(etag: &str) -> bool {
    normalize_etag(etag).contains('-')
}

/// True iff both objects exist and carry the same non-empty fingerprint
pub fn fingerprints_match(source: Option<&ObjectHead>, destination: Option<&ObjectHead>) -> bool {
    match (source, destination) {
        (Some(src), Some(dst)) => {
            let src = normalize_etag(&src.etag);
            !src.is_empty() && src == normalize_etag(&dst.etag)
        }
        _ => false,
    }
}

/// Head an object, mapping "not found" to `None`; other failures propagate
pub async fn fetch_head(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
) -> StoreResult<Option<ObjectHead>> {
    match store.head_object(bucket, key).await {
        Ok(head) => Ok(Some(head)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

impl SyncEngine {
    /// Compare live fingerprints of `key` on both stores.
    ///
    /// Absence on either side means "not synced".
    pub async fn is_synced_via_fingerprint(
        &self,
        source_bucket: &str,
        dest_bucket: &str,
        key: &str,
    ) -> Result<bool> {
        let source = fetch_head(self.source.as_ref(), source_bucket, key)
            .await
            .map_err(|e| SyncError::HeadFailed {
                bucket: source_bucket.to_string(),
                key: key.to_string(),
                source: e,
            })?;
        if source.is_none() {
            return Ok(false);
        }

        let destination = fetch_head(self.destination.as_ref(), dest_bucket, key)
            .await
            .map_err(|e| SyncError::HeadFailed {
                bucket: dest_bucket.to_string(),
                key: key.to_string(),
                source: e,
            })?;

        Ok(fingerprints_match(source.as_ref(), destination.as_ref()))
    }
}
