//! Single-object sync
//!
//! Per attempt the object moves through
//! `start -> source checked -> destination checked`, then either `skipped`
//! or `pending marked -> copying -> copied and annotated`. Store failures
//! never escape: every attempt ends in a [`SyncResult`].
//!
//! Not transactional. A crash between the copy and the final annotation
//! leaves correct destination content with the source stuck at `pending`;
//! a retry is safe because matching fingerprints turn it into a skip.

use chrono::Utc;

use super::compare::{fetch_head, fingerprints_match, is_multipart_etag};
use super::metadata::{annotate, write_metadata, write_status};
use super::SyncEngine;
use crate::error::{Result, SyncError};
use crate::store::PutOptions;
use crate::types::{Metadata, ObjectHead, SyncOutcome, SyncResult, SyncStatus};

impl SyncEngine {
    /// Sync one key from `source_bucket` to `dest_bucket`
    pub async fn sync_object(&self, source_bucket: &str, dest_bucket: &str, key: &str) -> SyncResult {
        tracing::info!(
            "Attempting to sync single file: '{}' from '{}' to '{}'",
            key,
            source_bucket,
            dest_bucket
        );

        let mut source_head = None;
        match self
            .run_object_sync(source_bucket, dest_bucket, key, &mut source_head)
            .await
        {
            Ok(outcome) => {
                tracing::info!("Successfully {}: {}", outcome, key);
                SyncResult::success(outcome, key)
            }
            Err(e) => {
                tracing::error!("Error during single file sync for '{}': {}", key, e);
                // Without a source head there is no metadata to merge with,
                // and writing a partial map would drop keys.
                if let Some(head) = source_head {
                    write_status(
                        self.source.as_ref(),
                        source_bucket,
                        &head,
                        SyncStatus::NotSynced,
                        Utc::now(),
                        dest_bucket,
                        &Metadata::new(),
                    )
                    .await;
                }
                SyncResult::failed(key, &e)
            }
        }
    }

    async fn run_object_sync(
        &self,
        source_bucket: &str,
        dest_bucket: &str,
        key: &str,
        source_head: &mut Option<ObjectHead>,
    ) -> Result<SyncOutcome> {
        if self.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let source = fetch_head(self.source.as_ref(), source_bucket, key)
            .await
            .map_err(|e| SyncError::HeadFailed {
                bucket: source_bucket.to_string(),
                key: key.to_string(),
                source: e,
            })?
            .ok_or_else(|| SyncError::SourceObjectNotFound {
                bucket: source_bucket.to_string(),
                key: key.to_string(),
            })?;
        let source: &ObjectHead = source_head.insert(source);

        self.ensure_destination_bucket(dest_bucket).await?;

        let existing = fetch_head(self.destination.as_ref(), dest_bucket, key)
            .await
            .map_err(|e| SyncError::HeadFailed {
                bucket: dest_bucket.to_string(),
                key: key.to_string(),
                source: e,
            })?;

        if fingerprints_match(Some(source), existing.as_ref()) {
            tracing::info!("Skipped: '{}' is already up to date in destination.", key);
            self.annotate_skip(source_bucket, dest_bucket, source.clone()).await;
            return Ok(SyncOutcome::Skipped);
        }

        if let Some(ref existing) = existing {
            if is_multipart_etag(&existing.etag) || is_multipart_etag(&source.etag) {
                tracing::debug!(
                    "Fingerprint mismatch for '{}' involves a multipart ETag; content may be identical",
                    key
                );
            }
        }

        write_status(
            self.source.as_ref(),
            source_bucket,
            source,
            SyncStatus::Pending,
            Utc::now(),
            dest_bucket,
            &Metadata::new(),
        )
        .await;

        let synced_at = Utc::now();
        let final_metadata = annotate(
            &source.metadata,
            SyncStatus::Synced,
            synced_at,
            dest_bucket,
            &Metadata::new(),
        );

        let body = self
            .source
            .get_object(source_bucket, key)
            .await
            .map_err(|e| SyncError::TransferFailure {
                key: key.to_string(),
                source: e,
            })?;
        self.destination
            .put_object(
                dest_bucket,
                key,
                body,
                PutOptions {
                    content_type: source.content_type.clone(),
                    content_length: Some(source.size),
                    metadata: final_metadata.clone(),
                },
            )
            .await
            .map_err(|e| SyncError::TransferFailure {
                key: key.to_string(),
                source: e,
            })?;

        write_metadata(self.source.as_ref(), source_bucket, source, &final_metadata).await;

        Ok(if existing.is_some() {
            SyncOutcome::Updated
        } else {
            SyncOutcome::Synced
        })
    }

    /// Record `synced=true` on a skipped source object
    async fn annotate_skip(&self, source_bucket: &str, dest_bucket: &str, head: ObjectHead) {
        let timestamp = Utc::now();
        if self.options.annotate_skips_in_background {
            let store = self.source.clone();
            let source_bucket = source_bucket.to_string();
            let dest_bucket = dest_bucket.to_string();
            self.spawn_background(async move {
                write_status(
                    store.as_ref(),
                    &source_bucket,
                    &head,
                    SyncStatus::Synced,
                    timestamp,
                    &dest_bucket,
                    &Metadata::new(),
                )
                .await;
            });
        } else {
            write_status(
                self.source.as_ref(),
                source_bucket,
                &head,
                SyncStatus::Synced,
                timestamp,
                dest_bucket,
                &Metadata::new(),
            )
            .await;
        }
    }
}
