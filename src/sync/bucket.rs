//! Whole-bucket sync

use futures::StreamExt;

use super::SyncEngine;
use crate::error::SyncError;
use crate::types::{BucketSyncSummary, SyncResult};

impl SyncEngine {
    /// Sync every object in `bucket` (optionally under `prefix`) to
    /// `dest_bucket`, which defaults to the source bucket name.
    ///
    /// Object failures are collected in the summary; readiness and listing
    /// failures end the run and land in `summary.error`.
    pub async fn sync_bucket(
        &self,
        bucket: &str,
        dest_bucket: Option<&str>,
        prefix: Option<&str>,
    ) -> BucketSyncSummary {
        let dest_bucket = dest_bucket.unwrap_or(bucket);
        tracing::info!(
            "Starting sync for bucket '{}' -> '{}' (prefix: {})",
            bucket,
            dest_bucket,
            prefix.unwrap_or("<none>")
        );

        let mut summary = BucketSyncSummary::new(bucket, dest_bucket);
        summary.prefix = prefix.map(String::from);

        if let Err(e) = self.prepare_buckets(bucket, dest_bucket).await {
            tracing::error!("Bucket readiness check failed for '{}': {}", bucket, e);
            summary.set_error(&e);
            return summary;
        }

        let mut token: Option<String> = None;
        loop {
            if self.is_cancelled() {
                tracing::warn!("Sync of bucket '{}' cancelled", bucket);
                summary.set_error(&SyncError::Cancelled);
                break;
            }

            let page = match self
                .source
                .list_objects_page(bucket, prefix, token.take(), self.options.page_size)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    let err = SyncError::Listing {
                        scope: format!("objects in source bucket '{}'", bucket),
                        source: e,
                    };
                    tracing::error!("{}", err);
                    summary.set_error(&err);
                    break;
                }
            };

            let keys: Vec<String> = page.objects.into_iter().map(|o| o.key).collect();
            for result in self.sync_keys(bucket, dest_bucket, keys).await {
                tracing::debug!(
                    "{} object '{}' in bucket '{}'",
                    result.status,
                    result.key,
                    bucket
                );
                summary.record(result);
            }

            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        if self.is_cancelled() && summary.error.is_none() {
            summary.set_error(&SyncError::Cancelled);
        }

        tracing::info!(
            "Sync complete for bucket '{}': synced={} updated={} skipped={} failed={}{}",
            bucket,
            summary.files_synced,
            summary.files_updated,
            summary.files_skipped,
            summary.failed_files.len(),
            summary
                .error
                .as_ref()
                .map(|e| format!(" error={}", e))
                .unwrap_or_default()
        );
        summary
    }

    async fn prepare_buckets(&self, bucket: &str, dest_bucket: &str) -> crate::error::Result<()> {
        self.check_source_bucket(bucket).await?;
        self.ensure_destination_bucket(dest_bucket).await
    }

    /// Sync one listing page worth of keys, stopping early on cancellation
    async fn sync_keys(&self, bucket: &str, dest_bucket: &str, keys: Vec<String>) -> Vec<SyncResult> {
        let concurrency = self.options.concurrency.max(1);

        if concurrency == 1 {
            let mut results = Vec::with_capacity(keys.len());
            for key in keys {
                if self.is_cancelled() {
                    break;
                }
                results.push(self.sync_object(bucket, dest_bucket, &key).await);
            }
            return results;
        }

        futures::stream::iter(keys)
            .map(|key| async move {
                if self.is_cancelled() {
                    return None;
                }
                Some(self.sync_object(bucket, dest_bucket, &key).await)
            })
            .buffer_unordered(concurrency)
            .filter_map(|result| async move { result })
            .collect::<Vec<_>>()
            .await
    }
}
