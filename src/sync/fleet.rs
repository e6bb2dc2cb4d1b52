//! Fleet sync: every bucket on the source store

use super::SyncEngine;
use crate::config::BucketNaming;
use crate::error::{Result, SyncError};
use crate::types::FleetSyncSummary;

impl SyncEngine {
    /// Sync all source buckets, mapping each to a destination via `naming`.
    ///
    /// Failing to list buckets is fatal and returns `Err`; per-bucket failures
    /// are recorded in `failed_buckets` and do not stop the run.
    pub async fn sync_fleet(&self, naming: &BucketNaming) -> Result<FleetSyncSummary> {
        tracing::info!("Starting full sync of all buckets...");

        let buckets = self.source.list_buckets().await.map_err(|e| {
            let err = SyncError::Listing {
                scope: "source buckets".to_string(),
                source: e,
            };
            tracing::error!("FATAL: {}. Aborting sync.", err);
            err
        })?;

        let mut summary = FleetSyncSummary {
            total_buckets_scanned: buckets.len() as u64,
            ..Default::default()
        };

        for bucket in buckets {
            if self.is_cancelled() {
                tracing::warn!(
                    "Fleet sync cancelled after {} of {} buckets",
                    summary.bucket_summaries.len(),
                    summary.total_buckets_scanned
                );
                break;
            }

            let dest_bucket = naming.destination_for(&bucket);
            let bucket_summary = self.sync_bucket(&bucket, Some(&dest_bucket), None).await;
            summary.record(bucket_summary);
        }

        if !summary.failed_buckets.is_empty() {
            tracing::warn!(
                "Sync completed with failures. Failed buckets: {}",
                summary.failed_buckets.len()
            );
        }
        tracing::info!(
            "Full sync of all buckets complete: scanned={} synced={} updated={} skipped={}",
            summary.total_buckets_scanned,
            summary.total_files_synced,
            summary.total_files_updated,
            summary.total_files_skipped
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::SyncOptions;
    use crate::error::StoreError;
    use crate::store::{Fault, InMemoryStore, StoreOp};
    use crate::types::{FailureKind, Metadata};

    fn setup() -> (Arc<InMemoryStore>, Arc<InMemoryStore>, SyncEngine) {
        let source = Arc::new(InMemoryStore::new("minio"));
        let destination = Arc::new(InMemoryStore::new("aws"));
        let engine = SyncEngine::new(source.clone(), destination.clone()).with_options(SyncOptions {
            annotate_skips_in_background: false,
            ..Default::default()
        });
        (source, destination, engine)
    }

    #[tokio::test]
    async fn test_bucket_listing_failure_is_fatal() {
        let (source, _, engine) = setup();
        source.add_bucket("docs");
        source.inject(Fault::new(StoreOp::ListBuckets, StoreError::unavailable("down")));

        let err = engine.sync_fleet(&BucketNaming::default()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::ListingFailure);
    }

    #[tokio::test]
    async fn test_suffix_naming_and_failed_buckets() {
        let (source, destination, engine) = setup();
        source.insert_object("docs", "a.txt", "a", Metadata::new());
        source.insert_object("media", "b.png", "b", Metadata::new());
        destination.inject(
            Fault::new(StoreOp::PutObject, StoreError::unavailable("reset")).bucket("media-backup"),
        );

        let summary = engine
            .sync_fleet(&BucketNaming::with_suffix("-backup"))
            .await
            .unwrap();

        assert_eq!(summary.total_buckets_scanned, 2);
        assert_eq!(summary.total_files_synced, 1);
        assert!(destination.object_data("docs-backup", "a.txt").is_some());
        assert_eq!(summary.failed_buckets.len(), 1);
        assert_eq!(summary.failed_buckets[0].bucket, "media");
        assert_eq!(summary.failed_buckets[0].error, "1 file(s) failed to sync");
    }

    #[tokio::test]
    async fn test_cancelled_fleet_stops_before_next_bucket() {
        let (source, _, engine) = setup();
        source.add_bucket("a");
        source.add_bucket("b");
        engine.cancel();

        let summary = engine.sync_fleet(&BucketNaming::default()).await.unwrap();
        assert_eq!(summary.total_buckets_scanned, 2);
        assert!(summary.bucket_summaries.is_empty());
    }
}
