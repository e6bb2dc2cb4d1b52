//! Sync engine handle shared by every sync layer

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SyncOptions;
use crate::error::{Result, SyncError};
use crate::store::ObjectStore;

/// Cross-store sync engine
///
/// Holds the two long-lived store handles and nothing else that outlives a
/// call: summaries and counters are local to each sync invocation. Cloning is
/// cheap and clones share the stores, the cancellation token and the set of
/// detached annotation tasks.
#[derive(Clone)]
pub struct SyncEngine {
    pub(crate) source: Arc<dyn ObjectStore>,
    pub(crate) destination: Arc<dyn ObjectStore>,
    pub(crate) options: SyncOptions,
    pub(crate) cancel: CancellationToken,
    background: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl SyncEngine {
    pub fn new(source: Arc<dyn ObjectStore>, destination: Arc<dyn ObjectStore>) -> Self {
        Self {
            source,
            destination,
            options: SyncOptions::default(),
            cancel: CancellationToken::new(),
            background: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn source(&self) -> &Arc<dyn ObjectStore> {
        &self.source
    }

    pub fn destination(&self) -> &Arc<dyn ObjectStore> {
        &self.destination
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop iterating at the next object or bucket boundary
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for every detached annotation task started so far
    pub async fn drain_background(&self) {
        let handles: Vec<_> = std::mem::take(&mut *self.background.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("Background annotation task failed: {}", e);
            }
        }
    }

    pub(crate) fn spawn_background<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        let mut handles = self.background.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Make sure a destination bucket exists, creating it when absent
    pub(crate) async fn ensure_destination_bucket(&self, bucket: &str) -> Result<()> {
        match self.destination.head_bucket(bucket).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => match self.destination.create_bucket(bucket).await {
                Ok(()) => {
                    tracing::info!(
                        "Created destination bucket '{}' on {}",
                        bucket,
                        self.destination.name()
                    );
                    Ok(())
                }
                // lost a creation race with a concurrent sync
                Err(e) if e.code == "BucketAlreadyOwnedByYou" => Ok(()),
                Err(e) => {
                    tracing::error!("Failed to create bucket '{}': {}", bucket, e);
                    Err(SyncError::DestinationUnavailable {
                        bucket: bucket.to_string(),
                        source: e,
                    })
                }
            },
            Err(e) => {
                tracing::error!("Failed to access bucket '{}': {}", bucket, e);
                Err(SyncError::DestinationUnavailable {
                    bucket: bucket.to_string(),
                    source: e,
                })
            }
        }
    }

    /// Verify the source bucket exists
    pub(crate) async fn check_source_bucket(&self, bucket: &str) -> Result<()> {
        match self.source.head_bucket(bucket).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Err(SyncError::SourceBucketNotFound(bucket.to_string())),
            Err(e) => Err(SyncError::SourceUnavailable {
                bucket: bucket.to_string(),
                source: e,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::{Fault, InMemoryStore, StoreOp};
    use crate::types::FailureKind;

    fn engine() -> (Arc<InMemoryStore>, Arc<InMemoryStore>, SyncEngine) {
        let source = Arc::new(InMemoryStore::new("minio"));
        let destination = Arc::new(InMemoryStore::new("aws"));
        let engine = SyncEngine::new(source.clone(), destination.clone());
        (source, destination, engine)
    }

    #[tokio::test]
    async fn test_ensure_destination_creates_missing_bucket() {
        let (_, destination, engine) = engine();
        engine.ensure_destination_bucket("backup").await.unwrap();
        assert!(destination.has_bucket("backup"));

        // second call only heads the bucket
        engine.ensure_destination_bucket("backup").await.unwrap();
        assert_eq!(destination.call_count(StoreOp::CreateBucket), 1);
    }

    #[tokio::test]
    async fn test_ensure_destination_reports_access_errors() {
        let (_, destination, engine) = engine();
        destination.inject(Fault::new(
            StoreOp::HeadBucket,
            StoreError::unavailable("connection refused"),
        ));

        let err = engine.ensure_destination_bucket("backup").await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::DestinationUnavailable);
        assert_eq!(destination.call_count(StoreOp::CreateBucket), 0);
    }

    #[tokio::test]
    async fn test_check_source_bucket() {
        let (source, _, engine) = engine();
        source.add_bucket("docs");
        assert!(engine.check_source_bucket("docs").await.is_ok());

        let err = engine.check_source_bucket("missing").await.unwrap_err();
        assert!(matches!(err, SyncError::SourceBucketNotFound(_)));
    }

    #[tokio::test]
    async fn test_cancel_is_shared_between_clones() {
        let (_, _, engine) = engine();
        let clone = engine.clone();
        clone.cancel();
        assert!(engine.is_cancelled());
    }
}
