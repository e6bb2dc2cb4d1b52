//! Object store abstraction
//!
//! The sync engine talks to both sides exclusively through [`ObjectStore`].
//! Two implementations ship with the crate:
//! - [`InMemoryStore`]: process-local buckets with fault injection
//! - `S3Store`: any S3-compatible API via `aws-sdk-s3` (requires the `s3` feature)
//!
//! # Feature Flags
//!
//! - `s3`: Enables the S3/MinIO backend

mod memory;
#[cfg(feature = "s3")]
mod s3;

pub use memory::{Fault, InMemoryStore, StoreOp};
#[cfg(feature = "s3")]
pub use s3::{classify_error, S3Store};

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::error::StoreResult;
use crate::types::{Metadata, ObjectHead, ObjectPage};

/// Streaming object body
pub type ObjectBody = Pin<Box<dyn Stream<Item = StoreResult<Bytes>> + Send>>;

/// Attributes written alongside an object body
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub metadata: Metadata,
}

/// Capability set of an S3-compatible object store
///
/// All methods take `&self`; implementations must be safe to share across
/// concurrent sync invocations. Timeouts, retries and connection pooling are
/// the implementation's responsibility.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short label used in logs
    fn name(&self) -> &str;

    /// Succeeds if the bucket exists and is accessible
    async fn head_bucket(&self, bucket: &str) -> StoreResult<()>;

    async fn create_bucket(&self, bucket: &str) -> StoreResult<()>;

    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectHead>;

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectBody>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ObjectBody,
        options: PutOptions,
    ) -> StoreResult<()>;

    /// Same-object copy that only replaces the user metadata
    async fn replace_metadata(
        &self,
        bucket: &str,
        key: &str,
        metadata: &Metadata,
        content_type: Option<&str>,
    ) -> StoreResult<()>;

    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation_token: Option<String>,
        page_size: Option<i32>,
    ) -> StoreResult<ObjectPage>;

    async fn list_buckets(&self) -> StoreResult<Vec<String>>;
}

/// Wrap an in-memory buffer as a single-chunk body
pub fn body_from_bytes(data: impl Into<Bytes>) -> ObjectBody {
    let data = data.into();
    Box::pin(futures::stream::once(async move { Ok(data) }))
}

/// Drain a body into one contiguous buffer
pub async fn collect_body(mut body: ObjectBody) -> StoreResult<Vec<u8>> {
    let mut buffer = Vec::new();
    while let Some(chunk) = body.next().await {
        buffer.extend_from_slice(&chunk?);
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[tokio::test]
    async fn test_collect_body_concatenates_chunks() {
        let body: ObjectBody = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ]));
        assert_eq!(collect_body(body).await.unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_collect_body_propagates_errors() {
        let body: ObjectBody = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(StoreError::unavailable("connection reset")),
        ]));
        let err = collect_body(body).await.unwrap_err();
        assert_eq!(err.message, "connection reset");
    }
}
