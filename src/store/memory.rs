//! In-memory object store with fault injection
//!
//! Keeps buckets in ordered maps so listings come back in lexical key order,
//! the same order S3 guarantees. Fingerprints are derived from content only,
//! so a metadata replace leaves the ETag unchanged, as it does on S3 for
//! single-part objects.

use std::collections::BTreeMap;
use std::ops::Bound;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};

use super::{body_from_bytes, collect_body, ObjectBody, ObjectStore, PutOptions};
use crate::error::{StoreError, StoreErrorKind, StoreResult};
use crate::types::{Metadata, ObjectHead, ObjectPage, ObjectSummary};

const DEFAULT_PAGE_SIZE: usize = 1000;

/// Store operations, used to target injected faults and count calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    HeadBucket,
    CreateBucket,
    HeadObject,
    GetObject,
    PutObject,
    ReplaceMetadata,
    ListObjects,
    ListBuckets,
}

/// An injected failure
#[derive(Debug, Clone)]
pub struct Fault {
    op: StoreOp,
    bucket: Option<String>,
    key: Option<String>,
    error: StoreError,
    /// Matching calls let through before the fault starts firing
    skip: usize,
    /// Remaining triggers; `None` fails forever
    remaining: Option<usize>,
}

impl Fault {
    pub fn new(op: StoreOp, error: StoreError) -> Self {
        Self {
            op,
            bucket: None,
            key: None,
            error,
            skip: 0,
            remaining: None,
        }
    }

    /// Only fail calls against this bucket
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Only fail calls against this key
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Fail only the next `n` matching calls
    pub fn times(mut self, n: usize) -> Self {
        self.remaining = Some(n);
        self
    }

    /// Let the first `n` matching calls succeed
    pub fn after(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    fn matches(&self, op: StoreOp, bucket: Option<&str>, key: Option<&str>) -> bool {
        self.op == op
            && self.remaining != Some(0)
            && self.bucket.as_deref().map_or(true, |b| Some(b) == bucket)
            && self.key.as_deref().map_or(true, |k| Some(k) == key)
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    etag: String,
    content_type: Option<String>,
    metadata: Metadata,
    last_modified: DateTime<Utc>,
}

impl StoredObject {
    fn head(&self, key: &str) -> ObjectHead {
        ObjectHead {
            key: key.to_string(),
            etag: self.etag.clone(),
            size: self.data.len() as u64,
            content_type: self.content_type.clone(),
            last_modified: Some(self.last_modified),
            metadata: self.metadata.clone(),
        }
    }
}

type Bucket = BTreeMap<String, StoredObject>;

/// Process-local object store
pub struct InMemoryStore {
    name: String,
    buckets: RwLock<BTreeMap<String, Bucket>>,
    faults: Mutex<Vec<Fault>>,
    calls: DashMap<StoreOp, u64>,
}

impl InMemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buckets: RwLock::new(BTreeMap::new()),
            faults: Mutex::new(Vec::new()),
            calls: DashMap::new(),
        }
    }

    /// Quoted content fingerprint, shaped like an S3 ETag
    pub fn fingerprint(data: &[u8]) -> String {
        let digest = Sha256::digest(data);
        format!("\"{}\"", hex::encode(&digest[..16]))
    }

    /// Create a bucket if it does not exist yet
    pub fn add_bucket(&self, bucket: &str) {
        self.buckets.write().entry(bucket.to_string()).or_default();
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.buckets.read().contains_key(bucket)
    }

    /// Store an object directly, creating the bucket as needed
    pub fn insert_object(&self, bucket: &str, key: &str, data: impl Into<Bytes>, metadata: Metadata) {
        let data = data.into();
        let object = StoredObject {
            etag: Self::fingerprint(&data),
            data,
            content_type: Some("application/octet-stream".to_string()),
            metadata,
            last_modified: Utc::now(),
        };
        self.buckets
            .write()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), object);
    }

    pub fn object_data(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.buckets
            .read()
            .get(bucket)
            .and_then(|b| b.get(key))
            .map(|o| o.data.clone())
    }

    pub fn object_metadata(&self, bucket: &str, key: &str) -> Option<Metadata> {
        self.buckets
            .read()
            .get(bucket)
            .and_then(|b| b.get(key))
            .map(|o| o.metadata.clone())
    }

    pub fn object_etag(&self, bucket: &str, key: &str) -> Option<String> {
        self.buckets
            .read()
            .get(bucket)
            .and_then(|b| b.get(key))
            .map(|o| o.etag.clone())
    }

    pub fn inject(&self, fault: Fault) {
        self.faults.lock().push(fault);
    }

    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// Number of calls made for an operation, including failed ones
    pub fn call_count(&self, op: StoreOp) -> u64 {
        self.calls.get(&op).map(|c| *c).unwrap_or(0)
    }

    fn enter(&self, op: StoreOp, bucket: Option<&str>, key: Option<&str>) -> StoreResult<()> {
        *self.calls.entry(op).or_insert(0) += 1;

        let mut faults = self.faults.lock();
        if let Some(fault) = faults.iter_mut().find(|f| f.matches(op, bucket, key)) {
            if fault.skip > 0 {
                fault.skip -= 1;
                return Ok(());
            }
            if let Some(ref mut remaining) = fault.remaining {
                *remaining -= 1;
            }
            return Err(fault.error.clone());
        }
        Ok(())
    }

    fn no_such_bucket(bucket: &str) -> StoreError {
        StoreError::not_found(
            "NoSuchBucket",
            format!("The specified bucket does not exist: {}", bucket),
        )
    }

    fn no_such_key(key: &str) -> StoreError {
        StoreError::not_found("NoSuchKey", format!("The specified key does not exist: {}", key))
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn head_bucket(&self, bucket: &str) -> StoreResult<()> {
        self.enter(StoreOp::HeadBucket, Some(bucket), None)?;
        if self.has_bucket(bucket) {
            Ok(())
        } else {
            Err(Self::no_such_bucket(bucket))
        }
    }

    async fn create_bucket(&self, bucket: &str) -> StoreResult<()> {
        self.enter(StoreOp::CreateBucket, Some(bucket), None)?;
        let mut buckets = self.buckets.write();
        if buckets.contains_key(bucket) {
            return Err(StoreError::new(
                StoreErrorKind::Other,
                "BucketAlreadyOwnedByYou",
                format!("Bucket already exists: {}", bucket),
            ));
        }
        buckets.insert(bucket.to_string(), Bucket::new());
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectHead> {
        self.enter(StoreOp::HeadObject, Some(bucket), Some(key))?;
        let buckets = self.buckets.read();
        let objects = buckets.get(bucket).ok_or_else(|| Self::no_such_bucket(bucket))?;
        objects
            .get(key)
            .map(|o| o.head(key))
            .ok_or_else(|| Self::no_such_key(key))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectBody> {
        self.enter(StoreOp::GetObject, Some(bucket), Some(key))?;
        let data = {
            let buckets = self.buckets.read();
            let objects = buckets.get(bucket).ok_or_else(|| Self::no_such_bucket(bucket))?;
            objects
                .get(key)
                .map(|o| o.data.clone())
                .ok_or_else(|| Self::no_such_key(key))?
        };
        Ok(body_from_bytes(data))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ObjectBody,
        options: PutOptions,
    ) -> StoreResult<()> {
        self.enter(StoreOp::PutObject, Some(bucket), Some(key))?;
        let data = Bytes::from(collect_body(body).await?);

        let mut buckets = self.buckets.write();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::no_such_bucket(bucket))?;
        objects.insert(
            key.to_string(),
            StoredObject {
                etag: Self::fingerprint(&data),
                data,
                content_type: options.content_type,
                metadata: options.metadata,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn replace_metadata(
        &self,
        bucket: &str,
        key: &str,
        metadata: &Metadata,
        content_type: Option<&str>,
    ) -> StoreResult<()> {
        self.enter(StoreOp::ReplaceMetadata, Some(bucket), Some(key))?;
        let mut buckets = self.buckets.write();
        let object = buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::no_such_bucket(bucket))?
            .get_mut(key)
            .ok_or_else(|| Self::no_such_key(key))?;

        object.metadata = metadata.clone();
        if let Some(content_type) = content_type {
            object.content_type = Some(content_type.to_string());
        }
        object.last_modified = Utc::now();
        Ok(())
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation_token: Option<String>,
        page_size: Option<i32>,
    ) -> StoreResult<ObjectPage> {
        self.enter(StoreOp::ListObjects, Some(bucket), None)?;
        let limit = page_size
            .filter(|n| *n > 0)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        let prefix = prefix.unwrap_or("");

        let buckets = self.buckets.read();
        let objects = buckets.get(bucket).ok_or_else(|| Self::no_such_bucket(bucket))?;

        let lower = match continuation_token {
            Some(ref token) => Bound::Excluded(token.clone()),
            None => Bound::Included(prefix.to_string()),
        };

        let mut page = ObjectPage::default();
        let mut matching = objects
            .range((lower, Bound::Unbounded))
            .filter(|(key, _)| key.starts_with(prefix))
            .peekable();

        while let Some((key, object)) = matching.next() {
            page.objects.push(ObjectSummary {
                key: key.clone(),
                etag: Some(object.etag.clone()),
                size: object.data.len() as u64,
            });
            if page.objects.len() == limit {
                if matching.peek().is_some() {
                    page.next_token = Some(key.clone());
                }
                break;
            }
        }

        Ok(page)
    }

    async fn list_buckets(&self) -> StoreResult<Vec<String>> {
        self.enter(StoreOp::ListBuckets, None, None)?;
        Ok(self.buckets.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listing_paginates_exhaustively() {
        let store = InMemoryStore::new("test");
        for i in 0..7 {
            store.insert_object("b", &format!("k{}", i), vec![i as u8], Metadata::new());
        }

        let mut keys = Vec::new();
        let mut token = None;
        let mut pages = 0;
        loop {
            let page = store.list_objects_page("b", None, token, Some(3)).await.unwrap();
            pages += 1;
            keys.extend(page.objects.into_iter().map(|o| o.key));
            token = page.next_token;
            if token.is_none() {
                break;
            }
        }

        assert_eq!(pages, 3);
        assert_eq!(keys.len(), 7);
        assert_eq!(keys[0], "k0");
        assert_eq!(keys[6], "k6");
    }

    #[tokio::test]
    async fn test_listing_respects_prefix() {
        let store = InMemoryStore::new("test");
        store.insert_object("b", "a/1", "x", Metadata::new());
        store.insert_object("b", "u1/1", "x", Metadata::new());
        store.insert_object("b", "u1/2", "x", Metadata::new());
        store.insert_object("b", "u2/1", "x", Metadata::new());

        let page = store.list_objects_page("b", Some("u1/"), None, None).await.unwrap();
        let keys: Vec<_> = page.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["u1/1", "u1/2"]);
        assert!(page.next_token.is_none());
    }

    #[tokio::test]
    async fn test_fault_injection_is_targeted_and_bounded() {
        let store = InMemoryStore::new("test");
        store.insert_object("b", "a", "1", Metadata::new());
        store.insert_object("b", "d", "2", Metadata::new());
        store.inject(
            Fault::new(StoreOp::HeadObject, StoreError::unavailable("flaky"))
                .key("d")
                .times(1),
        );

        assert!(store.head_object("b", "a").await.is_ok());
        assert!(store.head_object("b", "d").await.is_err());
        assert!(store.head_object("b", "d").await.is_ok());
        assert_eq!(store.call_count(StoreOp::HeadObject), 3);
    }

    #[tokio::test]
    async fn test_fault_after_lets_early_calls_through() {
        let store = InMemoryStore::new("test");
        store.insert_object("b", "k", "1", Metadata::new());
        store.inject(
            Fault::new(StoreOp::GetObject, StoreError::unavailable("late"))
                .after(2)
                .times(1),
        );

        assert!(store.get_object("b", "k").await.is_ok());
        assert!(store.get_object("b", "k").await.is_ok());
        assert!(store.get_object("b", "k").await.is_err());
        assert!(store.get_object("b", "k").await.is_ok());
    }

    #[tokio::test]
    async fn test_replace_metadata_keeps_fingerprint() {
        let store = InMemoryStore::new("test");
        store.insert_object("b", "k", "content", Metadata::new());
        let before = store.object_etag("b", "k").unwrap();

        let mut metadata = Metadata::new();
        metadata.insert("synced".to_string(), "true".to_string());
        store.replace_metadata("b", "k", &metadata, None).await.unwrap();

        assert_eq!(store.object_etag("b", "k").unwrap(), before);
        assert_eq!(store.object_metadata("b", "k").unwrap(), metadata);
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let store = InMemoryStore::new("test");
        store.add_bucket("b");
        let err = store.head_object("b", "nope").await.unwrap_err();
        assert!(err.is_not_found());
        let err = store.head_bucket("other").await.unwrap_err();
        assert_eq!(err.code, "NoSuchBucket");
    }
}
