//! S3-compatible backend (MinIO, AWS S3, R2)

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
    MetadataDirective,
};
use aws_sdk_s3::Client as S3Client;
use chrono::{DateTime, Utc};
use futures::StreamExt;

use super::{ObjectBody, ObjectStore, PutOptions};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError, StoreErrorKind, StoreResult};
use crate::types::{Metadata, ObjectHead, ObjectPage, ObjectSummary};

/// Bodies at or above this size are uploaded in parts
const PART_SIZE: usize = 8 * 1024 * 1024;

/// S3-compatible object store
#[derive(Clone)]
pub struct S3Store {
    client: S3Client,
    name: String,
    region: String,
}

impl S3Store {
    /// Build a client from explicit configuration
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .retry_config(RetryConfig::standard().with_max_attempts(config.max_attempts))
            .timeout_config(
                TimeoutConfig::builder()
                    .connect_timeout(config.connect_timeout())
                    .read_timeout(config.read_timeout())
                    .build(),
            );

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "bucketsync-static",
            ));
        }
        if let Some(ref endpoint) = config.endpoint_url {
            loader = loader.endpoint_url(endpoint.clone());
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        tracing::info!(
            "Initialized {} store (region={}, endpoint={})",
            config.name,
            config.region,
            config.endpoint_url.as_deref().unwrap_or("aws")
        );

        Ok(Self {
            client: S3Client::from_conf(s3_config),
            name: config.name.clone(),
            region: config.region.clone(),
        })
    }

    pub fn from_client(client: S3Client, name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            region: region.into(),
        }
    }

    async fn put_single(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        options: PutOptions,
    ) -> StoreResult<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .set_content_type(options.content_type)
            .set_metadata(Some(options.metadata))
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    async fn put_multipart(
        &self,
        bucket: &str,
        key: &str,
        first_part: Vec<u8>,
        mut body: ObjectBody,
        options: PutOptions,
    ) -> StoreResult<()> {
        let upload = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .set_content_type(options.content_type)
            .set_metadata(Some(options.metadata))
            .send()
            .await
            .map_err(map_sdk_error)?;
        let upload_id = upload.upload_id().map(str::to_string).ok_or_else(|| {
            StoreError::new(StoreErrorKind::Other, "MissingUploadId", "Missing upload ID")
        })?;

        let result = async {
            let mut parts = Vec::new();
            let mut part_number: i32 = 1;
            let mut buffer = first_part;
            let mut finished = false;

            while !finished {
                while buffer.len() < PART_SIZE {
                    match body.next().await {
                        Some(chunk) => buffer.extend_from_slice(&chunk?),
                        None => {
                            finished = true;
                            break;
                        }
                    }
                }
                if buffer.is_empty() {
                    break;
                }

                let part_data = if buffer.len() > PART_SIZE {
                    let rest = buffer.split_off(PART_SIZE);
                    std::mem::replace(&mut buffer, rest)
                } else {
                    std::mem::take(&mut buffer)
                };

                let part = self
                    .client
                    .upload_part()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .part_number(part_number)
                    .body(ByteStream::from(part_data))
                    .send()
                    .await
                    .map_err(map_sdk_error)?;
                parts.push(
                    CompletedPart::builder()
                        .set_e_tag(part.e_tag().map(str::to_string))
                        .part_number(part_number)
                        .build(),
                );
                part_number += 1;
            }

            self.client
                .complete_multipart_upload()
                .bucket(bucket)
                .key(key)
                .upload_id(&upload_id)
                .multipart_upload(
                    CompletedMultipartUpload::builder()
                        .set_parts(Some(parts))
                        .build(),
                )
                .send()
                .await
                .map_err(map_sdk_error)?;
            Ok::<(), StoreError>(())
        }
        .await;

        if result.is_err() {
            if let Err(e) = self
                .client
                .abort_multipart_upload()
                .bucket(bucket)
                .key(key)
                .upload_id(&upload_id)
                .send()
                .await
            {
                tracing::warn!(
                    "Failed to abort multipart upload {} for {}/{}: {}",
                    upload_id,
                    bucket,
                    key,
                    DisplayErrorContext(&e)
                );
            }
        }
        result
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &str {
        &self.name
    }

    async fn head_bucket(&self, bucket: &str) -> StoreResult<()> {
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    async fn create_bucket(&self, bucket: &str) -> StoreResult<()> {
        let mut request = self.client.create_bucket().bucket(bucket);
        // us-east-1 rejects an explicit location constraint
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        request.send().await.map_err(map_sdk_error)?;
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectHead> {
        let response = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(ObjectHead {
            key: key.to_string(),
            etag: response.e_tag().unwrap_or_default().to_string(),
            size: response.content_length().unwrap_or(0).max(0) as u64,
            content_type: response.content_type().map(String::from),
            last_modified: response
                .last_modified()
                .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos())),
            metadata: response.metadata().cloned().unwrap_or_default(),
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectBody> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(map_sdk_error)?;

        let stream = futures::stream::unfold(response.body, |mut body| async move {
            match body.next().await {
                Some(Ok(chunk)) => Some((Ok(chunk), body)),
                Some(Err(e)) => Some((Err(StoreError::unavailable(e.to_string())), body)),
                None => None,
            }
        });
        Ok(Box::pin(stream))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        mut body: ObjectBody,
        options: PutOptions,
    ) -> StoreResult<()> {
        // Bodies of PART_SIZE or more go up in parts, so their ETag is
        // `<hash>-<parts>` and never matches a single-part source ETag.
        let mut buffer = Vec::with_capacity(
            options
                .content_length
                .map(|n| (n as usize).min(PART_SIZE))
                .unwrap_or(0),
        );
        while buffer.len() < PART_SIZE {
            match body.next().await {
                Some(chunk) => buffer.extend_from_slice(&chunk?),
                None => return self.put_single(bucket, key, buffer, options).await,
            }
        }
        self.put_multipart(bucket, key, buffer, body, options).await
    }

    async fn replace_metadata(
        &self,
        bucket: &str,
        key: &str,
        metadata: &Metadata,
        content_type: Option<&str>,
    ) -> StoreResult<()> {
        self.client
            .copy_object()
            .bucket(bucket)
            .key(key)
            .copy_source(encode_copy_source(bucket, key))
            .metadata_directive(MetadataDirective::Replace)
            .set_metadata(Some(metadata.clone()))
            .set_content_type(content_type.map(String::from))
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation_token: Option<String>,
        page_size: Option<i32>,
    ) -> StoreResult<ObjectPage> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .set_prefix(prefix.map(String::from))
            .set_continuation_token(continuation_token)
            .set_max_keys(page_size)
            .send()
            .await
            .map_err(map_sdk_error)?;

        let objects = response
            .contents()
            .iter()
            .filter_map(|obj| {
                obj.key().map(|key| ObjectSummary {
                    key: key.to_string(),
                    etag: obj.e_tag().map(String::from),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                })
            })
            .collect();

        Ok(ObjectPage {
            objects,
            next_token: response.next_continuation_token().map(String::from),
        })
    }

    async fn list_buckets(&self) -> StoreResult<Vec<String>> {
        let response = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(response
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(String::from))
            .collect())
    }
}

/// Map an SDK failure onto the store error taxonomy
fn map_sdk_error<E>(err: SdkError<E, HttpResponse>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => StoreError::new(
            StoreErrorKind::Unavailable,
            "RequestDispatchFailure",
            DisplayErrorContext(&err).to_string(),
        ),
        _ => {
            let status = err.raw_response().map(|r| r.status().as_u16());
            let code = err
                .code()
                .map(String::from)
                .or_else(|| status.map(|s| s.to_string()))
                .unwrap_or_else(|| "Unknown".to_string());
            let message = err
                .message()
                .map(String::from)
                .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
            StoreError::new(classify_error(Some(&code), status), code, message)
        }
    }
}

/// Classify an S3 error code and HTTP status into a [`StoreErrorKind`]
pub fn classify_error(code: Option<&str>, status: Option<u16>) -> StoreErrorKind {
    match code {
        Some("NoSuchKey" | "NoSuchBucket" | "NotFound" | "NoSuchUpload" | "404") => {
            return StoreErrorKind::NotFound
        }
        Some(
            "AccessDenied" | "Forbidden" | "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "403",
        ) => return StoreErrorKind::AccessDenied,
        Some(
            "SlowDown" | "ServiceUnavailable" | "InternalError" | "RequestTimeout"
            | "RequestTimeTooSkewed" | "500" | "503",
        ) => return StoreErrorKind::Unavailable,
        _ => {}
    }

    match status {
        Some(404) => StoreErrorKind::NotFound,
        Some(401) | Some(403) => StoreErrorKind::AccessDenied,
        Some(s) if s >= 500 => StoreErrorKind::Unavailable,
        _ => StoreErrorKind::Other,
    }
}

/// `bucket/key` for CopySource, with the key percent-encoded except for `/`
fn encode_copy_source(bucket: &str, key: &str) -> String {
    format!("{}/{}", bucket, urlencoding::encode(key).replace("%2F", "/"))
}
