//! Configuration for stores and sync runs

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Connection settings for one S3-compatible store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Label used in logs ("minio", "aws")
    pub name: String,
    /// Custom endpoint (MinIO, R2); `None` targets AWS
    pub endpoint_url: Option<String>,
    pub region: String,
    pub access_key: Option<String>,
    #[serde(skip_serializing)]
    pub secret_key: Option<String>,
    /// Use path-style addressing (required by MinIO)
    pub force_path_style: bool,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    /// Total attempts per request, including the first
    pub max_attempts: u32,
}

impl StoreConfig {
    /// Configuration for a MinIO-style source store
    pub fn minio(
        endpoint_url: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            name: "minio".to_string(),
            endpoint_url: Some(endpoint_url.into()),
            access_key: Some(access_key.into()),
            secret_key: Some(secret_key.into()),
            force_path_style: true,
            ..Default::default()
        }
    }

    /// Configuration for an AWS S3 destination store
    pub fn aws(region: impl Into<String>) -> Self {
        Self {
            name: "aws".to_string(),
            region: region.into(),
            ..Default::default()
        }
    }

    pub fn with_credentials(
        mut self,
        access_key: Option<String>,
        secret_key: Option<String>,
    ) -> Self {
        self.access_key = access_key;
        self.secret_key = secret_key;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Reject half-configured credentials and nonsensical limits
    pub fn validate(&self) -> Result<()> {
        if self.access_key.is_some() != self.secret_key.is_some() {
            return Err(SyncError::Config(format!(
                "{}: access key and secret key must be set together",
                self.name
            )));
        }
        if self.region.trim().is_empty() {
            return Err(SyncError::Config(format!("{}: region is empty", self.name)));
        }
        if self.max_attempts == 0 {
            return Err(SyncError::Config(format!(
                "{}: max_attempts must be at least 1",
                self.name
            )));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "s3".to_string(),
            endpoint_url: None,
            region: "us-east-1".to_string(),
            access_key: None,
            secret_key: None,
            force_path_style: false,
            connect_timeout_ms: 5_000,
            read_timeout_ms: 60_000,
            max_attempts: 3,
        }
    }
}

/// Tuning knobs for a sync run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Objects synced at once within a bucket (1 = strictly sequential)
    pub concurrency: usize,
    /// Write the `synced=true` annotation for skipped objects on a detached task
    pub annotate_skips_in_background: bool,
    /// Keys requested per listing page (`None` = store default)
    pub page_size: Option<i32>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            annotate_skips_in_background: true,
            page_size: None,
        }
    }
}

/// Destination bucket-name transform used by fleet syncs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketNaming {
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
}

impl BucketNaming {
    pub fn with_suffix(suffix: impl Into<String>) -> Self {
        Self {
            prefix: String::new(),
            suffix: suffix.into(),
        }
    }

    /// Destination bucket for a given source bucket
    pub fn destination_for(&self, source_bucket: &str) -> String {
        format!("{}{}{}", self.prefix, source_bucket, self.suffix)
    }
}
