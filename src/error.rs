//! Error types for bucketsync

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::FailureKind;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Result type alias for object store calls
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Well-known classes of object store failures.
///
/// Backends map their native error codes into one of these so that callers
/// never have to inspect error text to tell "absent" from "broken".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreErrorKind {
    /// Bucket or object does not exist
    NotFound,
    /// Credentials were rejected or lack permission
    AccessDenied,
    /// Store unreachable, timed out, or returned a transient server error
    Unavailable,
    /// Anything else
    Other,
}

impl StoreErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreErrorKind::NotFound => "not_found",
            StoreErrorKind::AccessDenied => "access_denied",
            StoreErrorKind::Unavailable => "unavailable",
            StoreErrorKind::Other => "other",
        }
    }
}

/// A failure reported by an [`ObjectStore`](crate::store::ObjectStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct StoreError {
    pub kind: StoreErrorKind,
    /// Native error code, e.g. `NoSuchKey` or `AccessDenied`
    pub code: String,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::NotFound, code, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Unavailable, "ServiceUnavailable", message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == StoreErrorKind::NotFound
    }

    pub fn is_access_denied(&self) -> bool {
        self.kind == StoreErrorKind::AccessDenied
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Main error type for sync operations
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    #[error("Source object '{key}' not found in bucket '{bucket}'")]
    SourceObjectNotFound { bucket: String, key: String },

    #[error("Source bucket '{0}' does not exist")]
    SourceBucketNotFound(String),

    #[error("Could not access source bucket '{bucket}' (Cause: {source})")]
    SourceUnavailable { bucket: String, source: StoreError },

    #[error("Could not access metadata for {bucket}/{key} (Cause: {source})")]
    HeadFailed {
        bucket: String,
        key: String,
        source: StoreError,
    },

    #[error("Could not prepare destination bucket '{bucket}' (Cause: {source})")]
    DestinationUnavailable { bucket: String, source: StoreError },

    #[error("Transfer of '{key}' failed (Cause: {source})")]
    TransferFailure { key: String, source: StoreError },

    #[error("Metadata annotation of {bucket}/{key} failed (Cause: {source})")]
    MetadataAnnotation {
        bucket: String,
        key: String,
        source: StoreError,
    },

    #[error("Failed to list {scope} (Cause: {source})")]
    Listing { scope: String, source: StoreError },

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Structured failure class for callers that need to branch on the error
    pub fn kind(&self) -> FailureKind {
        match self {
            SyncError::SourceObjectNotFound { .. } | SyncError::SourceBucketNotFound(_) => {
                FailureKind::SourceNotFound
            }
            SyncError::SourceUnavailable { source, .. } | SyncError::HeadFailed { source, .. } => {
                if source.is_access_denied() {
                    FailureKind::AccessDenied
                } else {
                    FailureKind::StoreError
                }
            }
            SyncError::DestinationUnavailable { .. } => FailureKind::DestinationUnavailable,
            SyncError::TransferFailure { source, .. } => {
                if source.is_not_found() {
                    // the source vanished between head and get
                    FailureKind::SourceNotFound
                } else if source.is_access_denied() {
                    FailureKind::AccessDenied
                } else {
                    FailureKind::TransferFailure
                }
            }
            SyncError::MetadataAnnotation { .. } => FailureKind::MetadataAnnotation,
            SyncError::Listing { .. } => FailureKind::ListingFailure,
            SyncError::Cancelled => FailureKind::Cancelled,
            SyncError::Store(e) => match e.kind {
                StoreErrorKind::NotFound => FailureKind::SourceNotFound,
                StoreErrorKind::AccessDenied => FailureKind::AccessDenied,
                _ => FailureKind::StoreError,
            },
            SyncError::Config(_) => FailureKind::Config,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::SourceUnavailable { source, .. }
            | SyncError::HeadFailed { source, .. }
            | SyncError::DestinationUnavailable { source, .. }
            | SyncError::TransferFailure { source, .. }
            | SyncError::Listing { source, .. }
            | SyncError::Store(source) => source.kind == StoreErrorKind::Unavailable,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display_includes_code() {
        let err = StoreError::not_found("NoSuchKey", "The specified key does not exist.");
        assert_eq!(err.to_string(), "NoSuchKey: The specified key does not exist.");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_sync_error_kinds() {
        let err = SyncError::SourceObjectNotFound {
            bucket: "docs".to_string(),
            key: "a.txt".to_string(),
        };
        assert_eq!(err.kind(), FailureKind::SourceNotFound);

        let err = SyncError::TransferFailure {
            key: "a.txt".to_string(),
            source: StoreError::new(StoreErrorKind::AccessDenied, "AccessDenied", "denied"),
        };
        assert_eq!(err.kind(), FailureKind::AccessDenied);

        let err = SyncError::HeadFailed {
            bucket: "docs".to_string(),
            key: "d.txt".to_string(),
            source: StoreError::unavailable("connection reset"),
        };
        assert_eq!(err.kind(), FailureKind::StoreError);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_cause_is_rendered() {
        let err = SyncError::DestinationUnavailable {
            bucket: "backup".to_string(),
            source: StoreError::unavailable("timed out"),
        };
        let text = err.to_string();
        assert!(text.contains("backup"));
        assert!(text.contains("ServiceUnavailable: timed out"));
    }
}
