//! Cross-store synchronization (MinIO -> AWS S3)
//!
//! Layers, each independently callable:
//! - [`SyncEngine::sync_fleet`]: every bucket on the source store
//! - [`SyncEngine::sync_bucket`]: every key in one bucket, optionally under a prefix
//! - [`SyncEngine::sync_object`]: one key, with sync-state tracking in metadata
//!
//! Object-level failures are reported in results, never raised. Only a failure
//! to list source buckets aborts a fleet sync with an error.

mod bucket;
pub mod compare;
mod engine;
mod fleet;
pub mod metadata;
mod object;
pub mod report;

pub use compare::{fingerprints_match, normalize_etag};
pub use engine::SyncEngine;
pub use metadata::{annotate, initial_metadata, read_status, AWS_BUCKET_KEY, LAST_SYNCED_KEY, SYNCED_KEY};
pub use report::{bucket_failure_report, failure_report};
