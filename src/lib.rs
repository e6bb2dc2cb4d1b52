//! Bucketsync - MinIO to AWS S3 synchronization
//!
//! Replicates objects from a source S3-compatible store into a destination
//! store, tracking per-object sync state in the source object's own metadata.

pub mod api;
pub mod config;
pub mod error;
pub mod jobs;
pub mod store;
pub mod sync;
pub mod types;

pub use config::{BucketNaming, StoreConfig, SyncOptions};
pub use error::{Result, StoreError, StoreErrorKind, SyncError};
pub use store::{InMemoryStore, ObjectStore};
pub use sync::SyncEngine;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
