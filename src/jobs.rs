//! Registry of detached sync jobs
//!
//! Fire-and-forget syncs report into a bounded map keyed by job ID:
//! - finished jobs expire after a TTL
//! - when full, the oldest finished job is evicted first
//! - when full of running jobs, new jobs are refused
//! - expired entries are swept on every insert

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job identifier
pub type JobId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Running,
    Completed,
    Failed,
}

/// Public view of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    /// What was started ("fleet", "bucket:docs", ...)
    pub kind: String,
    pub state: JobState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug)]
struct JobEntry {
    record: JobRecord,
    finished: Option<Instant>,
}

impl JobEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.finished.map_or(false, |t| t.elapsed() > ttl)
    }
}

/// Configuration for the job registry
#[derive(Debug, Clone)]
pub struct JobRegistryConfig {
    /// How long finished jobs stay queryable (default: 1 hour)
    pub ttl_seconds: u64,
    /// Maximum number of tracked jobs (default: 256)
    pub max_jobs: usize,
}

impl Default for JobRegistryConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 3600,
            max_jobs: 256,
        }
    }
}

/// Bounded, TTL-evicting job table
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<DashMap<JobId, JobEntry>>,
    config: JobRegistryConfig,
    evictions: Arc<AtomicU64>,
}

impl JobRegistry {
    pub fn new(config: JobRegistryConfig) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            config,
            evictions: Arc::new(AtomicU64::new(0)),
        }
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.config.ttl_seconds)
    }

    /// Register a running job and return its ID.
    ///
    /// Returns `None` when the registry is full of running jobs.
    pub fn start(&self, kind: impl Into<String>) -> Option<JobId> {
        self.remove_expired();
        while self.jobs.len() >= self.capacity() {
            if !self.evict_oldest_finished() {
                tracing::warn!(
                    "Job registry full ({} running), rejecting new job",
                    self.jobs.len()
                );
                return None;
            }
        }

        let id = Uuid::new_v4().to_string();
        self.jobs.insert(
            id.clone(),
            JobEntry {
                record: JobRecord {
                    id: id.clone(),
                    kind: kind.into(),
                    state: JobState::Running,
                    started_at: Utc::now(),
                    finished_at: None,
                    result: None,
                    error: None,
                },
                finished: None,
            },
        );
        Some(id)
    }

    pub fn capacity(&self) -> usize {
        self.config.max_jobs.max(1)
    }

    pub fn complete(&self, id: &str, result: serde_json::Value) {
        self.finish(id, JobState::Completed, Some(result), None);
    }

    pub fn fail(&self, id: &str, error: impl Into<String>) {
        self.finish(id, JobState::Failed, None, Some(error.into()));
    }

    fn finish(
        &self,
        id: &str,
        state: JobState,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) {
        if let Some(mut entry) = self.jobs.get_mut(id) {
            entry.record.state = state;
            entry.record.finished_at = Some(Utc::now());
            entry.record.result = result;
            entry.record.error = error;
            entry.finished = Some(Instant::now());
        }
    }

    /// Look up a job; expired jobs read as absent
    pub fn get(&self, id: &str) -> Option<JobRecord> {
        let ttl = self.ttl();
        {
            let entry = self.jobs.get(id)?;
            if !entry.is_expired(ttl) {
                return Some(entry.record.clone());
            }
        }
        self.jobs.remove(id);
        None
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Drop finished jobs older than the TTL
    pub fn remove_expired(&self) {
        let ttl = self.ttl();
        self.jobs.retain(|_, entry| !entry.is_expired(ttl));
    }

    fn evict_oldest_finished(&self) -> bool {
        let oldest = self
            .jobs
            .iter()
            .filter_map(|entry| entry.finished.map(|t| (entry.key().clone(), t)))
            .min_by_key(|(_, t)| *t)
            .map(|(id, _)| id);

        match oldest {
            Some(id) => {
                self.jobs.remove(&id);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Run `task` on a detached tokio task, recording its outcome.
    ///
    /// The task is not started when the registry is full.
    pub fn spawn<F, T, E>(&self, kind: impl Into<String>, task: F) -> Option<JobId>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Serialize + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let kind = kind.into();
        let id = self.start(kind.clone())?;
        let registry = self.clone();
        let job_id = id.clone();

        tokio::spawn(async move {
            match task.await {
                Ok(value) => match serde_json::to_value(&value) {
                    Ok(json) => registry.complete(&job_id, json),
                    Err(e) => registry.fail(&job_id, format!("Could not serialize result: {}", e)),
                },
                Err(e) => {
                    tracing::error!("Background job {} ({}) failed: {}", job_id, kind, e);
                    registry.fail(&job_id, e.to_string());
                }
            }
        });

        Some(id)
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(JobRegistryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_lifecycle() {
        let registry = JobRegistry::default();
        let id = registry.start("fleet").unwrap();
        assert_eq!(registry.get(&id).unwrap().state, JobState::Running);

        registry.complete(&id, serde_json::json!({"total_buckets_scanned": 2}));
        let record = registry.get(&id).unwrap();
        assert_eq!(record.state, JobState::Completed);
        assert!(record.finished_at.is_some());
        assert_eq!(record.result.unwrap()["total_buckets_scanned"], 2);
    }

    #[test]
    fn test_finished_jobs_expire() {
        let registry = JobRegistry::new(JobRegistryConfig {
            ttl_seconds: 0,
            max_jobs: 10,
        });
        let id = registry.start("fleet").unwrap();
        registry.fail(&id, "boom");
        std::thread::sleep(Duration::from_millis(5));

        assert!(registry.get(&id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_running_jobs_never_expire() {
        let registry = JobRegistry::new(JobRegistryConfig {
            ttl_seconds: 0,
            max_jobs: 10,
        });
        let id = registry.start("fleet").unwrap();
        std::thread::sleep(Duration::from_millis(5));
        registry.remove_expired();
        assert!(registry.get(&id).is_some());
    }

    #[test]
    fn test_capacity_evicts_oldest_finished() {
        let registry = JobRegistry::new(JobRegistryConfig {
            ttl_seconds: 3600,
            max_jobs: 2,
        });
        let first = registry.start("a").unwrap();
        registry.complete(&first, serde_json::Value::Null);
        let second = registry.start("b").unwrap();
        let third = registry.start("c").unwrap();

        assert!(registry.get(&first).is_none());
        assert!(registry.get(&second).is_some());
        assert!(registry.get(&third).is_some());
        assert_eq!(registry.evictions(), 1);
    }

    #[test]
    fn test_full_registry_of_running_jobs_rejects_new_jobs() {
        let registry = JobRegistry::new(JobRegistryConfig {
            ttl_seconds: 3600,
            max_jobs: 2,
        });
        assert!(registry.start("fleet").is_some());
        assert!(registry.start("fleet").is_some());

        for _ in 0..3 {
            assert!(registry.start("fleet").is_none());
        }
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.evictions(), 0);
    }

    #[test]
    fn test_finishing_a_job_frees_a_slot() {
        let registry = JobRegistry::new(JobRegistryConfig {
            ttl_seconds: 3600,
            max_jobs: 1,
        });
        let id = registry.start("fleet").unwrap();
        assert!(registry.start("fleet").is_none());

        registry.complete(&id, serde_json::Value::Null);
        assert!(registry.start("fleet").is_some());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_spawn_refused_when_full() {
        let registry = JobRegistry::new(JobRegistryConfig {
            ttl_seconds: 3600,
            max_jobs: 1,
        });
        registry.start("held").unwrap();

        let id = registry.spawn("fleet", async { Ok::<_, String>(()) });
        assert!(id.is_none());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_spawn_records_outcome() {
        let registry = JobRegistry::default();
        let id = registry
            .spawn("bucket:docs", async { Ok::<_, String>(vec![1, 2, 3]) })
            .unwrap();

        for _ in 0..50 {
            if registry.get(&id).map(|r| r.state) != Some(JobState::Running) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let record = registry.get(&id).unwrap();
        assert_eq!(record.state, JobState::Completed);
        assert_eq!(record.result.unwrap(), serde_json::json!([1, 2, 3]));
    }
}
