use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One queued analysis job. The credential is kept for accounting only and
/// never serialized back to clients.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub job_id: String,
    pub owner: String,
    #[serde(skip_serializing)]
    pub credential: String,
    pub status: JobStatus,
    pub progress: u8,
    pub result: Option<Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Key-value job record store. Updates are best-effort telemetry for
/// pollers, not transactional with the gateway: implementations swallow
/// their own failures.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job_id: &str, owner: &str, credential: &str);

    async fn update(
        &self,
        job_id: &str,
        status: JobStatus,
        progress: Option<u8>,
        result: Option<Value>,
        error_message: Option<String>,
    );

    async fn get(&self, job_id: &str) -> Option<JobRecord>;

    async fn count(&self) -> usize;
}

/// In-memory job store. Lives for the process; a cleanup pass removes
/// terminal jobs past their retention window.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, JobRecord>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove terminal jobs older than `max_age_minutes`. Returns how many
    /// were removed.
    pub async fn cleanup_expired(&self, max_age_minutes: u64) -> usize {
        let cutoff = Utc::now() - ChronoDuration::minutes(max_age_minutes as i64);
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| !(job.status.is_terminal() && job.created_at < cutoff));
        let removed = before - jobs.len();
        if removed > 0 {
            debug!(removed, "cleaned up expired jobs");
        }
        removed
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job_id: &str, owner: &str, credential: &str) {
        let record = JobRecord {
            job_id: job_id.to_string(),
            owner: owner.to_string(),
            credential: credential.to_string(),
            status: JobStatus::Queued,
            progress: 0,
            result: None,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        self.jobs.write().await.insert(job_id.to_string(), record);
    }

    async fn update(
        &self,
        job_id: &str,
        status: JobStatus,
        progress: Option<u8>,
        result: Option<Value>,
        error_message: Option<String>,
    ) {
        let mut jobs = self.jobs.write().await;
        // Unknown job ids are ignored: updates are fire-and-forget.
        if let Some(job) = jobs.get_mut(job_id) {
            job.status = status;
            if status.is_terminal() {
                job.progress = 100;
                job.completed_at = Some(Utc::now());
            } else if let Some(progress) = progress {
                job.progress = progress;
            }
            if result.is_some() {
                job.result = result;
            }
            if error_message.is_some() {
                job.error_message = error_message;
            }
        }
    }

    async fn get(&self, job_id: &str) -> Option<JobRecord> {
        self.jobs.read().await.get(job_id).cloned()
    }

    async fn count(&self) -> usize {
        self.jobs.read().await.len()
    }
}

/// Caps on concurrently active jobs, counted per owner and per credential.
/// Admission increments both counters atomically; the returned guard
/// decrements them when dropped, so a panicking or erroring pipeline can
/// never leak a slot.
#[derive(Debug)]
pub struct ActiveJobCounter {
    max_per_owner: u32,
    max_per_credential: u32,
    counts: Arc<std::sync::Mutex<ActiveCounts>>,
}

#[derive(Debug, Default)]
struct ActiveCounts {
    per_owner: HashMap<String, u32>,
    per_credential: HashMap<String, u32>,
}

impl ActiveJobCounter {
    pub fn new(max_per_owner: u32, max_per_credential: u32) -> Self {
        Self {
            max_per_owner,
            max_per_credential,
            counts: Arc::new(std::sync::Mutex::new(ActiveCounts::default())),
        }
    }

    /// Admit a job, or explain which ceiling was hit.
    pub fn try_begin(&self, owner: &str, credential: &str) -> Result<ActiveJobGuard, String> {
        let mut counts = self
            .counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let owner_jobs = counts.per_owner.get(owner).copied().unwrap_or(0);
        if owner_jobs >= self.max_per_owner {
            return Err(format!(
                "user limit exceeded ({owner_jobs}/{})",
                self.max_per_owner
            ));
        }
        let credential_jobs = counts.per_credential.get(credential).copied().unwrap_or(0);
        if credential_jobs >= self.max_per_credential {
            return Err(format!(
                "api_key limit exceeded ({credential_jobs}/{})",
                self.max_per_credential
            ));
        }

        *counts.per_owner.entry(owner.to_string()).or_insert(0) += 1;
        *counts
            .per_credential
            .entry(credential.to_string())
            .or_insert(0) += 1;

        Ok(ActiveJobGuard {
            owner: owner.to_string(),
            credential: credential.to_string(),
            counts: Arc::clone(&self.counts),
        })
    }

    pub fn active_for_owner(&self, owner: &str) -> u32 {
        let counts = self
            .counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        counts.per_owner.get(owner).copied().unwrap_or(0)
    }
}

/// Decrements the active-job counters on drop.
#[derive(Debug)]
pub struct ActiveJobGuard {
    owner: String,
    credential: String,
    counts: Arc<std::sync::Mutex<ActiveCounts>>,
}

impl Drop for ActiveJobGuard {
    fn drop(&mut self) {
        let mut counts = self
            .counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(n) = counts.per_owner.get_mut(&self.owner) {
            *n = n.saturating_sub(1);
        }
        if let Some(n) = counts.per_credential.get_mut(&self.credential) {
            *n = n.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn create_then_update_lifecycle() {
        let store = InMemoryJobStore::new();
        store.create("job-1", "user-1", "key-1").await;

        let job = store.get("job-1").await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);

        store
            .update("job-1", JobStatus::Processing, Some(40), None, None)
            .await;
        let job = store.get("job-1").await.unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.progress, 40);
        assert!(job.completed_at.is_none());

        store
            .update(
                "job-1",
                JobStatus::Completed,
                None,
                Some(json!({"ok": true})),
                None,
            )
            .await;
        let job = store.get("job-1").await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.completed_at.is_some());
        assert_eq!(job.result.unwrap(), json!({"ok": true}));
    }

    #[tokio::test]
    async fn failed_jobs_keep_the_error_text() {
        let store = InMemoryJobStore::new();
        store.create("job-2", "u", "k").await;
        store
            .update(
                "job-2",
                JobStatus::Failed,
                None,
                None,
                Some("model API error 500".to_string()),
            )
            .await;
        let job = store.get("job-2").await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("model API error 500"));
    }

    #[tokio::test]
    async fn update_for_unknown_job_is_swallowed() {
        let store = InMemoryJobStore::new();
        store
            .update("missing", JobStatus::Completed, None, None, None)
            .await;
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn cleanup_only_touches_old_terminal_jobs() {
        let store = InMemoryJobStore::new();
        store.create("done", "u", "k").await;
        store.create("running", "u", "k").await;
        store
            .update("done", JobStatus::Completed, None, None, None)
            .await;
        store
            .update("running", JobStatus::Processing, Some(40), None, None)
            .await;

        // Retention of 0 minutes: terminal jobs are immediately eligible
        let removed = store.cleanup_expired(0).await;
        assert_eq!(removed, 1);
        assert!(store.get("done").await.is_none());
        assert!(store.get("running").await.is_some());
    }

    #[test]
    fn owner_cap_blocks_second_job_and_guard_restores_it() {
        let counter = ActiveJobCounter::new(1, 20);
        let guard = counter.try_begin("u1", "k1").unwrap();
        let err = counter.try_begin("u1", "k1").unwrap_err();
        assert!(err.contains("user limit exceeded"));

        // A different owner sharing the credential is still admitted
        let other = counter.try_begin("u2", "k1").unwrap();
        drop(other);

        drop(guard);
        assert_eq!(counter.active_for_owner("u1"), 0);
        let _again = counter.try_begin("u1", "k1").unwrap();
    }

    #[test]
    fn credential_cap_is_counted_across_owners() {
        let counter = ActiveJobCounter::new(10, 2);
        let _g1 = counter.try_begin("u1", "shared").unwrap();
        let _g2 = counter.try_begin("u2", "shared").unwrap();
        let err = counter.try_begin("u3", "shared").unwrap_err();
        assert!(err.contains("api_key limit exceeded"));
    }
}
