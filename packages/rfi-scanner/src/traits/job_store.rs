//! Persistent job and checkpoint store.
//!
//! The checkpoint stored here is the single source of truth for where a scan
//! resumes. Stores must make `claim` atomic: two runners calling it for the
//! same job at the same time must see exactly one success.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::types::job::{Checkpoint, JobStatus, ScanJob, ScanWindow, StatsDelta};

/// A successful claim.
#[derive(Debug, Clone)]
pub struct Claim {
    /// The job as it is after the claim (status Running)
    pub job: ScanJob,

    /// Status before the claim; `Running` means a crashed runner's lease
    /// was taken over
    pub previous_status: JobStatus,

    /// Worker that held the job before this claim
    pub previous_worker_id: Option<String>,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job.
    async fn create(&self, job: &ScanJob) -> StoreResult<()>;

    /// Fetch a job.
    async fn get(&self, job_id: Uuid) -> StoreResult<ScanJob>;

    /// List all jobs, newest first.
    async fn list(&self) -> StoreResult<Vec<ScanJob>>;

    /// Atomically flip a claimable job to Running under `worker_id`.
    ///
    /// Returns `None` when the job is not claimable (completed, or running
    /// under a live lease).
    async fn claim(
        &self,
        job_id: Uuid,
        worker_id: &str,
        lease: Duration,
    ) -> StoreResult<Option<Claim>>;

    /// Extend the lease held by `worker_id`.
    ///
    /// Fails with [`StoreError::LeaseLost`] once another worker has taken
    /// the job over.
    ///
    /// [`StoreError::LeaseLost`]: crate::error::StoreError::LeaseLost
    async fn extend_lease(&self, job_id: Uuid, worker_id: &str, lease: Duration)
        -> StoreResult<()>;

    /// Overwrite the checkpoint of a job `worker_id` is running.
    async fn save_checkpoint(
        &self,
        job_id: Uuid,
        worker_id: &str,
        checkpoint: &Checkpoint,
    ) -> StoreResult<()>;

    /// Set the job's status, releasing the lease.
    ///
    /// Leaving Running is only allowed for the worker holding the lease.
    async fn set_status(
        &self,
        job_id: Uuid,
        worker_id: &str,
        status: JobStatus,
        error: Option<&str>,
    ) -> StoreResult<()>;

    /// Atomically add to the job's lifetime statistics.
    async fn increment_stats(&self, job_id: Uuid, delta: StatsDelta) -> StoreResult<()>;

    /// Record the end of a window `worker_id` finished scanning.
    async fn mark_window_completed(
        &self,
        job_id: Uuid,
        worker_id: &str,
        window_end: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Queue a completed job again for a new window.
    ///
    /// Refuses jobs that are not Completed and windows starting before the
    /// end of the last completed one.
    async fn requeue(&self, job_id: Uuid, window: ScanWindow) -> StoreResult<()>;

    /// Oldest job a runner could claim right now.
    async fn next_claimable(&self) -> StoreResult<Option<Uuid>>;
}
