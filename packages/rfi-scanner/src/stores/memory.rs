//! In-memory job store for testing and development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use uuid::Uuid;

use super::{
    apply_checkpoint, apply_claim, apply_extend_lease, apply_requeue, apply_status,
    apply_window_completed, oldest_claimable,
};
use crate::error::{StoreError, StoreResult};
use crate::traits::job_store::{Claim, JobStore};
use crate::types::job::{Checkpoint, JobStatus, ScanJob, ScanWindow, StatsDelta};

/// In-memory job store.
///
/// Not suitable for production as jobs are lost on restart. Claims are
/// atomic within the process because every mutation holds the write lock.
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, ScanJob>>,
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Get the number of stored jobs.
    pub fn len(&self) -> usize {
        self.jobs.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update<T>(
        &self,
        job_id: Uuid,
        f: impl FnOnce(&mut ScanJob) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut jobs = self.jobs.write().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(StoreError::NotFound(job_id))?;
        f(job)
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &ScanJob) -> StoreResult<()> {
        self.jobs.write().unwrap().insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> StoreResult<ScanJob> {
        self.jobs
            .read()
            .unwrap()
            .get(&job_id)
            .cloned()
            .ok_or(StoreError::NotFound(job_id))
    }

    async fn list(&self) -> StoreResult<Vec<ScanJob>> {
        let mut jobs: Vec<ScanJob> = self.jobs.read().unwrap().values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(jobs)
    }

    async fn claim(
        &self,
        job_id: Uuid,
        worker_id: &str,
        lease: Duration,
    ) -> StoreResult<Option<Claim>> {
        self.update(job_id, |job| Ok(apply_claim(job, worker_id, lease, Utc::now())))
    }

    async fn extend_lease(
        &self,
        job_id: Uuid,
        worker_id: &str,
        lease: Duration,
    ) -> StoreResult<()> {
        self.update(job_id, |job| apply_extend_lease(job, worker_id, lease, Utc::now()))
    }

    async fn save_checkpoint(
        &self,
        job_id: Uuid,
        worker_id: &str,
        checkpoint: &Checkpoint,
    ) -> StoreResult<()> {
        self.update(job_id, |job| apply_checkpoint(job, worker_id, checkpoint, Utc::now()))
    }

    async fn set_status(
        &self,
        job_id: Uuid,
        worker_id: &str,
        status: JobStatus,
        error: Option<&str>,
    ) -> StoreResult<()> {
        self.update(job_id, |job| apply_status(job, worker_id, status, error, Utc::now()))
    }

    async fn increment_stats(&self, job_id: Uuid, delta: StatsDelta) -> StoreResult<()> {
        self.update(job_id, |job| {
            job.stats.apply(delta);
            Ok(())
        })
    }

    async fn mark_window_completed(
        &self,
        job_id: Uuid,
        worker_id: &str,
        window_end: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.update(job_id, |job| {
            apply_window_completed(job, worker_id, window_end, Utc::now())
        })
    }

    async fn requeue(&self, job_id: Uuid, window: ScanWindow) -> StoreResult<()> {
        self.update(job_id, |job| apply_requeue(job, window, Utc::now()))
    }

    async fn next_claimable(&self) -> StoreResult<Option<Uuid>> {
        let jobs = self.jobs.read().unwrap();
        Ok(oldest_claimable(jobs.values(), Utc::now()).map(|job| job.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn job() -> ScanJob {
        let end = Utc::now();
        ScanJob::new("acoustic", ScanWindow::new(end - chrono::Duration::days(7), end))
    }

    #[tokio::test]
    async fn test_create_get_list() {
        let store = MemoryJobStore::new();
        let first = job();
        let mut second = job();
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        store.create(&first).await.unwrap();
        store.create(&second).await.unwrap();

        assert_eq!(store.get(first.id).await.unwrap(), first);
        assert_eq!(store.len(), 2);
        let listed: Vec<Uuid> = store.list().await.unwrap().iter().map(|j| j.id).collect();
        assert_eq!(listed, vec![second.id, first.id]);
        assert!(matches!(
            store.get(Uuid::now_v7()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_claims_single_winner() {
        let store = Arc::new(MemoryJobStore::new());
        let job = job();
        store.create(&job).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .claim(job.id, &format!("w{i}"), Duration::from_secs(60))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_stats_accumulate() {
        let store = MemoryJobStore::new();
        let job = job();
        store.create(&job).await.unwrap();

        let delta = StatsDelta {
            scans_run: 1,
            documents_processed: 10,
            matches_found: 2,
            notifications_sent: 1,
        };
        store.increment_stats(job.id, delta).await.unwrap();
        store.increment_stats(job.id, delta).await.unwrap();

        let stats = store.get(job.id).await.unwrap().stats;
        assert_eq!(stats.scans_run, 2);
        assert_eq!(stats.documents_processed, 20);
        assert_eq!(stats.matches_found, 4);
    }

    #[tokio::test]
    async fn test_completed_job_not_claimable() {
        let store = MemoryJobStore::new();
        let job = job();
        store.create(&job).await.unwrap();
        store.claim(job.id, "w1", Duration::from_secs(60)).await.unwrap().unwrap();
        store.set_status(job.id, "w1", JobStatus::Completed, None).await.unwrap();

        assert_eq!(store.next_claimable().await.unwrap(), None);
        assert!(store
            .claim(job.id, "w2", Duration::from_secs(60))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_expired_holder_cannot_touch_taken_over_job() {
        let store = MemoryJobStore::new();
        let job = job();
        store.create(&job).await.unwrap();
        store.claim(job.id, "w1", Duration::ZERO).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store
            .claim(job.id, "w2", Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();

        let stale = Checkpoint {
            last_processed_index: Some(99),
            ..Default::default()
        };
        assert!(matches!(
            store.extend_lease(job.id, "w1", Duration::from_secs(60)).await,
            Err(StoreError::LeaseLost { .. })
        ));
        assert!(matches!(
            store.save_checkpoint(job.id, "w1", &stale).await,
            Err(StoreError::LeaseLost { .. })
        ));
        assert!(matches!(
            store.set_status(job.id, "w1", JobStatus::Completed, None).await,
            Err(StoreError::LeaseLost { .. })
        ));

        let current = store.get(job.id).await.unwrap();
        assert_eq!(current.status, JobStatus::Running);
        assert_eq!(current.worker_id.as_deref(), Some("w2"));
        assert_eq!(current.checkpoint.last_processed_index, None);
    }
}
