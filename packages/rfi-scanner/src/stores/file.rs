//! Directory-backed job store.
//!
//! Each job lives in `<dir>/<job_id>.json`. Writes go to a temporary file
//! that is renamed over the record, so a crash never leaves a half-written
//! checkpoint. Mutations are serialized through one lock, which makes claims
//! atomic for every runner sharing this store instance.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use super::{
    apply_checkpoint, apply_claim, apply_extend_lease, apply_requeue, apply_status,
    apply_window_completed, oldest_claimable,
};
use crate::error::{StoreError, StoreResult};
use crate::traits::job_store::{Claim, JobStore};
use crate::types::job::{Checkpoint, JobStatus, ScanJob, ScanWindow, StatsDelta};

fn backend(e: std::io::Error) -> StoreError {
    StoreError::Backend(Box::new(e))
}

pub struct FileJobStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileJobStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(backend)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, job_id: Uuid) -> PathBuf {
        self.dir.join(format!("{job_id}.json"))
    }

    async fn read(&self, job_id: Uuid) -> StoreResult<ScanJob> {
        let bytes = match tokio::fs::read(self.path_for(job_id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(job_id))
            }
            Err(e) => return Err(backend(e)),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write(&self, job: &ScanJob) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(job)?;
        let tmp = self.dir.join(format!(".{}.json.tmp", job.id));
        tokio::fs::write(&tmp, &bytes).await.map_err(backend)?;
        tokio::fs::rename(&tmp, self.path_for(job.id))
            .await
            .map_err(backend)
    }

    async fn read_all(&self) -> StoreResult<Vec<ScanJob>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(backend)?;
        let mut jobs = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(backend)? {
            let path = entry.path();
            let is_record = path.extension().is_some_and(|e| e == "json")
                && !entry.file_name().to_string_lossy().starts_with('.');
            if !is_record {
                continue;
            }
            let bytes = tokio::fs::read(&path).await.map_err(backend)?;
            match serde_json::from_slice::<ScanJob>(&bytes) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable job record"),
            }
        }
        Ok(jobs)
    }

    /// Read, mutate and write back one job under the write lock.
    async fn update<T>(
        &self,
        job_id: Uuid,
        f: impl FnOnce(&mut ScanJob) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let _guard = self.write_lock.lock().await;
        let mut job = self.read(job_id).await?;
        let out = f(&mut job)?;
        self.write(&job).await?;
        Ok(out)
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn create(&self, job: &ScanJob) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        self.write(job).await
    }

    async fn get(&self, job_id: Uuid) -> StoreResult<ScanJob> {
        self.read(job_id).await
    }

    async fn list(&self) -> StoreResult<Vec<ScanJob>> {
        let mut jobs = self.read_all().await?;
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(jobs)
    }

    async fn claim(
        &self,
        job_id: Uuid,
        worker_id: &str,
        lease: Duration,
    ) -> StoreResult<Option<Claim>> {
        let _guard = self.write_lock.lock().await;
        let mut job = self.read(job_id).await?;
        let claim = apply_claim(&mut job, worker_id, lease, Utc::now());
        if claim.is_some() {
            self.write(&job).await?;
        }
        Ok(claim)
    }

    async fn extend_lease(
        &self,
        job_id: Uuid,
        worker_id: &str,
        lease: Duration,
    ) -> StoreResult<()> {
        self.update(job_id, |job| apply_extend_lease(job, worker_id, lease, Utc::now()))
        .await
    }

    async fn save_checkpoint(
        &self,
        job_id: Uuid,
        worker_id: &str,
        checkpoint: &Checkpoint,
    ) -> StoreResult<()> {
        self.update(job_id, |job| apply_checkpoint(job, worker_id, checkpoint, Utc::now()))
        .await
    }

    async fn set_status(
        &self,
        job_id: Uuid,
        worker_id: &str,
        status: JobStatus,
        error: Option<&str>,
    ) -> StoreResult<()> {
        self.update(job_id, |job| apply_status(job, worker_id, status, error, Utc::now()))
            .await
    }

    async fn increment_stats(&self, job_id: Uuid, delta: StatsDelta) -> StoreResult<()> {
        self.update(job_id, |job| {
            job.stats.apply(delta);
            Ok(())
        })
        .await
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
        .await
    }

    async fn requeue(&self, job_id: Uuid, window: ScanWindow) -> StoreResult<()> {
        self.update(job_id, |job| apply_requeue(job, window, Utc::now()))
            .await
    }

    async fn next_claimable(&self) -> StoreResult<Option<Uuid>> {
        let jobs = self.read_all().await?;
        Ok(oldest_claimable(jobs.iter(), Utc::now()).map(|job| job.id))
    }
}
