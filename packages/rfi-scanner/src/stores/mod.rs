//! Job store implementations.
//!
//! Available backends:
//! - `MemoryJobStore` - In-memory storage (always available)
//! - `FileJobStore` - One JSON document per job in a directory (always available)
//! - `PostgresJobStore` - PostgreSQL storage (requires `postgres` feature)
//!
//! The memory and file stores share the state transitions below so that
//! both enforce the same claim and requeue rules.

pub mod file;
pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use file::FileJobStore;
pub use memory::MemoryJobStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresJobStore;

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::{StoreError, StoreResult};
use crate::traits::job_store::Claim;
use crate::types::job::{Checkpoint, JobStatus, ScanJob, ScanWindow};

pub(crate) fn lease_deadline(now: DateTime<Utc>, lease: Duration) -> DateTime<Utc> {
    now + chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::days(365))
}

/// Flip `job` to Running under `worker_id` if it is claimable at `now`.
pub(crate) fn apply_claim(
    job: &mut ScanJob,
    worker_id: &str,
    lease: Duration,
    now: DateTime<Utc>,
) -> Option<Claim> {
    if !job.is_claimable_at(now) {
        return None;
    }
    let previous_status = job.status;
    let previous_worker_id = job.worker_id.take();
    job.status = JobStatus::Running;
    job.worker_id = Some(worker_id.to_string());
    job.lease_expires_at = Some(lease_deadline(now, lease));
    job.updated_at = now;
    Some(Claim {
        job: job.clone(),
        previous_status,
        previous_worker_id,
    })
}

/// Fail with `LeaseLost` unless `worker_id` runs the job.
///
/// A holder whose lease ran out keeps it until another worker claims the job.
pub(crate) fn ensure_holder(job: &ScanJob, worker_id: &str) -> StoreResult<()> {
    if job.status == JobStatus::Running && job.worker_id.as_deref() == Some(worker_id) {
        return Ok(());
    }
    Err(StoreError::LeaseLost {
        job_id: job.id,
        worker_id: worker_id.to_string(),
    })
}

/// Push the lease forward if `worker_id` still holds it.
pub(crate) fn apply_extend_lease(
    job: &mut ScanJob,
    worker_id: &str,
    lease: Duration,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    ensure_holder(job, worker_id)?;
    job.lease_expires_at = Some(lease_deadline(now, lease));
    job.updated_at = now;
    Ok(())
}

pub(crate) fn apply_checkpoint(
    job: &mut ScanJob,
    worker_id: &str,
    checkpoint: &Checkpoint,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    ensure_holder(job, worker_id)?;
    job.checkpoint = checkpoint.clone();
    job.updated_at = now;
    Ok(())
}

pub(crate) fn apply_window_completed(
    job: &mut ScanJob,
    worker_id: &str,
    window_end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    ensure_holder(job, worker_id)?;
    job.last_completed_window_end = Some(window_end);
    job.updated_at = now;
    Ok(())
}

/// Statuses reachable through `set_status`. Running is only entered by a claim.
pub(crate) fn allowed(from: JobStatus, to: JobStatus) -> bool {
    use JobStatus::*;
    matches!(
        (from, to),
        (Running, Paused | Completed | Failed | Queued) | (Queued | Paused | Failed, Failed)
    )
}

/// Leaving Running requires the lease; failing an idle job does not.
pub(crate) fn apply_status(
    job: &mut ScanJob,
    worker_id: &str,
    status: JobStatus,
    error: Option<&str>,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    if !allowed(job.status, status) {
        return Err(StoreError::InvalidTransition {
            job_id: job.id,
            from: job.status,
            to: status,
        });
    }
    if job.status == JobStatus::Running {
        ensure_holder(job, worker_id)?;
    }
    job.status = status;
    job.worker_id = None;
    job.lease_expires_at = None;
    job.last_error = error.map(str::to_string);
    job.updated_at = now;
    Ok(())
}

pub(crate) fn apply_requeue(
    job: &mut ScanJob,
    window: ScanWindow,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    if job.status != JobStatus::Completed {
        return Err(StoreError::InvalidTransition {
            job_id: job.id,
            from: job.status,
            to: JobStatus::Queued,
        });
    }
    if job.already_covers(&window) {
        return Err(StoreError::AlreadyScanned {
            job_id: job.id,
            covered_until: job.last_completed_window_end.unwrap_or(window.end),
        });
    }
    job.window = window;
    job.status = JobStatus::Queued;
    job.checkpoint = Default::default();
    job.last_error = None;
    job.updated_at = now;
    Ok(())
}

/// Claimable job that has waited longest since its last update.
pub(crate) fn oldest_claimable<'a>(
    jobs: impl Iterator<Item = &'a ScanJob>,
    now: DateTime<Utc>,
) -> Option<&'a ScanJob> {
    jobs.filter(|job| job.is_claimable_at(now))
        .min_by_key(|job| (job.updated_at, job.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn job() -> ScanJob {
        let end = Utc::now();
        ScanJob::new("acoustic", ScanWindow::new(end - ChronoDuration::days(7), end))
    }

    #[test]
    fn test_claim_records_previous_holder() {
        let now = Utc::now();
        let mut job = job();
        let claim = apply_claim(&mut job, "w1", Duration::from_secs(60), now).unwrap();
        assert_eq!(claim.previous_status, JobStatus::Queued);
        assert_eq!(claim.previous_worker_id, None);
        assert!(apply_claim(&mut job, "w2", Duration::from_secs(60), now).is_none());

        let later = now + ChronoDuration::seconds(61);
        let takeover = apply_claim(&mut job, "w2", Duration::from_secs(60), later).unwrap();
        assert_eq!(takeover.previous_status, JobStatus::Running);
        assert_eq!(takeover.previous_worker_id.as_deref(), Some("w1"));
    }

    #[test]
    fn test_lease_extension_requires_holder() {
        let now = Utc::now();
        let mut job = job();
        apply_claim(&mut job, "w1", Duration::from_secs(60), now).unwrap();
        assert!(matches!(
            apply_extend_lease(&mut job, "w2", Duration::from_secs(60), now),
            Err(StoreError::LeaseLost { .. })
        ));
        apply_extend_lease(&mut job, "w1", Duration::from_secs(120), now).unwrap();
        assert_eq!(job.lease_expires_at, Some(now + ChronoDuration::seconds(120)));
    }

    #[test]
    fn test_stale_holder_is_fenced_out() {
        let now = Utc::now();
        let mut job = job();
        apply_claim(&mut job, "w1", Duration::ZERO, now).unwrap();
        let later = now + ChronoDuration::seconds(1);
        apply_claim(&mut job, "w2", Duration::from_secs(60), later).unwrap();

        let stale = Checkpoint {
            last_processed_index: Some(99),
            ..Default::default()
        };
        assert!(matches!(
            apply_extend_lease(&mut job, "w1", Duration::from_secs(60), later),
            Err(StoreError::LeaseLost { .. })
        ));
        assert!(matches!(
            apply_checkpoint(&mut job, "w1", &stale, later),
            Err(StoreError::LeaseLost { .. })
        ));
        let window_end = job.window.end;
        assert!(matches!(
            apply_window_completed(&mut job, "w1", window_end, later),
            Err(StoreError::LeaseLost { .. })
        ));
        assert!(matches!(
            apply_status(&mut job, "w1", JobStatus::Completed, None, later),
            Err(StoreError::LeaseLost { .. })
        ));

        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.worker_id.as_deref(), Some("w2"));
        assert_eq!(job.checkpoint.last_processed_index, None);
        assert_eq!(job.last_completed_window_end, None);

        apply_checkpoint(&mut job, "w2", &stale, later).unwrap();
        apply_status(&mut job, "w2", JobStatus::Paused, None, later).unwrap();
        assert_eq!(job.checkpoint.last_processed_index, Some(99));
    }

    #[test]
    fn test_status_rules() {
        let now = Utc::now();
        let mut job = job();
        assert!(matches!(
            apply_status(&mut job, "w1", JobStatus::Completed, None, now),
            Err(StoreError::InvalidTransition { .. })
        ));
        apply_claim(&mut job, "w1", Duration::from_secs(60), now).unwrap();
        apply_status(&mut job, "w1", JobStatus::Failed, Some("boom"), now).unwrap();
        assert_eq!(job.worker_id, None);
        assert_eq!(job.lease_expires_at, None);
        assert_eq!(job.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_requeue_rules() {
        let now = Utc::now();
        let mut job = job();
        let next = ScanWindow::new(job.window.end, job.window.end + ChronoDuration::days(7));
        assert!(matches!(
            apply_requeue(&mut job, next, now),
            Err(StoreError::InvalidTransition { .. })
        ));

        job.status = JobStatus::Completed;
        job.last_completed_window_end = Some(job.window.end);
        job.checkpoint.processed_count = 12;
        let same = job.window;
        assert!(matches!(
            apply_requeue(&mut job, same, now),
            Err(StoreError::AlreadyScanned { .. })
        ));

        // Ends later but starts inside the scanned window
        let overlapping = ScanWindow::new(
            job.window.end - ChronoDuration::days(6),
            job.window.end + ChronoDuration::days(1),
        );
        assert!(matches!(
            apply_requeue(&mut job, overlapping, now),
            Err(StoreError::AlreadyScanned { .. })
        ));

        apply_requeue(&mut job, next, now).unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.window, next);
        assert_eq!(job.checkpoint.processed_count, 0);
    }

    #[test]
    fn test_oldest_claimable_first() {
        let now = Utc::now();
        let mut a = job();
        let mut b = job();
        let mut c = job();
        a.updated_at = now - ChronoDuration::seconds(5);
        b.updated_at = now - ChronoDuration::seconds(50);
        c.updated_at = now - ChronoDuration::seconds(500);
        c.status = JobStatus::Completed;

        let jobs = [a, b.clone(), c];
        assert_eq!(oldest_claimable(jobs.iter(), now).map(|j| j.id), Some(b.id));
    }
}
