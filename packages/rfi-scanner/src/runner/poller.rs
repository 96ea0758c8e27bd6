//! Polls the job store and runs claimable jobs one at a time.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{JobRunner, RunOutcome};
use crate::error::RunnerError;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Sleep between polls when nothing is claimable
    pub idle_interval: Duration,

    /// Sleep after a store error
    pub error_backoff: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_secs(30),
            error_backoff: Duration::from_secs(1),
        }
    }
}

/// Long-running loop over [`JobRunner::run`].
///
/// Jobs run sequentially: a run holds at most one window's worth of state,
/// and the memory breaker assumes it is the only scan in the process.
pub struct JobPoller {
    runner: Arc<JobRunner>,
    config: PollerConfig,
}

impl JobPoller {
    pub fn new(runner: Arc<JobRunner>, config: PollerConfig) -> Self {
        Self { runner, config }
    }

    /// Run the next claimable job, if any.
    pub async fn run_once(&self) -> Result<Option<RunOutcome>, RunnerError> {
        let Some(job_id) = self.runner.jobs().next_claimable().await? else {
            return Ok(None);
        };
        debug!(%job_id, "found claimable job");
        self.runner.run(job_id).await.map(Some)
    }

    /// Poll until `shutdown` is cancelled. A run in progress is finished
    /// before the loop exits.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            worker_id = %self.runner.config().worker_id,
            idle_interval_secs = self.config.idle_interval.as_secs(),
            "job poller starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let wait = match self.run_once().await {
                Ok(Some(RunOutcome::Completed(_))) => Duration::ZERO,
                Ok(Some(RunOutcome::NotClaimed)) => self.config.error_backoff,
                // Paused and failed jobs stay claimable; give them room
                Ok(Some(_)) | Ok(None) => self.config.idle_interval,
                Err(e) => {
                    error!(error = %e, "job run failed");
                    self.config.error_backoff
                }
            };

            if wait.is_zero() {
                continue;
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        info!(worker_id = %self.runner.config().worker_id, "job poller stopped");
    }
}
