//! Checkpointed, resumable job runner.
//!
//! A run claims a job, optionally counts the window, then streams documents
//! through the cascade in listing order. The checkpoint is written after
//! every document during warm-up and periodically after that; memory is
//! sampled after each write. Crossing the memory threshold pauses the job
//! instead of letting the process be killed.
//!
//! ```text
//! JobRunner::run
//!     ├─► claim (atomic, lease)
//!     ├─► count pass (total_documents)
//!     ├─► for each candidate after the checkpoint
//!     │       ├─► extract text
//!     │       ├─► cascade
//!     │       ├─► queue match for notification
//!     │       └─► persist / milestone flush / memory check
//!     └─► Completed | Paused | Failed
//! ```

mod breaker;
mod events;
mod poller;

pub use breaker::{MemoryBreaker, MemoryReading};
pub use events::{JobEvent, PauseReason};
pub use poller::{JobPoller, PollerConfig};

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::cascade::ClassificationCascade;
use crate::error::{RunnerError, ScanError, StoreError};
use crate::notify::NotificationAggregator;
use crate::scanner::{ObjectStoreScanner, StopReason};
use crate::traits::classifier::Classifier;
use crate::traits::job_store::JobStore;
use crate::traits::memory::MemoryProbe;
use crate::traits::metadata::MetadataService;
use crate::traits::notifier::NotificationChannel;
use crate::traits::object_store::ObjectStore;
use crate::traits::text::TextExtractor;
use crate::types::category::{Category, CategoryCatalog};
use crate::types::config::{CascadeConfig, RunnerConfig, ScanLimits, ScannerConfig};
use crate::types::document::{key_order, CandidateDocument};
use crate::types::job::{Checkpoint, JobStatus, ScanJob, StatsDelta};
use crate::types::matching::MatchRecord;

/// Everything a runner talks to.
#[derive(Clone)]
pub struct ScanDeps {
    pub objects: Arc<dyn ObjectStore>,
    pub text: Arc<dyn TextExtractor>,
    pub classifier: Arc<dyn Classifier>,
    pub jobs: Arc<dyn JobStore>,
    pub metadata: Arc<dyn MetadataService>,
    pub channel: Arc<dyn NotificationChannel>,
    pub memory: Arc<dyn MemoryProbe>,
}

/// Work done by one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Documents classified in this run
    pub processed: u64,

    /// Documents skipped because an earlier run already processed them
    pub skipped: u64,

    pub matches_found: u64,

    /// Notification batches delivered
    pub notifications_sent: u64,

    pub duration: Duration,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Another runner holds the job, or it is already completed
    NotClaimed,

    /// The window was fully scanned
    Completed(RunSummary),

    /// Stopped early; the checkpoint is resumable
    Paused {
        reason: PauseReason,
        summary: RunSummary,
    },

    /// A document could not be processed; the checkpoint is resumable
    Failed { error: String, summary: RunSummary },
}

impl RunOutcome {
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            RunOutcome::NotClaimed => None,
            RunOutcome::Completed(summary)
            | RunOutcome::Paused { summary, .. }
            | RunOutcome::Failed { summary, .. } => Some(summary),
        }
    }
}

pub struct JobRunner {
    scanner: ObjectStoreScanner,
    text: Arc<dyn TextExtractor>,
    cascade: Arc<ClassificationCascade>,
    jobs: Arc<dyn JobStore>,
    metadata: Arc<dyn MetadataService>,
    channel: Arc<dyn NotificationChannel>,
    breaker: MemoryBreaker,
    catalog: CategoryCatalog,
    config: RunnerConfig,
    events: broadcast::Sender<JobEvent>,
}

impl JobRunner {
    pub fn new(deps: ScanDeps, config: RunnerConfig) -> Self {
        let breaker = MemoryBreaker::new(
            deps.memory,
            config.memory_ceiling_bytes,
            config.memory_fraction,
        );
        let (events, _) = broadcast::channel(256);
        Self {
            scanner: ObjectStoreScanner::new(deps.objects, ScannerConfig::default()),
            text: deps.text,
            cascade: Arc::new(ClassificationCascade::new(
                deps.classifier,
                CascadeConfig::default(),
            )),
            jobs: deps.jobs,
            metadata: deps.metadata,
            channel: deps.channel,
            breaker,
            catalog: CategoryCatalog::builtin(),
            config,
            events,
        }
    }

    pub fn with_scanner_config(mut self, config: ScannerConfig) -> Self {
        self.scanner = ObjectStoreScanner::new(self.scanner.store().clone(), config);
        self
    }

    /// Replace the cascade, e.g. to change its config or retry policy.
    pub fn with_cascade(mut self, cascade: ClassificationCascade) -> Self {
        self.cascade = Arc::new(cascade);
        self
    }

    pub fn with_catalog(mut self, catalog: CategoryCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn cascade(&self) -> &ClassificationCascade {
        &self.cascade
    }

    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    /// Receive lifecycle events from every run started after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: JobEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Claim and run a job until it completes, pauses or fails.
    ///
    /// Only store failures are returned as errors. Document failures leave
    /// the job Failed with a resumable checkpoint and are reported through
    /// [`RunOutcome::Failed`].
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub async fn run(&self, job_id: Uuid) -> Result<RunOutcome, RunnerError> {
        let Some(claim) = self
            .jobs
            .claim(job_id, &self.config.worker_id, self.config.lease)
            .await?
        else {
            debug!("job not claimable");
            return Ok(RunOutcome::NotClaimed);
        };

        if claim.previous_status == JobStatus::Running {
            warn!(
                old_worker_id = claim.previous_worker_id.as_deref().unwrap_or("unknown"),
                "recovered job with expired lease"
            );
            self.emit(JobEvent::LeaseRecovered {
                job_id,
                old_worker_id: claim.previous_worker_id.clone(),
                new_worker_id: self.config.worker_id.clone(),
            });
        }

        let job = claim.job;
        let Some(category) = self.catalog.get(&job.category).cloned() else {
            let err = RunnerError::UnknownCategory(job.category.clone());
            error!(category = %job.category, "job targets an unknown category");
            self.jobs
                .set_status(job.id, &self.config.worker_id, JobStatus::Failed, Some(&err.to_string()))
                .await?;
            self.emit(JobEvent::Failed {
                job_id,
                error: err.to_string(),
            });
            return Err(err);
        };

        let heartbeat = self.spawn_heartbeat(job.id);
        let crashed = claim.previous_status == JobStatus::Running;
        let result = self.scan(&job, &category, crashed, &heartbeat.lost).await;
        heartbeat.stop().await;

        match &result {
            Err(RunnerError::Store(StoreError::LeaseLost { .. })) => {
                warn!("lease taken over by another worker, run abandoned");
            }
            Err(e) => error!(error = %e, "run aborted by store failure; lease will expire"),
            Ok(_) => {}
        }
        result
    }

    async fn scan(
        &self,
        job: &ScanJob,
        category: &Category,
        crashed: bool,
        lease_lost: &CancellationToken,
    ) -> Result<RunOutcome, RunnerError> {
        let started = Instant::now();
        let mut summary = RunSummary::default();

        // A job left Running with progress is resumed even without the flag
        let resuming = job.checkpoint.last_processed_index.is_some()
            && (job.checkpoint.is_resuming || (crashed && job.checkpoint.processed_count > 0));
        let mut checkpoint = if resuming {
            job.checkpoint.clone()
        } else {
            Checkpoint::default()
        };

        if self.config.count_first && (!resuming || checkpoint.total_documents == 0) {
            let total = self.scanner.count(job.window, ScanLimits::none()).await?;
            checkpoint.total_documents = total.max(checkpoint.processed_count);
        }
        checkpoint.is_resuming = resuming;
        self.jobs
            .save_checkpoint(job.id, &self.config.worker_id, &checkpoint)
            .await?;

        info!(
            job_id = %job.id,
            category = %category.name,
            resuming,
            resume_index = checkpoint.resume_index(),
            total_documents = checkpoint.total_documents,
            "scan started"
        );
        self.emit(JobEvent::Started {
            job_id: job.id,
            worker_id: self.config.worker_id.clone(),
            resuming,
            resume_index: checkpoint.resume_index(),
            total_documents: checkpoint.total_documents,
        });

        let mut aggregator = NotificationAggregator::new(self.metadata.clone(), self.channel.clone());

        // The stored key is authoritative; the index is the fallback for
        // checkpoints written without one
        let resume_key = if resuming {
            checkpoint.last_processed_key.clone()
        } else {
            None
        };
        let mut skip_by_index = if resuming && resume_key.is_none() {
            checkpoint.resume_index()
        } else {
            0
        };
        let mut drift_checked = !resuming;

        // The object cap bounds work done in this run, so skipped documents
        // do not count towards it
        let listing_limits = ScanLimits {
            max_objects: None,
            ..self.config.limits
        };
        let mut cursor = self.scanner.cursor(job.window, listing_limits);
        let mut pause = None;

        while let Some(doc) = cursor.next().await? {
            if lease_lost.is_cancelled() {
                return Err(StoreError::LeaseLost {
                    job_id: job.id,
                    worker_id: self.config.worker_id.clone(),
                }
                .into());
            }

            if let Some(key) = resume_key.as_deref() {
                if key_order(&doc.key, key) != Ordering::Greater {
                    summary.skipped += 1;
                    continue;
                }
            } else if skip_by_index > 0 {
                skip_by_index -= 1;
                summary.skipped += 1;
                continue;
            }

            if let Some(max) = self.config.limits.max_objects {
                if summary.processed >= max {
                    pause = Some(PauseReason::ObjectLimit);
                    cursor.halt();
                    break;
                }
            }

            if !drift_checked {
                drift_checked = true;
                if summary.skipped != checkpoint.resume_index() {
                    warn!(
                        skipped = summary.skipped,
                        resume_index = checkpoint.resume_index(),
                        "listing changed since the checkpoint was written; resuming by key"
                    );
                }
            }

            let index = checkpoint.resume_index();
            let matched = match self.process(job, category, &doc, index, &mut aggregator).await {
                Ok(matched) => matched,
                Err(e) => {
                    summary.duration = started.elapsed();
                    return self.fail(job, checkpoint, aggregator, summary, e).await;
                }
            };

            checkpoint.advance(index, &doc.file_name, &doc.key, matched);
            summary.processed += 1;
            if matched {
                summary.matches_found += 1;
            }

            if self.config.should_persist(index) {
                self.jobs
                    .save_checkpoint(job.id, &self.config.worker_id, &checkpoint)
                    .await?;
                self.jobs
                    .extend_lease(job.id, &self.config.worker_id, self.config.lease)
                    .await?;

                if self.config.is_milestone(index) {
                    self.flush(job.id, &mut aggregator, &mut summary).await;
                    info!(
                        processed = checkpoint.processed_count,
                        total = checkpoint.total_documents,
                        matches = checkpoint.matches_found,
                        "scan milestone"
                    );
                    self.emit(JobEvent::Milestone {
                        job_id: job.id,
                        processed: checkpoint.processed_count,
                        total_documents: checkpoint.total_documents,
                        matches_found: checkpoint.matches_found,
                    });
                }

                if let MemoryReading::Tripped { used, threshold } = self.breaker.check() {
                    warn!(used, threshold, "memory threshold crossed, pausing job");
                    pause = Some(PauseReason::MemoryPressure);
                    cursor.halt();
                    break;
                }
            }

            if self.config.pace_every > 0 && summary.processed % self.config.pace_every == 0 {
                tokio::time::sleep(self.config.pace).await;
            }
        }

        let pause = pause.or(match cursor.stats().stop_reason {
            StopReason::Timeout => Some(PauseReason::Timeout),
            StopReason::MaxObjects => Some(PauseReason::ObjectLimit),
            StopReason::Exhausted | StopReason::Halted => None,
        });

        self.flush(job.id, &mut aggregator, &mut summary).await;
        summary.duration = started.elapsed();

        match pause {
            Some(reason) => {
                checkpoint.is_resuming = true;
                self.jobs
                    .save_checkpoint(job.id, &self.config.worker_id, &checkpoint)
                    .await?;
                self.jobs
                    .set_status(job.id, &self.config.worker_id, JobStatus::Paused, None)
                    .await?;
                self.record_stats(job.id, &summary, false).await?;

                info!(?reason, processed = summary.processed, "scan paused");
                self.emit(JobEvent::Paused {
                    job_id: job.id,
                    reason,
                    processed: checkpoint.processed_count,
                });
                Ok(RunOutcome::Paused { reason, summary })
            }
            None => {
                checkpoint.is_resuming = false;
                self.jobs
                    .save_checkpoint(job.id, &self.config.worker_id, &checkpoint)
                    .await?;
                self.jobs
                    .mark_window_completed(job.id, &self.config.worker_id, job.window.end)
                    .await?;
                self.jobs
                    .set_status(job.id, &self.config.worker_id, JobStatus::Completed, None)
                    .await?;
                self.record_stats(job.id, &summary, true).await?;

                info!(
                    processed = checkpoint.processed_count,
                    matches = checkpoint.matches_found,
                    duration_ms = summary.duration.as_millis() as u64,
                    "scan completed"
                );
                self.emit(JobEvent::Completed {
                    job_id: job.id,
                    processed: checkpoint.processed_count,
                    matches_found: checkpoint.matches_found,
                    duration_ms: summary.duration.as_millis() as u64,
                });
                Ok(RunOutcome::Completed(summary))
            }
        }
    }

    /// Classify one document. Returns whether it matched.
    async fn process(
        &self,
        job: &ScanJob,
        category: &Category,
        doc: &CandidateDocument,
        index: u64,
        aggregator: &mut NotificationAggregator,
    ) -> Result<bool, RunnerError> {
        let text = match self.text.extract(doc).await {
            Ok(text) => text,
            Err(ScanError::NoText { .. }) => {
                warn!(key = %doc.key, "no extractable text, treating as non-match");
                return Ok(false);
            }
            Err(e) => {
                return Err(RunnerError::Document {
                    index,
                    key: doc.key.clone(),
                    reason: e.to_string(),
                })
            }
        };

        let result = self
            .cascade
            .classify(&doc.file_name, &text, category)
            .await
            .map_err(|e| RunnerError::Document {
                index,
                key: doc.key.clone(),
                reason: e.to_string(),
            })?;

        let quote = match (&result.quote, result.is_match) {
            (Some(quote), true) => quote.clone(),
            _ => {
                debug!(key = %doc.key, stage = %result.stage, "document rejected");
                return Ok(false);
            }
        };

        if result.is_cached() {
            debug!(key = %doc.key, "cached match, already notified");
            return Ok(true);
        }

        info!(key = %doc.key, project_id = %doc.project_id, "validated match");
        aggregator.push(
            MatchRecord::new(job.id, doc, category.name.clone(), quote, result.confidence),
            &job.subscribers,
        );
        Ok(true)
    }

    async fn fail(
        &self,
        job: &ScanJob,
        mut checkpoint: Checkpoint,
        mut aggregator: NotificationAggregator,
        mut summary: RunSummary,
        error: RunnerError,
    ) -> Result<RunOutcome, RunnerError> {
        let message = error.to_string();
        error!(error = %message, "document failed, job stopped at last checkpoint");

        // Matches found before the failure are valid
        self.flush(job.id, &mut aggregator, &mut summary).await;

        checkpoint.is_resuming = true;
        self.jobs
            .save_checkpoint(job.id, &self.config.worker_id, &checkpoint)
            .await?;
        self.jobs
            .set_status(job.id, &self.config.worker_id, JobStatus::Failed, Some(&message))
            .await?;
        self.record_stats(job.id, &summary, false).await?;

        self.emit(JobEvent::Failed {
            job_id: job.id,
            error: message.clone(),
        });
        Ok(RunOutcome::Failed {
            error: message,
            summary,
        })
    }

    async fn flush(
        &self,
        job_id: Uuid,
        aggregator: &mut NotificationAggregator,
        summary: &mut RunSummary,
    ) {
        if aggregator.is_empty() {
            return;
        }
        let report = aggregator.flush().await;
        let batches = report.batches_sent();
        summary.notifications_sent += batches as u64;
        if batches > 0 {
            self.emit(JobEvent::NotificationsSent {
                job_id,
                batches,
                matches: report.matches_delivered(),
            });
        }
    }

    async fn record_stats(
        &self,
        job_id: Uuid,
        summary: &RunSummary,
        completed: bool,
    ) -> Result<(), RunnerError> {
        let delta = StatsDelta {
            scans_run: u64::from(completed),
            documents_processed: summary.processed,
            matches_found: summary.matches_found,
            notifications_sent: summary.notifications_sent,
        };
        self.jobs.increment_stats(job_id, delta).await?;
        Ok(())
    }

    fn spawn_heartbeat(&self, job_id: Uuid) -> Heartbeat {
        let jobs = self.jobs.clone();
        let worker_id = self.config.worker_id.clone();
        let lease = self.config.lease;
        let period = (lease / 3).max(Duration::from_millis(100));
        let token = CancellationToken::new();
        let cancel = token.clone();
        let lost = CancellationToken::new();
        let signal_lost = lost.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        match jobs.extend_lease(job_id, &worker_id, lease).await {
                            Ok(()) => {}
                            Err(e @ StoreError::LeaseLost { .. }) => {
                                warn!(job_id = %job_id, error = %e, "heartbeat lost the lease");
                                signal_lost.cancel();
                                break;
                            }
                            Err(e) => warn!(job_id = %job_id, error = %e, "heartbeat failed"),
                        }
                    }
                }
            }
        });

        Heartbeat {
            token,
            lost,
            handle,
        }
    }
}

struct Heartbeat {
    token: CancellationToken,

    /// Cancelled when another worker has taken the job over
    lost: CancellationToken,
    handle: JoinHandle<()>,
}

impl Heartbeat {
    async fn stop(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}
