//! End-to-end runs of the checkpointed job runner against in-memory
//! collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use uuid::Uuid;

use rfi_scanner::error::StoreResult;
use rfi_scanner::testing::{
    FixedMemoryProbe, MemoryTextExtractor, MockClassifier, MockMetadataService, RecordingChannel,
};
use rfi_scanner::{
    Checkpoint, Claim, ClassificationCascade, CascadeConfig, ClassifierError, JobEvent, JobRunner,
    JobStatus, JobStore, MemoryJobStore, MemoryObjectStore, PauseReason, RetryPolicy, RunOutcome,
    RunnerConfig, ScanDeps, ScanJob, ScanWindow, StatsDelta, StoreError, Subscriber,
};

const REQUEST: &str = "Dear Sir or Madam,\n\nFollowing review of the application, the applicant is requested to submit a noise impact assessment for the proposed plant. Please provide this within 21 days.\n\nYours faithfully";

const UNRELATED: &str = "Dear Sir or Madam,\n\nThe site visit is arranged for Tuesday morning at ten. The case officer will meet you at the main gate.\n\nYours faithfully";

const RESPONSE: &str = "Dear Case Officer,\n\nWe have submitted the noise impact assessment as requested.\n\nKind regards";

/// In-memory collaborators for one test.
struct Harness {
    objects: Arc<MemoryObjectStore>,
    text: Arc<MemoryTextExtractor>,
    classifier: Arc<MockClassifier>,
    jobs: Arc<dyn JobStore>,
    metadata: Arc<MockMetadataService>,
    channel: Arc<RecordingChannel>,
    probe: Arc<FixedMemoryProbe>,
    window: ScanWindow,
}

impl Harness {
    fn new(classifier: MockClassifier) -> Self {
        Self::with_jobs(classifier, Arc::new(MemoryJobStore::new()))
    }

    fn with_jobs(classifier: MockClassifier, jobs: Arc<dyn JobStore>) -> Self {
        let end = Utc::now();
        Self {
            objects: Arc::new(MemoryObjectStore::new()),
            text: Arc::new(MemoryTextExtractor::new()),
            classifier: Arc::new(classifier),
            jobs,
            metadata: Arc::new(
                MockMetadataService::new()
                    .with_project("P1", "Land at Mill Lane")
                    .with_project("P2", "Old Barn conversion")
                    .with_project("P3", "Riverside flats"),
            ),
            channel: Arc::new(RecordingChannel::new()),
            probe: Arc::new(FixedMemoryProbe::new(100)),
            window: ScanWindow::new(end - ChronoDuration::days(7), end),
        }
    }

    fn in_window(&self) -> DateTime<Utc> {
        self.window.end - ChronoDuration::days(1)
    }

    fn add(&self, key: &str, text: &str) {
        self.objects.put(key, b"%PDF".to_vec(), self.in_window());
        self.text.insert(key, rfi_scanner::ExtractedText::new(text));
    }

    fn add_outside_window(&self, key: &str, text: &str) {
        self.objects
            .put(key, b"%PDF".to_vec(), self.window.start - ChronoDuration::days(30));
        self.text.insert(key, rfi_scanner::ExtractedText::new(text));
    }

    fn deps(&self) -> ScanDeps {
        ScanDeps {
            objects: self.objects.clone(),
            text: self.text.clone(),
            classifier: self.classifier.clone(),
            jobs: self.jobs.clone(),
            metadata: self.metadata.clone(),
            channel: self.channel.clone(),
            memory: self.probe.clone(),
        }
    }

    fn runner(&self, config: RunnerConfig) -> JobRunner {
        let cascade = ClassificationCascade::new(self.classifier.clone(), CascadeConfig::default())
            .with_retry(RetryPolicy::new(3, Duration::from_millis(10)).without_jitter());
        JobRunner::new(self.deps(), config).with_cascade(cascade)
    }

    async fn job(&self) -> ScanJob {
        let job = ScanJob::new("acoustic", self.window)
            .with_subscriber(Subscriber::new("planning@example.com"));
        self.jobs.create(&job).await.unwrap();
        job
    }
}

fn config() -> RunnerConfig {
    RunnerConfig::with_worker_id("test-worker").with_checkpointing(10, 5, 100)
}

#[tokio::test]
async fn test_only_documents_in_window_are_processed() {
    let h = Harness::new(MockClassifier::accepting());
    h.add("P1/letter-a.pdf", UNRELATED);
    h.add("P2/letter-b.pdf", UNRELATED);
    h.add_outside_window("P3/old.pdf", REQUEST);
    let job = h.job().await;

    let outcome = h.runner(config()).run(job.id).await.unwrap();

    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(summary.processed, 2);
    assert_eq!(h.text.extractions(), 2);
}

#[tokio::test]
async fn test_full_run_notifies_validated_matches() {
    let h = Harness::new(MockClassifier::accepting());
    h.add("P1/letter-1.pdf", REQUEST);
    h.add("P1/letter-2.pdf", UNRELATED);
    h.add("P2/letter-3.pdf", REQUEST);
    h.add("P3/letter-4.pdf", RESPONSE);
    h.add("P3/Applicant_Response.pdf", REQUEST);
    let job = h.job().await;

    let outcome = h.runner(config()).run(job.id).await.unwrap();

    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(summary.processed, 5);
    assert_eq!(summary.matches_found, 2);
    assert_eq!(summary.notifications_sent, 1);

    let batches = h.channel.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].subscriber, "planning@example.com");
    let keys: Vec<&str> = batches[0]
        .matches
        .iter()
        .map(|m| m.record.document.key.as_str())
        .collect();
    assert_eq!(keys, vec!["P1/letter-1.pdf", "P2/letter-3.pdf"]);
    for m in &batches[0].matches {
        assert!(m.record.quote.contains("noise"));
        assert!(m.record.quote.contains("submit"));
    }
    assert_eq!(h.metadata.lookups("P1"), 1);

    let stored = h.jobs.get(job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.worker_id, None);
    assert!(!stored.checkpoint.is_resuming);
    assert_eq!(stored.checkpoint.processed_count, 5);
    assert_eq!(stored.checkpoint.total_documents, 5);
    assert_eq!(stored.checkpoint.matches_found, 2);
    assert_eq!(stored.last_completed_window_end, Some(h.window.end));
    assert_eq!(stored.stats.scans_run, 1);
    assert_eq!(stored.stats.documents_processed, 5);
    assert_eq!(stored.stats.notifications_sent, 1);
}

#[tokio::test]
async fn test_memory_pressure_pauses_then_resumes_without_reprocessing() {
    let h = Harness::new(MockClassifier::accepting());
    for i in 0..5 {
        h.add(&format!("P1/letter-{i}.pdf"), UNRELATED);
    }
    h.add("P2/request.pdf", REQUEST);
    let job = h.job().await;

    // Third persisted document reads above 85% of the 1000 byte ceiling
    let probe = Arc::new(FixedMemoryProbe::new(100).with_script([100, 100, 900]));
    let deps = ScanDeps {
        memory: probe,
        ..h.deps()
    };
    let cfg = config().with_memory_ceiling(1000, 0.85);
    let runner = JobRunner::new(deps, cfg).with_cascade(
        ClassificationCascade::new(h.classifier.clone(), CascadeConfig::default()),
    );

    let outcome = runner.run(job.id).await.unwrap();
    let RunOutcome::Paused { reason, summary } = outcome else {
        panic!("expected pause, got {outcome:?}");
    };
    assert_eq!(reason, PauseReason::MemoryPressure);
    assert_eq!(summary.processed, 3);

    let paused = h.jobs.get(job.id).await.unwrap();
    assert_eq!(paused.status, JobStatus::Paused);
    assert!(paused.checkpoint.is_resuming);
    assert_eq!(paused.checkpoint.resume_index(), 3);
    assert_eq!(paused.checkpoint.last_processed_key.as_deref(), Some("P1/letter-2.pdf"));
    assert_eq!(paused.stats.scans_run, 0);

    let outcome = runner.run(job.id).await.unwrap();
    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.matches_found, 1);

    // Every document extracted exactly once across both runs
    assert_eq!(h.text.extractions(), 6);

    let done = h.jobs.get(job.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.checkpoint.processed_count, 6);
    assert_eq!(done.stats.documents_processed, 6);
    assert_eq!(done.stats.scans_run, 1);
}

#[tokio::test]
async fn test_object_limit_pauses_with_resumable_checkpoint() {
    let h = Harness::new(MockClassifier::accepting());
    for i in 0..6 {
        h.add(&format!("P1/letter-{i}.pdf"), UNRELATED);
    }
    let job = h.job().await;
    let cfg = config().with_limits(rfi_scanner::ScanLimits::none().with_max_objects(4));
    let runner = h.runner(cfg);

    let outcome = runner.run(job.id).await.unwrap();
    assert!(matches!(
        outcome,
        RunOutcome::Paused {
            reason: PauseReason::ObjectLimit,
            ..
        }
    ));
    assert_eq!(h.jobs.get(job.id).await.unwrap().checkpoint.resume_index(), 4);
}

#[tokio::test]
async fn test_document_failure_fails_job_and_resumes_at_failed_document() {
    let h = Harness::new(MockClassifier::accepting());
    for i in 0..4 {
        h.add(&format!("P1/letter-{i}.pdf"), UNRELATED);
    }
    h.text.fail("P1/letter-2.pdf");
    let job = h.job().await;
    let runner = h.runner(config());

    let outcome = runner.run(job.id).await.unwrap();
    let RunOutcome::Failed { error, summary } = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(error.contains("P1/letter-2.pdf"));
    assert_eq!(summary.processed, 2);

    let failed = h.jobs.get(job.id).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.last_error.is_some());
    assert_eq!(failed.checkpoint.resume_index(), 2);

    h.text.clear_failure("P1/letter-2.pdf");
    let outcome = runner.run(job.id).await.unwrap();
    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.processed, 2);
    assert_eq!(h.jobs.get(job.id).await.unwrap().last_error, None);
}

#[tokio::test]
async fn test_missing_text_is_a_non_match_not_a_failure() {
    let h = Harness::new(MockClassifier::accepting());
    h.add("P1/letter-1.pdf", REQUEST);
    h.objects.put("P1/scan.pdf", b"%PDF".to_vec(), h.in_window());
    let job = h.job().await;

    let outcome = h.runner(config()).run(job.id).await.unwrap();
    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.matches_found, 1);
}

#[tokio::test(start_paused = true)]
async fn test_classifier_timeouts_retried_within_run() {
    let h = Harness::new(
        MockClassifier::accepting().with_detect_failures(2, || ClassifierError::Timeout),
    );
    h.add("P1/letter-1.pdf", REQUEST);
    let job = h.job().await;

    let started = tokio::time::Instant::now();
    let outcome = h.runner(config()).run(job.id).await.unwrap();

    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(summary.matches_found, 1);
    assert_eq!(h.classifier.call_counts().detect_request, 3);
    // 10ms + 20ms backoff
    assert!(started.elapsed() >= Duration::from_millis(30));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_classifier_retries_fail_the_job() {
    let h = Harness::new(
        MockClassifier::accepting().with_match_failures(10, || ClassifierError::Timeout),
    );
    h.add("P1/letter-1.pdf", REQUEST);
    let job = h.job().await;

    let outcome = h.runner(config()).run(job.id).await.unwrap();

    assert!(matches!(outcome, RunOutcome::Failed { .. }));
    let stored = h.jobs.get(job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.checkpoint.resume_index(), 0);
    assert!(h.channel.batches().is_empty());
}

#[tokio::test]
async fn test_cache_hits_make_no_classifier_calls() {
    let h = Harness::new(MockClassifier::accepting());
    h.add("P1/letter-1.pdf", REQUEST);
    h.add("P2/letter-2.pdf", UNRELATED);
    let runner = h.runner(config());

    let first = h.job().await;
    runner.run(first.id).await.unwrap();
    let calls = h.classifier.call_counts().total();
    assert!(calls > 0);
    assert_eq!(h.channel.batches().len(), 1);

    let second = h.job().await;
    let outcome = runner.run(second.id).await.unwrap();
    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };

    assert_eq!(h.classifier.call_counts().total(), calls);
    // Cached matches count but are not delivered again
    assert_eq!(summary.matches_found, 1);
    assert_eq!(h.channel.batches().len(), 1);
}

#[tokio::test]
async fn test_completed_job_is_not_run_again() {
    let h = Harness::new(MockClassifier::accepting());
    h.add("P1/letter-1.pdf", REQUEST);
    let job = h.job().await;
    let runner = h.runner(config());

    assert!(matches!(runner.run(job.id).await.unwrap(), RunOutcome::Completed(_)));
    assert_eq!(runner.run(job.id).await.unwrap(), RunOutcome::NotClaimed);
    assert_eq!(h.channel.batches().len(), 1);

    assert!(matches!(
        h.jobs.requeue(job.id, h.window).await,
        Err(StoreError::AlreadyScanned { .. })
    ));
}

#[tokio::test]
async fn test_concurrent_runners_single_claim() {
    let h = Harness::new(MockClassifier::accepting());
    for i in 0..20 {
        h.add(&format!("P1/letter-{i:02}.pdf"), UNRELATED);
    }
    let job = h.job().await;
    let a = Arc::new(h.runner(RunnerConfig::with_worker_id("a")));
    let b = Arc::new(h.runner(RunnerConfig::with_worker_id("b")));

    let (ra, rb) = tokio::join!(
        {
            let a = a.clone();
            async move { a.run(job.id).await.unwrap() }
        },
        {
            let b = b.clone();
            async move { b.run(job.id).await.unwrap() }
        }
    );

    let ran = [&ra, &rb]
        .into_iter()
        .filter(|o| **o != RunOutcome::NotClaimed)
        .count();
    assert_eq!(ran, 1);
    assert_eq!(h.text.extractions(), 20);
}

#[tokio::test]
async fn test_expired_lease_is_recovered() {
    let h = Harness::new(MockClassifier::accepting());
    h.add("P1/letter-1.pdf", UNRELATED);
    let job = h.job().await;

    // A crashed worker's claim with a lease that is already over
    h.jobs
        .claim(job.id, "crashed", Duration::ZERO)
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let runner = h.runner(config());
    let mut events = runner.subscribe();
    let outcome = runner.run(job.id).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));

    let first = events.recv().await.unwrap();
    match first {
        JobEvent::LeaseRecovered {
            old_worker_id,
            new_worker_id,
            ..
        } => {
            assert_eq!(old_worker_id.as_deref(), Some("crashed"));
            assert_eq!(new_worker_id, "test-worker");
        }
        other => panic!("expected lease recovery, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_category_fails_job() {
    let h = Harness::new(MockClassifier::accepting());
    let job = ScanJob::new("astrology", h.window);
    h.jobs.create(&job).await.unwrap();

    let err = h.runner(config()).run(job.id).await.unwrap_err();
    assert!(matches!(err, rfi_scanner::RunnerError::UnknownCategory(_)));
    assert_eq!(h.jobs.get(job.id).await.unwrap().status, JobStatus::Failed);
}

// ============================================================================
// Checkpoint monotonicity
// ============================================================================

/// Job store that records every checkpoint written through it, with the
/// job status at the time of the write.
struct RecordingJobStore {
    inner: MemoryJobStore,
    checkpoints: RwLock<Vec<(JobStatus, Checkpoint)>>,

    /// Another worker claims the job just before this checkpoint write
    takeover_at: Option<usize>,
}

impl RecordingJobStore {
    fn new() -> Self {
        Self {
            inner: MemoryJobStore::new(),
            checkpoints: RwLock::new(Vec::new()),
            takeover_at: None,
        }
    }

    fn with_takeover_at(mut self, write: usize) -> Self {
        self.takeover_at = Some(write);
        self
    }

    fn checkpoints(&self) -> Vec<(JobStatus, Checkpoint)> {
        self.checkpoints.read().unwrap().clone()
    }
}

#[async_trait]
impl JobStore for RecordingJobStore {
    async fn create(&self, job: &ScanJob) -> StoreResult<()> {
        self.inner.create(job).await
    }

    async fn get(&self, job_id: Uuid) -> StoreResult<ScanJob> {
        self.inner.get(job_id).await
    }

    async fn list(&self) -> StoreResult<Vec<ScanJob>> {
        self.inner.list().await
    }

    async fn claim(
        &self,
        job_id: Uuid,
        worker_id: &str,
        lease: Duration,
    ) -> StoreResult<Option<Claim>> {
        self.inner.claim(job_id, worker_id, lease).await
    }

    async fn extend_lease(
        &self,
        job_id: Uuid,
        worker_id: &str,
        lease: Duration,
    ) -> StoreResult<()> {
        self.inner.extend_lease(job_id, worker_id, lease).await
    }

    async fn save_checkpoint(
        &self,
        job_id: Uuid,
        worker_id: &str,
        checkpoint: &Checkpoint,
    ) -> StoreResult<()> {
        let writes = self.checkpoints.read().unwrap().len();
        if self.takeover_at == Some(writes) {
            // Past the holder's zero-length lease
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.inner
                .claim(job_id, "usurper", Duration::from_secs(600))
                .await?;
        }
        let status = self.inner.get(job_id).await?.status;
        self.inner
            .save_checkpoint(job_id, worker_id, checkpoint)
            .await?;
        self.checkpoints
            .write()
            .unwrap()
            .push((status, checkpoint.clone()));
        Ok(())
    }

    async fn set_status(
        &self,
        job_id: Uuid,
        worker_id: &str,
        status: JobStatus,
        error: Option<&str>,
    ) -> StoreResult<()> {
        self.inner.set_status(job_id, worker_id, status, error).await
    }

    async fn increment_stats(&self, job_id: Uuid, delta: StatsDelta) -> StoreResult<()> {
        self.inner.increment_stats(job_id, delta).await
    }

    async fn mark_window_completed(
        &self,
        job_id: Uuid,
        worker_id: &str,
        window_end: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.inner
            .mark_window_completed(job_id, worker_id, window_end)
            .await
    }

    async fn requeue(&self, job_id: Uuid, window: ScanWindow) -> StoreResult<()> {
        self.inner.requeue(job_id, window).await
    }

    async fn next_claimable(&self) -> StoreResult<Option<Uuid>> {
        self.inner.next_claimable().await
    }
}

#[tokio::test]
async fn test_checkpoint_index_never_decreases_across_pauses() {
    let store = Arc::new(RecordingJobStore::new());
    let h = Harness::with_jobs(MockClassifier::accepting(), store.clone());
    for i in 0..12 {
        h.add(&format!("P1/letter-{i:02}.pdf"), UNRELATED);
    }
    let job = h.job().await;

    // Pause every 4 objects until the window is done
    let cfg = config()
        .with_checkpointing(2, 3, 100)
        .with_limits(rfi_scanner::ScanLimits::none().with_max_objects(4));
    let runner = h.runner(cfg);
    let mut runs = 0;
    loop {
        runs += 1;
        assert!(runs < 10, "scan never completed");
        match runner.run(job.id).await.unwrap() {
            RunOutcome::Completed(_) => break,
            RunOutcome::Paused { .. } => continue,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    let indices: Vec<u64> = store
        .checkpoints()
        .iter()
        .filter_map(|(_, cp)| cp.last_processed_index)
        .collect();
    assert!(!indices.is_empty());
    assert!(indices.windows(2).all(|w| w[0] <= w[1]), "{indices:?}");
    assert_eq!(indices.last(), Some(&11));
    assert_eq!(h.text.extractions(), 12);
}

#[tokio::test]
async fn test_first_run_checkpoints_are_not_resuming() {
    let store = Arc::new(RecordingJobStore::new());
    let h = Harness::with_jobs(MockClassifier::accepting(), store.clone());
    for i in 0..7 {
        h.add(&format!("P1/letter-{i}.pdf"), UNRELATED);
    }
    let job = h.job().await;

    let outcome = h.runner(config().with_checkpointing(2, 3, 100)).run(job.id).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));

    let running: Vec<Checkpoint> = store
        .checkpoints()
        .into_iter()
        .filter(|(status, _)| *status == JobStatus::Running)
        .map(|(_, cp)| cp)
        .collect();
    assert!(running.len() > 1);
    assert!(running.iter().all(|cp| !cp.is_resuming), "{running:?}");
}

// ============================================================================
// Lease fencing and crash recovery
// ============================================================================

#[tokio::test]
async fn test_crashed_run_resumes_after_last_processed_document() {
    let h = Harness::new(MockClassifier::accepting());
    for i in 0..6 {
        h.add(&format!("P1/letter-{i}.pdf"), UNRELATED);
    }
    let job = h.job().await;

    // A worker processed three documents, then died mid-run with its
    // checkpoint still marked as a fresh run
    h.jobs
        .claim(job.id, "crashed", Duration::ZERO)
        .await
        .unwrap()
        .unwrap();
    let checkpoint = Checkpoint {
        last_processed_index: Some(2),
        last_processed_file: Some("letter-2.pdf".to_string()),
        last_processed_key: Some("P1/letter-2.pdf".to_string()),
        processed_count: 3,
        total_documents: 6,
        is_resuming: false,
        ..Checkpoint::default()
    };
    h.jobs
        .save_checkpoint(job.id, "crashed", &checkpoint)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let runner = h.runner(config());
    let mut events = runner.subscribe();
    let outcome = runner.run(job.id).await.unwrap();

    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.processed, 3);
    // Only the documents after the crash point are extracted
    assert_eq!(h.text.extractions(), 3);
    assert!(matches!(
        events.recv().await.unwrap(),
        JobEvent::LeaseRecovered { .. }
    ));

    let done = h.jobs.get(job.id).await.unwrap();
    assert_eq!(done.checkpoint.processed_count, 6);
    assert_eq!(done.checkpoint.last_processed_key.as_deref(), Some("P1/letter-5.pdf"));
}

#[tokio::test]
async fn test_stale_runner_stops_after_takeover() {
    // The second checkpoint write is the first one after a document
    let store = Arc::new(RecordingJobStore::new().with_takeover_at(1));
    let h = Harness::with_jobs(MockClassifier::accepting(), store.clone());
    for i in 0..6 {
        h.add(&format!("P1/letter-{i}.pdf"), UNRELATED);
    }
    let job = h.job().await;

    // A zero lease lets the takeover claim succeed at once
    let cfg = RunnerConfig {
        lease: Duration::ZERO,
        ..config().with_checkpointing(1, 100, 100)
    };
    let err = h.runner(cfg).run(job.id).await.unwrap_err();
    assert!(
        matches!(
            err,
            rfi_scanner::RunnerError::Store(StoreError::LeaseLost { .. })
        ),
        "{err:?}"
    );

    // The new holder's state is untouched by the stale runner
    let stored = h.jobs.get(job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Running);
    assert_eq!(stored.worker_id.as_deref(), Some("usurper"));
    assert_eq!(stored.checkpoint.processed_count, 0);
    assert_eq!(stored.last_completed_window_end, None);
    assert_eq!(store.checkpoints().len(), 1);
    assert!(h.channel.batches().is_empty());
}
