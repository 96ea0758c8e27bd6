//! Resumable Request-for-Information Scanner
//!
//! Walks a very large object store for documents modified inside a date
//! window, decides for each one whether it is a formal request for further
//! information concerning a target category, and notifies subscribers of the
//! matches. Scans survive crashes, restarts and memory pressure by resuming
//! from a persisted checkpoint.
//!
//! # Design Philosophy
//!
//! - Cheapest check first: structural filters before any classifier call
//! - No match without evidence: every match carries a verbatim quote
//! - Constant memory: the listing is streamed, caches are bounded
//! - The checkpoint is the only source of truth for where a scan resumes
//!
//! # Usage
//!
//! ```rust,ignore
//! use rfi_scanner::{JobRunner, MemoryJobStore, RunnerConfig, ScanDeps, ScanJob, ScanWindow};
//! use rfi_scanner::testing::MockClassifier;
//!
//! let runner = JobRunner::new(deps, RunnerConfig::default());
//!
//! let job = ScanJob::new("acoustic", ScanWindow::new(start, end))
//!     .with_subscriber(Subscriber::new("planning@example.com"));
//! runner.jobs().create(&job).await?;
//!
//! match runner.run(job.id).await? {
//!     RunOutcome::Completed(summary) => println!("{} matches", summary.matches_found),
//!     RunOutcome::Paused { reason, .. } => println!("paused: {reason:?}"),
//!     other => println!("{other:?}"),
//! }
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Collaborator interfaces (ObjectStore, Classifier, JobStore, ...)
//! - [`types`] - Jobs, checkpoints, documents, verdicts and configuration
//! - [`scanner`] - Paginated, window-filtered object store walk
//! - [`cascade`] - Five-stage classification with evidence gating
//! - [`runner`] - Checkpointed job runner, memory breaker and poller
//! - [`notify`] - Per-subscriber match aggregation and delivery
//! - [`stores`] - Job store implementations (memory, file, Postgres)
//! - [`ai`] - Classifier implementations
//! - [`testing`] - Mock implementations for testing

pub mod ai;
pub mod cache;
pub mod cascade;
pub mod error;
pub mod notify;
pub mod retry;
pub mod runner;
pub mod scanner;
pub mod stores;
pub mod testing;
pub mod text;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{
    CascadeError, ClassifierError, NotifyError, RunnerError, ScanError, StoreError,
};
pub use traits::{
    classifier::{CategoryAssessment, Classifier, RequestAssessment},
    job_store::{Claim, JobStore},
    memory::{MemoryProbe, ProcMemoryProbe},
    metadata::MetadataService,
    notifier::NotificationChannel,
    object_store::{ListPage, ObjectStore},
    text::{ExtractedText, TextExtractor},
};
pub use types::{
    category::{Category, CategoryCatalog},
    classification::{ClassificationResult, Stage},
    config::{CascadeConfig, RunnerConfig, ScanLimits, ScannerConfig},
    document::{key_order, CandidateDocument, DocumentKind, ObjectSummary},
    job::{Checkpoint, JobStats, JobStatus, ScanJob, ScanWindow, StatsDelta, Subscriber},
    matching::{DocumentRef, MatchRecord, NotificationBatch, NotifiedMatch, ProjectMetadata},
};

pub use cache::{BoundedCache, ResultCache};
pub use cascade::ClassificationCascade;
pub use notify::{FlushReport, HttpMetadataService, NotificationAggregator, WebhookChannel};
pub use retry::RetryPolicy;
pub use runner::{
    JobEvent, JobPoller, JobRunner, MemoryBreaker, PauseReason, PollerConfig, RunOutcome,
    RunSummary, ScanDeps,
};
pub use scanner::{LocalObjectStore, MemoryObjectStore, ObjectStoreScanner, ScanStats, StopReason};
pub use stores::{FileJobStore, MemoryJobStore};
pub use text::SidecarTextExtractor;

#[cfg(feature = "postgres")]
pub use stores::PostgresJobStore;

// Re-export testing utilities
pub use testing::{MockClassifier, MockMetadataService, RecordingChannel};
