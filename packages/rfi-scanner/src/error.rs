//! Typed errors for the scanner library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. Stage rejections are never
//! errors; they are returned as [`ClassificationResult`](crate::ClassificationResult)
//! values. Only genuine I/O and infrastructure failures show up here.

use thiserror::Error;
use uuid::Uuid;

use crate::types::job::JobStatus;

/// Errors from the object store listing and text extraction seam.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Listing call failed
    #[error("object store listing failed: {0}")]
    Listing(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Object could not be read
    #[error("failed to read object {key}: {source}")]
    Read {
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Object missing from the store
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// Text could not be extracted from a document
    #[error("no text available for {key}")]
    NoText { key: String },

    /// Continuation token was rejected by the store
    #[error("invalid continuation token: {0}")]
    InvalidToken(String),
}

/// Errors returned by the external semantic classifier.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// Request timed out
    #[error("classifier timed out")]
    Timeout,

    /// Connection reset, refused or otherwise interrupted
    #[error("classifier transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status
    #[error("classifier returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Response did not match the typed contract
    #[error("malformed classifier output: {0}")]
    Malformed(String),

    /// Misconfigured client (missing key, bad URL)
    #[error("classifier config error: {0}")]
    Config(String),
}

impl ClassifierError {
    /// Whether a retry has a reasonable chance of succeeding.
    ///
    /// Timeouts, transport failures, rate limiting, server errors and
    /// malformed output are retried. Client errors and configuration
    /// problems are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClassifierError::Timeout
            | ClassifierError::Transport(_)
            | ClassifierError::Malformed(_) => true,
            ClassifierError::Http { status, .. } => *status == 429 || *status >= 500,
            ClassifierError::Config(_) => false,
        }
    }
}

/// Errors from a single cascade invocation.
#[derive(Debug, Error)]
pub enum CascadeError {
    /// A classifier stage exhausted its retries
    #[error("{stage} classifier call failed after {attempts} attempts: {source}")]
    Classifier {
        stage: &'static str,
        attempts: u32,
        #[source]
        source: ClassifierError,
    },
}

/// Errors from the persistent job/checkpoint store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Job does not exist
    #[error("job not found: {0}")]
    NotFound(Uuid),

    /// Status transition not allowed from the current state
    #[error("job {job_id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    /// Requeue onto a window that overlaps ground already scanned
    #[error("job {job_id} already scanned up to {covered_until}")]
    AlreadyScanned {
        job_id: Uuid,
        covered_until: chrono::DateTime<chrono::Utc>,
    },

    /// The caller no longer holds the job's lease
    #[error("worker {worker_id} no longer holds the lease on job {job_id}")]
    LeaseLost { job_id: Uuid, worker_id: String },

    /// Backend failure (I/O, database)
    #[error("storage error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Stored record could not be decoded
    #[error("corrupt job record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Errors from the metadata service and notification channel.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Metadata lookup failed
    #[error("metadata lookup failed for project {project_id}: {reason}")]
    Metadata { project_id: String, reason: String },

    /// Delivery failed
    #[error("delivery to {subscriber} failed: {reason}")]
    Delivery { subscriber: String, reason: String },

    /// HTTP error talking to a collaborator
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors surfaced by the job runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// A document could not be processed; the job is now Failed and resumable
    #[error("document {index} ({key}) failed: {reason}")]
    Document {
        index: u64,
        key: String,
        reason: String,
    },

    /// Listing failed outside of per-document processing
    #[error("scan failed: {0}")]
    Scan(#[from] ScanError),

    /// Job store failure
    #[error("job store error: {0}")]
    Store(#[from] StoreError),

    /// Unknown target category
    #[error("unknown category: {0}")]
    UnknownCategory(String),
}

/// Result type alias for scan operations.
pub type ScanResult<T> = std::result::Result<T, ScanError>;

/// Result type alias for classifier calls.
pub type ClassifierResult<T> = std::result::Result<T, ClassifierError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for notification operations.
pub type NotifyResult<T> = std::result::Result<T, NotifyError>;
