//! Scan job model and its embedded checkpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Running,
    Paused,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether a runner may claim a job in this status.
    ///
    /// Running jobs are claimable only once their lease has expired, which
    /// the store checks separately.
    pub fn is_claimable(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Paused | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "paused" => Some(JobStatus::Paused),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Value types
// ============================================================================

/// Inclusive modification-date window a job scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ScanWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Whether `ts` falls inside the window (both bounds inclusive).
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Someone who receives notifications for a job's matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscriber {
    /// Delivery address (email, webhook target, ...)
    pub address: String,

    /// Display name
    #[serde(default)]
    pub name: Option<String>,
}

impl Subscriber {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Persisted progress marker enabling resumption after a crash or pause.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Index of the last fully processed document in listing order
    pub last_processed_index: Option<u64>,

    /// File name of that document
    pub last_processed_file: Option<String>,

    /// Storage key of that document (stable sort key)
    pub last_processed_key: Option<String>,

    /// Documents in the window, from the count pass
    pub total_documents: u64,

    /// Documents processed so far in this scan
    pub processed_count: u64,

    /// Matches found so far in this scan
    pub matches_found: u64,

    /// Set while a scan is interrupted and should continue where it stopped
    pub is_resuming: bool,
}

impl Checkpoint {
    /// Index the next run should start at.
    pub fn resume_index(&self) -> u64 {
        self.last_processed_index.map(|i| i + 1).unwrap_or(0)
    }

    /// Record that document `index` is done.
    pub fn advance(&mut self, index: u64, file_name: &str, key: &str, matched: bool) {
        self.last_processed_index = Some(index);
        self.last_processed_file = Some(file_name.to_string());
        self.last_processed_key = Some(key.to_string());
        self.processed_count += 1;
        if matched {
            self.matches_found += 1;
        }
        // Listing can grow between the count pass and the scan
        if self.processed_count > self.total_documents {
            self.total_documents = self.processed_count;
        }
    }
}

/// Lifetime statistics for a job across all its scans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub scans_run: u64,
    pub documents_processed: u64,
    pub matches_found: u64,
    pub notifications_sent: u64,
}

/// Increment applied atomically to [`JobStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsDelta {
    pub scans_run: u64,
    pub documents_processed: u64,
    pub matches_found: u64,
    pub notifications_sent: u64,
}

impl JobStats {
    pub fn apply(&mut self, delta: StatsDelta) {
        self.scans_run += delta.scans_run;
        self.documents_processed += delta.documents_processed;
        self.matches_found += delta.matches_found;
        self.notifications_sent += delta.notifications_sent;
    }
}

// ============================================================================
// Job Model
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: Uuid,

    /// Target category name (see [`CategoryCatalog`](crate::CategoryCatalog))
    pub category: String,

    pub subscribers: Vec<Subscriber>,

    pub window: ScanWindow,

    pub status: JobStatus,

    pub checkpoint: Checkpoint,

    pub stats: JobStats,

    // Claim / lease
    pub worker_id: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,

    pub last_error: Option<String>,

    /// End of the most recent window this job completed
    pub last_completed_window_end: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScanJob {
    /// Create a queued job.
    pub fn new(category: impl Into<String>, window: ScanWindow) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            category: category.into(),
            subscribers: Vec::new(),
            window,
            status: JobStatus::Queued,
            checkpoint: Checkpoint::default(),
            stats: JobStats::default(),
            worker_id: None,
            lease_expires_at: None,
            last_error: None,
            last_completed_window_end: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_subscriber(mut self, subscriber: Subscriber) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    pub fn with_subscribers(mut self, subscribers: impl IntoIterator<Item = Subscriber>) -> Self {
        self.subscribers.extend(subscribers);
        self
    }

    /// Whether this job may be claimed at `now`.
    pub fn is_claimable_at(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            JobStatus::Running => self.lease_expires_at.map(|t| t < now).unwrap_or(true),
            status => status.is_claimable(),
        }
    }

    /// Whether the given window would rescan ground this job already covered.
    ///
    /// A follow-up window must start at or after the end of the last
    /// completed one.
    pub fn already_covers(&self, window: &ScanWindow) -> bool {
        self.last_completed_window_end
            .map(|end| window.start < end)
            .unwrap_or(false)
    }
}
