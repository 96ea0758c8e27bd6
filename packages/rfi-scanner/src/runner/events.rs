use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a run stopped before finishing its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    /// Resident memory crossed the breaker threshold
    MemoryPressure,
    /// The scan's soft time limit ran out
    Timeout,
    /// The scan's object limit was reached
    ObjectLimit,
}

/// Job lifecycle events.
///
/// These are facts about a run, broadcast to anyone subscribed to the
/// runner. Sending never blocks and is a no-op without subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobEvent {
    /// A run claimed the job and started scanning.
    Started {
        job_id: Uuid,
        worker_id: String,
        resuming: bool,
        resume_index: u64,
        total_documents: u64,
    },

    /// A running job's lease had expired and was taken over.
    LeaseRecovered {
        job_id: Uuid,
        old_worker_id: Option<String>,
        new_worker_id: String,
    },

    /// Periodic progress report.
    Milestone {
        job_id: Uuid,
        processed: u64,
        total_documents: u64,
        matches_found: u64,
    },

    /// Pending matches were delivered.
    NotificationsSent {
        job_id: Uuid,
        batches: usize,
        matches: usize,
    },

    /// The run stopped early; the job resumes from its checkpoint.
    Paused {
        job_id: Uuid,
        reason: PauseReason,
        processed: u64,
    },

    /// A document could not be processed; the job resumes from its checkpoint.
    Failed { job_id: Uuid, error: String },

    /// The window was fully scanned.
    Completed {
        job_id: Uuid,
        processed: u64,
        matches_found: u64,
        duration_ms: u64,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> Uuid {
        match self {
            JobEvent::Started { job_id, .. }
            | JobEvent::LeaseRecovered { job_id, .. }
            | JobEvent::Milestone { job_id, .. }
            | JobEvent::NotificationsSent { job_id, .. }
            | JobEvent::Paused { job_id, .. }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::Completed { job_id, .. } => *job_id,
        }
    }
}
