//! Configuration types for scanning, classification and job running.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Configuration for the object store scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Objects requested per listing call.
    ///
    /// Default: 1000 (the S3 maximum).
    pub page_size: usize,

    /// Lowercase extensions worth classifying.
    ///
    /// Default: `["pdf"]`. Add `"docx"` to widen the scope.
    pub target_extensions: Vec<String>,

    /// Exact file names that are never documents.
    pub ignored_names: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            page_size: 1000,
            target_extensions: vec!["pdf".to_string()],
            ignored_names: [".DS_Store", "Thumbs.db", "desktop.ini", "_SUCCESS", "_$folder$"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ScannerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listing page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Replace the target extensions.
    pub fn with_extensions(mut self, exts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.target_extensions = exts
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }
}

/// Hard and soft limits on one listing pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanLimits {
    /// Stop after examining this many objects (hard limit)
    pub max_objects: Option<u64>,

    /// Stop once this much time has elapsed (soft limit, checked between objects)
    pub timeout: Option<Duration>,
}

impl ScanLimits {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_max_objects(mut self, max: u64) -> Self {
        self.max_objects = Some(max);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Configuration for the classification cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeConfig {
    /// Documents estimated longer than this are treated as reports.
    ///
    /// Default: 12.
    pub max_pages: u32,

    /// Characters per page when the extractor gives no page count.
    pub chars_per_page: usize,

    /// Characters taken from each end of the text for the screening call.
    ///
    /// Default: 1500.
    pub sample_chars: usize,

    /// Upper bound on text sent to the expensive calls.
    ///
    /// Default: 12000.
    pub max_classifier_chars: usize,

    /// Maximum words between the request verb and the category term in an
    /// evidence quote.
    ///
    /// Default: 30.
    pub proximity_words: usize,

    /// Result cache capacity.
    pub cache_capacity: usize,

    /// Leading characters of normalized text that feed the cache key.
    pub cache_prefix_chars: usize,

    /// Treat a failed screening call as a pass.
    ///
    /// Default: true (recall over precision at stage 1).
    pub fail_open_screen: bool,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            max_pages: 12,
            chars_per_page: 3000,
            sample_chars: 1500,
            max_classifier_chars: 12_000,
            proximity_words: 30,
            cache_capacity: 1000,
            cache_prefix_chars: 500,
            fail_open_screen: true,
        }
    }
}

impl CascadeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_proximity_words(mut self, words: usize) -> Self {
        self.proximity_words = words;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }
}

/// Configuration for the checkpointed job runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Identity written into the job lease
    pub worker_id: String,

    /// How long a claim stays valid without a checkpoint write
    pub lease: Duration,

    /// Persist after every document for this many documents
    pub checkpoint_warmup: u64,

    /// After warm-up, persist every N documents
    pub checkpoint_every: u64,

    /// Persist, flush notifications and emit progress every M documents
    pub milestone_every: u64,

    /// Runtime memory ceiling in bytes; `None` disables the breaker
    pub memory_ceiling_bytes: Option<u64>,

    /// Fraction of the ceiling that trips the breaker
    pub memory_fraction: f64,

    /// Sleep `pace` after every `pace_every` documents (0 disables)
    pub pace_every: u64,
    pub pace: Duration,

    /// Run a listing-only pass first to fill `total_documents`
    pub count_first: bool,

    /// Limits applied to the document stream
    pub limits: ScanLimits,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::new_v4()),
            lease: Duration::from_secs(300),
            checkpoint_warmup: 10,
            checkpoint_every: 5,
            milestone_every: 100,
            memory_ceiling_bytes: None,
            memory_fraction: 0.85,
            pace_every: 0,
            pace: Duration::ZERO,
            count_first: true,
            limits: ScanLimits::default(),
        }
    }
}

impl RunnerConfig {
    /// Create a config with a specific worker ID.
    pub fn with_worker_id(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }

    pub fn with_memory_ceiling(mut self, bytes: u64, fraction: f64) -> Self {
        self.memory_ceiling_bytes = Some(bytes);
        self.memory_fraction = fraction;
        self
    }

    pub fn with_checkpointing(mut self, warmup: u64, every: u64, milestone: u64) -> Self {
        self.checkpoint_warmup = warmup;
        self.checkpoint_every = every.max(1);
        self.milestone_every = milestone.max(1);
        self
    }

    pub fn with_pacing(mut self, every: u64, pause: Duration) -> Self {
        self.pace_every = every;
        self.pace = pause;
        self
    }

    pub fn with_limits(mut self, limits: ScanLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Whether the checkpoint must be written after processing `index`.
    pub fn should_persist(&self, index: u64) -> bool {
        let done = index + 1;
        index < self.checkpoint_warmup
            || done % self.checkpoint_every.max(1) == 0
            || self.is_milestone(index)
    }

    /// Whether `index` completes a milestone.
    pub fn is_milestone(&self, index: u64) -> bool {
        (index + 1) % self.milestone_every.max(1) == 0
    }
}
