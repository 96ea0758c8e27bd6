//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the scanner without
//! making real classifier, metadata or notification calls.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::{ClassifierError, ClassifierResult, NotifyError, NotifyResult, ScanError, ScanResult};
use crate::traits::classifier::{CategoryAssessment, Classifier, RequestAssessment};
use crate::traits::memory::MemoryProbe;
use crate::traits::metadata::MetadataService;
use crate::traits::notifier::NotificationChannel;
use crate::traits::text::{ExtractedText, TextExtractor};
use crate::types::category::Category;
use crate::types::document::CandidateDocument;
use crate::types::matching::{NotificationBatch, ProjectMetadata};

type ErrorFactory = Arc<dyn Fn() -> ClassifierError + Send + Sync>;

/// Fails the first `remaining` calls of one stage.
#[derive(Clone)]
struct Failures {
    remaining: Arc<AtomicU32>,
    error: ErrorFactory,
}

impl Failures {
    fn new(count: u32, error: impl Fn() -> ClassifierError + Send + Sync + 'static) -> Self {
        Self {
            remaining: Arc::new(AtomicU32::new(count)),
            error: Arc::new(error),
        }
    }

    fn take(failures: &Option<Self>) -> ClassifierResult<()> {
        let Some(f) = failures else {
            return Ok(());
        };
        let took = f
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took {
            Err((f.error)())
        } else {
            Ok(())
        }
    }
}

/// Record of a call made to the mock classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockClassifierCall {
    Screen { chars: usize },
    DetectRequest { chars: usize },
    MatchCategory { chars: usize, category: String },
}

/// Per-stage call counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub screen: usize,
    pub detect_request: usize,
    pub match_category: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.screen + self.detect_request + self.match_category
    }
}

/// A mock classifier for testing.
///
/// Returns configurable answers for every stage and tracks each call for
/// assertions. Failures are injected per stage and consumed in order.
#[derive(Clone)]
pub struct MockClassifier {
    screen: bool,
    request: bool,
    category_match: bool,
    category_quote: Option<String>,

    /// Texts containing any of these are judged not to be requests
    non_request_markers: Vec<String>,

    screen_failures: Option<Failures>,
    detect_failures: Option<Failures>,
    match_failures: Option<Failures>,

    /// Call tracking for assertions
    calls: Arc<RwLock<Vec<MockClassifierCall>>>,
}

impl MockClassifier {
    /// A classifier that says yes at every stage.
    pub fn accepting() -> Self {
        Self {
            screen: true,
            request: true,
            category_match: true,
            category_quote: None,
            non_request_markers: Vec::new(),
            screen_failures: None,
            detect_failures: None,
            match_failures: None,
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// A classifier that rejects at the screen.
    pub fn rejecting() -> Self {
        Self::accepting().with_screen(false)
    }

    pub fn with_screen(mut self, plausible: bool) -> Self {
        self.screen = plausible;
        self
    }

    pub fn with_request(mut self, is_request: bool) -> Self {
        self.request = is_request;
        self
    }

    /// Judge texts containing `marker` (case-insensitive) as non-requests.
    pub fn with_non_request_marker(mut self, marker: impl Into<String>) -> Self {
        self.non_request_markers.push(marker.into().to_lowercase());
        self
    }

    pub fn with_category_match(mut self, matches: bool) -> Self {
        self.category_match = matches;
        self
    }

    /// Advisory quote returned with category matches.
    pub fn with_category_quote(mut self, quote: impl Into<String>) -> Self {
        self.category_quote = Some(quote.into());
        self
    }

    pub fn with_screen_failures(
        mut self,
        count: u32,
        error: impl Fn() -> ClassifierError + Send + Sync + 'static,
    ) -> Self {
        self.screen_failures = Some(Failures::new(count, error));
        self
    }

    pub fn with_detect_failures(
        mut self,
        count: u32,
        error: impl Fn() -> ClassifierError + Send + Sync + 'static,
    ) -> Self {
        self.detect_failures = Some(Failures::new(count, error));
        self
    }

    pub fn with_match_failures(
        mut self,
        count: u32,
        error: impl Fn() -> ClassifierError + Send + Sync + 'static,
    ) -> Self {
        self.match_failures = Some(Failures::new(count, error));
        self
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockClassifierCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_counts(&self) -> CallCounts {
        let mut counts = CallCounts::default();
        for call in self.calls.read().unwrap().iter() {
            match call {
                MockClassifierCall::Screen { .. } => counts.screen += 1,
                MockClassifierCall::DetectRequest { .. } => counts.detect_request += 1,
                MockClassifierCall::MatchCategory { .. } => counts.match_category += 1,
            }
        }
        counts
    }

    /// Clear call history.
    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    fn record(&self, call: MockClassifierCall) {
        self.calls.write().unwrap().push(call);
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn screen(&self, sample: &str) -> ClassifierResult<bool> {
        self.record(MockClassifierCall::Screen {
            chars: sample.chars().count(),
        });
        Failures::take(&self.screen_failures)?;
        Ok(self.screen)
    }

    async fn detect_request(&self, text: &str) -> ClassifierResult<RequestAssessment> {
        self.record(MockClassifierCall::DetectRequest {
            chars: text.chars().count(),
        });
        Failures::take(&self.detect_failures)?;

        let lower = text.to_lowercase();
        if let Some(marker) = self.non_request_markers.iter().find(|m| lower.contains(m.as_str())) {
            return Ok(RequestAssessment::no(format!("mentions {marker}")));
        }
        Ok(if self.request {
            RequestAssessment::yes()
        } else {
            RequestAssessment::no("mock says no")
        })
    }

    async fn match_category(
        &self,
        text: &str,
        category: &Category,
    ) -> ClassifierResult<CategoryAssessment> {
        self.record(MockClassifierCall::MatchCategory {
            chars: text.chars().count(),
            category: category.name.clone(),
        });
        Failures::take(&self.match_failures)?;

        if !self.category_match {
            return Ok(CategoryAssessment::no("mock says no"));
        }
        let mut assessment = CategoryAssessment::yes();
        assessment.quote = self.category_quote.clone();
        Ok(assessment)
    }
}

/// A mock metadata service with canned projects.
///
/// Unknown project ids fail the lookup.
#[derive(Default)]
pub struct MockMetadataService {
    projects: HashMap<String, ProjectMetadata>,
    failures: RwLock<HashMap<String, usize>>,
    lookups: RwLock<HashMap<String, usize>>,
}

impl MockMetadataService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(mut self, project_id: &str, title: &str) -> Self {
        self.projects
            .insert(project_id.to_string(), ProjectMetadata::new(project_id, title));
        self
    }

    /// Fail the next `count` lookups of `project_id`.
    pub fn with_failures(self, project_id: &str, count: usize) -> Self {
        self.failures
            .write()
            .unwrap()
            .insert(project_id.to_string(), count);
        self
    }

    /// Number of lookups made for `project_id`.
    pub fn lookups(&self, project_id: &str) -> usize {
        self.lookups
            .read()
            .unwrap()
            .get(project_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_lookups(&self) -> usize {
        self.lookups.read().unwrap().values().sum()
    }
}

#[async_trait]
impl MetadataService for MockMetadataService {
    async fn project(&self, project_id: &str) -> NotifyResult<ProjectMetadata> {
        *self
            .lookups
            .write()
            .unwrap()
            .entry(project_id.to_string())
            .or_default() += 1;

        if let Some(remaining) = self.failures.write().unwrap().get_mut(project_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(NotifyError::Metadata {
                    project_id: project_id.to_string(),
                    reason: "service unavailable".into(),
                });
            }
        }

        self.projects
            .get(project_id)
            .cloned()
            .ok_or_else(|| NotifyError::Metadata {
                project_id: project_id.to_string(),
                reason: "unknown project".into(),
            })
    }
}

/// A notification channel that records every batch it is given.
#[derive(Default)]
pub struct RecordingChannel {
    batches: RwLock<Vec<NotificationBatch>>,
    failing: HashSet<String>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every delivery to `subscriber`.
    pub fn failing_for(mut self, subscriber: &str) -> Self {
        self.failing.insert(subscriber.to_string());
        self
    }

    /// Batches delivered successfully.
    pub fn batches(&self) -> Vec<NotificationBatch> {
        self.batches.read().unwrap().clone()
    }

    /// Total matches across delivered batches.
    pub fn delivered_matches(&self) -> usize {
        self.batches.read().unwrap().iter().map(|b| b.len()).sum()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn deliver(&self, batch: &NotificationBatch) -> NotifyResult<()> {
        if self.failing.contains(&batch.subscriber) {
            return Err(NotifyError::Delivery {
                subscriber: batch.subscriber.clone(),
                reason: "mock delivery failure".into(),
            });
        }
        self.batches.write().unwrap().push(batch.clone());
        Ok(())
    }
}

/// A memory probe reporting a settable reading.
///
/// Scripted readings are consumed first, one per probe; after that the
/// fixed value is reported.
#[derive(Default)]
pub struct FixedMemoryProbe {
    bytes: AtomicU64,
    script: RwLock<VecDeque<u64>>,
}

impl FixedMemoryProbe {
    pub fn new(bytes: u64) -> Self {
        Self {
            bytes: AtomicU64::new(bytes),
            script: RwLock::new(VecDeque::new()),
        }
    }

    pub fn set(&self, bytes: u64) {
        self.bytes.store(bytes, Ordering::SeqCst);
    }

    /// Readings reported before falling back to the fixed value.
    pub fn with_script(self, readings: impl IntoIterator<Item = u64>) -> Self {
        self.script.write().unwrap().extend(readings);
        self
    }
}

impl MemoryProbe for FixedMemoryProbe {
    fn resident_bytes(&self) -> Option<u64> {
        if let Some(next) = self.script.write().unwrap().pop_front() {
            return Some(next);
        }
        Some(self.bytes.load(Ordering::SeqCst))
    }
}

/// A text extractor with canned text per document key.
///
/// Keys without text yield [`ScanError::NoText`]; keys registered with
/// [`fail`](Self::fail) yield a read error.
#[derive(Default)]
pub struct MemoryTextExtractor {
    texts: RwLock<HashMap<String, ExtractedText>>,
    failing: RwLock<HashSet<String>>,
    extractions: AtomicU64,
}

impl MemoryTextExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(self, key: &str, text: &str) -> Self {
        self.insert(key, ExtractedText::new(text));
        self
    }

    pub fn insert(&self, key: &str, text: ExtractedText) {
        self.texts.write().unwrap().insert(key.to_string(), text);
    }

    pub fn fail(&self, key: &str) {
        self.failing.write().unwrap().insert(key.to_string());
    }

    /// Undo [`fail`](Self::fail).
    pub fn clear_failure(&self, key: &str) {
        self.failing.write().unwrap().remove(key);
    }

    /// Number of extract calls made.
    pub fn extractions(&self) -> u64 {
        self.extractions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextExtractor for MemoryTextExtractor {
    async fn extract(&self, doc: &CandidateDocument) -> ScanResult<ExtractedText> {
        self.extractions.fetch_add(1, Ordering::SeqCst);
        if self.failing.read().unwrap().contains(&doc.key) {
            return Err(ScanError::Read {
                key: doc.key.clone(),
                source: "mock read failure".into(),
            });
        }
        self.texts
            .read()
            .unwrap()
            .get(&doc.key)
            .cloned()
            .ok_or_else(|| ScanError::NoText {
                key: doc.key.clone(),
            })
    }
}
