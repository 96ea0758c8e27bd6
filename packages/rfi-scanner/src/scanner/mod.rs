//! Paginated, constant-memory scan over an object store.
//!
//! At most one listing page is held at a time. Objects are filtered by
//! modification window, extension and ignored names, then handed out one at
//! a time as [`CandidateDocument`]s.

mod local;
mod memory;

pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;

use std::collections::VecDeque;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{ScanError, ScanResult};
use crate::traits::object_store::ObjectStore;
use crate::types::config::{ScanLimits, ScannerConfig};
use crate::types::document::{extension, CandidateDocument, ObjectSummary};
use crate::types::job::ScanWindow;

/// Why a scan stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Listing ran out of objects
    Exhausted,
    /// Hard object limit reached
    MaxObjects,
    /// Soft time limit reached
    Timeout,
    /// The consumer asked to stop
    Halted,
}

/// Summary of one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanStats {
    /// Objects examined, filtered or not
    pub total_scanned: u64,

    /// Candidates handed to the consumer
    pub total_matched: u64,

    pub duration: Duration,
    pub stop_reason: StopReason,
}

/// Streams candidate documents out of an [`ObjectStore`].
#[derive(Clone)]
pub struct ObjectStoreScanner {
    store: Arc<dyn ObjectStore>,
    config: ScannerConfig,
}

impl ObjectStoreScanner {
    pub fn new(store: Arc<dyn ObjectStore>, config: ScannerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Start a pull-based scan over objects modified within `window`.
    pub fn cursor(&self, window: ScanWindow, limits: ScanLimits) -> ScanCursor {
        ScanCursor {
            store: self.store.clone(),
            config: self.config.clone(),
            window,
            limits,
            page: VecDeque::new(),
            continuation: None,
            listing_done: false,
            started: Instant::now(),
            scanned: 0,
            yielded: 0,
            stop_reason: None,
        }
    }

    /// Hand every candidate in `window` to `on_document` in listing order.
    ///
    /// The callback returns `ControlFlow::Break(())` to stop the scan early.
    pub async fn stream_since<F, Fut, E>(
        &self,
        window: ScanWindow,
        limits: ScanLimits,
        mut on_document: F,
    ) -> Result<ScanStats, E>
    where
        F: FnMut(CandidateDocument) -> Fut,
        Fut: Future<Output = Result<ControlFlow<()>, E>>,
        E: From<ScanError>,
    {
        let mut cursor = self.cursor(window, limits);
        while let Some(doc) = cursor.next().await? {
            if on_document(doc).await?.is_break() {
                cursor.halt();
                break;
            }
        }
        let stats = cursor.stats();
        info!(
            scanned = stats.total_scanned,
            candidates = stats.total_matched,
            duration_ms = stats.duration.as_millis() as u64,
            stop_reason = ?stats.stop_reason,
            "scan finished"
        );
        Ok(stats)
    }

    /// Count the candidates in `window` without reading any of them.
    pub async fn count(&self, window: ScanWindow, limits: ScanLimits) -> ScanResult<u64> {
        let mut cursor = self.cursor(window, limits);
        while cursor.next().await?.is_some() {}
        Ok(cursor.stats().total_matched)
    }
}

/// Pull-based scan state. Holds one listing page at most.
pub struct ScanCursor {
    store: Arc<dyn ObjectStore>,
    config: ScannerConfig,
    window: ScanWindow,
    limits: ScanLimits,
    page: VecDeque<ObjectSummary>,
    continuation: Option<String>,
    listing_done: bool,
    started: Instant,
    scanned: u64,
    yielded: u64,
    stop_reason: Option<StopReason>,
}

impl ScanCursor {
    /// Next candidate, or `None` once the scan has stopped.
    pub async fn next(&mut self) -> ScanResult<Option<CandidateDocument>> {
        loop {
            if self.stop_reason.is_some() {
                return Ok(None);
            }

            if let Some(timeout) = self.limits.timeout {
                if self.started.elapsed() >= timeout {
                    self.stop_reason = Some(StopReason::Timeout);
                    return Ok(None);
                }
            }

            if let Some(max) = self.limits.max_objects {
                if self.scanned >= max {
                    self.stop_reason = Some(StopReason::MaxObjects);
                    return Ok(None);
                }
            }

            let Some(object) = self.next_object().await? else {
                self.stop_reason = Some(StopReason::Exhausted);
                return Ok(None);
            };
            self.scanned += 1;

            if let Some(doc) = self.accept(&object) {
                self.yielded += 1;
                return Ok(Some(doc));
            }
        }
    }

    /// Stop the scan at the consumer's request.
    pub fn halt(&mut self) {
        self.stop_reason.get_or_insert(StopReason::Halted);
        self.page.clear();
    }

    pub fn stats(&self) -> ScanStats {
        ScanStats {
            total_scanned: self.scanned,
            total_matched: self.yielded,
            duration: self.started.elapsed(),
            stop_reason: self.stop_reason.unwrap_or(StopReason::Halted),
        }
    }

    async fn next_object(&mut self) -> ScanResult<Option<ObjectSummary>> {
        while self.page.is_empty() {
            if self.listing_done {
                return Ok(None);
            }
            let page = self
                .store
                .list_page(self.continuation.as_deref(), self.config.page_size)
                .await?;
            debug!(
                objects = page.objects.len(),
                more = page.next_token.is_some(),
                "listing page"
            );
            self.page = page.objects.into();
            self.listing_done = page.next_token.is_none();
            self.continuation = page.next_token;
        }
        Ok(self.page.pop_front())
    }

    fn accept(&self, object: &ObjectSummary) -> Option<CandidateDocument> {
        if !self.window.contains(object.last_modified) {
            return None;
        }
        let doc = CandidateDocument::from_object(object)?;
        if doc.file_name.starts_with('.')
            || self.config.ignored_names.iter().any(|n| n == &doc.file_name)
        {
            return None;
        }
        let ext = extension(&doc.file_name)?;
        if !self.config.target_extensions.iter().any(|t| t == &ext) {
            return None;
        }
        Some(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    fn ts(day: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    fn march() -> ScanWindow {
        ScanWindow::new(ts(1), ts(31))
    }

    fn store() -> Arc<MemoryObjectStore> {
        let store = MemoryObjectStore::new();
        store.put("PRJ-1/letter.pdf", b"a".to_vec(), ts(2));
        store.put("PRJ-1/plan.dwg", b"b".to_vec(), ts(2));
        store.put("PRJ-1/.hidden.pdf", b"c".to_vec(), ts(2));
        store.put("PRJ-2/old.pdf", b"d".to_vec(), Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());
        store.put("PRJ-2/Thumbs.db", b"e".to_vec(), ts(3));
        store.put("PRJ-3/request.PDF", b"f".to_vec(), ts(4));
        store.put("orphan.pdf", b"g".to_vec(), ts(4));
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_filters_window_extension_and_junk() {
        let scanner = ObjectStoreScanner::new(store(), ScannerConfig::new().with_page_size(2));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let stats = scanner
            .stream_since(march(), ScanLimits::none(), move |doc| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(doc.key);
                    Ok::<_, ScanError>(ControlFlow::Continue(()))
                }
            })
            .await
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["PRJ-1/letter.pdf".to_string(), "PRJ-3/request.PDF".to_string()]
        );
        assert_eq!(stats.total_scanned, 7);
        assert_eq!(stats.total_matched, 2);
        assert_eq!(stats.stop_reason, StopReason::Exhausted);
    }

    #[tokio::test]
    async fn test_max_objects_is_hard_limit() {
        let scanner = ObjectStoreScanner::new(store(), ScannerConfig::new().with_page_size(3));
        let mut cursor = scanner.cursor(march(), ScanLimits::none().with_max_objects(4));
        let mut keys = Vec::new();
        while let Some(doc) = cursor.next().await.unwrap() {
            keys.push(doc.key);
        }
        assert_eq!(keys, vec!["PRJ-1/letter.pdf"]);
        let stats = cursor.stats();
        assert_eq!(stats.total_scanned, 4);
        assert_eq!(stats.stop_reason, StopReason::MaxObjects);
    }

    #[tokio::test]
    async fn test_break_halts_scan() {
        let scanner = ObjectStoreScanner::new(store(), ScannerConfig::new());
        let stats = scanner
            .stream_since(march(), ScanLimits::none(), |_doc| async {
                Ok::<_, ScanError>(ControlFlow::Break(()))
            })
            .await
            .unwrap();
        assert_eq!(stats.total_matched, 1);
        assert_eq!(stats.stop_reason, StopReason::Halted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_soft() {
        let scanner = ObjectStoreScanner::new(store(), ScannerConfig::new());
        let stats = scanner
            .stream_since(
                march(),
                ScanLimits::none().with_timeout(Duration::from_secs(1)),
                |_doc| async {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    Ok::<_, ScanError>(ControlFlow::Continue(()))
                },
            )
            .await
            .unwrap();
        // The document in flight finishes; the next one is never fetched
        assert_eq!(stats.total_matched, 1);
        assert_eq!(stats.stop_reason, StopReason::Timeout);
    }

    #[tokio::test]
    async fn test_count_matches_stream() {
        let scanner = ObjectStoreScanner::new(store(), ScannerConfig::new().with_page_size(1));
        assert_eq!(scanner.count(march(), ScanLimits::none()).await.unwrap(), 2);

        let wide = ScannerConfig::new().with_extensions(["pdf", "dwg"]);
        let scanner = ObjectStoreScanner::new(store(), wide);
        assert_eq!(scanner.count(march(), ScanLimits::none()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_empty_store() {
        let scanner = ObjectStoreScanner::new(Arc::new(MemoryObjectStore::new()), ScannerConfig::new());
        let mut cursor = scanner.cursor(march(), ScanLimits::none());
        assert!(cursor.next().await.unwrap().is_none());
        assert_eq!(cursor.stats().stop_reason, StopReason::Exhausted);
    }
}
