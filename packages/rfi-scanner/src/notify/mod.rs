//! Match aggregation and delivery.
//!
//! Matches are grouped by subscriber and sent as one batch per subscriber per
//! flush. Project metadata is looked up once per project for the lifetime of
//! the aggregator, however many subscribers or categories match it. A failed
//! lookup is not remembered: its matches are dropped from that flush and the
//! project is looked up again on the next one.

mod metadata;
mod webhook;

pub use metadata::HttpMetadataService;
pub use webhook::WebhookChannel;

use chrono::Utc;
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::cache::BoundedCache;
use crate::traits::metadata::MetadataService;
use crate::traits::notifier::NotificationChannel;
use crate::types::job::Subscriber;
use crate::types::matching::{MatchRecord, NotificationBatch, NotifiedMatch, ProjectMetadata};

/// Projects whose metadata is remembered between flushes.
const METADATA_CACHE_CAPACITY: usize = 1024;

/// Outcome of delivering one subscriber's batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub subscriber: String,
    pub matches: usize,
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// What a flush did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub deliveries: Vec<DeliveryOutcome>,

    /// Matches dropped because their project metadata was a placeholder or
    /// could not be fetched
    pub filtered: usize,

    /// Metadata lookups made during this flush
    pub metadata_lookups: usize,
}

impl FlushReport {
    /// Batches delivered successfully.
    pub fn batches_sent(&self) -> usize {
        self.deliveries.iter().filter(|d| d.is_success()).count()
    }

    /// Matches contained in successful batches.
    pub fn matches_delivered(&self) -> usize {
        self.deliveries
            .iter()
            .filter(|d| d.is_success())
            .map(|d| d.matches)
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &DeliveryOutcome> {
        self.deliveries.iter().filter(|d| !d.is_success())
    }
}

pub struct NotificationAggregator {
    metadata: Arc<dyn MetadataService>,
    channel: Arc<dyn NotificationChannel>,
    pending: BTreeMap<String, Vec<MatchRecord>>,
    projects: BoundedCache<String, ProjectMetadata>,
}

impl NotificationAggregator {
    pub fn new(metadata: Arc<dyn MetadataService>, channel: Arc<dyn NotificationChannel>) -> Self {
        Self {
            metadata,
            channel,
            pending: BTreeMap::new(),
            projects: BoundedCache::new(METADATA_CACHE_CAPACITY),
        }
    }

    /// Queue a match for each subscriber.
    ///
    /// Matches without a quote are dropped; a document already queued for a
    /// subscriber in the same category is not queued twice.
    pub fn push(&mut self, record: MatchRecord, subscribers: &[Subscriber]) {
        if record.quote.trim().is_empty() {
            warn!(key = %record.document.key, "dropping match without evidence quote");
            return;
        }
        for subscriber in subscribers {
            let queue = self.pending.entry(subscriber.address.clone()).or_default();
            let duplicate = queue.iter().any(|r| {
                r.document.key == record.document.key && r.category == record.category
            });
            if !duplicate {
                queue.push(record.clone());
            }
        }
    }

    /// Matches waiting for the next flush, across all subscribers.
    pub fn pending(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Deliver everything pending, one batch per subscriber.
    pub async fn flush(&mut self) -> FlushReport {
        let mut report = FlushReport::default();
        if self.pending.is_empty() {
            return report;
        }

        report.metadata_lookups = self.resolve_projects().await;

        let pending = std::mem::take(&mut self.pending);
        let mut batches = Vec::with_capacity(pending.len());
        for (subscriber, records) in pending {
            let mut matches = Vec::with_capacity(records.len());
            for record in records {
                match self.projects.get(&record.project_id) {
                    Some(project) if !project.is_placeholder() => matches.push(NotifiedMatch {
                        record,
                        project: project.clone(),
                    }),
                    _ => {
                        debug!(project_id = %record.project_id, "filtering match without usable metadata");
                        report.filtered += 1;
                    }
                }
            }
            if !matches.is_empty() {
                batches.push(NotificationBatch {
                    subscriber,
                    matches,
                    generated_at: Utc::now(),
                });
            }
        }

        let channel = &self.channel;
        let results = join_all(batches.iter().map(|batch| channel.deliver(batch))).await;

        for (batch, result) in batches.iter().zip(results) {
            let error = match result {
                Ok(()) => None,
                Err(e) => {
                    error!(subscriber = %batch.subscriber, error = %e, "notification delivery failed");
                    Some(e.to_string())
                }
            };
            report.deliveries.push(DeliveryOutcome {
                subscriber: batch.subscriber.clone(),
                matches: batch.len(),
                error,
            });
        }

        info!(
            sent = report.batches_sent(),
            failed = report.failures().count(),
            filtered = report.filtered,
            "notifications flushed"
        );
        report
    }

    /// Look up every pending project not yet known and remember the answers.
    /// Returns the number of lookups made.
    async fn resolve_projects(&mut self) -> usize {
        let unknown: BTreeSet<String> = self
            .pending
            .values()
            .flatten()
            .map(|r| r.project_id.clone())
            .filter(|id| !self.projects.contains(id))
            .collect();

        let metadata = &self.metadata;
        let lookups = join_all(unknown.iter().map(|id| async move {
            match metadata.project(id).await {
                Ok(project) => Some((id.clone(), project)),
                Err(e) => {
                    warn!(project_id = %id, error = %e, "metadata lookup failed, retrying next flush");
                    None
                }
            }
        }))
        .await;

        let count = lookups.len();
        for (id, project) in lookups.into_iter().flatten() {
            self.projects.insert(id, project);
        }
        count
    }
}
