//! In-memory object store for testing and development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::RwLock;

use crate::error::{ScanError, ScanResult};
use crate::traits::object_store::{ListPage, ObjectStore};
use crate::types::document::{key_order, ObjectSummary};

struct StoredObject {
    summary: ObjectSummary,
    body: Vec<u8>,
}

/// Objects held in a vector kept in [`key_order`]. The continuation token is
/// the last key of the previous page.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<Vec<StoredObject>>,
    failing: RwLock<HashSet<String>>,
    list_calls: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an object.
    pub fn put(&self, key: impl Into<String>, body: Vec<u8>, last_modified: DateTime<Utc>) {
        let key = key.into();
        let summary = ObjectSummary::new(key.clone(), body.len() as u64, last_modified);
        let mut objects = self.objects.write().unwrap();
        match objects.binary_search_by(|o| key_order(&o.summary.key, &key)) {
            Ok(i) => objects[i] = StoredObject { summary, body },
            Err(i) => objects.insert(i, StoredObject { summary, body }),
        }
    }

    /// Make every read of `key` fail.
    pub fn fail_reads(&self, key: impl Into<String>) {
        self.failing.write().unwrap().insert(key.into());
    }

    pub fn len(&self) -> usize {
        self.objects.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of listing calls served.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(AtomicOrdering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_page(&self, continuation: Option<&str>, page_size: usize) -> ScanResult<ListPage> {
        self.list_calls.fetch_add(1, AtomicOrdering::SeqCst);
        let objects = self.objects.read().unwrap();

        let start = match continuation {
            Some(token) => objects.partition_point(|o| key_order(&o.summary.key, token) != Ordering::Greater),
            None => 0,
        };
        let end = (start + page_size.max(1)).min(objects.len());
        let page: Vec<ObjectSummary> = objects[start..end]
            .iter()
            .map(|o| o.summary.clone())
            .collect();

        let next_token = if end < objects.len() {
            page.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            objects: page,
            next_token,
        })
    }

    async fn get(&self, key: &str) -> ScanResult<Vec<u8>> {
        if self.failing.read().unwrap().contains(key) {
            return Err(ScanError::Read {
                key: key.to_string(),
                source: "injected read failure".into(),
            });
        }
        self.objects
            .read()
            .unwrap()
            .iter()
            .find(|o| o.summary.key == key)
            .map(|o| o.body.clone())
            .ok_or_else(|| ScanError::NotFound {
                key: key.to_string(),
            })
    }
}
