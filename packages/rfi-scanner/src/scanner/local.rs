//! Object store backed by a local directory tree.
//!
//! Keys are paths relative to the root with `/` separators. Directory
//! entries are walked sorted by name, which yields keys in [`key_order`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{ScanError, ScanResult};
use crate::traits::object_store::{ListPage, ObjectStore};
use crate::types::document::{key_order, ObjectSummary};

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> ScanResult<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(ScanError::NotFound {
                key: key.to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    let key = parts?.join("/");
    (!key.is_empty()).then_some(key)
}

/// Whether anything under the directory `dir` can sort after `token`.
fn dir_may_follow(dir: &str, token: &str) -> bool {
    let under = token
        .strip_prefix(dir)
        .is_some_and(|rest| rest.starts_with('/'));
    under || key_order(dir, token) == Ordering::Greater
}

fn list_blocking(
    root: &Path,
    continuation: Option<&str>,
    page_size: usize,
) -> ScanResult<ListPage> {
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let (Some(token), Some(key)) = (continuation, relative_key(root, entry.path())) else {
                return true;
            };
            if entry.file_type().is_dir() {
                dir_may_follow(&key, token)
            } else {
                key_order(&key, token) == Ordering::Greater
            }
        });

    let mut objects = Vec::with_capacity(page_size);
    let mut more = false;
    for entry in walker {
        let entry = entry.map_err(|e| ScanError::Listing(Box::new(e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(key) = relative_key(root, entry.path()) else {
            continue;
        };
        if objects.len() == page_size {
            more = true;
            break;
        }
        let metadata = entry.metadata().map_err(|e| ScanError::Listing(Box::new(e)))?;
        let last_modified: DateTime<Utc> = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .map_err(|e| ScanError::Listing(Box::new(e)))?;
        objects.push(ObjectSummary::new(key, metadata.len(), last_modified));
    }

    let next_token = if more {
        objects.last().map(|o: &ObjectSummary| o.key.clone())
    } else {
        None
    };
    Ok(ListPage {
        objects,
        next_token,
    })
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn list_page(&self, continuation: Option<&str>, page_size: usize) -> ScanResult<ListPage> {
        let root = self.root.clone();
        let continuation = continuation.map(str::to_string);
        let page_size = page_size.max(1);
        tokio::task::spawn_blocking(move || list_blocking(&root, continuation.as_deref(), page_size))
            .await
            .map_err(|e| ScanError::Listing(Box::new(e)))?
    }

    async fn get(&self, key: &str) -> ScanResult<Vec<u8>> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ScanError::NotFound {
                key: key.to_string(),
            },
            _ => ScanError::Read {
                key: key.to_string(),
                source: Box::new(e),
            },
        })
    }
}
