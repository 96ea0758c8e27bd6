//! Object store listing seam.

use async_trait::async_trait;

use crate::error::ScanResult;
use crate::types::document::ObjectSummary;

/// One page of a listing call.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectSummary>,

    /// Token for the next page; `None` once the listing is exhausted
    pub next_token: Option<String>,
}

/// Read-only, paginated object store.
///
/// Implementations must list keys in ascending
/// [`key_order`](crate::types::document::key_order) so a scan can be resumed
/// from a persisted key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List up to `page_size` objects after the given continuation token.
    async fn list_page(&self, continuation: Option<&str>, page_size: usize) -> ScanResult<ListPage>;

    /// Read an object's bytes.
    async fn get(&self, key: &str) -> ScanResult<Vec<u8>>;

    /// Whether an object exists.
    async fn exists(&self, key: &str) -> ScanResult<bool> {
        match self.get(key).await {
            Ok(_) => Ok(true),
            Err(crate::error::ScanError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
