//! Project metadata seam.

use async_trait::async_trait;

use crate::error::NotifyResult;
use crate::types::matching::ProjectMetadata;

/// Project id to descriptive record.
///
/// Callers cache results; implementations may return placeholder records
/// ("unknown", empty title) which the aggregator filters out.
#[async_trait]
pub trait MetadataService: Send + Sync {
    async fn project(&self, project_id: &str) -> NotifyResult<ProjectMetadata>;
}
