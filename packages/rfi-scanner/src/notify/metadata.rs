//! Project metadata over HTTP.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::error::{NotifyError, NotifyResult};
use crate::traits::metadata::MetadataService;
use crate::types::matching::ProjectMetadata;

/// Fetches `GET {base_url}/projects/{project_id}`.
///
/// A 404 yields a record with no title, which the aggregator treats as a
/// placeholder.
#[derive(Clone)]
pub struct HttpMetadataService {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpMetadataService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn project_url(&self, project_id: &str) -> String {
        format!("{}/projects/{}", self.base_url, project_id)
    }
}

#[async_trait]
impl MetadataService for HttpMetadataService {
    async fn project(&self, project_id: &str) -> NotifyResult<ProjectMetadata> {
        let response = self
            .client
            .get(self.project_url(project_id))
            .timeout(self.timeout)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(ProjectMetadata {
                project_id: project_id.to_string(),
                ..Default::default()
            }),
            status if status.is_success() => {
                let mut project: ProjectMetadata = response.json().await?;
                if project.project_id.is_empty() {
                    project.project_id = project_id.to_string();
                }
                Ok(project)
            }
            status => Err(NotifyError::Metadata {
                project_id: project_id.to_string(),
                reason: format!("HTTP {}", status.as_u16()),
            }),
        }
    }
}
