//! JSON webhook notification channel.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::error::{NotifyError, NotifyResult};
use crate::traits::notifier::NotificationChannel;
use crate::types::matching::NotificationBatch;

/// Posts each batch as JSON to a fixed URL.
#[derive(Clone)]
pub struct WebhookChannel {
    client: Client,
    url: String,
    timeout: Duration,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn deliver(&self, batch: &NotificationBatch) -> NotifyResult<()> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(batch)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Delivery {
                subscriber: batch.subscriber.clone(),
                reason: format!("HTTP {}: {}", status.as_u16(), body),
            });
        }

        debug!(subscriber = %batch.subscriber, matches = batch.len(), "webhook delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let channel = WebhookChannel::new("https://hooks.example.com/rfi")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(channel.url(), "https://hooks.example.com/rfi");
        assert_eq!(channel.timeout, Duration::from_secs(5));
    }
}
