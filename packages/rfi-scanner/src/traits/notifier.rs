//! Notification delivery seam.

use async_trait::async_trait;

use crate::error::NotifyResult;
use crate::types::matching::NotificationBatch;

/// Delivers an aggregated batch to one subscriber.
///
/// One attempt per aggregation cycle; retrying is the channel's business.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn deliver(&self, batch: &NotificationBatch) -> NotifyResult<()>;
}
