//! Rate-limited classifier wrapper.
//!
//! Wraps any [`Classifier`] with a shared request budget using the governor
//! crate. Every stage call waits for a permit.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::error::ClassifierResult;
use crate::traits::classifier::{CategoryAssessment, Classifier, RequestAssessment};
use crate::types::category::Category;

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub struct RateLimitedClassifier<C: Classifier> {
    inner: C,
    limiter: Arc<DefaultRateLimiter>,
}

impl<C: Classifier> RateLimitedClassifier<C> {
    /// Allow at most `requests_per_second` calls; zero is treated as one.
    pub fn new(classifier: C, requests_per_second: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
        Self::with_quota(classifier, quota)
    }

    /// Create with a custom quota.
    pub fn with_quota(classifier: C, quota: Quota) -> Self {
        Self {
            inner: classifier,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: Classifier> Classifier for RateLimitedClassifier<C> {
    async fn screen(&self, sample: &str) -> ClassifierResult<bool> {
        self.limiter.until_ready().await;
        self.inner.screen(sample).await
    }

    async fn detect_request(&self, text: &str) -> ClassifierResult<RequestAssessment> {
        self.limiter.until_ready().await;
        self.inner.detect_request(text).await
    }

    async fn match_category(
        &self,
        text: &str,
        category: &Category,
    ) -> ClassifierResult<CategoryAssessment> {
        self.limiter.until_ready().await;
        self.inner.match_category(text, category).await
    }
}
