//! Five-stage classification cascade.
//!
//! Each stage is more expensive than the one before it and runs only if
//! every earlier stage passed:
//!
//! 0. structural checks (pure)
//! 1. cheap screening call over a head and tail sample
//! 2. expensive request-detection call
//! 3. deny-list, expensive category call and evidence extraction from the raw text
//! 4. evidence gate (pure)
//!
//! Rejections are returned as [`ClassificationResult`] values. Only a
//! classifier that keeps failing after retries produces an error, and at
//! stage 1 even that is treated as a pass by default.
//!
//! Outcomes are memoized in a [`ResultCache`]; a hit skips every stage.

pub mod evidence;
pub mod structure;

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::cache::ResultCache;
use crate::error::CascadeError;
use crate::retry::{RetryExhausted, RetryPolicy};
use crate::traits::classifier::Classifier;
use crate::traits::text::ExtractedText;
use crate::types::category::Category;
use crate::types::classification::{ClassificationResult, Stage};
use crate::types::config::CascadeConfig;

/// Runs documents through the cascade for one category at a time.
pub struct ClassificationCascade {
    classifier: Arc<dyn Classifier>,
    cache: Mutex<ResultCache>,
    config: CascadeConfig,
    retry: RetryPolicy,
}

impl ClassificationCascade {
    pub fn new(classifier: Arc<dyn Classifier>, config: CascadeConfig) -> Self {
        Self {
            classifier,
            cache: Mutex::new(ResultCache::new(
                config.cache_capacity,
                config.cache_prefix_chars,
            )),
            config,
            retry: RetryPolicy::default(),
        }
    }

    /// Set the retry policy for classifier calls.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    /// Number of memoized outcomes.
    pub async fn cached_results(&self) -> usize {
        self.cache.lock().await.len()
    }

    /// Classify one document's text against one category.
    #[instrument(skip(self, text, category), fields(category = %category.name))]
    pub async fn classify(
        &self,
        file_name: &str,
        text: &ExtractedText,
        category: &Category,
    ) -> Result<ClassificationResult, CascadeError> {
        let key = {
            let cache = self.cache.lock().await;
            let key = cache.key(file_name, &category.name, &text.text);
            if let Some(hit) = cache.get(&key) {
                debug!(stage = %hit.stage, "cascade cache hit");
                return Ok(hit);
            }
            key
        };

        let result = self.run_stages(file_name, text, category).await?;
        debug!(
            stage = %result.stage,
            is_match = result.is_match,
            reason = result.reason.as_deref().unwrap_or(""),
            "cascade finished"
        );

        self.cache.lock().await.insert(key, result.clone());
        Ok(result)
    }

    async fn run_stages(
        &self,
        file_name: &str,
        text: &ExtractedText,
        category: &Category,
    ) -> Result<ClassificationResult, CascadeError> {
        // Stage 0
        if let Some(reason) = structure::check(file_name, text, &self.config) {
            return Ok(ClassificationResult::rejected(
                Stage::StructureReject,
                reason.to_string(),
            ));
        }

        // Stage 1
        let sample = head_and_tail(&text.text, self.config.sample_chars);
        let classifier = &self.classifier;
        match self
            .retry
            .run("screen", || classifier.screen(&sample))
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                return Ok(ClassificationResult::rejected(
                    Stage::CheapAiReject,
                    "screening call found no request",
                ));
            }
            Err(exhausted) if self.config.fail_open_screen => {
                warn!(
                    attempts = exhausted.attempts,
                    error = %exhausted.error,
                    "screening call failed, continuing"
                );
            }
            Err(exhausted) => return Err(escalate("screen", exhausted)),
        }

        // Stage 2
        let body = bounded(&text.text, self.config.max_classifier_chars);
        let assessment = self
            .retry
            .run("detect_request", || classifier.detect_request(body))
            .await
            .map_err(|e| escalate("detect_request", e))?;
        if !assessment.is_request {
            let reason = if assessment.reason.is_empty() {
                "not a formal request to the applicant".to_string()
            } else {
                assessment.reason
            };
            return Ok(ClassificationResult::rejected(Stage::NotFiRequest, reason));
        }

        // Stage 3: deny-list, then the category call
        if let Some(phrase) = evidence::response_language(&text.text) {
            return Ok(ClassificationResult::rejected(
                Stage::ResponseLanguage,
                format!("response or decision language: \"{phrase}\""),
            ));
        }

        let assessment = self
            .retry
            .run("match_category", || {
                classifier.match_category(body, category)
            })
            .await
            .map_err(|e| escalate("match_category", e))?;
        if !assessment.matches {
            let reason = if assessment.reason.is_empty() {
                format!("request does not concern {}", category.label)
            } else {
                assessment.reason
            };
            return Ok(ClassificationResult::rejected(Stage::TypeMismatch, reason));
        }

        let Some(quote) =
            evidence::extract_quote(&text.text, category, self.config.proximity_words)
        else {
            return Ok(ClassificationResult::rejected(
                Stage::EvidenceReject,
                format!("no request sentence mentions {}", category.label),
            ));
        };

        if let Some(advisory) = assessment.quote.as_deref() {
            if evidence::collapse(advisory) != quote {
                debug!(advisory, "classifier quote ignored in favour of extracted quote");
            }
        }

        // Stage 4
        match evidence::validate_quote(&quote, category, self.config.proximity_words) {
            Ok(()) => Ok(ClassificationResult::matched(quote)),
            Err(rejection) => Ok(ClassificationResult::rejected(
                Stage::EvidenceReject,
                rejection.to_string(),
            )),
        }
    }
}

fn escalate(stage: &'static str, exhausted: RetryExhausted) -> CascadeError {
    CascadeError::Classifier {
        stage,
        attempts: exhausted.attempts,
        source: exhausted.error,
    }
}

/// First and last `n` characters, or the whole text when it is short.
pub fn head_and_tail(text: &str, n: usize) -> String {
    let total = text.chars().count();
    if total <= n * 2 {
        return text.to_string();
    }
    let head: String = text.chars().take(n).collect();
    let tail: String = text.chars().skip(total - n).collect();
    format!("{head}\n[...]\n{tail}")
}

/// At most `max` leading characters.
pub fn bounded(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClassifierError;
    use crate::testing::MockClassifier;
    use crate::types::category::CategoryCatalog;
    use std::time::Duration;

    fn acoustic() -> Category {
        CategoryCatalog::builtin().get("acoustic").cloned().unwrap()
    }

    fn cascade(classifier: Arc<MockClassifier>) -> ClassificationCascade {
        ClassificationCascade::new(classifier, CascadeConfig::default())
            .with_retry(RetryPolicy::new(3, Duration::from_millis(10)).without_jitter())
    }

    #[tokio::test]
    async fn test_request_letter_matches() {
        let mock = Arc::new(MockClassifier::accepting());
        let cascade = cascade(mock.clone());
        let text = ExtractedText::new(
            "the applicant is requested to submit a noise impact assessment,",
        );

        let result = cascade.classify("letter.pdf", &text, &acoustic()).await.unwrap();

        assert_eq!(result.stage, Stage::ValidatedMatch);
        assert!(result.is_match);
        let quote = result.quote.unwrap();
        assert!(quote.contains("noise"));
        assert!(quote.contains("submit"));
        assert_eq!(mock.call_counts().total(), 3);
    }

    #[tokio::test]
    async fn test_response_language_overrides_classifier() {
        let mock = Arc::new(MockClassifier::accepting());
        let cascade = cascade(mock.clone());
        let text = ExtractedText::new("we have submitted the noise impact assessment as requested");

        let result = cascade.classify("letter.pdf", &text, &acoustic()).await.unwrap();

        assert_eq!(result.stage, Stage::ResponseLanguage);
        assert!(!result.is_match);
        assert_eq!(mock.call_counts().match_category, 0);
    }

    #[tokio::test]
    async fn test_structure_reject_costs_nothing() {
        let mock = Arc::new(MockClassifier::accepting());
        let cascade = cascade(mock.clone());
        let text = ExtractedText::new("please submit a noise survey");

        let result = cascade
            .classify("Applicant_Response.pdf", &text, &acoustic())
            .await
            .unwrap();

        assert_eq!(result.stage, Stage::StructureReject);
        assert_eq!(result.confidence, 0.95);
        assert_eq!(mock.call_counts().total(), 0);
    }

    #[tokio::test]
    async fn test_cheap_reject() {
        let mock = Arc::new(MockClassifier::accepting().with_screen(false));
        let cascade = cascade(mock.clone());
        let text = ExtractedText::new("please submit a noise survey");

        let result = cascade.classify("letter.pdf", &text, &acoustic()).await.unwrap();

        assert_eq!(result.stage, Stage::CheapAiReject);
        assert_eq!(mock.call_counts().detect_request, 0);
    }

    #[tokio::test]
    async fn test_type_mismatch() {
        let mock = Arc::new(MockClassifier::accepting().with_category_match(false));
        let cascade = cascade(mock);
        let text = ExtractedText::new("please submit a noise survey");

        let result = cascade.classify("letter.pdf", &text, &acoustic()).await.unwrap();
        assert_eq!(result.stage, Stage::TypeMismatch);
    }

    #[tokio::test]
    async fn test_affirmative_without_evidence_rejected() {
        let mock = Arc::new(MockClassifier::accepting());
        let cascade = cascade(mock);
        // Classifier says yes, but no sentence pairs a verb with a term
        let text = ExtractedText::new("Noise levels on the site. The drawings are attached.");

        let result = cascade.classify("letter.pdf", &text, &acoustic()).await.unwrap();
        assert_eq!(result.stage, Stage::EvidenceReject);
        assert!(result.quote.is_none());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_all_stages() {
        let mock = Arc::new(MockClassifier::accepting());
        let cascade = cascade(mock.clone());
        let text = ExtractedText::new("please submit a noise survey for the plant room");

        let first = cascade.classify("letter.pdf", &text, &acoustic()).await.unwrap();
        let calls_after_first = mock.call_counts().total();

        let second = cascade.classify("letter.pdf", &text, &acoustic()).await.unwrap();

        assert_eq!(mock.call_counts().total(), calls_after_first);
        assert_eq!(second.stage, first.stage);
        assert_eq!(second.method, format!("{}_cached", first.method));
        assert_eq!(cascade.cached_results().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_screen_fails_open() {
        let mock = Arc::new(
            MockClassifier::accepting().with_screen_failures(5, || ClassifierError::Timeout),
        );
        let cascade = cascade(mock.clone());
        let text = ExtractedText::new("please submit a noise survey");

        let result = cascade.classify("letter.pdf", &text, &acoustic()).await.unwrap();
        assert_eq!(result.stage, Stage::ValidatedMatch);
        assert_eq!(mock.call_counts().screen, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_recovered() {
        let mock = Arc::new(
            MockClassifier::accepting().with_detect_failures(2, || ClassifierError::Timeout),
        );
        let cascade = cascade(mock.clone());
        let text = ExtractedText::new("please submit a noise survey");

        let result = cascade.classify("letter.pdf", &text, &acoustic()).await.unwrap();
        assert_eq!(result.stage, Stage::ValidatedMatch);
        assert_eq!(mock.call_counts().detect_request, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_escalate_and_are_not_cached() {
        let mock = Arc::new(
            MockClassifier::accepting()
                .with_detect_failures(3, || ClassifierError::Malformed("{".into())),
        );
        let cascade = cascade(mock.clone());
        let text = ExtractedText::new("please submit a noise survey");

        let err = cascade
            .classify("letter.pdf", &text, &acoustic())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CascadeError::Classifier {
                stage: "detect_request",
                attempts: 3,
                ..
            }
        ));
        assert_eq!(cascade.cached_results().await, 0);
    }

    #[test]
    fn test_head_and_tail() {
        assert_eq!(head_and_tail("short", 10), "short");
        let text = "a".repeat(10) + &"b".repeat(10) + &"c".repeat(10);
        assert_eq!(head_and_tail(&text, 5), "aaaaa\n[...]\nccccc");
    }

    #[test]
    fn test_bounded_respects_char_boundaries() {
        assert_eq!(bounded("héllo", 2), "hé");
        assert_eq!(bounded("hi", 10), "hi");
    }
}
