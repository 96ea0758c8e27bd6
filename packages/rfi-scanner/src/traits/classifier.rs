//! External semantic classifier contract.
//!
//! The classifier is a black box. Responses are parsed into the typed
//! assessments below at the call boundary; anything that does not fit is a
//! [`ClassifierError::Malformed`](crate::error::ClassifierError::Malformed).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ClassifierResult;
use crate::types::category::Category;

/// Answer to "is this, in substance, a formal request to the applicant?"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestAssessment {
    pub is_request: bool,

    #[serde(default)]
    pub reason: String,
}

impl RequestAssessment {
    pub fn yes() -> Self {
        Self {
            is_request: true,
            reason: String::new(),
        }
    }

    pub fn no(reason: impl Into<String>) -> Self {
        Self {
            is_request: false,
            reason: reason.into(),
        }
    }
}

/// Answer to "does the request concern this category?"
///
/// The quote is advisory only; the cascade extracts its own evidence from
/// the raw text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAssessment {
    pub matches: bool,

    #[serde(default)]
    pub quote: Option<String>,

    #[serde(default)]
    pub reason: String,
}

impl CategoryAssessment {
    pub fn yes() -> Self {
        Self {
            matches: true,
            quote: None,
            reason: String::new(),
        }
    }

    pub fn no(reason: impl Into<String>) -> Self {
        Self {
            matches: false,
            quote: None,
            reason: reason.into(),
        }
    }
}

/// Semantic classifier used by cascade stages 1 to 3.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Cheap binary screen over a head+tail sample.
    async fn screen(&self, sample: &str) -> ClassifierResult<bool>;

    /// Expensive request detection over bounded text.
    async fn detect_request(&self, text: &str) -> ClassifierResult<RequestAssessment>;

    /// Expensive category match over bounded text.
    async fn match_category(
        &self,
        text: &str,
        category: &Category,
    ) -> ClassifierResult<CategoryAssessment>;
}
