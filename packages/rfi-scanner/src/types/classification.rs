//! Cascade outcomes.

use serde::{Deserialize, Serialize};

/// Terminal stage of a cascade run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Stage 0: filename, length or report structure
    #[serde(rename = "structure-reject")]
    StructureReject,

    /// Stage 1: cheap screening call said no
    #[serde(rename = "cheap-ai-reject")]
    CheapAiReject,

    /// Stage 2: not a formal authority-to-applicant request
    #[serde(rename = "not-fi-request")]
    NotFiRequest,

    /// Stage 3: response/decision language found in the text
    #[serde(rename = "response-language")]
    ResponseLanguage,

    /// Stage 3: request does not concern the target category
    #[serde(rename = "type-mismatch")]
    TypeMismatch,

    /// Stage 4: quote failed validation
    #[serde(rename = "evidence-reject")]
    EvidenceReject,

    /// Passed every stage
    #[serde(rename = "validated-match")]
    ValidatedMatch,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::StructureReject => "structure-reject",
            Stage::CheapAiReject => "cheap-ai-reject",
            Stage::NotFiRequest => "not-fi-request",
            Stage::ResponseLanguage => "response-language",
            Stage::TypeMismatch => "type-mismatch",
            Stage::EvidenceReject => "evidence-reject",
            Stage::ValidatedMatch => "validated-match",
        }
    }

    /// Stage number in the cascade (0 to 4).
    pub fn ordinal(&self) -> u8 {
        match self {
            Stage::StructureReject => 0,
            Stage::CheapAiReject => 1,
            Stage::NotFiRequest => 2,
            Stage::ResponseLanguage | Stage::TypeMismatch => 3,
            Stage::EvidenceReject | Stage::ValidatedMatch => 4,
        }
    }

    /// Fixed confidence reported for outcomes ending at this stage.
    pub fn confidence(&self) -> f32 {
        match self {
            Stage::StructureReject => 0.95,
            Stage::CheapAiReject => 0.70,
            Stage::NotFiRequest => 0.85,
            Stage::ResponseLanguage => 0.90,
            Stage::TypeMismatch => 0.80,
            Stage::EvidenceReject => 0.85,
            Stage::ValidatedMatch => 0.90,
        }
    }

    /// Detection method tag recorded on results.
    pub fn method(&self) -> &'static str {
        match self {
            Stage::StructureReject => "structural",
            Stage::CheapAiReject => "cheap_ai",
            Stage::NotFiRequest => "request_detection",
            Stage::ResponseLanguage => "deny_list",
            Stage::TypeMismatch => "type_match",
            Stage::EvidenceReject | Stage::ValidatedMatch => "evidence_gate",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one document for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub stage: Stage,
    pub is_match: bool,
    pub confidence: f32,

    /// Why the document was rejected
    pub reason: Option<String>,

    /// Validated evidence quote (matches only)
    pub quote: Option<String>,

    /// Detection method, suffixed `_cached` when served from cache
    pub method: String,
}

impl ClassificationResult {
    /// A rejection at `stage`.
    pub fn rejected(stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            is_match: false,
            confidence: stage.confidence(),
            reason: Some(reason.into()),
            quote: None,
            method: stage.method().to_string(),
        }
    }

    /// A validated match carrying its evidence quote.
    pub fn matched(quote: impl Into<String>) -> Self {
        let stage = Stage::ValidatedMatch;
        Self {
            stage,
            is_match: true,
            confidence: stage.confidence(),
            reason: None,
            quote: Some(quote.into()),
            method: stage.method().to_string(),
        }
    }

    /// Copy of this result marked as served from cache.
    pub fn as_cached(&self) -> Self {
        let mut cached = self.clone();
        if !cached.is_cached() {
            cached.method.push_str("_cached");
        }
        cached
    }

    pub fn is_cached(&self) -> bool {
        self.method.ends_with("_cached")
    }
}
