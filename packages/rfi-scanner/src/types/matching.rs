//! Validated matches and the notification payloads built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::CandidateDocument;

/// Reference to the document a match came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub key: String,
    pub file_name: String,
    pub last_modified: DateTime<Utc>,
}

impl From<&CandidateDocument> for DocumentRef {
    fn from(doc: &CandidateDocument) -> Self {
        Self {
            key: doc.key.clone(),
            file_name: doc.file_name.clone(),
            last_modified: doc.last_modified,
        }
    }
}

/// A document that passed every cascade stage for a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub job_id: Uuid,
    pub project_id: String,
    pub document: DocumentRef,
    pub category: String,
    pub quote: String,
    pub confidence: f32,
}

impl MatchRecord {
    pub fn new(
        job_id: Uuid,
        doc: &CandidateDocument,
        category: impl Into<String>,
        quote: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self {
            job_id,
            project_id: doc.project_id.clone(),
            document: DocumentRef::from(doc),
            category: category.into(),
            quote: quote.into(),
            confidence,
        }
    }
}

/// Display record for a project from the metadata service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    #[serde(default)]
    pub project_id: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub address: Option<String>,

    #[serde(default)]
    pub reference: Option<String>,

    #[serde(default)]
    pub url: Option<String>,
}

/// Titles the metadata service returns when it has nothing real.
const PLACEHOLDER_TITLES: &[&str] = &[
    "unknown",
    "unknown project",
    "untitled",
    "n/a",
    "na",
    "none",
    "null",
    "error",
    "not found",
    "tbc",
    "-",
];

impl ProjectMetadata {
    pub fn new(project_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            title: Some(title.into()),
            ..Default::default()
        }
    }

    /// Whether this record is a placeholder the service returned instead of
    /// a real project.
    pub fn is_placeholder(&self) -> bool {
        match self.title.as_deref().map(str::trim) {
            None => true,
            Some(title) => {
                title.is_empty()
                    || PLACEHOLDER_TITLES
                        .iter()
                        .any(|p| title.eq_ignore_ascii_case(p))
            }
        }
    }
}

/// One match as delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifiedMatch {
    pub record: MatchRecord,
    pub project: ProjectMetadata,
}

/// Everything one subscriber receives from one aggregation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationBatch {
    pub subscriber: String,
    pub matches: Vec<NotifiedMatch>,
    pub generated_at: DateTime<Utc>,
}

impl NotificationBatch {
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_detection() {
        assert!(ProjectMetadata::new("p1", "Error").is_placeholder());
        assert!(ProjectMetadata::new("p1", "  Unknown ").is_placeholder());
        assert!(ProjectMetadata::new("p1", "").is_placeholder());
        assert!(ProjectMetadata {
            project_id: "p1".into(),
            ..Default::default()
        }
        .is_placeholder());
        assert!(!ProjectMetadata::new("p1", "12 High Street extension").is_placeholder());
    }
}
