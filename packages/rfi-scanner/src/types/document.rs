//! Candidate documents and object listing records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One object as returned by a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    /// Full storage key, `/`-separated
    pub key: String,

    /// Size in bytes
    pub size: u64,

    /// Last modification time reported by the store
    pub last_modified: DateTime<Utc>,
}

impl ObjectSummary {
    /// Create a new object summary.
    pub fn new(key: impl Into<String>, size: u64, last_modified: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified,
        }
    }
}

/// Inferred document type, from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    Docx,
    Doc,
    Text,
    Other,
}

impl DocumentKind {
    /// Infer the kind from a file name.
    pub fn from_file_name(file_name: &str) -> Self {
        match extension(file_name).as_deref() {
            Some("pdf") => Self::Pdf,
            Some("docx") => Self::Docx,
            Some("doc") => Self::Doc,
            Some("txt") | Some("md") => Self::Text,
            _ => Self::Other,
        }
    }

    /// Canonical lowercase extension for this kind.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Self::Pdf => Some("pdf"),
            Self::Docx => Some("docx"),
            Self::Doc => Some("doc"),
            Self::Text => Some("txt"),
            Self::Other => None,
        }
    }
}

/// Lowercased extension of a file name, if any.
pub fn extension(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// A document that passed listing filters. Immutable once listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDocument {
    /// Project the document belongs to (parent path segment)
    pub project_id: String,

    /// File name (last path segment)
    pub file_name: String,

    /// Full storage key
    pub key: String,

    /// Last modification time
    pub last_modified: DateTime<Utc>,

    /// Size in bytes
    pub size: u64,

    /// Inferred document type
    pub kind: DocumentKind,
}

impl CandidateDocument {
    /// Build a candidate from a listing record.
    ///
    /// Returns `None` when the key has no project segment or no file name.
    pub fn from_object(object: &ObjectSummary) -> Option<Self> {
        let (project_id, file_name) = split_key(&object.key)?;
        Some(Self {
            project_id: project_id.to_string(),
            file_name: file_name.to_string(),
            key: object.key.clone(),
            last_modified: object.last_modified,
            size: object.size,
            kind: DocumentKind::from_file_name(file_name),
        })
    }
}

/// Split a storage key into `(project_id, file_name)`.
///
/// The project is the segment directly above the file, so
/// `planning/2024/PRJ-001/letter.pdf` yields `("PRJ-001", "letter.pdf")`.
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    let mut segments = key.rsplit('/');
    let file_name = segments.next().filter(|s| !s.is_empty())?;
    let project_id = segments.next().filter(|s| !s.is_empty())?;
    Some((project_id, file_name))
}

/// Ordering every object store listing must follow: segment-wise comparison
/// of `/`-separated keys.
///
/// This is the stable sort key persisted with the checkpoint.
pub fn key_order(a: &str, b: &str) -> Ordering {
    a.split('/').cmp(b.split('/'))
}
