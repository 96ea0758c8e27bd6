//! Text extraction backed by OCR sidecar files.
//!
//! OCR runs upstream and drops `<key>.txt` next to each document. Plain text
//! documents are read directly. Form feeds in the text separate pages.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ScanError, ScanResult};
use crate::traits::object_store::ObjectStore;
use crate::traits::text::{ExtractedText, TextExtractor};
use crate::types::document::{CandidateDocument, DocumentKind};

const PAGE_BREAK: char = '\u{000C}';

pub struct SidecarTextExtractor {
    store: Arc<dyn ObjectStore>,
    suffix: String,
}

impl SidecarTextExtractor {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            suffix: ".txt".to_string(),
        }
    }

    /// Sidecar suffix appended to the document key (default `.txt`).
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }
}

/// Decode bytes as text and count form-feed separated pages.
pub fn decode_text(bytes: &[u8]) -> ExtractedText {
    let text = String::from_utf8_lossy(bytes).into_owned();
    let breaks = text.matches(PAGE_BREAK).count();
    let extracted = ExtractedText::new(text);
    if breaks > 0 {
        extracted.with_page_count(breaks as u32 + 1)
    } else {
        extracted
    }
}

#[async_trait]
impl TextExtractor for SidecarTextExtractor {
    async fn extract(&self, doc: &CandidateDocument) -> ScanResult<ExtractedText> {
        if doc.kind == DocumentKind::Text {
            return Ok(decode_text(&self.store.get(&doc.key).await?));
        }

        let sidecar = format!("{}{}", doc.key, self.suffix);
        match self.store.get(&sidecar).await {
            Ok(bytes) => {
                let extracted = decode_text(&bytes);
                if extracted.text.trim().is_empty() {
                    return Err(ScanError::NoText {
                        key: doc.key.clone(),
                    });
                }
                Ok(extracted)
            }
            Err(ScanError::NotFound { .. }) => {
                debug!(key = %doc.key, "no text sidecar");
                Err(ScanError::NoText {
                    key: doc.key.clone(),
                })
            }
            Err(e) => Err(e),
        }
    }
}
