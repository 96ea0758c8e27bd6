//! Text extraction seam.
//!
//! OCR and PDF text extraction run outside this crate; the pipeline only
//! needs the resulting text.

use async_trait::async_trait;

use crate::error::ScanResult;
use crate::types::document::CandidateDocument;

/// Text pulled out of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,

    /// Page count when the extractor knows it
    pub page_count: Option<u32>,
}

impl ExtractedText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            page_count: None,
        }
    }

    pub fn with_page_count(mut self, pages: u32) -> Self {
        self.page_count = Some(pages);
        self
    }

    /// Page count, estimated from form feeds or length when unknown.
    pub fn estimated_pages(&self, chars_per_page: usize) -> u32 {
        if let Some(pages) = self.page_count {
            return pages;
        }
        let form_feeds = self.text.matches('\x0c').count();
        if form_feeds > 0 {
            return (form_feeds + 1) as u32;
        }
        let chars = self.text.chars().count();
        let per_page = chars_per_page.max(1);
        (chars.div_ceil(per_page)).max(1) as u32
    }
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract text for a listed document.
    async fn extract(&self, doc: &CandidateDocument) -> ScanResult<ExtractedText>;
}
