//! Stage 0: structural rejection.
//!
//! Pure, zero-cost checks on the file name, the document length and the
//! markers of a formal report. Request letters are short, addressed to the
//! applicant, and never carry a table of contents.

use regex::Regex;
use std::sync::LazyLock;

use crate::traits::text::ExtractedText;
use crate::types::config::CascadeConfig;

/// File name fragments of documents sent *to* the authority.
const RESPONSE_NAME_MARKERS: &[&str] = &[
    "respons",
    "reply",
    "replies",
    "receiv",
    "submitted",
    "submission",
    "rebuttal",
    "comments on",
];

/// Characters at the head of the text searched for report markers.
const REPORT_HEAD_CHARS: usize = 4000;

static RE_REPORT_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(table\s+of\s+contents|executive\s+summary|prepared\s+(by|for|on\s+behalf\s+of)|document\s+control|revision\s+history|list\s+of\s+(figures|tables|appendices))\b",
    )
    .unwrap()
});

/// Why stage 0 rejected a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureReason {
    ResponseFileName(String),
    TooLong { pages: u32, max: u32 },
    ReportMarker(String),
}

impl std::fmt::Display for StructureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StructureReason::ResponseFileName(marker) => {
                write!(f, "file name indicates a response ({marker})")
            }
            StructureReason::TooLong { pages, max } => {
                write!(f, "estimated {pages} pages exceeds {max}")
            }
            StructureReason::ReportMarker(marker) => {
                write!(f, "formal report marker: {marker}")
            }
        }
    }
}

/// Run the stage 0 checks. `None` means the document passes.
pub fn check(
    file_name: &str,
    text: &ExtractedText,
    config: &CascadeConfig,
) -> Option<StructureReason> {
    if let Some(marker) = response_name_marker(file_name) {
        return Some(StructureReason::ResponseFileName(marker.to_string()));
    }

    let pages = text.estimated_pages(config.chars_per_page);
    if pages > config.max_pages {
        return Some(StructureReason::TooLong {
            pages,
            max: config.max_pages,
        });
    }

    report_marker(&text.text).map(StructureReason::ReportMarker)
}

fn response_name_marker(file_name: &str) -> Option<&'static str> {
    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name)
        .to_lowercase()
        .replace(['_', '-', '.'], " ");
    RESPONSE_NAME_MARKERS
        .iter()
        .copied()
        .find(|marker| stem.contains(marker))
}

fn report_marker(text: &str) -> Option<String> {
    let head: String = text.chars().take(REPORT_HEAD_CHARS).collect();
    RE_REPORT_MARKERS
        .find(&head)
        .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> ExtractedText {
        ExtractedText::new(s)
    }

    #[test]
    fn test_request_letter_passes() {
        let config = CascadeConfig::default();
        let letter = text("Dear Applicant, the applicant is requested to submit a noise impact assessment.");
        assert_eq!(check("further_information_request.pdf", &letter, &config), None);
    }

    #[test]
    fn test_response_file_names() {
        let config = CascadeConfig::default();
        let body = text("short letter");
        for name in [
            "Applicant_Response_to_RFI.pdf",
            "noise-reply.pdf",
            "Received 2024-03-01.pdf",
            "submitted_documents.pdf",
            "ResubmissionPack.pdf",
            "Comments_on_Noise_Report.pdf",
        ] {
            assert!(
                matches!(check(name, &body, &config), Some(StructureReason::ResponseFileName(_))),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_long_documents_rejected() {
        let config = CascadeConfig::default().with_max_pages(5);
        let long = text("word ").with_page_count(40);
        assert_eq!(
            check("letter.pdf", &long, &config),
            Some(StructureReason::TooLong { pages: 40, max: 5 })
        );

        // No page count: estimated from length
        let estimated = text(&"x".repeat(config.chars_per_page * 6 + 1));
        assert!(matches!(
            check("letter.pdf", &estimated, &config),
            Some(StructureReason::TooLong { pages: 7, .. })
        ));
    }

    #[test]
    fn test_form_feeds_count_pages() {
        let config = CascadeConfig::default().with_max_pages(3);
        let paged = text("page one\x0cpage two\x0cpage three\x0cpage four");
        assert_eq!(
            check("letter.pdf", &paged, &config),
            Some(StructureReason::TooLong { pages: 4, max: 3 })
        );
    }

    #[test]
    fn test_report_markers() {
        let config = CascadeConfig::default();
        let report = text("Noise Impact Assessment\nPrepared  by Acme Acoustics\nTable of Contents\n1. Intro");
        assert_eq!(
            check("nia.pdf", &report, &config),
            Some(StructureReason::ReportMarker("prepared by".to_string()))
        );
    }

    #[test]
    fn test_deterministic() {
        let config = CascadeConfig::default();
        let body = text("Executive Summary: the site is quiet.");
        let first = check("a.pdf", &body, &config);
        for _ in 0..10 {
            assert_eq!(check("a.pdf", &body, &config), first);
        }
    }
}
