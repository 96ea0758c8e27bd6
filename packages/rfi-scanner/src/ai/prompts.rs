//! LLM prompts for the classification cascade.
//!
//! Every prompt asks for a single JSON object so the response can be parsed
//! into a typed assessment at the call boundary.

use crate::types::category::Category;

/// Stage 1: cheap screen over the head and tail of a document.
pub const SCREEN_PROMPT: &str = r#"You are screening planning documents.

Could the excerpt below come from a letter or memo in which a planning
authority or consultee formally asks the applicant to supply further
information? Answer true when unsure.

Output JSON:
{
    "plausible": true | false
}

Excerpt:
{sample}"#;

/// Stage 2: is the document a formal request to the applicant?
pub const DETECT_REQUEST_PROMPT: &str = r#"Decide whether this document is, in substance, a formal request for
further information addressed to the applicant.

It IS a request when the author asks the applicant to submit, provide or
clarify something before the application can be decided.

It is NOT a request when it is:
- the applicant's response or a consultant's report
- a consultee comment that only states an opinion
- a decision notice, committee report or officer summary

Output JSON:
{
    "is_request": true | false,
    "reason": "one sentence"
}

Document:
{text}"#;

/// Stage 3: does the request concern the target category?
pub const MATCH_CATEGORY_PROMPT: &str = r#"This document is a formal request for further information. Decide whether
the applicant is asked to supply something concerning: {label}.

Related terms: {terms}

Only answer true when the request itself concerns this subject. A passing
mention in background text does not count. If true, copy the sentence that
makes the request word for word.

Output JSON:
{
    "matches": true | false,
    "quote": "verbatim sentence, or null",
    "reason": "one sentence"
}

Document:
{text}"#;

pub fn format_screen_prompt(sample: &str) -> String {
    SCREEN_PROMPT.replace("{sample}", sample)
}

pub fn format_detect_request_prompt(text: &str) -> String {
    DETECT_REQUEST_PROMPT.replace("{text}", text)
}

pub fn format_match_category_prompt(text: &str, category: &Category) -> String {
    // Document text goes last so its contents are never re-scanned for placeholders
    MATCH_CATEGORY_PROMPT
        .replace("{label}", &category.label)
        .replace("{terms}", &category.terms.join(", "))
        .replace("{text}", text)
}
