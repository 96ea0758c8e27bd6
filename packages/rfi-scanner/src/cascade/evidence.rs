//! Deterministic evidence extraction and validation.
//!
//! The quote attached to a match is always found here, in the raw text.
//! A quote is evidence only when a request verb and a category term appear
//! together, in one sentence or two adjacent ones, no more than a bounded
//! number of words apart.

use regex::Regex;
use std::sync::LazyLock;

use crate::types::category::Category;

/// Longest quote attached to a match, in characters.
pub const MAX_QUOTE_CHARS: usize = 500;

/// Shortest quote worth showing anyone.
pub const MIN_QUOTE_CHARS: usize = 12;

/// Stems of the verbs an authority uses when asking for something.
const REQUEST_VERB_STEMS: &[&str] = &[
    "submit",
    "provide",
    "provision",
    "supply",
    "supplied",
    "request",
    "require",
    "clarif",
    "confirm",
    "send",
    "forward",
    "furnish",
    "undertake",
    "commission",
    "prepare",
    "demonstrate",
];

/// Quotes that carry no evidence at all.
const PLACEHOLDER_QUOTES: &[&str] = &[
    "n/a",
    "na",
    "none",
    "null",
    "nil",
    "unknown",
    "not found",
    "not applicable",
    "no quote",
    "no quote found",
    "no evidence",
    "tbc",
    "tbd",
    "quote",
    "example quote",
];

/// Applicant voice and decision language. A document using these phrases
/// answers a request or decides an application; it never asks.
static RE_RESPONSE_LANGUAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(we\s+have\s+(now\s+)?(submitted|provided|enclosed|attached|uploaded)|we\s+enclose|please\s+find\s+(enclosed|attached)\s+(our|the\s+requested)|in\s+response\s+to\s+your\s+(request|letter|email|e-mail)|further\s+to\s+your\s+(request|letter|email|e-mail)|on\s+behalf\s+of\s+(our\s+client|the\s+applicant)|decision\s+notice|notice\s+of\s+decision|permission\s+is\s+hereby\s+granted|hereby\s+(grant|refuse)s?|consultation\s+response)\b",
    )
    .unwrap()
});

static RE_SENTENCE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+\s+|\n\s*\n").unwrap());

/// Why a quote failed the evidence gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvidenceRejection {
    Empty,
    TooShort(usize),
    Placeholder,
    NoRequestVerb,
    NoCategoryTerm,
    TooFarApart { distance: usize, max: usize },
}

impl std::fmt::Display for EvidenceRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvidenceRejection::Empty => f.write_str("empty quote"),
            EvidenceRejection::TooShort(n) => write!(f, "quote too short ({n} chars)"),
            EvidenceRejection::Placeholder => f.write_str("placeholder quote"),
            EvidenceRejection::NoRequestVerb => f.write_str("quote has no request verb"),
            EvidenceRejection::NoCategoryTerm => f.write_str("quote has no category term"),
            EvidenceRejection::TooFarApart { distance, max } => {
                write!(f, "request verb and category term {distance} words apart (max {max})")
            }
        }
    }
}

/// Lowercase alphanumeric word tokens.
pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

pub fn is_request_verb(word: &str) -> bool {
    REQUEST_VERB_STEMS.iter().any(|stem| word.starts_with(stem))
}

/// First response or decision phrase in the text, whitespace-collapsed.
pub fn response_language(text: &str) -> Option<String> {
    RE_RESPONSE_LANGUAGE
        .find(text)
        .map(|m| collapse(m.as_str()).to_lowercase())
}

/// Smallest distance in words between a request verb and a category term.
fn closest_pair(tokens: &[&str], category: &Category) -> Option<(usize, usize)> {
    let verbs: Vec<usize> = (0..tokens.len())
        .filter(|&i| is_request_verb(tokens[i]))
        .collect();
    let terms: Vec<usize> = (0..tokens.len())
        .filter(|&i| category.matches_at(tokens, i))
        .collect();

    let mut best: Option<(usize, usize)> = None;
    for &v in &verbs {
        for &t in &terms {
            if v == t {
                continue;
            }
            let (a, b) = if v < t { (v, t) } else { (t, v) };
            if best.map_or(true, |(x, y)| b - a < y - x) {
                best = Some((a, b));
            }
        }
    }
    best
}

/// Check a quote against the evidence gate.
pub fn validate_quote(
    quote: &str,
    category: &Category,
    proximity: usize,
) -> Result<(), EvidenceRejection> {
    let trimmed = quote.trim();
    if trimmed.is_empty() {
        return Err(EvidenceRejection::Empty);
    }
    if is_placeholder(trimmed) {
        return Err(EvidenceRejection::Placeholder);
    }
    let chars = trimmed.chars().count();
    if chars < MIN_QUOTE_CHARS {
        return Err(EvidenceRejection::TooShort(chars));
    }

    let owned = words(trimmed);
    let tokens: Vec<&str> = owned.iter().map(String::as_str).collect();

    if !tokens.iter().any(|w| is_request_verb(w)) {
        return Err(EvidenceRejection::NoRequestVerb);
    }
    if !(0..tokens.len()).any(|i| category.matches_at(&tokens, i)) {
        return Err(EvidenceRejection::NoCategoryTerm);
    }

    match closest_pair(&tokens, category) {
        Some((a, b)) if b - a <= proximity => Ok(()),
        Some((a, b)) => Err(EvidenceRejection::TooFarApart {
            distance: b - a,
            max: proximity,
        }),
        // Verb and term only ever coincide on one word
        None => Err(EvidenceRejection::NoCategoryTerm),
    }
}

fn is_placeholder(quote: &str) -> bool {
    let lower = quote.to_lowercase();
    let bare = lower.trim_matches(|c: char| !c.is_alphanumeric() && c != '/');
    if bare.is_empty() || PLACEHOLDER_QUOTES.contains(&bare) {
        return true;
    }
    (lower.starts_with('[') && lower.ends_with(']'))
        || (lower.starts_with('<') && lower.ends_with('>'))
        || lower.contains("lorem ipsum")
        || lower.contains("insert quote")
}

/// Find the best evidence quote for `category` in the raw text.
///
/// Single sentences are tried first, then adjacent pairs. The returned quote
/// is a whitespace-collapsed excerpt of the text, at most
/// [`MAX_QUOTE_CHARS`] long, that passes [`validate_quote`].
pub fn extract_quote(text: &str, category: &Category, proximity: usize) -> Option<String> {
    let spans = sentence_spans(text);

    for &(start, end) in &spans {
        if let Some(quote) = quote_from(&text[start..end], category, proximity) {
            return Some(quote);
        }
    }

    for pair in spans.windows(2) {
        let (start, _) = pair[0];
        let (_, end) = pair[1];
        if let Some(quote) = quote_from(&text[start..end], category, proximity) {
            return Some(quote);
        }
    }

    None
}

/// Byte spans of trimmed sentences.
fn sentence_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;

    let mut push = |start: usize, end: usize| {
        let slice = &text[start..end];
        let lead = slice.len() - slice.trim_start().len();
        let trail = slice.len() - slice.trim_end().len();
        if start + lead < end - trail {
            spans.push((start + lead, end - trail));
        }
    };

    for m in RE_SENTENCE_BREAK.find_iter(text) {
        // Keep the terminal punctuation with its sentence
        let end = m.start() + m.as_str().trim_end().len();
        push(start, end);
        start = m.end();
    }
    push(start, text.len());
    spans
}

fn quote_from(sentence: &str, category: &Category, proximity: usize) -> Option<String> {
    let collapsed = collapse(sentence);
    let quote = if collapsed.chars().count() <= MAX_QUOTE_CHARS {
        collapsed
    } else {
        window_around_pair(&collapsed, category, proximity)?
    };
    validate_quote(&quote, category, proximity).ok()?;
    Some(quote)
}

/// Shrink an over-long sentence to the words spanning its closest
/// verb/term pair, widened evenly while it fits.
fn window_around_pair(collapsed: &str, category: &Category, proximity: usize) -> Option<String> {
    let chunks: Vec<&str> = collapsed.split(' ').collect();

    // Tokens with the index of the space-separated chunk they came from
    let mut owned = Vec::new();
    let mut owner = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        for word in words(chunk) {
            owned.push(word);
            owner.push(i);
        }
    }
    let tokens: Vec<&str> = owned.iter().map(String::as_str).collect();

    let (a, b) = closest_pair(&tokens, category)?;
    if b - a > proximity {
        return None;
    }

    // Include every chunk of a multi-word term ending the pair
    let last_token = (b..tokens.len())
        .take_while(|&i| i == b || owner[i] == owner[b])
        .last()
        .unwrap_or(b);
    let term_len = category
        .terms
        .iter()
        .map(|t| t.split_whitespace().count())
        .max()
        .unwrap_or(1);
    let end_token = (last_token + term_len - 1).min(tokens.len() - 1);

    let mut lo = owner[a];
    let mut hi = owner[end_token];
    let fits = |lo: usize, hi: usize| chunks[lo..=hi].join(" ").chars().count() <= MAX_QUOTE_CHARS;
    if !fits(lo, hi) {
        return None;
    }
    loop {
        let mut grew = false;
        if lo > 0 && fits(lo - 1, hi) {
            lo -= 1;
            grew = true;
        }
        if hi + 1 < chunks.len() && fits(lo, hi + 1) {
            hi += 1;
            grew = true;
        }
        if !grew {
            break;
        }
    }
    Some(chunks[lo..=hi].join(" "))
}

/// Collapse runs of whitespace to single spaces.
pub fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
