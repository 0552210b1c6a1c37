//! Category tags: keyword scanning, normalisation and merging.
//!
//! Tags are lowercased and trimmed; merging is a set union on the normalised
//! form, so `"Dining"` and `"dining"` collapse to one tag.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::providers::ProviderError;

/// Deduplicated, normalised category tags in a stable order.
pub type CategorySet = BTreeSet<String>;

/// System instruction for structured category extraction.
pub const EXTRACTION_INSTRUCTION: &str = "Classify the user's request into venue or activity \
categories such as dining, nightlife, attractions, events, comedy, outdoors, shopping. \
Respond with a JSON array of lowercase strings only, for example [\"dining\",\"events\"]. \
Respond with [] if nothing applies.";

// ---------------------------------------------------------------------------
// Topic patterns
// ---------------------------------------------------------------------------

/// The fixed topics detected in response text. Word boundaries keep `bar`
/// from matching inside `barbecue`.
static TOPIC_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        (
            "dining",
            r"(?i)\b(?:restaurants?|dining|cafes?|caf[eé]s?|bistros?|brunch|dinner|lunch|eatery|eateries|food)\b",
        ),
        (
            "nightlife",
            r"(?i)\b(?:bars?|pubs?|nightclubs?|clubs?|lounges?|cocktails?|nightlife|brewery|breweries)\b",
        ),
        (
            "attractions",
            r"(?i)\b(?:museums?|parks?|landmarks?|galler(?:y|ies)|attractions?|tours?|monuments?|zoo)\b",
        ),
        (
            "events",
            r"(?i)\b(?:concerts?|festivals?|events?|shows?|live music|performances?|tickets?)\b",
        ),
        (
            "comedy",
            r"(?i)\b(?:comedy|comedians?|stand-up|standup|improv|open mic)\b",
        ),
    ]
    .into_iter()
    .map(|(topic, pattern)| {
        let re = Regex::new(pattern).unwrap_or_else(|e| panic!("Bad topic pattern `{pattern}`: {e}"));
        (topic, re)
    })
    .collect()
});

/// Topics whose keywords appear anywhere in `text`.
pub fn scan_topics(text: &str) -> CategorySet {
    TOPIC_PATTERNS
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(topic, _)| (*topic).to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Normalisation & merge
// ---------------------------------------------------------------------------

/// Lowercase and trim a tag; `None` if nothing is left.
pub fn normalize(tag: &str) -> Option<String> {
    let t = tag.trim().to_lowercase();
    (!t.is_empty()).then_some(t)
}

/// Case-insensitive union of two tag lists. Order of inputs does not matter.
pub fn merge_categories<A, B>(structured: A, scanned: B) -> CategorySet
where
    A: IntoIterator,
    A::Item: AsRef<str>,
    B: IntoIterator,
    B::Item: AsRef<str>,
{
    structured
        .into_iter()
        .filter_map(|t| normalize(t.as_ref()))
        .chain(scanned.into_iter().filter_map(|t| normalize(t.as_ref())))
        .collect()
}

// ---------------------------------------------------------------------------
// Structured extraction output
// ---------------------------------------------------------------------------

/// Parse a model's category answer. Accepts a bare JSON array or one wrapped
/// in prose or a fenced code block.
pub fn parse_category_list(raw: &str) -> Result<Vec<String>, ProviderError> {
    let start = raw.find('[');
    let end = raw.rfind(']');
    let (Some(start), Some(end)) = (start, end) else {
        return Err(ProviderError::Parse(format!(
            "no JSON array in category answer: {raw:.80}"
        )));
    };
    if end < start {
        return Err(ProviderError::Parse("unbalanced category array".into()));
    }

    let tags: Vec<String> = serde_json::from_str(&raw[start..=end])
        .map_err(|e| ProviderError::Parse(format!("category array: {e}")))?;

    Ok(tags.iter().filter_map(|t| normalize(t)).collect())
}
