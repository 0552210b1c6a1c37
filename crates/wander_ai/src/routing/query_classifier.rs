//! Query Classifier
//!
//! Decides whether a query is about places or things to do. Pure and
//! deterministic; it never calls a provider. The router only sees the
//! [`QueryClassifier`] trait so a model-based classifier can replace the
//! keyword one without touching control flow.

use once_cell::sync::Lazy;
use regex::Regex;

/// Classifies a raw user query.
pub trait QueryClassifier: Send + Sync {
    /// `true` when the query should take the location/event path.
    fn is_location_query(&self, query: &str) -> bool;
}

// ---------------------------------------------------------------------------
// Compiled patterns
// ---------------------------------------------------------------------------

/// Intent words, "things to do" phrasing and venue-category nouns.
static INTENT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:what|where|when|how)\b",
        r"|\bthings\s+to\s+do\b",
        r"|\b(?:restaurants?|bars?|pubs?|clubs?|caf[eé]s?|coffee\s+shops?|museums?|galler(?:y|ies)",
        r"|parks?|concerts?|events?|festivals?|shows?|venues?|theaters?|theatres?|nightlife",
        r"|brunch|dinner|lunch|breakfast|comedy|attractions?|hotels?)\b",
    ))
    .expect("intent regex")
});

/// Cities the app is commonly asked about.
const KNOWN_CITIES: &[&str] = &[
    "austin",
    "atlanta",
    "boston",
    "chicago",
    "dallas",
    "denver",
    "houston",
    "las vegas",
    "los angeles",
    "miami",
    "nashville",
    "new orleans",
    "new york",
    "philadelphia",
    "phoenix",
    "portland",
    "san antonio",
    "san diego",
    "san francisco",
    "seattle",
    "washington",
];

static CITY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    let alternation = KNOWN_CITIES
        .iter()
        .map(|c| c.replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).expect("city regex")
});

// ---------------------------------------------------------------------------
// KeywordQueryClassifier
// ---------------------------------------------------------------------------

/// Regex classifier over fixed English keyword and city lists.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordQueryClassifier;

impl KeywordQueryClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn mentions_known_city(query: &str) -> bool {
        CITY_PATTERN.is_match(query)
    }
}

impl QueryClassifier for KeywordQueryClassifier {
    fn is_location_query(&self, query: &str) -> bool {
        INTENT_PATTERN.is_match(query) || CITY_PATTERN.is_match(query)
    }
}
