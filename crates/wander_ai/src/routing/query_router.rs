//! Query Router
//!
//! Classifies a query, runs it through the Registry's chat chain (with
//! location enhancement when applicable), merges category tags, records the
//! last search and appends the Explore deep link. Provider failures never
//! escape; the caller only ever sees a [`RoutedResponse`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wander_core::{WanderConfig, WanderError};

use super::fallback::{Attempt, ChainRunner, FallbackHistory};
use super::query_classifier::{KeywordQueryClassifier, QueryClassifier};
use crate::categories::{CategorySet, merge_categories, scan_topics};
use crate::providers::AiProvider;
use crate::registry::ProviderRegistry;
use crate::search_cache::{DEFAULT_TTL_SECS, LastSearchCache, ttl_from_secs};
use crate::types::{Capability, ChatMessage, Prompt, TaskKind};

// ---------------------------------------------------------------------------
// Prompt shaping
// ---------------------------------------------------------------------------

pub const LOCATION_SYSTEM_INSTRUCTION: &str = "You are Wander, a local discovery guide. \
You recommend real places, events and things to do for the city the user asks about. \
Be specific and practical, and never invent venues.";

pub const GENERAL_SYSTEM_INSTRUCTION: &str = "You are Wander, a friendly local discovery guide. \
Keep answers short and conversational.";

const LOCATION_GUIDANCE: &str = "Include specific venue names, street addresses, opening hours \
and pricing where available. Group the recommendations by category (for example dining, \
nightlife, attractions, events, comedy) with a short heading for each group.";

const EXPLORE_LINK_LABEL: &str = "view all these results on our Explore page";

/// Prompt used for the location path.
pub fn location_prompt(query: &str) -> Prompt {
    Prompt::user(format!("{query}\n\n{LOCATION_GUIDANCE}")).with_system(LOCATION_SYSTEM_INSTRUCTION)
}

/// Everything except the characters `encodeURIComponent` leaves as-is.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// `/explore?q=<query>` with the query percent-encoded and spaces as `%20`.
pub fn explore_link(query: &str) -> String {
    format!("/explore?q={}", utf8_percent_encode(query, QUERY_COMPONENT))
}

/// Append the Markdown deep link the Explore view parses back out.
pub fn append_explore_link(text: &str, query: &str) -> String {
    format!("{text}\n\n...[{EXPLORE_LINK_LABEL}]({})", explore_link(query))
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Answered,
    /// No provider is available for chat at all.
    ProviderUnavailable,
    /// Every provider failed or answered inadequately.
    Exhausted,
    Cancelled,
    /// Blank query; nothing was sent.
    EmptyQuery,
}

/// What the caller renders. Empty `text` and `categories` on every outcome
/// except `Answered`.
#[derive(Debug, Clone)]
pub struct RoutedResponse {
    pub text: String,
    pub categories: CategorySet,
    pub provider_id: Option<String>,
    pub is_location_query: bool,
    pub outcome: RouteOutcome,
    pub attempts: Vec<Attempt>,
}

impl RoutedResponse {
    fn empty(outcome: RouteOutcome, is_location_query: bool, attempts: Vec<Attempt>) -> Self {
        Self {
            text: String::new(),
            categories: CategorySet::new(),
            provider_id: None,
            is_location_query,
            outcome,
            attempts,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// User-facing line for degraded outcomes.
    pub fn user_notice(&self) -> Option<String> {
        match self.outcome {
            RouteOutcome::ProviderUnavailable => Some(
                WanderError::ProviderUnavailable {
                    capability: Capability::Chat.to_string(),
                }
                .user_message(),
            ),
            RouteOutcome::Exhausted => {
                Some(WanderError::Provider("all providers failed".into()).user_message())
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Minimum characters for a location answer to count as adequate.
    pub min_response_chars: usize,
    pub provider_timeout: Duration,
    /// How long a recorded last search stays readable.
    pub cache_ttl: chrono::Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            min_response_chars: 100,
            provider_timeout: Duration::from_secs(8),
            cache_ttl: chrono::Duration::seconds(DEFAULT_TTL_SECS),
        }
    }
}

impl RouterConfig {
    pub fn from_config(config: &WanderConfig) -> Self {
        Self {
            min_response_chars: config.min_response_chars,
            provider_timeout: Duration::from_secs(config.provider_timeout_secs.max(1)),
            cache_ttl: ttl_from_secs(config.cache_ttl_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// QueryRouter
// ---------------------------------------------------------------------------

pub struct QueryRouter {
    registry: Arc<ProviderRegistry>,
    /// Implementations keyed by registry id.
    providers: RwLock<HashMap<String, Arc<dyn AiProvider>>>,
    classifier: Arc<dyn QueryClassifier>,
    cache: LastSearchCache,
    runner: ChainRunner,
    min_response_chars: AtomicUsize,
}

impl QueryRouter {
    pub fn new(registry: Arc<ProviderRegistry>, cache: LastSearchCache, config: RouterConfig) -> Self {
        cache.set_ttl(config.cache_ttl);
        Self {
            registry,
            providers: RwLock::new(HashMap::new()),
            classifier: Arc::new(KeywordQueryClassifier::new()),
            cache,
            runner: ChainRunner::new(config.provider_timeout),
            min_response_chars: AtomicUsize::new(config.min_response_chars),
        }
    }

    /// Replace the tuning. Takes effect for routes started afterwards.
    pub fn update_config(&self, config: &RouterConfig) {
        self.min_response_chars
            .store(config.min_response_chars, Ordering::Relaxed);
        self.runner.set_timeout(config.provider_timeout);
        self.cache.set_ttl(config.cache_ttl);
    }

    pub fn config(&self) -> RouterConfig {
        RouterConfig {
            min_response_chars: self.min_response_chars.load(Ordering::Relaxed),
            provider_timeout: self.runner.timeout(),
            cache_ttl: self.cache.ttl(),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn QueryClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Attach the implementation for a registry id. Replaces any previous one.
    pub fn register_provider(&self, provider: Arc<dyn AiProvider>) {
        let id = provider.id().to_string();
        debug!(id = %id, "Provider implementation attached");
        self.providers.write().insert(id, provider);
    }

    pub fn provider(&self, id: &str) -> Option<Arc<dyn AiProvider>> {
        self.providers.read().get(id).cloned()
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &LastSearchCache {
        &self.cache
    }

    pub fn fallback_history(&self) -> &Arc<FallbackHistory> {
        self.runner.history()
    }

    pub fn is_location_query(&self, query: &str) -> bool {
        self.classifier.is_location_query(query)
    }

    /// The chain for `capability` right now: Registry order, restricted to
    /// ids with an attached implementation. Computed fresh per request.
    pub fn chain_for(&self, capability: Capability) -> Vec<Arc<dyn AiProvider>> {
        let providers = self.providers.read();
        self.registry
            .list_by_capability(capability)
            .into_iter()
            .filter_map(|p| {
                let found = providers.get(&p.id).cloned();
                if found.is_none() {
                    debug!(id = %p.id, "Registry entry has no implementation, skipping");
                }
                found
            })
            .collect()
    }

    /// Answer `query`. Never fails; degraded outcomes are data.
    pub async fn route(
        &self,
        query: &str,
        prior_turns: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> RoutedResponse {
        let query = query.trim();
        if query.is_empty() {
            return RoutedResponse::empty(RouteOutcome::EmptyQuery, false, Vec::new());
        }

        let is_location = self.classifier.is_location_query(query);
        let chat_chain = self.chain_for(Capability::Chat);
        if chat_chain.is_empty() {
            warn!(capability = %Capability::Chat, "No provider available");
            return RoutedResponse::empty(RouteOutcome::ProviderUnavailable, is_location, Vec::new());
        }

        debug!(is_location, chain_len = chat_chain.len(), "Routing query");
        if is_location {
            self.route_location(query, prior_turns, cancel, &chat_chain)
                .await
        } else {
            self.route_general(query, prior_turns, cancel, &chat_chain)
                .await
        }
    }

    async fn route_location(
        &self,
        query: &str,
        prior_turns: &[ChatMessage],
        cancel: &CancellationToken,
        chat_chain: &[Arc<dyn AiProvider>],
    ) -> RoutedResponse {
        let mut attempts = Vec::new();
        let structured = self.extract_categories(query, cancel, &mut attempts).await;
        if cancel.is_cancelled() {
            return RoutedResponse::empty(RouteOutcome::Cancelled, true, attempts);
        }

        let prompt = location_prompt(query);
        let prompt = &prompt;
        let min_chars = self.min_response_chars.load(Ordering::Relaxed);
        let chat = self
            .runner
            .run(
                TaskKind::LocationSearch,
                chat_chain,
                cancel,
                |p| async move { p.generate_chat_response(prompt, prior_turns).await },
                |text: &String| text.trim().chars().count() >= min_chars,
            )
            .await;

        let cancelled = chat.was_cancelled();
        attempts.extend(chat.attempts);
        let Some((provider_id, text)) = chat.winner else {
            let outcome = if cancelled {
                RouteOutcome::Cancelled
            } else {
                RouteOutcome::Exhausted
            };
            info!(attempts = attempts.len(), ?outcome, "Location query produced no answer");
            return RoutedResponse::empty(outcome, true, attempts);
        };

        let categories = merge_categories(&structured, scan_topics(&text));
        if !categories.is_empty() {
            self.cache.write(&categories, query, Utc::now());
        }

        info!(
            provider = %provider_id,
            categories = categories.len(),
            attempts = attempts.len(),
            "Location query answered"
        );

        RoutedResponse {
            text: append_explore_link(&text, query),
            categories,
            provider_id: Some(provider_id),
            is_location_query: true,
            outcome: RouteOutcome::Answered,
            attempts,
        }
    }

    async fn route_general(
        &self,
        query: &str,
        prior_turns: &[ChatMessage],
        cancel: &CancellationToken,
        chat_chain: &[Arc<dyn AiProvider>],
    ) -> RoutedResponse {
        let prompt = Prompt::user(query).with_system(GENERAL_SYSTEM_INSTRUCTION);
        let prompt = &prompt;
        let chat = self
            .runner
            .run(
                TaskKind::ChatCompletion,
                chat_chain,
                cancel,
                |p| async move { p.generate_chat_response(prompt, prior_turns).await },
                |text: &String| !text.trim().is_empty(),
            )
            .await;

        let cancelled = chat.was_cancelled();
        match chat.winner {
            Some((provider_id, text)) => {
                info!(provider = %provider_id, attempts = chat.attempts.len(), "Query answered");
                RoutedResponse {
                    text,
                    categories: CategorySet::new(),
                    provider_id: Some(provider_id),
                    is_location_query: false,
                    outcome: RouteOutcome::Answered,
                    attempts: chat.attempts,
                }
            }
            None => {
                let outcome = if cancelled {
                    RouteOutcome::Cancelled
                } else {
                    RouteOutcome::Exhausted
                };
                info!(attempts = chat.attempts.len(), ?outcome, "Query produced no answer");
                RoutedResponse::empty(outcome, false, chat.attempts)
            }
        }
    }

    /// Best-effort structured extraction over the search chain. Empty on any
    /// failure.
    async fn extract_categories(
        &self,
        query: &str,
        cancel: &CancellationToken,
        attempts: &mut Vec<Attempt>,
    ) -> Vec<String> {
        let chain = self.chain_for(TaskKind::CategoryExtraction.capability());
        if chain.is_empty() {
            debug!("No category extractor available");
            return Vec::new();
        }

        let out = self
            .runner
            .run(
                TaskKind::CategoryExtraction,
                &chain,
                cancel,
                |p| async move { p.extract_categories(query).await },
                |_: &Vec<String>| true,
            )
            .await;
        attempts.extend(out.attempts);

        match out.winner {
            Some((provider_id, tags)) => {
                debug!(provider = %provider_id, tags = ?tags, "Structured categories extracted");
                tags
            }
            None => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use crate::registry::Provider;
    use crate::routing::fallback::AttemptOutcome;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wander_core::MemorySessionStore;

    const AUSTIN_ANSWER: &str = "Start the night with craft cocktails at a rooftop bar on \
Rainey Street, where the patio fills up early. Later, head over to Stubb's for a concert \
under the stars; doors open at seven and entry starts around twenty five dollars a person.";

    struct Mock {
        id: &'static str,
        chat: Result<String, ProviderError>,
        tags: Result<Vec<String>, ProviderError>,
        chat_calls: AtomicUsize,
        extract_calls: AtomicUsize,
    }

    impl Mock {
        fn chat(id: &'static str, chat: Result<&str, ProviderError>) -> Arc<Self> {
            Arc::new(Self {
                id,
                chat: chat.map(str::to_string),
                tags: Err(ProviderError::Other("not a classifier".into())),
                chat_calls: AtomicUsize::new(0),
                extract_calls: AtomicUsize::new(0),
            })
        }

        fn classifier(id: &'static str, tags: Result<&[&str], ProviderError>) -> Arc<Self> {
            Arc::new(Self {
                id,
                chat: Err(ProviderError::Other("not a chat model".into())),
                tags: tags.map(|t| t.iter().map(|s| s.to_string()).collect()),
                chat_calls: AtomicUsize::new(0),
                extract_calls: AtomicUsize::new(0),
            })
        }

        fn chat_calls(&self) -> usize {
            self.chat_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AiProvider for Mock {
        fn id(&self) -> &str {
            self.id
        }
        fn name(&self) -> &str {
            self.id
        }
        fn has_credentials(&self) -> bool {
            true
        }
        async fn generate_chat_response(
            &self,
            _prompt: &Prompt,
            _prior: &[ChatMessage],
        ) -> Result<String, ProviderError> {
            self.chat_calls.fetch_add(1, Ordering::SeqCst);
            self.chat.clone()
        }
        async fn extract_categories(&self, _text: &str) -> Result<Vec<String>, ProviderError> {
            self.extract_calls.fetch_add(1, Ordering::SeqCst);
            self.tags.clone()
        }
    }

    fn build(entries: Vec<(Arc<Mock>, Capability, i32)>) -> (QueryRouter, Arc<MemorySessionStore>) {
        let registry = Arc::new(ProviderRegistry::new());
        for (mock, cap, priority) in &entries {
            registry.register(Provider::new(mock.id, mock.id, *cap, *priority));
        }
        let store = Arc::new(MemorySessionStore::new());
        let router = QueryRouter::new(
            registry,
            LastSearchCache::new(store.clone()),
            RouterConfig::default(),
        );
        for (mock, _, _) in entries {
            router.register_provider(mock);
        }
        (router, store)
    }

    fn cats(items: &[&str]) -> CategorySet {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn austin_end_to_end() {
        assert!(AUSTIN_ANSWER.len() >= 100);
        let extractor = Mock::classifier("extractor", Ok(&["event"][..]));
        let chat = Mock::chat("chat", Ok(AUSTIN_ANSWER));
        let (router, _store) = build(vec![
            (extractor.clone(), Capability::Search, 50),
            (chat.clone(), Capability::Chat, 40),
        ]);

        let query = "things to do in Austin tonight";
        let resp = router.route(query, &[], &CancellationToken::new()).await;

        assert_eq!(resp.outcome, RouteOutcome::Answered);
        assert!(resp.is_location_query);
        assert_eq!(resp.provider_id.as_deref(), Some("chat"));
        assert_eq!(resp.categories, cats(&["event", "events", "nightlife"]));
        assert!(resp.text.starts_with("Start the night"));
        assert!(resp.text.ends_with(
            "...[view all these results on our Explore page](/explore?q=things%20to%20do%20in%20Austin%20tonight)"
        ));

        let cached = router.cache().read(Utc::now()).unwrap();
        assert_eq!(cached.query, query);
        assert_eq!(cached.categories, vec!["event", "events", "nightlife"]);
        assert_eq!(extractor.extract_calls.load(Ordering::SeqCst), 1);
        assert_eq!(chat.chat_calls(), 1);
    }

    #[tokio::test]
    async fn third_provider_answers_after_two_failures() {
        let p1 = Mock::chat("p1", Err(ProviderError::Network("refused".into())));
        let p2 = Mock::chat("p2", Err(ProviderError::InvalidKey));
        let p3 = Mock::chat("p3", Ok("Why did the scarecrow win an award?"));
        let (router, _) = build(vec![
            (p1.clone(), Capability::Chat, 30),
            (p2.clone(), Capability::Chat, 20),
            (p3.clone(), Capability::Both, 10),
        ]);

        let resp = router
            .route("tell me a joke", &[], &CancellationToken::new())
            .await;

        assert_eq!(resp.outcome, RouteOutcome::Answered);
        assert!(!resp.is_location_query);
        assert_eq!(resp.provider_id.as_deref(), Some("p3"));
        assert_eq!(resp.text, "Why did the scarecrow win an award?");
        assert!(resp.categories.is_empty());
        for p in [&p1, &p2, &p3] {
            assert_eq!(p.chat_calls(), 1);
        }
        let ids: Vec<&str> = resp.attempts.iter().map(|a| a.provider_id.as_str()).collect();
        assert_eq!(ids, ["p1", "p2", "p3"]);
        assert!(resp.attempts[2].succeeded());
    }

    #[tokio::test]
    async fn exhaustion_is_empty_not_error() {
        let p1 = Mock::chat("p1", Err(ProviderError::RateLimit));
        let p2 = Mock::chat("p2", Err(ProviderError::Timeout));
        let (router, store) = build(vec![
            (p1.clone(), Capability::Chat, 2),
            (p2.clone(), Capability::Chat, 1),
        ]);

        let resp = router
            .route("best bars in Chicago", &[], &CancellationToken::new())
            .await;

        assert_eq!(resp.outcome, RouteOutcome::Exhausted);
        assert!(resp.text.is_empty());
        assert!(resp.categories.is_empty());
        assert!(store.is_empty());
        assert_eq!(p1.chat_calls(), 1);
        assert_eq!(p2.chat_calls(), 1);
        assert!(resp.user_notice().is_some());
        assert_eq!(router.fallback_history().len(), 2);
    }

    #[tokio::test]
    async fn short_location_answer_falls_through() {
        let terse = Mock::chat("terse", Ok("Try Franklin."));
        let full = Mock::chat("full", Ok(AUSTIN_ANSWER));
        let (router, _) = build(vec![
            (terse.clone(), Capability::Chat, 9),
            (full.clone(), Capability::Chat, 1),
        ]);

        let resp = router
            .route("where to go in Austin", &[], &CancellationToken::new())
            .await;

        assert_eq!(resp.provider_id.as_deref(), Some("full"));
        assert_eq!(resp.attempts[0].outcome, AttemptOutcome::Inadequate);
        assert_eq!(terse.chat_calls(), 1);
    }

    #[tokio::test]
    async fn updated_minimum_length_applies_to_next_route() {
        let terse = Mock::chat("terse", Ok("Try Franklin."));
        let full = Mock::chat("full", Ok(AUSTIN_ANSWER));
        let (router, _) = build(vec![
            (terse.clone(), Capability::Chat, 9),
            (full.clone(), Capability::Chat, 1),
        ]);
        router.update_config(&RouterConfig {
            min_response_chars: 5,
            provider_timeout: Duration::from_secs(2),
            cache_ttl: chrono::Duration::seconds(60),
        });

        let resp = router
            .route("where to go in Austin", &[], &CancellationToken::new())
            .await;

        assert_eq!(resp.provider_id.as_deref(), Some("terse"));
        assert_eq!(full.chat_calls(), 0);
        let tuning = router.config();
        assert_eq!(tuning.provider_timeout, Duration::from_secs(2));
        assert_eq!(router.cache().ttl(), chrono::Duration::seconds(60));
    }

    #[tokio::test]
    async fn extraction_failure_is_best_effort() {
        let extractor = Mock::classifier("extractor", Err(ProviderError::RateLimit));
        let chat = Mock::chat("chat", Ok(AUSTIN_ANSWER));
        let (router, _) = build(vec![
            (extractor, Capability::Search, 5),
            (chat, Capability::Chat, 5),
        ]);

        let resp = router
            .route("nightlife in Austin", &[], &CancellationToken::new())
            .await;

        assert_eq!(resp.outcome, RouteOutcome::Answered);
        assert_eq!(resp.categories, cats(&["events", "nightlife"]));
        assert_eq!(resp.attempts[0].task, TaskKind::CategoryExtraction);
    }

    #[tokio::test]
    async fn no_available_provider_short_circuits() {
        let p1 = Mock::chat("p1", Ok("unused"));
        let (router, _) = build(vec![(p1.clone(), Capability::Chat, 1)]);
        router.registry().set_availability("p1", false);

        let resp = router.route("hello", &[], &CancellationToken::new()).await;

        assert_eq!(resp.outcome, RouteOutcome::ProviderUnavailable);
        assert!(resp.attempts.is_empty());
        assert_eq!(p1.chat_calls(), 0);
        assert_eq!(
            resp.user_notice().as_deref(),
            Some("Search is unavailable right now. Enable a provider in settings.")
        );
    }

    #[tokio::test]
    async fn registry_toggle_changes_next_chain() {
        let p1 = Mock::chat("p1", Ok("from p1"));
        let p2 = Mock::chat("p2", Ok("from p2"));
        let (router, _) = build(vec![
            (p1.clone(), Capability::Chat, 2),
            (p2.clone(), Capability::Chat, 1),
        ]);
        let cancel = CancellationToken::new();

        assert_eq!(router.route("hi", &[], &cancel).await.text, "from p1");
        router.registry().set_availability("p1", false);
        assert_eq!(router.route("hi", &[], &cancel).await.text, "from p2");
    }

    #[tokio::test]
    async fn cancelled_route_is_empty() {
        let p1 = Mock::chat("p1", Ok(AUSTIN_ANSWER));
        let (router, _) = build(vec![(p1.clone(), Capability::Chat, 1)]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let resp = router.route("hi there", &[], &cancel).await;

        assert_eq!(resp.outcome, RouteOutcome::Cancelled);
        assert_eq!(p1.chat_calls(), 0);
    }

    #[tokio::test]
    async fn blank_query_is_not_sent() {
        let p1 = Mock::chat("p1", Ok("unused"));
        let (router, _) = build(vec![(p1.clone(), Capability::Chat, 1)]);
        let resp = router.route("   ", &[], &CancellationToken::new()).await;
        assert_eq!(resp.outcome, RouteOutcome::EmptyQuery);
        assert_eq!(p1.chat_calls(), 0);
    }

    #[test]
    fn explore_link_encoding() {
        assert_eq!(
            explore_link("things to do in Austin tonight"),
            "/explore?q=things%20to%20do%20in%20Austin%20tonight"
        );
        assert_eq!(explore_link("bars & pubs?"), "/explore?q=bars%20%26%20pubs%3F");
    }

    #[test]
    fn explore_link_keeps_uri_component_marks() {
        assert_eq!(explore_link("what's on"), "/explore?q=what's%20on");
        assert_eq!(
            explore_link("jazz (live)! ~late* -_."),
            "/explore?q=jazz%20(live)!%20~late*%20-_."
        );
        assert_eq!(explore_link("café+bar/1"), "/explore?q=caf%C3%A9%2Bbar%2F1");
    }

    #[test]
    fn location_prompt_carries_guidance() {
        let p = location_prompt("tacos in Dallas");
        assert!(p.user.starts_with("tacos in Dallas"));
        assert!(p.user.contains("addresses"));
        assert_eq!(p.system.as_deref(), Some(LOCATION_SYSTEM_INSTRUCTION));
    }
}
