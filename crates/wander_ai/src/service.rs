//! Wander Service: composition root.
//!
//! Builds the Registry, the provider implementations, the Query Router and
//! the Speaker from [`WanderConfig`], keeps Registry availability in sync
//! with settings toggles and credentials, and exposes the `respond` /
//! `speak` API the UI layer calls.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use wander_core::{ConfigManager, EphemeralStore, NotificationStore, WanderConfig, WanderError};

use crate::providers::AiProvider;
use crate::providers::openai_compat::{GEMINI, OPENAI, OpenAiCompatProvider, PERPLEXITY};
use crate::registry::{ProviderRegistry, default_catalog};
use crate::routing::{QueryRouter, RoutedResponse, RouterConfig};
use crate::search_cache::LastSearchCache;
use crate::tts::TtsProvider;
use crate::tts::elevenlabs::ElevenLabsProvider;
use crate::tts::local::{ProcessAudioSink, SystemSpeechEngine};
use crate::tts::speaker::{Speaker, SpeakerConfig, SpeechOutcome};
use crate::types::ChatMessage;

/// Marks the start of the Explore deep link appended to location answers.
const EXPLORE_SUFFIX_START: &str = "\n\n...[";

/// Text suitable for reading aloud: the answer without its deep link.
pub fn speakable_text(text: &str) -> &str {
    match text.rfind(EXPLORE_SUFFIX_START) {
        Some(idx) => text[..idx].trim_end(),
        None => text.trim_end(),
    }
}

/// Registry availability for `config`: the user's toggle (on unless set)
/// and a usable credential.
pub fn effective_availability(
    config: &WanderConfig,
    registry: &ProviderRegistry,
    has_credentials: impl Fn(&str) -> bool,
) -> BTreeMap<String, bool> {
    registry
        .all()
        .into_iter()
        .map(|p| {
            let enabled = config.provider_toggles.get(&p.id).copied().unwrap_or(true);
            let usable = enabled && has_credentials(&p.id);
            (p.id, usable)
        })
        .collect()
}

pub struct WanderService {
    router: QueryRouter,
    speaker: Speaker,
    notifications: Arc<NotificationStore>,
}

impl WanderService {
    /// Build the shipped provider set from configuration.
    pub fn new(
        config: &WanderConfig,
        store: Arc<dyn EphemeralStore>,
        notifications: Arc<NotificationStore>,
    ) -> Self {
        let providers: Vec<Arc<dyn AiProvider>> = vec![
            Arc::new(OpenAiCompatProvider::from_preset(
                &PERPLEXITY,
                config.perplexity_api_key.clone(),
            )),
            Arc::new(OpenAiCompatProvider::from_preset(
                &OPENAI,
                config.openai_api_key.clone(),
            )),
            Arc::new(OpenAiCompatProvider::from_preset(
                &GEMINI,
                config.gemini_api_key.clone(),
            )),
        ];

        let cloud: Arc<dyn TtsProvider> =
            Arc::new(ElevenLabsProvider::new(config.elevenlabs_api_key.clone()));
        let speaker = Speaker::new(
            Some(cloud),
            Arc::new(SystemSpeechEngine::detect()),
            Arc::new(ProcessAudioSink::detect()),
            Arc::clone(&notifications),
            SpeakerConfig::from_config(config),
        );

        Self::with_parts(
            config,
            Arc::new(ProviderRegistry::with_catalog(default_catalog())),
            providers,
            store,
            speaker,
            notifications,
        )
    }

    /// Assemble from explicit parts (alternate providers, tests).
    pub fn with_parts(
        config: &WanderConfig,
        registry: Arc<ProviderRegistry>,
        providers: Vec<Arc<dyn AiProvider>>,
        store: Arc<dyn EphemeralStore>,
        speaker: Speaker,
        notifications: Arc<NotificationStore>,
    ) -> Self {
        let router = QueryRouter::new(
            registry,
            LastSearchCache::new(store),
            RouterConfig::from_config(config),
        );
        for provider in providers {
            router.register_provider(provider);
        }

        let service = Self {
            router,
            speaker,
            notifications,
        };
        service.apply_config(config);
        info!(
            providers = service.router.registry().all().len(),
            "Wander service initialized"
        );
        service
    }

    /// Re-derive Registry availability, router tuning and speaker settings
    /// from `config`.
    pub fn apply_config(&self, config: &WanderConfig) {
        let availability = effective_availability(config, self.router.registry(), |id| {
            self.router
                .provider(id)
                .is_some_and(|p| p.has_credentials())
        });
        debug!(?availability, "Applying provider availability");
        self.router.registry().bulk_set_availability(&availability);
        self.router.update_config(&RouterConfig::from_config(config));

        let speaker_config = SpeakerConfig::from_config(config);
        self.speaker.update_config(|c| *c = speaker_config);
    }

    /// Persist a settings toggle and apply it to the Registry.
    pub fn set_provider_enabled(
        &self,
        manager: &ConfigManager,
        provider_id: &str,
        enabled: bool,
    ) -> Result<(), WanderError> {
        manager
            .set_provider_enabled(provider_id, enabled)
            .map_err(|e| WanderError::Config(format!("{e:#}")))?;
        self.apply_config(&manager.get());
        Ok(())
    }

    /// Re-apply configuration whenever `manager` hot-reloads the file.
    pub fn follow_config(self: &Arc<Self>, manager: &ConfigManager) {
        let service = Arc::downgrade(self);
        manager.on_reload(move |config| {
            if let Some(service) = service.upgrade() {
                service.apply_config(config);
            }
        });
    }

    /// Answer a user query. Degraded outcomes come back as data.
    pub async fn respond(
        &self,
        query: &str,
        prior_turns: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> RoutedResponse {
        self.router.route(query, prior_turns, cancel).await
    }

    /// Read an answer aloud without its deep link.
    pub async fn speak_response(&self, response: &RoutedResponse) -> SpeechOutcome {
        self.speaker.speak(speakable_text(&response.text)).await
    }

    pub async fn speak(&self, text: &str) -> SpeechOutcome {
        self.speaker.speak(text).await
    }

    pub fn stop_speaking(&self) {
        self.speaker.stop();
    }

    pub fn router(&self) -> &QueryRouter {
        &self.router
    }

    pub fn speaker(&self) -> &Speaker {
        &self.speaker
    }

    pub fn notifications(&self) -> &Arc<NotificationStore> {
        &self.notifications
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
