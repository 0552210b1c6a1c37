//! OpenAI-compatible chat provider.
//!
//! Perplexity, OpenAI and Google Gemini all expose `/chat/completions` with
//! the same request and response shape, so one implementation with a
//! per-backend preset covers the whole catalog.

use async_trait::async_trait;
use tracing::debug;

use super::wire::{ChatCompletionResponse, CompletionRequest, WireMessage};
use super::{AiProvider, ProviderError};
use crate::types::{ChatMessage, Prompt};

// ---------------------------------------------------------------------------
// Presets
// ---------------------------------------------------------------------------

/// Connection details for one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CompatPreset {
    pub id: &'static str,
    pub name: &'static str,
    pub base_url: &'static str,
    pub model: &'static str,
}

pub const PERPLEXITY: CompatPreset = CompatPreset {
    id: "perplexity",
    name: "Perplexity",
    base_url: "https://api.perplexity.ai",
    model: "sonar",
};

pub const OPENAI: CompatPreset = CompatPreset {
    id: "openai",
    name: "OpenAI",
    base_url: "https://api.openai.com/v1",
    model: "gpt-4o-mini",
};

pub const GEMINI: CompatPreset = CompatPreset {
    id: "gemini",
    name: "Google Gemini",
    base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
    model: "gemini-2.0-flash",
};

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

pub struct OpenAiCompatProvider {
    id: String,
    name: String,
    api_key: Option<String>,
    base_url: String,
    model: String,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Build a provider from a preset. A missing or empty key yields a
    /// provider that reports `has_credentials() == false`.
    pub fn from_preset(preset: &CompatPreset, api_key: Option<String>) -> Self {
        Self {
            id: preset.id.into(),
            name: preset.name.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            base_url: preset.base_url.into(),
            model: preset.model.into(),
            max_tokens: 1024,
            client: reqwest::Client::new(),
        }
    }

    /// Point the provider at a different endpoint (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn require_key(&self) -> Result<&str, ProviderError> {
        self.api_key.as_deref().ok_or(ProviderError::InvalidKey)
    }

    fn build_body<'a>(
        &'a self,
        prompt: &'a Prompt,
        prior_turns: &'a [ChatMessage],
    ) -> CompletionRequest<'a> {
        let mut messages = Vec::with_capacity(prior_turns.len() + 2);
        if let Some(system) = prompt.system.as_deref() {
            messages.push(WireMessage {
                role: "system",
                content: system,
            });
        }
        for turn in prior_turns {
            messages.push(WireMessage {
                role: turn.role.as_str(),
                content: &turn.content,
            });
        }
        messages.push(WireMessage {
            role: "user",
            content: &prompt.user,
        });

        CompletionRequest {
            model: &self.model,
            messages,
            stream: false,
            max_tokens: Some(self.max_tokens),
            temperature: Some(0.7),
        }
    }

    /// Turn an HTTP response into the answer text or a typed error.
    async fn parse_response(&self, resp: reqwest::Response) -> Result<String, ProviderError> {
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ProviderError::InvalidKey);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimit);
        }
        if status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::GATEWAY_TIMEOUT
        {
            return Err(ProviderError::Timeout);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Other(format!(
                "{} API error {status}: {text}",
                self.name
            )));
        }

        let data: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        match data.first_text().map(str::trim) {
            Some(text) if !text.is_empty() => Ok(text.to_string()),
            _ => Err(ProviderError::EmptyResponse),
        }
    }
}

#[async_trait]
impl AiProvider for OpenAiCompatProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate_chat_response(
        &self,
        prompt: &Prompt,
        prior_turns: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        let key = self.require_key()?;
        let body = self.build_body(prompt, prior_turns);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(provider = %self.id, model = %self.model, turns = prior_turns.len(), "Chat completion request");

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {key}"))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        self.parse_response(resp).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
