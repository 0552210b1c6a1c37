//! AI provider trait and implementations.
//!
//! Every backend the registry can route to implements [`AiProvider`]. The
//! shipped backends all speak the OpenAI `/chat/completions` wire format and
//! share [`openai_compat::OpenAiCompatProvider`].

pub mod openai_compat;
pub(crate) mod wire;

use async_trait::async_trait;

use crate::categories;
use crate::types::{ChatMessage, Prompt};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that any provider may return. An empty answer is an error, never a
/// silent success.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited")]
    RateLimit,

    #[error("Invalid API key")]
    InvalidKey,

    #[error("Timeout")]
    Timeout,

    #[error("Empty response")]
    EmptyResponse,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Provider error: {0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Unified interface for interchangeable chat / search backends.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Registry id this implementation serves (e.g. `"perplexity"`).
    fn id(&self) -> &str;

    /// Human-readable display name.
    fn name(&self) -> &str;

    /// Whether the provider has what it needs to make calls (credential).
    fn has_credentials(&self) -> bool;

    /// Non-streaming completion for `prompt`, with earlier turns as context.
    async fn generate_chat_response(
        &self,
        prompt: &Prompt,
        prior_turns: &[ChatMessage],
    ) -> Result<String, ProviderError>;

    /// Classify free text into venue/activity category tags.
    ///
    /// The default asks the model for a JSON array and parses it.
    async fn extract_categories(&self, text: &str) -> Result<Vec<String>, ProviderError> {
        let prompt = Prompt::user(text).with_system(categories::EXTRACTION_INSTRUCTION);
        let raw = self.generate_chat_response(&prompt, &[]).await?;
        categories::parse_category_list(&raw)
    }
}
