use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level application error type.
///
/// Degraded-service outcomes (no provider, exhausted chain, failed speech)
/// are returned as data by the orchestration layer. This type is only used
/// where something has to be shown to the user or a setup step fails.
#[derive(Error, Debug)]
pub enum WanderError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No {capability} provider is available")]
    ProviderUnavailable { capability: String },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Voice synthesis unavailable: {0}")]
    Synthesis(String),

}

/// Classification of errors for logging and user display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// A backend could not serve the request.
    ProviderError,
    /// Audio output could not be produced.
    AudioError,
    /// Invalid or missing configuration.
    ConfigError,
}

impl WanderError {
    /// Returns the broad error category for routing and display purposes.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::ConfigError,
            Self::ProviderUnavailable { .. } | Self::Provider(_) => ErrorCategory::ProviderError,
            Self::Synthesis(_) => ErrorCategory::AudioError,
        }
    }

    /// Returns a user-friendly message (hides internal details).
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(msg) => format!("Configuration issue: {msg}"),
            Self::ProviderUnavailable { .. } => {
                "Search is unavailable right now. Enable a provider in settings.".into()
            }
            Self::Provider(_) => "We couldn't get an answer right now.".into(),
            Self::Synthesis(_) => "Voice synthesis unavailable".into(),
        }
    }
}
