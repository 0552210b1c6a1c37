pub mod categories;
pub mod providers;
pub mod registry;
pub mod routing;
pub mod search_cache;
pub mod service;
pub mod tts;
pub mod types;

// Re-export core types at crate root for convenience.
pub use categories::CategorySet;
pub use providers::{AiProvider, ProviderError};
pub use registry::{Provider, ProviderRegistry, default_catalog};
pub use routing::{
    AttemptOutcome, FallbackEvent, FallbackReason, QueryClassifier, QueryRouter, RouteOutcome,
    RoutedResponse, RouterConfig,
};
pub use search_cache::{LastSearch, LastSearchCache};
pub use service::WanderService;
pub use tts::speaker::{Speaker, SpeakerConfig, SpeakerState, SpeechOutcome};
pub use tts::{TtsError, TtsProvider};
pub use types::*;
