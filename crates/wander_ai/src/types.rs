use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// One prior turn of the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ChatMessage {
    pub fn text(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// The prompt handed to a chat provider: an optional system instruction and
/// the user-facing text for this turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
}

impl Prompt {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            system: None,
            user: text.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// What kind of task a provider can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Search,
    Chat,
    Both,
}

impl Capability {
    /// Whether a provider tagged `self` is eligible for a `requested` task.
    /// `Both` serves everything; otherwise the tags must match exactly.
    pub fn serves(self, requested: Capability) -> bool {
        self == requested || self == Capability::Both
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Chat => "chat",
            Self::Both => "both",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of task the router is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    ChatCompletion,
    LocationSearch,
    CategoryExtraction,
}

impl TaskKind {
    /// Capability a provider needs to run this task.
    pub fn capability(self) -> Capability {
        match self {
            Self::ChatCompletion | Self::LocationSearch => Capability::Chat,
            Self::CategoryExtraction => Capability::Search,
        }
    }
}
