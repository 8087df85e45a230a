use crate::error::ConversationError;
use chrono::{DateTime, Local};
use std::fmt;
use std::str::FromStr;

/// The three supported vendor backends. Always derived from a [`ModelId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    Google,
    OpenAi,
    Anthropic,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Google => "google",
            ProviderId::OpenAi => "openai",
            ProviderId::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelId {
    Flash,
    Pro,
    Gpt4o,
    Gpt4oMini,
    Sonnet4,
}

/// Catalog entry shown when picking a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: ModelId,
    pub name: &'static str,
    pub description: &'static str,
}

pub const MODEL_CATALOG: [ModelInfo; 5] = [
    ModelInfo {
        id: ModelId::Flash,
        name: "Gemini 2.5 Flash",
        description: "Fast & Responsive",
    },
    ModelInfo {
        id: ModelId::Pro,
        name: "Gemini 3.0 Pro",
        description: "Advanced Reasoning",
    },
    ModelInfo {
        id: ModelId::Gpt4o,
        name: "GPT-4o",
        description: "Powerful & Versatile",
    },
    ModelInfo {
        id: ModelId::Gpt4oMini,
        name: "GPT-4o Mini",
        description: "Fast & Affordable",
    },
    ModelInfo {
        id: ModelId::Sonnet4,
        name: "Claude Sonnet 4",
        description: "Thoughtful & Precise",
    },
];

impl ModelId {
    /// The identifier the vendor API expects.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::Flash => "gemini-2.5-flash",
            ModelId::Pro => "gemini-3-pro-preview",
            ModelId::Gpt4o => "gpt-4o",
            ModelId::Gpt4oMini => "gpt-4o-mini",
            ModelId::Sonnet4 => "claude-sonnet-4-20250514",
        }
    }

    pub fn provider(&self) -> ProviderId {
        match self {
            ModelId::Flash | ModelId::Pro => ProviderId::Google,
            ModelId::Gpt4o | ModelId::Gpt4oMini => ProviderId::OpenAi,
            ModelId::Sonnet4 => ProviderId::Anthropic,
        }
    }

    pub fn info(&self) -> &'static ModelInfo {
        // The catalog lists every variant exactly once, in declaration order.
        &MODEL_CATALOG[*self as usize]
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = ConversationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MODEL_CATALOG
            .iter()
            .map(|info| info.id)
            .find(|id| id.as_str() == s)
            .ok_or_else(|| ConversationError::UnknownModel(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptStyle {
    Technical,
    Behavioral,
}

impl PromptStyle {
    /// Template name in the prompt book.
    pub fn template_name(&self) -> &'static str {
        match self {
            PromptStyle::Technical => "technical",
            PromptStyle::Behavioral => "behavioral",
        }
    }
}

impl FromStr for PromptStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "technical" => Ok(PromptStyle::Technical),
            "behavioral" | "behavioural" => Ok(PromptStyle::Behavioral),
            other => Err(format!("unknown interview style: {other}")),
        }
    }
}

/// Interview setup, fixed for the lifetime of one session.
///
/// `model` is kept as the raw string from setup so that an unsupported value
/// is reported by [`crate::conversation::ConversationSession::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub model: String,
    pub style: PromptStyle,
    pub role: String,
    pub topic: String,
    pub candidate_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Model,
}

/// One exchanged message exactly as it was sent or received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub text: String,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Model,
            text: text.into(),
        }
    }
}

/// A message as shown to the candidate. The text is what was typed or
/// generated, without the timing annotation sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayMessage {
    pub id: u64,
    pub role: TurnRole,
    pub text: String,
    pub timestamp: DateTime<Local>,
}
