use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::FableError;

/// Upstream narration service.
///
/// `Relay` speaks the turn-request shape directly to a narration proxy; the
/// other two build a prompt and call the hosted API themselves.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Relay,
    Openai,
    Anthropic,
}

impl Provider {
    pub fn from_str_loose(s: &str) -> Result<Self, FableError> {
        match s.trim().to_lowercase().as_str() {
            "relay" | "proxy" => Ok(Provider::Relay),
            "openai" => Ok(Provider::Openai),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            _ => Err(FableError::UnknownProvider(s.to_string())),
        }
    }

    pub fn default_endpoint(self) -> &'static str {
        match self {
            Provider::Relay => "http://localhost:3000/api/story",
            Provider::Openai => "https://api.openai.com/v1/chat/completions",
            Provider::Anthropic => "https://api.anthropic.com/v1/messages",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Provider::Relay => "default",
            Provider::Openai => "gpt-4o-mini",
            Provider::Anthropic => "claude-sonnet-4-20250514",
        }
    }

    /// Environment variable holding the API key for this provider.
    pub fn api_key_var(self) -> &'static str {
        match self {
            Provider::Relay => "FABLE_RELAY_KEY",
            Provider::Openai => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    /// Hosted providers refuse unauthenticated calls; a relay may not.
    pub fn requires_api_key(self) -> bool {
        !matches!(self, Provider::Relay)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Relay => write!(f, "relay"),
            Provider::Openai => write!(f, "openai"),
            Provider::Anthropic => write!(f, "anthropic"),
        }
    }
}

// -- OpenAI request types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct OpenAIChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct OpenAIChatRequest {
    pub model: String,
    pub messages: Vec<OpenAIChatMessage>,
    pub stream: bool,
    pub temperature: f32,
    pub max_tokens: u32,
}

// -- Anthropic request types ------------------------------------------------

#[derive(Debug, Serialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct AnthropicRequest {
    pub model: String,
    pub messages: Vec<AnthropicMessage>,
    pub max_tokens: u32,
    pub stream: bool,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
