//! Generation backend request/response types for Vendly.
//!
//! These types model the data shapes for generative-text provider
//! interactions: completion requests, usage tracking, error handling, and
//! the per-provider configuration the dispatcher routes over.

use std::fmt;
use std::str::FromStr;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a message in a generation conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(MessageRole::System),
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(format!("invalid message role: '{other}'")),
        }
    }
}

/// A single message in a generation conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

/// Request to a generation backend for a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// Response from a generation backend for a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub usage: Usage,
}

/// Token usage for a completion request/response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Errors from generation backend operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider error: {message}")]
    Provider { message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("generation timed out after {0}ms")]
    Timeout(u64),

    #[error("provider overloaded: {0}")]
    Overloaded(String),

    #[error("rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("no eligible provider remains")]
    Exhausted,
}

/// Dispatcher-facing classification of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient (network, timeout, 5xx). Retried with backoff, then failover.
    Retryable,
    /// Auth/validation (4xx except 429). Immediate failover, no retry.
    NonRetryable,
    /// Backend-reported rate/usage limit (429). Provider marked exhausted
    /// for the day; circuit health is not penalized.
    QuotaExceeded,
}

impl LlmError {
    /// Classify this error for retry/failover decisions.
    ///
    /// Unclassified shapes default to `Retryable` so an unknown failure
    /// never silently drops a message.
    pub fn class(&self) -> ErrorClass {
        match self {
            LlmError::Provider { .. }
            | LlmError::Network(_)
            | LlmError::Timeout(_)
            | LlmError::Overloaded(_)
            | LlmError::Exhausted => ErrorClass::Retryable,
            LlmError::RateLimited { .. } => ErrorClass::QuotaExceeded,
            LlmError::AuthenticationFailed
            | LlmError::InvalidRequest(_)
            | LlmError::Deserialization(_) => ErrorClass::NonRetryable,
        }
    }
}

/// Kind of generation backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAi,
    Gemini,
    Anthropic,
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::OpenAi => write!(f, "openai"),
            ProviderKind::Gemini => write!(f, "gemini"),
            ProviderKind::Anthropic => write!(f, "anthropic"),
            ProviderKind::OpenAiCompatible => write!(f, "openai_compatible"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "gemini" => Ok(ProviderKind::Gemini),
            "anthropic" => Ok(ProviderKind::Anthropic),
            "openai_compatible" => Ok(ProviderKind::OpenAiCompatible),
            other => Err(format!("invalid provider kind: '{other}'")),
        }
    }
}

/// Configuration for a single generation backend in the dispatcher.
///
/// The decrypted API key lives only in memory (`SecretString`); the
/// persisted form carries the encrypted key and is decrypted on load.
#[derive(Clone)]
pub struct ProviderConfig {
    pub id: Uuid,
    /// Human-readable name (e.g., "openai-primary").
    pub name: String,
    pub kind: ProviderKind,
    /// Decrypted credential. Never serialized, never logged.
    pub api_key: SecretString,
    /// Override the backend's default base URL.
    pub base_url: Option<String>,
    /// Model identifier to use.
    pub model: String,
    /// Selection order; higher value = tried first.
    pub priority: u32,
    /// Maximum successful generations per day.
    pub daily_limit: u32,
    /// Successful generations so far today. Monotonically increases until
    /// an explicit daily reset.
    pub used_today: u32,
    /// Backend reported quota exhaustion for the rest of the day.
    /// Kept separate from `used_today` so "exhausted" never masquerades
    /// as a numeric usage value.
    pub exhausted: bool,
    pub enabled: bool,
}

// ProviderConfig intentionally does NOT derive Debug: the SecretString field
// redacts itself, but omitting Debug entirely keeps the whole config out of
// accidental log output.

impl ProviderConfig {
    /// Whether quota permits another generation today.
    pub fn quota_available(&self) -> bool {
        !self.exhausted && self.used_today < self.daily_limit
    }
}

/// Result of a successful generation through the dispatcher.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub content: String,
    pub provider_id: Uuid,
    pub provider_name: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub latency_ms: u64,
}

/// Status information for a provider (operator visibility).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderStatusInfo {
    pub id: Uuid,
    pub name: String,
    /// One of "closed", "open", "half_open".
    pub circuit_state: String,
    pub used_today: u32,
    pub daily_limit: u32,
    pub exhausted: bool,
    pub last_error: Option<String>,
    pub total_calls: u64,
    pub total_failures: u64,
}

/// A persisted usage record for one successful generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub latency_ms: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
