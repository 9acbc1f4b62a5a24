//! OpenAI-compatible chat-completions backend.
//!
//! One [`OpenAiCompatibleBackend`] serves every configured provider kind
//! via configurable base URLs: OpenAI, Gemini's OpenAI-compatible beta
//! endpoint, Anthropic's compatibility layer, and any self-hosted
//! gateway speaking the same wire format.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is only
//! exposed when building the Authorization header.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use vendly_core::llm::box_provider::BoxGenerationBackend;
use vendly_core::llm::provider::GenerationBackend;
use vendly_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, ProviderConfig, ProviderKind, Usage,
};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    model: Option<String>,
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// HTTP request timeout. The dispatcher wraps each attempt in its own
/// shorter timeout; this is the hard backstop.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Generation backend for any OpenAI-compatible `/chat/completions` API.
///
/// Does NOT derive Debug to prevent accidental exposure of the API key.
pub struct OpenAiCompatibleBackend {
    client: reqwest::Client,
    name: String,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl OpenAiCompatibleBackend {
    pub fn new(name: String, api_key: SecretString, base_url: String, model: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            name,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    fn build_request(&self, request: &CompletionRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);

        if let Some(ref system) = request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        for msg in &request.messages {
            messages.push(ChatMessage {
                role: msg.role.to_string(),
                content: msg.content.clone(),
            });
        }

        // Empty request model falls back to the configured default
        let model = if request.model.is_empty() {
            self.model.clone()
        } else {
            request.model.clone()
        };

        ChatRequest {
            model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }
}

impl GenerationBackend for OpenAiCompatibleBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request(request);
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000);
            let error_body = response.text().await.unwrap_or_default();

            return Err(match status.as_u16() {
                401 | 403 => LlmError::AuthenticationFailed,
                429 => LlmError::RateLimited { retry_after_ms },
                529 => LlmError::Overloaded(error_body),
                code if (400..500).contains(&code) => {
                    LlmError::InvalidRequest(format!("HTTP {status}: {error_body}"))
                }
                _ => LlmError::Provider {
                    message: format!("HTTP {status}: {error_body}"),
                },
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Deserialization(format!("failed to parse response: {e}")))?;

        let content = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        let usage = parsed
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens.unwrap_or(0),
                output_tokens: u.completion_tokens.unwrap_or(0),
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            content,
            model: parsed.model.unwrap_or_else(|| body.model.clone()),
            usage,
        })
    }
}

fn map_transport_error(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout(REQUEST_TIMEOUT.as_millis() as u64)
    } else {
        LlmError::Network(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Default base URL for a provider kind, used when the configuration
/// does not override it.
fn default_base_url(kind: &ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OpenAi => "https://api.openai.com/v1",
        ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
        ProviderKind::Anthropic => "https://api.anthropic.com/v1",
        ProviderKind::OpenAiCompatible => "http://localhost:8080/v1",
    }
}

/// Build a type-erased backend for a provider configuration.
pub fn backend_for(config: &ProviderConfig) -> BoxGenerationBackend {
    let base_url = config
        .base_url
        .clone()
        .unwrap_or_else(|| default_base_url(&config.kind).to_string());

    BoxGenerationBackend::new(OpenAiCompatibleBackend::new(
        config.name.clone(),
        config.api_key.clone(),
        base_url,
        config.model.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn backend() -> OpenAiCompatibleBackend {
        OpenAiCompatibleBackend::new(
            "openai-primary".to_string(),
            SecretString::from("sk-test"),
            "https://api.openai.com/v1/".to_string(),
            "gpt-4o-mini".to_string(),
        )
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let b = backend();
        assert_eq!(b.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_build_request_includes_system_first() {
        let b = backend();
        let request = CompletionRequest {
            model: String::new(),
            messages: vec![
                vendly_types::llm::Message {
                    role: vendly_types::llm::MessageRole::User,
                    content: "Hello".to_string(),
                },
                vendly_types::llm::Message {
                    role: vendly_types::llm::MessageRole::Assistant,
                    content: "Hi there!".to_string(),
                },
            ],
            system: Some("Be helpful".to_string()),
            max_tokens: 1024,
            temperature: Some(0.7),
        };

        let wire = b.build_request(&request);
        assert_eq!(wire.model, "gpt-4o-mini");
        assert_eq!(wire.messages.len(), 3);
        assert_eq!(wire.messages[0].role, "system");
        assert_eq!(wire.messages[1].role, "user");
        assert_eq!(wire.messages[2].role, "assistant");
        assert_eq!(wire.max_tokens, 1024);
    }

    #[test]
    fn test_build_request_keeps_explicit_model() {
        let b = backend();
        let request = CompletionRequest {
            model: "gpt-4o".to_string(),
            messages: vec![],
            system: None,
            max_tokens: 512,
            temperature: None,
        };
        assert_eq!(b.build_request(&request).model, "gpt-4o");
    }

    #[test]
    fn test_factory_uses_default_base_url_per_kind() {
        let mut config = ProviderConfig {
            id: Uuid::now_v7(),
            name: "gemini-backup".to_string(),
            kind: ProviderKind::Gemini,
            api_key: SecretString::from("key"),
            base_url: None,
            model: "gemini-2.0-flash".to_string(),
            priority: 1,
            daily_limit: 100,
            used_today: 0,
            exhausted: false,
            enabled: true,
        };
        let b = backend_for(&config);
        assert_eq!(b.name(), "gemini-backup");

        config.base_url = Some("https://gateway.internal/v1".to_string());
        let b = backend_for(&config);
        assert_eq!(b.name(), "gemini-backup");
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Sure!"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Sure!"));
        assert_eq!(parsed.usage.unwrap().prompt_tokens, Some(12));
    }
}
