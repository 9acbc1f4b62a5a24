//! GenerationBackend trait definition.
//!
//! The core abstraction every generation backend implements. Uses native
//! async fn in traits (RPITIT); `BoxGenerationBackend` provides the
//! object-safe wrapper for runtime backend selection.

use vendly_types::llm::{CompletionRequest, CompletionResponse, LlmError};

/// Trait for generation backends (OpenAI, Gemini, Anthropic, ...).
///
/// Implementations live in vendly-infra (e.g., `OpenAiCompatibleBackend`).
/// Error shapes are normalized: the dispatcher's retry/failover decisions
/// rely on `LlmError::class()` being accurate for every implementation.
pub trait GenerationBackend: Send + Sync {
    /// Human-readable backend name (e.g., "openai-primary").
    fn name(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;
}
