//! Multi-provider generation dispatcher.
//!
//! Routes generation requests through the configured backends with quota
//! tracking, bounded per-attempt deadlines, retry with exponential backoff,
//! and circuit-breaker failover. Providers are tried in descending priority
//! order; retryable errors (network, timeout, 5xx) are retried then failed
//! over, auth/validation errors fail over immediately, and quota signals
//! mark the provider exhausted for the day without penalizing its health.

use std::time::{Duration, Instant};

use uuid::Uuid;

use vendly_types::config::EngineConfig;
use vendly_types::error::RepositoryError;
use vendly_types::llm::{
    CompletionRequest, CompletionResponse, ErrorClass, GenerationResult, LlmError, ProviderConfig,
    ProviderStatusInfo, UsageRecord,
};

use super::box_provider::BoxGenerationBackend;
use super::health::ProviderHealth;

use crate::repository::provider::ProviderRepository;

/// One configured provider with its transient health state and backend.
struct ProviderEntry {
    config: ProviderConfig,
    health: ProviderHealth,
    backend: BoxGenerationBackend,
}

/// Retry/backoff/circuit tuning for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub generation_timeout: Duration,
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub circuit_failure_threshold: u32,
    pub circuit_open_duration: Duration,
}

impl DispatcherSettings {
    pub fn from_engine_config(config: &EngineConfig) -> Self {
        Self {
            generation_timeout: Duration::from_millis(config.generation_timeout_ms),
            retry_max_attempts: config.retry_max_attempts,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            retry_max_delay: Duration::from_millis(config.retry_max_delay_ms),
            circuit_failure_threshold: config.circuit_failure_threshold,
            circuit_open_duration: Duration::from_millis(config.circuit_open_ms),
        }
    }
}

/// Routes generation requests through multiple providers with failover.
///
/// Owns the quota counters and circuit state exclusively; nothing outside
/// the dispatcher mutates them. Methods take `&mut self` -- callers wrap
/// the dispatcher in an async `Mutex`, which also guarantees no two
/// concurrent generation calls race for the same provider's quota counter.
pub struct ProviderDispatcher<R: ProviderRepository> {
    providers: Vec<ProviderEntry>,
    repo: R,
    settings: DispatcherSettings,
}

impl<R: ProviderRepository> ProviderDispatcher<R> {
    /// Build a dispatcher from configs paired with their backends.
    pub fn new(
        configs: Vec<(ProviderConfig, BoxGenerationBackend)>,
        repo: R,
        settings: DispatcherSettings,
    ) -> Self {
        let providers = configs
            .into_iter()
            .map(|(config, backend)| ProviderEntry {
                health: ProviderHealth::new(
                    settings.circuit_failure_threshold,
                    settings.circuit_open_duration,
                ),
                config,
                backend,
            })
            .collect();

        Self {
            providers,
            repo,
            settings,
        }
    }

    /// Replace the provider set wholesale (admin change or daily reset).
    ///
    /// Circuit state is transient and starts fresh for the new set.
    pub fn reload(&mut self, configs: Vec<(ProviderConfig, BoxGenerationBackend)>) {
        tracing::info!(count = configs.len(), "Reloading provider set");
        self.providers = configs
            .into_iter()
            .map(|(config, backend)| ProviderEntry {
                health: ProviderHealth::new(
                    self.settings.circuit_failure_threshold,
                    self.settings.circuit_open_duration,
                ),
                config,
                backend,
            })
            .collect();
    }

    /// Daily reset: zero in-memory counters and clear exhausted flags,
    /// then persist the reset.
    pub async fn reset_daily_usage(&mut self) -> Result<(), RepositoryError> {
        for entry in &mut self.providers {
            entry.config.used_today = 0;
            entry.config.exhausted = false;
        }
        self.repo.reset_daily_usage().await
    }

    /// Status of every configured provider (operator visibility).
    pub fn stats(&self) -> Vec<ProviderStatusInfo> {
        self.providers
            .iter()
            .map(|entry| ProviderStatusInfo {
                id: entry.config.id,
                name: entry.config.name.clone(),
                circuit_state: entry.health.state_label().to_string(),
                used_today: entry.config.used_today,
                daily_limit: entry.config.daily_limit,
                exhausted: entry.config.exhausted,
                last_error: entry.health.last_error.clone(),
                total_calls: entry.health.total_calls,
                total_failures: entry.health.total_failures,
            })
            .collect()
    }

    /// Whether any provider is currently eligible for dispatch.
    pub fn has_available(&mut self) -> bool {
        let indices = self.sorted_indices();
        indices.into_iter().any(|idx| {
            let entry = &mut self.providers[idx];
            entry.config.enabled && entry.config.quota_available() && entry.health.is_available()
        })
    }

    /// Indices sorted by priority descending, ties broken by name.
    fn sorted_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.providers.len()).collect();
        indices.sort_by(|&a, &b| {
            let ca = &self.providers[a].config;
            let cb = &self.providers[b].config;
            cb.priority
                .cmp(&ca.priority)
                .then_with(|| ca.name.cmp(&cb.name))
        });
        indices
    }

    /// Send a generation request through the provider chain.
    ///
    /// On total exhaustion the last classified error is surfaced; the
    /// caller treats this as "no reply generated", never as a crash.
    pub async fn generate(
        &mut self,
        request: &CompletionRequest,
    ) -> Result<GenerationResult, LlmError> {
        let indices = self.sorted_indices();
        let mut last_error: Option<LlmError> = None;

        for idx in indices {
            {
                let entry = &mut self.providers[idx];
                if !entry.config.enabled {
                    continue;
                }
                if !entry.config.quota_available() {
                    tracing::debug!(provider = %entry.config.name, "Quota unavailable, skipping");
                    continue;
                }
                if !entry.health.is_available() {
                    tracing::debug!(provider = %entry.config.name, "Circuit not closed, skipping");
                    continue;
                }
            }

            let start = Instant::now();
            match self.try_provider(idx, request).await {
                Ok(response) => {
                    let latency_ms = start.elapsed().as_millis() as u64;
                    return Ok(self.record_success(idx, response, latency_ms).await);
                }
                Err(err) => {
                    let provider_name = self.providers[idx].config.name.clone();
                    match err.class() {
                        ErrorClass::QuotaExceeded => {
                            tracing::warn!(
                                provider = %provider_name,
                                error = %err,
                                "Provider reported quota exhaustion, marking exhausted for today"
                            );
                            self.mark_exhausted(idx).await;
                        }
                        ErrorClass::NonRetryable => {
                            tracing::warn!(
                                provider = %provider_name,
                                error = %err,
                                "Non-retryable provider error, failing over"
                            );
                        }
                        ErrorClass::Retryable => {
                            tracing::warn!(
                                provider = %provider_name,
                                error = %err,
                                "Provider failed after retries, failing over"
                            );
                        }
                    }
                    // Stats for every class; only retryable attempts moved
                    // the circuit (inside try_provider).
                    if err.class() != ErrorClass::Retryable {
                        self.providers[idx].health.record_failure(&err);
                    }
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or(LlmError::Exhausted))
    }

    /// Attempt one provider with the retry/backoff policy.
    ///
    /// Retryable attempt failures each advance the provider's circuit; a
    /// non-retryable or quota error aborts the retry loop immediately.
    async fn try_provider(
        &mut self,
        idx: usize,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        let max_attempts = self.settings.retry_max_attempts.max(1);
        let timeout_ms = self.settings.generation_timeout.as_millis() as u64;
        let mut delay = self.settings.retry_base_delay;
        let mut last_error = LlmError::Exhausted;

        for attempt in 1..=max_attempts {
            let model = self.providers[idx].config.model.clone();
            let mut attempt_request = request.clone();
            attempt_request.model = model;

            let outcome = tokio::time::timeout(
                self.settings.generation_timeout,
                self.providers[idx].backend.complete(&attempt_request),
            )
            .await;

            // Deadline expiry abandons the underlying call; this is a
            // timeout, not cancellation -- the backend future is dropped
            // but any in-flight HTTP request is not aborted server-side.
            let err = match outcome {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(err)) => err,
                Err(_) => LlmError::Timeout(timeout_ms),
            };

            if err.class() != ErrorClass::Retryable {
                return Err(err);
            }

            self.providers[idx].health.record_failure(&err);
            tracing::debug!(
                provider = %self.providers[idx].config.name,
                attempt,
                error = %err,
                "Retryable generation failure"
            );
            last_error = err;

            if attempt < max_attempts {
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(self.settings.retry_max_delay);
            }
        }

        Err(last_error)
    }

    /// Success path: bump quota, reset the circuit, persist the usage row.
    async fn record_success(
        &mut self,
        idx: usize,
        response: CompletionResponse,
        latency_ms: u64,
    ) -> GenerationResult {
        let entry = &mut self.providers[idx];
        entry.config.used_today += 1;
        entry.health.record_success();

        let record = UsageRecord {
            id: Uuid::now_v7(),
            provider_id: entry.config.id,
            model: response.model.clone(),
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
            latency_ms,
            created_at: chrono::Utc::now(),
        };

        let result = GenerationResult {
            content: response.content,
            provider_id: entry.config.id,
            provider_name: entry.config.name.clone(),
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
            latency_ms,
        };

        if let Err(err) = self.repo.record_usage(&record).await {
            // The reply already exists; losing the audit row is an
            // operator-visible defect, not a reason to fail the message.
            tracing::error!(error = %err, "Failed to persist usage record");
        }

        result
    }

    /// Flag the provider exhausted for the rest of the day, in memory and
    /// in the backing store.
    async fn mark_exhausted(&mut self, idx: usize) {
        self.providers[idx].config.exhausted = true;
        let provider_id = self.providers[idx].config.id;
        if let Err(err) = self.repo.mark_exhausted(&provider_id).await {
            tracing::error!(error = %err, %provider_id, "Failed to persist exhausted flag");
        }
    }
}
