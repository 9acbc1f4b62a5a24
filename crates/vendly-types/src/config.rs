//! Engine configuration: every cap and deadline the core relies on.
//!
//! Loaded from `vendly.toml` by the infra layer, with serde defaults so a
//! partial (or missing) file still yields a working configuration.

use serde::{Deserialize, Serialize};

/// Tunable caps and deadlines for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Hard cap on concurrently managed transport accounts.
    #[serde(default = "default_max_accounts")]
    pub max_accounts: usize,

    /// Global cap on concurrent per-sender processing slots.
    #[serde(default = "default_max_processing_slots")]
    pub max_processing_slots: usize,

    /// Cap on tracked recipients in the outbound rate limiter.
    #[serde(default = "default_max_rate_entries")]
    pub max_rate_entries: usize,

    /// Recent-history window size for generation context.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Per-attempt generation deadline.
    #[serde(default = "default_generation_timeout_ms")]
    pub generation_timeout_ms: u64,

    /// Outbound transport send deadline.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Media download deadline.
    #[serde(default = "default_media_timeout_ms")]
    pub media_timeout_ms: u64,

    /// Absolute deadline for processing a single inbound message.
    #[serde(default = "default_processing_timeout_ms")]
    pub processing_timeout_ms: u64,

    /// Max retries against one provider for retryable errors.
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// Base backoff delay, doubled per retry.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Backoff cap.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Consecutive retryable failures before a circuit opens.
    #[serde(default = "default_circuit_failure_threshold")]
    pub circuit_failure_threshold: u32,

    /// Circuit cooldown before a half-open trial.
    #[serde(default = "default_circuit_open_ms")]
    pub circuit_open_ms: u64,

    /// Reconnect delay multiplier: wait `base * attempt_number`.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,

    /// Reconnect attempts before settling into DISCONNECTED.
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,

    /// Rolling window for the per-recipient send rate limit.
    #[serde(default = "default_rate_limit_window_ms")]
    pub rate_limit_window_ms: u64,

    /// Max sends per recipient within the rolling window.
    #[serde(default = "default_rate_limit_max_sends")]
    pub rate_limit_max_sends: usize,

    /// Grace period for in-flight work during shutdown.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_max_accounts() -> usize {
    20
}
fn default_max_processing_slots() -> usize {
    100
}
fn default_max_rate_entries() -> usize {
    1000
}
fn default_history_window() -> usize {
    20
}
fn default_generation_timeout_ms() -> u64 {
    30_000
}
fn default_send_timeout_ms() -> u64 {
    15_000
}
fn default_media_timeout_ms() -> u64 {
    20_000
}
fn default_processing_timeout_ms() -> u64 {
    120_000
}
fn default_retry_max_attempts() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    500
}
fn default_retry_max_delay_ms() -> u64 {
    8_000
}
fn default_circuit_failure_threshold() -> u32 {
    3
}
fn default_circuit_open_ms() -> u64 {
    60_000
}
fn default_reconnect_base_delay_ms() -> u64 {
    2_000
}
fn default_reconnect_max_attempts() -> u32 {
    5
}
fn default_rate_limit_window_ms() -> u64 {
    60_000
}
fn default_rate_limit_max_sends() -> usize {
    20
}
fn default_shutdown_grace_ms() -> u64 {
    10_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        // serde defaults are the single source of truth
        serde_json::from_str("{}").expect("empty config deserializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_accounts, 20);
        assert_eq!(config.max_processing_slots, 100);
        assert_eq!(config.retry_max_attempts, 3);
        assert_eq!(config.circuit_failure_threshold, 3);
        assert_eq!(config.reconnect_max_attempts, 5);
        assert_eq!(config.history_window, 20);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
max_accounts = 5
generation_timeout_ms = 10000
"#,
        )
        .unwrap();
        assert_eq!(config.max_accounts, 5);
        assert_eq!(config.generation_timeout_ms, 10_000);
        assert_eq!(config.rate_limit_max_sends, 20);
    }
}
