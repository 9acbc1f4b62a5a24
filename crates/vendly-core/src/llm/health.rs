//! Provider health tracking for the dispatcher.
//!
//! Implements a circuit breaker per provider. Only *retryable* failures
//! (network, timeout, 5xx) count toward opening the circuit; auth/validation
//! failures and quota exhaustion are not signals of backend unhealthiness
//! and never move the state machine.

use std::time::{Duration, Instant};

use vendly_types::llm::{ErrorClass, LlmError};

/// Circuit breaker state for a provider.
#[derive(Debug, Clone)]
pub enum CircuitState {
    /// Normal operation. Tracks consecutive retryable failures toward threshold.
    Closed { consecutive_failures: u32 },
    /// Provider is disabled. Will probe after `wait_duration` elapses.
    Open {
        opened_at: Instant,
        wait_duration: Duration,
    },
    /// Probing: one request allowed to test if the provider recovered.
    HalfOpen,
}

/// Health tracking for a single generation provider.
#[derive(Debug)]
pub struct ProviderHealth {
    /// Current circuit breaker state.
    pub state: CircuitState,
    /// Last error message from this provider.
    pub last_error: Option<String>,
    /// Total calls routed to this provider.
    pub total_calls: u64,
    /// Total failed calls.
    pub total_failures: u64,
    /// Consecutive retryable failures before opening the circuit.
    pub failure_threshold: u32,
    /// How long to wait in Open state before probing.
    pub open_duration: Duration,
}

impl ProviderHealth {
    /// Create a new health tracker. Created lazily on first dispatcher use.
    pub fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        Self {
            state: CircuitState::Closed {
                consecutive_failures: 0,
            },
            last_error: None,
            total_calls: 0,
            total_failures: 0,
            failure_threshold,
            open_duration,
        }
    }

    /// Check whether this provider's circuit admits a call.
    ///
    /// Handles the Open -> HalfOpen transition once the cooldown deadline
    /// has passed; in HalfOpen exactly one trial is admitted before the
    /// next state decision.
    pub fn is_available(&mut self) -> bool {
        match &self.state {
            CircuitState::Closed { .. } => true,
            CircuitState::Open {
                opened_at,
                wait_duration,
            } => {
                if opened_at.elapsed() >= *wait_duration {
                    self.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    /// Record a successful call. A success in any state fully resets the breaker.
    pub fn record_success(&mut self) {
        self.total_calls += 1;
        self.state = CircuitState::Closed {
            consecutive_failures: 0,
        };
        self.last_error = None;
    }

    /// Record a failed call.
    ///
    /// Only `ErrorClass::Retryable` failures advance the state machine.
    /// Non-retryable and quota failures are recorded in the stats and
    /// `last_error` but leave the circuit untouched.
    pub fn record_failure(&mut self, error: &LlmError) {
        self.total_calls += 1;
        self.total_failures += 1;
        self.last_error = Some(error.to_string());

        if error.class() != ErrorClass::Retryable {
            return;
        }

        match &self.state {
            CircuitState::Closed {
                consecutive_failures,
            } => {
                let new_count = consecutive_failures + 1;
                if new_count >= self.failure_threshold {
                    self.state = CircuitState::Open {
                        opened_at: Instant::now(),
                        wait_duration: self.open_duration,
                    };
                } else {
                    self.state = CircuitState::Closed {
                        consecutive_failures: new_count,
                    };
                }
            }
            CircuitState::HalfOpen => {
                // Probe failed, reopen with a fresh cooldown
                self.state = CircuitState::Open {
                    opened_at: Instant::now(),
                    wait_duration: self.open_duration,
                };
            }
            CircuitState::Open { .. } => {
                // Already open, no state change
            }
        }
    }

    /// The circuit state as a display string ("closed"/"open"/"half_open").
    pub fn state_label(&self) -> &'static str {
        match &self.state {
            CircuitState::Closed { .. } => "closed",
            CircuitState::Open { .. } => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health() -> ProviderHealth {
        ProviderHealth::new(3, Duration::from_secs(30))
    }

    fn retryable() -> LlmError {
        LlmError::Provider {
            message: "500 internal".to_string(),
        }
    }

    #[test]
    fn test_available_when_closed() {
        let mut h = health();
        assert!(h.is_available());
        assert_eq!(h.state_label(), "closed");
    }

    #[test]
    fn test_circuit_opens_after_threshold_retryable_failures() {
        let mut h = health();

        h.record_failure(&retryable());
        h.record_failure(&retryable());
        assert!(h.is_available()); // 2 failures, threshold is 3

        h.record_failure(&retryable());
        assert!(!h.is_available()); // 3 failures, circuit opens
        assert_eq!(h.state_label(), "open");
    }

    #[test]
    fn test_non_retryable_never_opens_circuit() {
        let mut h = health();
        for _ in 0..10 {
            h.record_failure(&LlmError::AuthenticationFailed);
        }
        assert!(h.is_available());
        assert!(matches!(
            h.state,
            CircuitState::Closed {
                consecutive_failures: 0
            }
        ));
        assert_eq!(h.total_failures, 10);
    }

    #[test]
    fn test_quota_failure_never_opens_circuit() {
        let mut h = health();
        for _ in 0..10 {
            h.record_failure(&LlmError::RateLimited {
                retry_after_ms: None,
            });
        }
        assert!(h.is_available());
        assert_eq!(h.state_label(), "closed");
    }

    #[test]
    fn test_success_resets_failure_count() {
        let mut h = health();
        h.record_failure(&retryable());
        h.record_failure(&retryable());
        h.record_success();

        assert!(matches!(
            h.state,
            CircuitState::Closed {
                consecutive_failures: 0
            }
        ));
        assert!(h.last_error.is_none());
    }

    #[test]
    fn test_open_transitions_to_half_open_after_cooldown() {
        let mut h = ProviderHealth::new(1, Duration::from_millis(0));
        h.record_failure(&retryable());
        assert!(matches!(h.state, CircuitState::Open { .. }));

        // Cooldown of zero: next availability check flips to HalfOpen
        assert!(h.is_available());
        assert_eq!(h.state_label(), "half_open");
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let mut h = ProviderHealth::new(1, Duration::from_millis(0));
        h.record_failure(&retryable());
        assert!(h.is_available()); // now HalfOpen

        h.record_failure(&retryable());
        assert!(matches!(h.state, CircuitState::Open { .. }));
    }

    #[test]
    fn test_half_open_success_closes() {
        let mut h = ProviderHealth::new(1, Duration::from_millis(0));
        h.record_failure(&retryable());
        assert!(h.is_available()); // HalfOpen

        h.record_success();
        assert_eq!(h.state_label(), "closed");
    }
}
