//! Retry/backoff and circuit-breaker policy for outbound provider calls
//! (spec §5 "Cancellation and timeouts", §7 "Transient provider failure"),
//! generalized from the teacher's `claude::error_recovery`.

use crate::error::LlmError;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ErrorRecoveryConfig {
    pub max_retries: u32,
    pub circuit_breaker_failure_threshold: u32,
    pub circuit_breaker_timeout: Duration,
}

impl Default for ErrorRecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            circuit_breaker_failure_threshold: 5,
            circuit_breaker_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
enum CircuitState {
    Closed,
    Open { opened_at: DateTime<Utc> },
    HalfOpen,
}

/// Trips open after a run of consecutive failures and short-circuits further
/// calls to a failing provider (SPEC_FULL.md §B "provider rate limiting &
/// circuit breaking"). Tasks touching an open-circuit provider are marked
/// `SKIPPED` immediately rather than individually retried to exhaustion.
pub struct CircuitBreaker {
    config: ErrorRecoveryConfig,
    state: Arc<Mutex<CircuitState>>,
    consecutive_failures: Arc<Mutex<u32>>,
}

impl CircuitBreaker {
    pub fn new(config: ErrorRecoveryConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(CircuitState::Closed)),
            consecutive_failures: Arc::new(Mutex::new(0)),
        }
    }

    pub async fn can_proceed(&self) -> bool {
        let mut state = self.state.lock().await;
        match *state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open { opened_at } => {
                let elapsed = Utc::now().signed_duration_since(opened_at);
                if elapsed >= chrono::Duration::from_std(self.config.circuit_breaker_timeout).unwrap_or_default() {
                    *state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub async fn record_success(&self) {
        *self.consecutive_failures.lock().await = 0;
        *self.state.lock().await = CircuitState::Closed;
    }

    pub async fn record_failure(&self) {
        let mut failures = self.consecutive_failures.lock().await;
        *failures += 1;
        if *failures >= self.config.circuit_breaker_failure_threshold {
            *self.state.lock().await = CircuitState::Open { opened_at: Utc::now() };
        }
    }

    pub async fn is_open(&self) -> bool {
        matches!(*self.state.lock().await, CircuitState::Open { .. })
    }
}

/// Retry a fallible async operation with exponential backoff, stopping at
/// `max_retries` or on the breaker tripping (spec §7).
pub async fn execute_with_recovery<F, Fut, T>(
    config: &ErrorRecoveryConfig,
    breaker: &CircuitBreaker,
    provider_name: &str,
    mut operation: F,
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0;
    let mut last_error = None;

    while attempt < config.max_retries {
        if !breaker.can_proceed().await {
            return Err(LlmError::CircuitBreakerOpen(provider_name.to_string()));
        }

        match operation().await {
            Ok(value) => {
                breaker.record_success().await;
                return Ok(value);
            }
            Err(err) => {
                attempt += 1;
                breaker.record_failure().await;
                if !err.is_transient() {
                    return Err(err);
                }
                warn!(provider = provider_name, attempt, "retrying after transient LLM error: {err}");
                last_error = Some(err);
                if attempt < config.max_retries {
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or(LlmError::MaxRetriesExceeded))
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(200 * 2u64.pow(attempt.min(5)))
}
