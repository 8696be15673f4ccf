//! Token-bucket rate limiting shared by every outbound LLM/embedding call
//! (SPEC_FULL.md §B), generalized from the teacher's `claude::rate_limiter`.

use crate::error::LlmError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests_per_minute: u64,
    pub max_tokens_per_minute: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_delay: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: 60,
            max_tokens_per_minute: 200_000,
            backoff_multiplier: 2.0,
            max_backoff_delay: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Arc<Mutex<RateLimiterState>>,
}

#[derive(Debug)]
struct RateLimiterState {
    available_tokens: u64,
    available_requests: u64,
    window_started_at: DateTime<Utc>,
    failure_count: u32,
    last_failure: Option<DateTime<Utc>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let now = Utc::now();
        Self {
            state: Arc::new(Mutex::new(RateLimiterState {
                available_tokens: config.max_tokens_per_minute,
                available_requests: config.max_requests_per_minute,
                window_started_at: now,
                failure_count: 0,
                last_failure: None,
            })),
            config,
        }
    }

    /// Wait out any adaptive backoff, refill the window if expired, then
    /// reserve `estimated_tokens` and one request slot.
    pub async fn acquire(&self, estimated_tokens: u64) -> Result<(), LlmError> {
        if let Some(delay) = self.backoff_delay().await {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().await;
        self.refill(&mut state);

        if state.available_requests == 0 {
            return Err(LlmError::RateLimit {
                message: "request rate limit exceeded".to_string(),
            });
        }
        if state.available_tokens < estimated_tokens {
            return Err(LlmError::RateLimit {
                message: format!(
                    "token rate limit exceeded: need {estimated_tokens}, have {}",
                    state.available_tokens
                ),
            });
        }

        state.available_requests -= 1;
        state.available_tokens -= estimated_tokens;
        Ok(())
    }

    pub async fn record_success(&self) {
        let mut state = self.state.lock().await;
        state.failure_count = 0;
        state.last_failure = None;
    }

    pub async fn record_failure(&self) {
        let mut state = self.state.lock().await;
        state.failure_count += 1;
        state.last_failure = Some(Utc::now());
    }

    fn refill(&self, state: &mut RateLimiterState) {
        let elapsed = Utc::now().signed_duration_since(state.window_started_at);
        if elapsed >= chrono::Duration::seconds(60) {
            state.available_tokens = self.config.max_tokens_per_minute;
            state.available_requests = self.config.max_requests_per_minute;
            state.window_started_at = Utc::now();
        }
    }

    async fn backoff_delay(&self) -> Option<Duration> {
        let state = self.state.lock().await;
        if state.failure_count == 0 {
            return None;
        }
        if let Some(last) = state.last_failure
            && Utc::now().signed_duration_since(last) > chrono::Duration::seconds(300)
        {
            return None;
        }
        let multiplier = self.config.backoff_multiplier.powi(state.failure_count.min(5) as i32);
        let base = Duration::from_millis(200);
        let delay = Duration::from_millis((base.as_millis() as f64 * multiplier) as u64);
        let jitter = 1.0 + (rand::random::<f64>() - 0.5) * 0.2;
        Some(Duration::from_millis((delay.as_millis() as f64 * jitter) as u64).min(self.config.max_backoff_delay))
    }
}
