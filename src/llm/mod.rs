//! LLM and embedding provider abstraction (spec §6), plus the shared
//! reliability stack — rate limiting, retry/circuit-breaking, usage
//! accounting — that every concrete provider sits behind.

pub mod anthropic_provider;
pub mod error_recovery;
pub mod openai_provider;
pub mod provider;
pub mod rate_limiter;
pub mod types;
pub mod usage_tracker;

pub use anthropic_provider::AnthropicProvider;
pub use error_recovery::{CircuitBreaker, ErrorRecoveryConfig, execute_with_recovery};
pub use openai_provider::OpenAiProvider;
pub use provider::{EmbeddingProvider, LLMProvider};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use types::{CompletionRequest, CompletionResponse, JsonCompletionRequest, TokenUsage};
pub use usage_tracker::{CostTable, ModelUsage, UsageTracker};

use crate::error::LlmError;
use std::sync::Arc;

/// A provider wrapped with its own circuit breaker and usage accounting, so
/// callers get retry/backoff and cost tracking for free instead of
/// reimplementing it per call site (SPEC_FULL.md §B "usage accounting").
pub struct ManagedProvider {
    pub provider: Arc<dyn LLMProvider>,
    pub breaker: CircuitBreaker,
    pub recovery_config: ErrorRecoveryConfig,
    pub usage: Arc<UsageTracker>,
}

impl ManagedProvider {
    pub fn new(provider: Arc<dyn LLMProvider>, recovery_config: ErrorRecoveryConfig) -> Self {
        Self::with_usage_tracker(provider, recovery_config, Arc::new(UsageTracker::new(CostTable::default())))
    }

    pub fn with_usage_tracker(provider: Arc<dyn LLMProvider>, recovery_config: ErrorRecoveryConfig, usage: Arc<UsageTracker>) -> Self {
        Self {
            provider,
            breaker: CircuitBreaker::new(recovery_config.clone()),
            recovery_config,
            usage,
        }
    }

    pub async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let name = self.provider.provider_name();
        let response = execute_with_recovery(&self.recovery_config, &self.breaker, name, || {
            self.provider.complete(request.clone())
        })
        .await?;
        self.usage.record(&response.model_used, &response.token_usage).await;
        Ok(response)
    }

    pub async fn complete_json(&self, request: JsonCompletionRequest) -> Result<serde_json::Value, LlmError> {
        let name = self.provider.provider_name();
        let model_id = request.model_id.clone();
        let (value, usage) = execute_with_recovery(&self.recovery_config, &self.breaker, name, || {
            self.provider.complete_json_with_usage(request.clone())
        })
        .await?;
        self.usage.record(&model_id, &usage).await;
        Ok(value)
    }
}
