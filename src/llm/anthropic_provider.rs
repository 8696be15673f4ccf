//! HTTP-based Anthropic Messages API provider.
//!
//! Adapted from the teacher's `llm::claude_provider::ClaudeProvider`: the
//! teacher shelled out to a local `claude` CLI, but spec §1 treats the LLM
//! transport as an external collaborator with a named contract, so this
//! provider talks to the HTTP API directly via `reqwest`, matching how the
//! teacher's Cargo.toml already carries `reqwest` for outbound calls.

use crate::error::LlmError;
use crate::llm::provider::LLMProvider;
use crate::llm::rate_limiter::RateLimiter;
use crate::llm::types::{CompletionRequest, CompletionResponse, JsonCompletionRequest, TokenUsage};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    rate_limiter: RateLimiter,
    request_timeout: Duration,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>, rate_limiter: RateLimiter) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.anthropic.com/v1/messages".to_string(),
            rate_limiter,
            request_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn send(&self, body: serde_json::Value, estimated_tokens: u64) -> Result<serde_json::Value, LlmError> {
        self.rate_limiter.acquire(estimated_tokens).await?;

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Network(format!("request timed out: {e}"))
                } else {
                    LlmError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            self.rate_limiter.record_failure().await;
            return Err(LlmError::RateLimit { message: "provider returned 429".to_string() });
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(LlmError::Authentication("invalid API key".to_string()));
        }
        if status.is_server_error() {
            self.rate_limiter.record_failure().await;
            return Err(LlmError::ProviderUnavailable(format!("server error: {status}")));
        }
        if !status.is_success() {
            return Err(LlmError::InvalidRequest(format!("unexpected status: {status}")));
        }

        self.rate_limiter.record_success().await;
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| LlmError::ParseFailure(e.to_string()))
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let estimated = self.estimate_tokens(&request.prompt);
        let body = serde_json::json!({
            "model": request.model_id,
            "max_tokens": request.max_tokens.unwrap_or(4096),
            "temperature": request.temperature,
            "system": request.system_message,
            "messages": [{"role": "user", "content": request.prompt}],
        });

        let value = self.send(body, estimated).await?;
        let content = value["content"][0]["text"].as_str().unwrap_or_default().to_string();
        let input_tokens = value["usage"]["input_tokens"].as_u64().unwrap_or(0);
        let output_tokens = value["usage"]["output_tokens"].as_u64().unwrap_or(0);

        Ok(CompletionResponse {
            request_id: request.id,
            content,
            model_used: request.model_id,
            token_usage: TokenUsage {
                input_tokens,
                output_tokens,
                total_tokens: input_tokens + output_tokens,
            },
            provider_metadata: HashMap::new(),
        })
    }

    async fn complete_json(&self, request: JsonCompletionRequest) -> Result<serde_json::Value, LlmError> {
        self.complete_json_with_usage(request).await.map(|(value, _)| value)
    }

    async fn complete_json_with_usage(&self, request: JsonCompletionRequest) -> Result<(serde_json::Value, TokenUsage), LlmError> {
        let instructed_prompt = format!(
            "{}\n\nRespond with JSON only, matching this schema:\n{}",
            request.prompt, request.schema
        );
        let completion = self
            .complete(CompletionRequest::new(instructed_prompt, request.model_id, 0.0))
            .await?;

        let value = serde_json::from_str(&completion.content)
            .map_err(|e| LlmError::ParseFailure(format!("response was not valid JSON: {e}")))?;
        Ok((value, completion.token_usage))
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }
}
