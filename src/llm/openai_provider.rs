//! HTTP-based OpenAI-compatible chat completion and embedding provider.
//!
//! Adapted from the teacher's `openai::` integration (a CLI wrapper around
//! the Codex tool); spec §6 only needs the two named capabilities
//! (`complete`/`complete_json`) plus embeddings, so this talks directly to
//! the Chat Completions and Embeddings HTTP endpoints.

use crate::error::LlmError;
use crate::llm::provider::{EmbeddingProvider, LLMProvider};
use crate::llm::rate_limiter::RateLimiter;
use crate::llm::types::{CompletionRequest, CompletionResponse, JsonCompletionRequest, TokenUsage};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    rate_limiter: RateLimiter,
    embedding_dimension: usize,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, rate_limiter: RateLimiter) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            rate_limiter,
            embedding_dimension: 1536,
        }
    }

    fn auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.bearer_auth(&self.api_key)
    }
}

#[async_trait]
impl LLMProvider for OpenAiProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let estimated = self.estimate_tokens(&request.prompt);
        self.rate_limiter.acquire(estimated).await?;

        let mut messages = Vec::new();
        if let Some(system) = &request.system_message {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": request.prompt}));

        let body = serde_json::json!({
            "model": request.model_id,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "messages": messages,
        });

        let response = self
            .auth(self.client.post(format!("{}/chat/completions", self.base_url)))
            .json(&body)
            .timeout(Duration::from_secs(120))
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            self.rate_limiter.record_failure().await;
            return Err(LlmError::RateLimit { message: "provider returned 429".to_string() });
        }
        if !response.status().is_success() {
            self.rate_limiter.record_failure().await;
            return Err(LlmError::ProviderUnavailable(format!("status {}", response.status())));
        }

        self.rate_limiter.record_success().await;
        let value: serde_json::Value = response.json().await.map_err(|e| LlmError::ParseFailure(e.to_string()))?;
        let content = value["choices"][0]["message"]["content"].as_str().unwrap_or_default().to_string();
        let input_tokens = value["usage"]["prompt_tokens"].as_u64().unwrap_or(0);
        let output_tokens = value["usage"]["completion_tokens"].as_u64().unwrap_or(0);

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
        "openai"
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed(&self, text: &str, model_id: &str) -> Result<Vec<f32>, LlmError> {
        let estimated = self.estimate_tokens(text);
        self.rate_limiter.acquire(estimated).await?;

        let body = serde_json::json!({ "model": model_id, "input": text });
        let response = self
            .auth(self.client.post(format!("{}/embeddings", self.base_url)))
            .json(&body)
            .timeout(Duration::from_secs(60))
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !response.status().is_success() {
            self.rate_limiter.record_failure().await;
            return Err(LlmError::ProviderUnavailable(format!("status {}", response.status())));
        }
        self.rate_limiter.record_success().await;

        let value: serde_json::Value = response.json().await.map_err(|e| LlmError::ParseFailure(e.to_string()))?;
        let vector = value["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| LlmError::ParseFailure("missing embedding array".to_string()))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }
}
