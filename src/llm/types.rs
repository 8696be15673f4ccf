//! Generic LLM request/response types shared by every provider (spec §6).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A free-text completion request — the `complete(prompt, model_id,
/// temperature)` capability of spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub id: Uuid,
    pub prompt: String,
    pub system_message: Option<String>,
    pub model_id: String,
    pub temperature: f32,
    pub max_tokens: Option<u64>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, model_id: impl Into<String>, temperature: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            system_message: None,
            model_id: model_id.into(),
            temperature,
            max_tokens: None,
        }
    }

    /// Canonical cache key fields (spec §3 "Prompt cache entry": key is a
    /// hash of (prompt text, model id, temperature class)).
    pub fn cache_fingerprint(&self) -> String {
        format!(
            "{}|{}|{}",
            self.prompt,
            self.model_id,
            temperature_class(self.temperature)
        )
    }
}

/// Temperature is bucketed into a small set of classes so that
/// floating-point jitter doesn't fragment the prompt cache.
fn temperature_class(t: f32) -> &'static str {
    if t < 0.15 {
        "deterministic"
    } else if t < 0.6 {
        "balanced"
    } else {
        "creative"
    }
}

/// A structured-extraction request — the `complete_json(prompt, schema,
/// model_id)` capability of spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonCompletionRequest {
    pub id: Uuid,
    pub prompt: String,
    pub schema: serde_json::Value,
    pub model_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub request_id: Uuid,
    pub content: String,
    pub model_used: String,
    pub token_usage: TokenUsage,
    pub provider_metadata: HashMap<String, serde_json::Value>,
}
