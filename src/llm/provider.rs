//! Provider-agnostic LLM and embedding contracts (spec §6).
//!
//! Generalized from the teacher's `llm::provider::LLMProvider` trait, which
//! abstracted over Claude/OpenAI CLI integrations; here the two capabilities
//! named by the spec — free-text completion and structured JSON extraction —
//! are split out explicitly, and an `EmbeddingProvider` contract is added
//! for the vector-index ingestion path (spec §4.B).

use crate::error::LlmError;
use crate::llm::types::{CompletionRequest, CompletionResponse, JsonCompletionRequest, TokenUsage};
use async_trait::async_trait;

#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    async fn complete_json(
        &self,
        request: JsonCompletionRequest,
    ) -> Result<serde_json::Value, LlmError>;

    /// Same extraction as [`Self::complete_json`], but also surfaces the
    /// token usage spent on the underlying completion, so `ManagedProvider`
    /// can record cost without re-issuing the call (SPEC_FULL.md §B "usage
    /// accounting"). Providers built on top of `complete` should override
    /// this with the real usage; the default zeroes it out.
    async fn complete_json_with_usage(
        &self,
        request: JsonCompletionRequest,
    ) -> Result<(serde_json::Value, TokenUsage), LlmError> {
        let value = self.complete_json(request).await?;
        Ok((value, TokenUsage::default()))
    }

    fn provider_name(&self) -> &'static str;

    /// Rough token estimate for pre-flight budget checks (spec §4.F, §4.E).
    fn estimate_tokens(&self, text: &str) -> u64 {
        (text.len() as f64 / 4.0).ceil() as u64
    }
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str, model_id: &str) -> Result<Vec<f32>, LlmError>;

    async fn embed_batch(&self, texts: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, LlmError> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.embed(t, model_id).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize;
}
