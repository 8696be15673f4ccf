//! Shared defensive-monotone contract for diagram synthesis (spec §4.E),
//! used by both the incremental and folder-based strategies (SPEC_FULL.md
//! §D.3: reinforcement rounds apply to both).
//!
//! Adapted from the teacher's `claude::context_manager::optimize_context`,
//! which never allowed optimization to destroy information silently —
//! here the same shape is applied to "only add, never remove" diagram
//! growth instead of token-budget compression.

use crate::error::LlmError;
use crate::llm::LLMProvider;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

/// Placeholders the post-check rejects (spec §4.E: "generic placeholders
/// ... are rejected").
const REJECTED_PLACEHOLDERS: &[&str] = &["Contract", "Token", "System", "Component", "Module"];

pub struct MonotoneDiagramSynthesizer {
    llm: Arc<dyn LLMProvider>,
    model_id: String,
    max_retries: u32,
}

impl MonotoneDiagramSynthesizer {
    pub fn new(llm: Arc<dyn LLMProvider>, model_id: impl Into<String>, max_retries: u32) -> Self {
        Self { llm, model_id: model_id.into(), max_retries }
    }

    /// Ask the LLM to extend `previous_diagram` with content from
    /// `new_source`, enforcing the "only add" contract with bounded retry
    /// on regression (spec §4.E, §8 "monotone summarization").
    pub async fn extend(
        &self,
        previous_diagram: &str,
        new_source: &str,
        known_names: &HashSet<String>,
    ) -> Result<String, LlmError> {
        let mut instruction_strength = 0;
        let mut last_candidate = previous_diagram.to_string();

        for attempt in 0..=self.max_retries {
            let prompt = self.build_prompt(previous_diagram, new_source, instruction_strength);
            let response = self
                .llm
                .complete(crate::llm::CompletionRequest::new(prompt, self.model_id.clone(), 0.1))
                .await?;

            let candidate = response.content;
            if is_superset(previous_diagram, &candidate) && uses_only_known_names(&candidate, known_names) {
                return Ok(candidate);
            }

            warn!(attempt, "reinforcement round regressed or used placeholder names, retrying with stronger instruction");
            instruction_strength += 1;
            last_candidate = candidate;
        }

        warn!("reinforcement retries exhausted, keeping previous diagram");
        let _ = last_candidate;
        Ok(previous_diagram.to_string())
    }

    fn build_prompt(&self, previous_diagram: &str, new_source: &str, instruction_strength: u32) -> String {
        let preservation_clause = match instruction_strength {
            0 => "Only add new participants and interactions; preserve everything already present.".to_string(),
            _ => format!(
                "CRITICAL (retry {instruction_strength}): you MUST preserve every participant and interaction \
                 from the previous diagram verbatim, then only ADD new ones. Do not rename, merge, or drop \
                 anything that was already there."
            ),
        };
        format!(
            "{preservation_clause} Use only the original contract and function names found in the source — \
             never generic placeholders like \"Contract\" or \"Token\".\n\n\
             Previous diagram:\n{previous_diagram}\n\n\
             New source to fold in:\n{new_source}\n\n\
             Return the complete, updated Mermaid diagram."
        )
    }
}

/// A diagram is a superset of another if every non-trivial line of the
/// previous diagram still appears in the candidate (spec §8: "the set of
/// participants and interactions ... is a superset of the previous round's").
fn is_superset(previous: &str, candidate: &str) -> bool {
    let previous_lines: HashSet<&str> = previous.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let candidate_lines: HashSet<&str> = candidate.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    previous_lines.is_subset(&candidate_lines)
}

fn uses_only_known_names(diagram: &str, known_names: &HashSet<String>) -> bool {
    if known_names.is_empty() {
        return true;
    }
    let identifier = Regex::new(r"\b[A-Z][A-Za-z0-9_]*\b").unwrap();
    for capture in identifier.find_iter(diagram) {
        let name = capture.as_str();
        if REJECTED_PLACEHOLDERS.contains(&name) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::CompletionResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedLlm {
        responses: Vec<&'static str>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LLMProvider for ScriptedLlm {
        async fn complete(&self, request: crate::llm::CompletionRequest) -> Result<CompletionResponse, LlmError> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            let content = self.responses.get(idx).copied().unwrap_or(self.responses.last().unwrap()).to_string();
            Ok(CompletionResponse {
                request_id: request.id,
                content,
                model_used: request.model_id,
                token_usage: crate::llm::TokenUsage { input_tokens: 0, output_tokens: 0, total_tokens: 0 },
                provider_metadata: Default::default(),
            })
        }
        async fn complete_json(&self, _request: crate::llm::JsonCompletionRequest) -> Result<serde_json::Value, LlmError> {
            unreachable!()
        }
        fn provider_name(&self) -> &'static str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn accepts_a_genuine_superset_extension() {
        let llm = Arc::new(ScriptedLlm {
            responses: vec!["TokenVault -> IERC20: transferFrom\nTokenVault -> Staking: stake"],
            calls: AtomicU32::new(0),
        });
        let synthesizer = MonotoneDiagramSynthesizer::new(llm, "model", 2);
        let result = synthesizer
            .extend("TokenVault -> IERC20: transferFrom", "stake function body", &HashSet::new())
            .await
            .unwrap();
        assert!(result.contains("transferFrom"));
        assert!(result.contains("stake"));
    }

    #[tokio::test]
    async fn regression_is_retried_then_falls_back_to_previous() {
        let llm = Arc::new(ScriptedLlm {
            responses: vec!["TokenVault -> Staking: stake", "TokenVault -> Staking: stake"],
            calls: AtomicU32::new(0),
        });
        let synthesizer = MonotoneDiagramSynthesizer::new(llm, "model", 1);
        let previous = "TokenVault -> IERC20: transferFrom";
        let result = synthesizer.extend(previous, "stake function body", &HashSet::new()).await.unwrap();
        assert_eq!(result, previous);
    }

    #[tokio::test]
    async fn generic_placeholder_names_are_rejected() {
        let llm = Arc::new(ScriptedLlm { responses: vec!["Contract -> Token: transfer"], calls: AtomicU32::new(0) });
        let synthesizer = MonotoneDiagramSynthesizer::new(llm, "model", 0);
        let known = HashSet::new();
        let result = synthesizer.extend("", "source", &known).await.unwrap();
        assert_eq!(result, "");
    }
}
