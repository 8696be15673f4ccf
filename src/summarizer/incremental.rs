//! Incremental whole-project summarization: a monotone fold over files in
//! stable path order, used when the project is small enough that a single
//! sequential diagram-growth pass is affordable.
//!
//! Adapted from the teacher's `claude::context_manager` monotone
//! optimization loop, threaded here through
//! [`MonotoneDiagramSynthesizer`](super::diagram::MonotoneDiagramSynthesizer)
//! instead of token-budget compression.

use crate::error::LlmError;
use crate::model::function::SourceFile;
use crate::summarizer::diagram::MonotoneDiagramSynthesizer;
use std::collections::HashSet;
use tracing::info;

pub struct IncrementalSummarizer<'a> {
    synthesizer: &'a MonotoneDiagramSynthesizer,
    reinforcement_rounds: u32,
    reinforcement_candidate_count: usize,
}

/// Per-file confidence used to pick reinforcement candidates: the round in
/// which the file was last folded in, earlier rounds read as lower
/// confidence once later files have since been added.
#[derive(Debug, Clone)]
struct FileConfidence {
    relative_path: String,
    content: String,
    folded_at_round: usize,
}

impl<'a> IncrementalSummarizer<'a> {
    pub fn new(
        synthesizer: &'a MonotoneDiagramSynthesizer,
        reinforcement_rounds: u32,
        reinforcement_candidate_count: usize,
    ) -> Self {
        Self { synthesizer, reinforcement_rounds, reinforcement_candidate_count }
    }

    /// Fold `files` into a single diagram, one file at a time, in path
    /// order, then run the configured number of reinforcement rounds over
    /// the lowest-confidence files.
    pub async fn summarize(&self, files: &[SourceFile]) -> Result<String, LlmError> {
        let mut ordered: Vec<&SourceFile> = files.iter().collect();
        ordered.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        let known_names = collect_known_names(&ordered);
        let mut diagram = String::new();
        let mut confidences = Vec::with_capacity(ordered.len());

        for (round, file) in ordered.iter().enumerate() {
            diagram = self.synthesizer.extend(&diagram, &file.content, &known_names).await?;
            confidences.push(FileConfidence {
                relative_path: file.relative_path.clone(),
                content: file.content.clone(),
                folded_at_round: round,
            });
        }
        info!(files = ordered.len(), "initial incremental fold complete");

        for round in 0..self.reinforcement_rounds {
            let candidates = self.lowest_confidence(&confidences);
            for candidate in &candidates {
                diagram = self.synthesizer.extend(&diagram, &candidate.content, &known_names).await?;
            }
            if let Some(last) = confidences.last() {
                let current_round = last.folded_at_round + 1;
                for candidate_path in candidates.iter().map(|c| &c.relative_path) {
                    if let Some(entry) = confidences.iter_mut().find(|c| &c.relative_path == candidate_path) {
                        entry.folded_at_round = current_round;
                    }
                }
            }
            info!(round, candidates = candidates.len(), "reinforcement round complete");
        }

        Ok(diagram)
    }

    /// The files least recently folded in are the lowest-confidence
    /// candidates for reinforcement (spec §4.E reinforcement phase).
    fn lowest_confidence(&self, confidences: &[FileConfidence]) -> Vec<FileConfidence> {
        let mut sorted = confidences.to_vec();
        sorted.sort_by_key(|c| c.folded_at_round);
        sorted.into_iter().take(self.reinforcement_candidate_count).collect()
    }
}

fn collect_known_names(files: &[&SourceFile]) -> HashSet<String> {
    files
        .iter()
        .filter_map(|f| {
            std::path::Path::new(&f.relative_path)
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionRequest, CompletionResponse, LLMProvider, TokenUsage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Echoes the previous diagram plus the new source as an additional
    /// line, genuinely honoring the monotone-superset contract.
    struct GrowingLlm {
        calls: AtomicU32,
    }

    #[async_trait]
    impl LLMProvider for GrowingLlm {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let previous = request
                .prompt
                .split("Previous diagram:\n")
                .nth(1)
                .and_then(|s| s.split("\n\nNew source to fold in:\n").next())
                .unwrap_or_default();
            let new_source = request
                .prompt
                .split("New source to fold in:\n")
                .nth(1)
                .and_then(|s| s.split("\n\nReturn the complete").next())
                .unwrap_or_default();
            let content = if previous.is_empty() {
                new_source.to_string()
            } else {
                format!("{previous}\n{new_source}")
            };
            Ok(CompletionResponse {
                request_id: request.id,
                content,
                model_used: request.model_id,
                token_usage: TokenUsage { input_tokens: 0, output_tokens: 0, total_tokens: 0 },
                provider_metadata: Default::default(),
            })
        }
        async fn complete_json(&self, _request: crate::llm::JsonCompletionRequest) -> Result<serde_json::Value, LlmError> {
            unreachable!()
        }
        fn provider_name(&self) -> &'static str {
            "growing"
        }
    }

    fn file(path: &str, content: &str) -> SourceFile {
        SourceFile {
            relative_path: path.to_string(),
            absolute_path: format!("/{path}"),
            content: content.to_string(),
            byte_len: content.len() as u64,
            function_ids: Vec::new(),
            extension: "sol".to_string(),
            description: None,
        }
    }

    #[tokio::test]
    async fn folds_files_in_stable_path_order() {
        let llm: Arc<dyn LLMProvider> = Arc::new(GrowingLlm { calls: AtomicU32::new(0) });
        let synthesizer = MonotoneDiagramSynthesizer::new(llm, "model", 0);
        let summarizer = IncrementalSummarizer::new(&synthesizer, 0, 0);

        let files = vec![file("b.sol", "B"), file("a.sol", "A")];
        let result = summarizer.summarize(&files).await.unwrap();
        assert_eq!(result, "A\nB");
    }

    #[tokio::test]
    async fn reinforcement_rounds_revisit_earliest_files() {
        let llm: Arc<dyn LLMProvider> = Arc::new(GrowingLlm { calls: AtomicU32::new(0) });
        let synthesizer = MonotoneDiagramSynthesizer::new(llm, "model", 0);
        let summarizer = IncrementalSummarizer::new(&synthesizer, 1, 1);

        let files = vec![file("a.sol", "A"), file("b.sol", "B"), file("c.sol", "C")];
        let result = summarizer.summarize(&files).await.unwrap();
        assert_eq!(result, "A\nB\nC\nA");
    }
}
