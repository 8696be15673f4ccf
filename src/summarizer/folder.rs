//! Folder-strategy summarization: used once the project exceeds the
//! incremental thresholds (too many files, or too many top-level folders).
//! Each top-level folder is summarized independently with bounded
//! concurrency, then a final LLM call links the per-folder diagrams into a
//! single project-wide overview.
//!
//! Adapted from the teacher's bounded worker-pool fan-out pattern
//! (`futures::stream::buffer_unordered`, also used in
//! `vector::embedding_store`) combined with the monotone contract shared
//! with the incremental strategy.

use crate::error::LlmError;
use crate::llm::LLMProvider;
use crate::model::function::SourceFile;
use crate::summarizer::diagram::MonotoneDiagramSynthesizer;
use crate::summarizer::incremental::IncrementalSummarizer;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

pub struct FolderSummarizer<'a> {
    synthesizer: &'a MonotoneDiagramSynthesizer,
    overview_llm: Arc<dyn LLMProvider>,
    overview_model_id: String,
    reinforcement_rounds: u32,
    reinforcement_candidate_count: usize,
    folder_concurrency: usize,
}

/// One folder's independently-derived diagram.
#[derive(Debug, Clone)]
pub struct FolderSummary {
    pub folder: String,
    pub diagram: String,
}

impl<'a> FolderSummarizer<'a> {
    pub fn new(
        synthesizer: &'a MonotoneDiagramSynthesizer,
        overview_llm: Arc<dyn LLMProvider>,
        overview_model_id: impl Into<String>,
        reinforcement_rounds: u32,
        reinforcement_candidate_count: usize,
        folder_concurrency: usize,
    ) -> Self {
        Self {
            synthesizer,
            overview_llm,
            overview_model_id: overview_model_id.into(),
            reinforcement_rounds,
            reinforcement_candidate_count,
            folder_concurrency,
        }
    }

    /// Group files by top-level folder, fold each group independently
    /// (bounded concurrency), then synthesize a global overview linking
    /// the per-folder diagrams.
    pub async fn summarize(&self, files: &[SourceFile]) -> Result<(Vec<FolderSummary>, String), LlmError> {
        let groups = group_by_top_level_folder(files);
        info!(folders = groups.len(), "grouped files for folder-strategy summarization");

        let inner = IncrementalSummarizer::new(self.synthesizer, self.reinforcement_rounds, self.reinforcement_candidate_count);

        let summaries: Vec<Option<FolderSummary>> = stream::iter(groups.into_iter())
            .map(|(folder, folder_files)| {
                let inner = &inner;
                async move {
                    match inner.summarize(&folder_files).await {
                        Ok(diagram) => Some(FolderSummary { folder, diagram }),
                        Err(err) => {
                            tracing::warn!(folder, "folder summarization failed: {err}");
                            None
                        }
                    }
                }
            })
            .buffer_unordered(self.folder_concurrency)
            .collect()
            .await;

        let mut summaries: Vec<FolderSummary> = summaries.into_iter().flatten().collect();
        summaries.sort_by(|a, b| a.folder.cmp(&b.folder));

        let overview = self.synthesize_overview(&summaries).await?;
        Ok((summaries, overview))
    }

    async fn synthesize_overview(&self, summaries: &[FolderSummary]) -> Result<String, LlmError> {
        let joined = summaries
            .iter()
            .map(|s| format!("## {}\n{}", s.folder, s.diagram))
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = format!(
            "The following are independently derived Mermaid diagrams, one per top-level folder of a smart \
             contract project. Produce a single project-wide overview diagram that links them, preserving every \
             participant and interaction from each. Use only the original contract and function names found in \
             the diagrams below — never generic placeholders like \"Contract\" or \"Token\".\n\n{joined}"
        );
        let request = crate::llm::CompletionRequest::new(prompt, self.overview_model_id.clone(), 0.1);
        let response = self.overview_llm.complete(request).await?;
        Ok(response.content)
    }
}

fn group_by_top_level_folder(files: &[SourceFile]) -> BTreeMap<String, Vec<SourceFile>> {
    let mut groups: BTreeMap<String, Vec<SourceFile>> = BTreeMap::new();
    for file in files {
        let key = file.top_level_folder().unwrap_or_else(|| "<root>".to_string());
        groups.entry(key).or_default().push(file.clone());
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionRequest, CompletionResponse, TokenUsage};
    use async_trait::async_trait;

    struct EchoLlm;

    #[async_trait]
    impl LLMProvider for EchoLlm {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                request_id: request.id,
                content: request.prompt,
                model_used: request.model_id,
                token_usage: TokenUsage { input_tokens: 0, output_tokens: 0, total_tokens: 0 },
                provider_metadata: Default::default(),
            })
        }
        async fn complete_json(&self, _request: crate::llm::JsonCompletionRequest) -> Result<serde_json::Value, LlmError> {
            unreachable!()
        }
        fn provider_name(&self) -> &'static str {
            "echo"
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
    async fn groups_files_by_top_level_folder() {
        let files = vec![
            file("contracts/A.sol", "A"),
            file("contracts/B.sol", "B"),
            file("test/AT.sol", "AT"),
        ];
        let groups = group_by_top_level_folder(&files);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["contracts"].len(), 2);
        assert_eq!(groups["test"].len(), 1);
    }

    #[tokio::test]
    async fn produces_one_summary_per_folder_plus_overview() {
        let llm: Arc<dyn LLMProvider> = Arc::new(EchoLlm);
        let synthesizer = MonotoneDiagramSynthesizer::new(llm.clone(), "model", 0);
        let summarizer = FolderSummarizer::new(&synthesizer, llm, "model", 0, 0, 4);

        let files = vec![file("contracts/A.sol", "A"), file("lib/B.sol", "B")];
        let (summaries, overview) = summarizer.summarize(&files).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert!(!overview.is_empty());
    }
}
