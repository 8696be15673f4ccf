//! Code Summarizer: builds an incremental, monotonically-growing Mermaid
//! business-flow diagram of a project, choosing between a sequential
//! incremental fold and a parallel folder-grouped strategy depending on
//! project size.

pub mod diagram;
pub mod folder;
pub mod incremental;

use crate::config::EngineConfig;
use crate::error::LlmError;
use crate::llm::LLMProvider;
use crate::model::function::SourceFile;
use diagram::MonotoneDiagramSynthesizer;
use folder::{FolderSummarizer, FolderSummary};
use incremental::IncrementalSummarizer;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// The strategy a given project was summarized with, and the result.
pub enum SummaryOutcome {
    Incremental { diagram: String },
    Folder { folders: Vec<FolderSummary>, overview: String },
}

impl SummaryOutcome {
    /// The single diagram to use as downstream context: the overview for
    /// the folder strategy, the whole-project diagram for incremental.
    pub fn project_diagram(&self) -> &str {
        match self {
            SummaryOutcome::Incremental { diagram } => diagram,
            SummaryOutcome::Folder { overview, .. } => overview,
        }
    }
}

pub struct CodeSummarizer {
    llm: Arc<dyn LLMProvider>,
    model_id: String,
    config: EngineConfig,
    folder_concurrency: usize,
}

impl CodeSummarizer {
    pub fn new(llm: Arc<dyn LLMProvider>, model_id: impl Into<String>, config: EngineConfig, folder_concurrency: usize) -> Self {
        Self { llm, model_id: model_id.into(), config, folder_concurrency }
    }

    /// Pick a strategy per the configured thresholds and run it to
    /// completion (spec §4.E: "small projects are folded sequentially;
    /// larger ones are grouped by top-level folder and summarized in
    /// parallel, then linked by a final overview pass").
    pub async fn summarize(&self, files: &[SourceFile]) -> Result<SummaryOutcome, LlmError> {
        let synthesizer = MonotoneDiagramSynthesizer::new(self.llm.clone(), self.model_id.clone(), self.config.max_llm_retries);
        let top_level_folders: HashSet<Option<String>> = files.iter().map(|f| f.top_level_folder()).collect();

        let use_incremental = files.len() <= self.config.summarizer_max_files_for_incremental
            && top_level_folders.len() <= self.config.summarizer_max_top_level_folders_for_incremental;

        if use_incremental {
            info!(files = files.len(), "summarizing with incremental strategy");
            let summarizer = IncrementalSummarizer::new(
                &synthesizer,
                self.config.summarizer_reinforcement_rounds,
                self.config.summarizer_reinforcement_candidate_count,
            );
            let diagram = summarizer.summarize(files).await?;
            Ok(SummaryOutcome::Incremental { diagram })
        } else {
            info!(files = files.len(), folders = top_level_folders.len(), "summarizing with folder strategy");
            let summarizer = FolderSummarizer::new(
                &synthesizer,
                self.llm.clone(),
                self.model_id.clone(),
                self.config.summarizer_reinforcement_rounds,
                self.config.summarizer_reinforcement_candidate_count,
                self.folder_concurrency,
            );
            let (folders, overview) = summarizer.summarize(files).await?;
            Ok(SummaryOutcome::Folder { folders, overview })
        }
    }
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
    async fn small_project_uses_incremental_strategy() {
        let mut config = EngineConfig::default();
        config.summarizer_max_files_for_incremental = 10;
        config.summarizer_max_top_level_folders_for_incremental = 5;
        let summarizer = CodeSummarizer::new(Arc::new(EchoLlm), "model", config, 2);
        let files = vec![file("a.sol", "A")];
        let outcome = summarizer.summarize(&files).await.unwrap();
        assert!(matches!(outcome, SummaryOutcome::Incremental { .. }));
    }

    #[tokio::test]
    async fn large_project_uses_folder_strategy() {
        let mut config = EngineConfig::default();
        config.summarizer_max_files_for_incremental = 1;
        config.summarizer_max_top_level_folders_for_incremental = 1;
        let summarizer = CodeSummarizer::new(Arc::new(EchoLlm), "model", config, 2);
        let files = vec![file("contracts/A.sol", "A"), file("lib/B.sol", "B")];
        let outcome = summarizer.summarize(&files).await.unwrap();
        assert!(matches!(outcome, SummaryOutcome::Folder { .. }));
    }
}
