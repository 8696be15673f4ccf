//! Embedding ingestion for the function and file tables (spec §4.B).
//!
//! Generalized from the teacher's row-count invariant checking in
//! `session::persistence` (checksum/coherence validation on load) applied
//! here to "does the vector table match the source table" rather than "does
//! the session blob match its checksum".

use crate::error::{LlmError, VectorIndexError};
use crate::llm::EmbeddingProvider;
use crate::model::function::{Function, SourceFile};
use crate::vector::index::{VectorIndex, VectorRow};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

pub const FUNCTION_TABLE: &str = "functions";
pub const FILE_TABLE: &str = "files";

pub const CONTENT_EMBEDDING: &str = "content_embedding";
pub const NAME_EMBEDDING: &str = "name_embedding";
pub const NATURAL_EMBEDDING: &str = "natural_embedding";

/// Bounded worker-pool fan-out over embedding calls (spec §4.B: "recommended
/// 2-4 workers; embedding and description LLM calls dominate latency").
pub struct EmbeddingStore {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    model_id: String,
    dimension: usize,
    ingestion_concurrency: usize,
}

impl EmbeddingStore {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        model_id: impl Into<String>,
        dimension: usize,
        ingestion_concurrency: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            model_id: model_id.into(),
            dimension,
            ingestion_concurrency: ingestion_concurrency.max(1),
        }
    }

    /// Rebuild policy (spec §4.B): if the table exists but its row count
    /// differs from the source count, both tables are rebuilt. Partial
    /// upserts are forbidden.
    pub async fn ensure_function_table(&self, functions: &[Function]) -> Result<bool, VectorIndexError> {
        let needs_rebuild = match self.index.count(FUNCTION_TABLE).await {
            Ok(count) => count != functions.len(),
            Err(_) => true,
        };
        if needs_rebuild {
            warn!(table = FUNCTION_TABLE, "row count mismatch or table absent, rebuilding");
            let _ = self.index.drop_table(FUNCTION_TABLE).await;
            self.index.create_table(FUNCTION_TABLE, self.dimension).await?;
        }
        Ok(needs_rebuild)
    }

    pub async fn ensure_file_table(&self, files: &[SourceFile]) -> Result<bool, VectorIndexError> {
        let needs_rebuild = match self.index.count(FILE_TABLE).await {
            Ok(count) => count != files.len(),
            Err(_) => true,
        };
        if needs_rebuild {
            warn!(table = FILE_TABLE, "row count mismatch or table absent, rebuilding");
            let _ = self.index.drop_table(FILE_TABLE).await;
            self.index.create_table(FILE_TABLE, self.dimension).await?;
        }
        Ok(needs_rebuild)
    }

    /// Embed and upsert every function's three vector columns (content,
    /// name, natural-description), honoring the rebuild policy.
    pub async fn upsert_functions(&self, functions: Vec<Function>) -> Result<(), VectorIndexError> {
        self.ensure_function_table(&functions).await?;

        let results: Vec<Result<(Function, Vec<f32>, Vec<f32>, Vec<f32>), LlmError>> =
            stream::iter(functions.into_iter())
                .map(|function| {
                    let embedder = self.embedder.clone();
                    let model_id = self.model_id.clone();
                    async move {
                        let content = embedder.embed(&function.content, &model_id).await?;
                        let name = embedder.embed(&function.qualified_name(), &model_id).await?;
                        let natural = embedder
                            .embed(function.description.as_deref().unwrap_or(&function.name), &model_id)
                            .await?;
                        Ok((function, content, name, natural))
                    }
                })
                .buffer_unordered(self.ingestion_concurrency)
                .collect()
                .await;

        let mut content_rows = Vec::new();
        let mut name_rows = Vec::new();
        let mut natural_rows = Vec::new();
        for result in results {
            match result {
                Ok((function, content, name, natural)) => {
                    let payload = serde_json::json!({ "function_id": function.id });
                    content_rows.push(VectorRow { id: function.id.clone(), vector: content, payload: payload.clone() });
                    name_rows.push(VectorRow { id: function.id.clone(), vector: name, payload: payload.clone() });
                    natural_rows.push(VectorRow { id: function.id.clone(), vector: natural, payload });
                }
                Err(err) => {
                    warn!("embedding generation failed for a function, dropping row: {err}");
                }
            }
        }

        self.index.upsert(FUNCTION_TABLE, CONTENT_EMBEDDING, content_rows).await?;
        self.index.upsert(FUNCTION_TABLE, NAME_EMBEDDING, name_rows).await?;
        self.index.upsert(FUNCTION_TABLE, NATURAL_EMBEDDING, natural_rows).await?;
        info!("function embeddings ingested");
        Ok(())
    }

    pub async fn upsert_files(&self, files: Vec<SourceFile>) -> Result<(), VectorIndexError> {
        self.ensure_file_table(&files).await?;

        let results: Vec<Result<(SourceFile, Vec<f32>, Vec<f32>), LlmError>> = stream::iter(files.into_iter())
            .map(|file| {
                let embedder = self.embedder.clone();
                let model_id = self.model_id.clone();
                async move {
                    let content = embedder.embed(&file.content, &model_id).await?;
                    let natural = embedder.embed(file.description.as_deref().unwrap_or(&file.relative_path), &model_id).await?;
                    Ok((file, content, natural))
                }
            })
            .buffer_unordered(self.ingestion_concurrency)
            .collect()
            .await;

        let mut content_rows = Vec::new();
        let mut natural_rows = Vec::new();
        for result in results {
            match result {
                Ok((file, content, natural)) => {
                    let payload = serde_json::json!({ "relative_path": file.relative_path });
                    content_rows.push(VectorRow { id: file.relative_path.clone(), vector: content, payload: payload.clone() });
                    natural_rows.push(VectorRow { id: file.relative_path.clone(), vector: natural, payload });
                }
                Err(err) => {
                    warn!("embedding generation failed for a file, dropping row: {err}");
                }
            }
        }

        self.index.upsert(FILE_TABLE, CONTENT_EMBEDDING, content_rows).await?;
        self.index.upsert(FILE_TABLE, NATURAL_EMBEDDING, natural_rows).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::index::InMemoryVectorIndex;
    use async_trait::async_trait;

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        async fn embed(&self, text: &str, _model_id: &str) -> Result<Vec<f32>, LlmError> {
            Ok(vec![text.len() as f32, 0.0, 0.0])
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    fn function(id: &str) -> Function {
        Function {
            id: id.to_string(),
            name: "deposit".to_string(),
            content: "function deposit() {}".to_string(),
            start_line: 1,
            end_line: 1,
            relative_file_path: "Vault.sol".to_string(),
            absolute_file_path: "/x/Vault.sol".to_string(),
            contract_name: "TokenVault".to_string(),
            contract_code: String::new(),
            modifiers: Vec::new(),
            visibility: crate::model::function::Visibility::Public,
            state_mutability: crate::model::function::StateMutability::Nonpayable,
            description: None,
        }
    }

    #[tokio::test]
    async fn ingests_three_columns_per_function() {
        let index: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new());
        let store = EmbeddingStore::new(index.clone(), Arc::new(FakeEmbedder), "model", 3, 2);
        store.upsert_functions(vec![function("TokenVault.deposit")]).await.unwrap();
        assert_eq!(index.count(FUNCTION_TABLE).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn row_count_mismatch_triggers_rebuild() {
        let index: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new());
        let store = EmbeddingStore::new(index.clone(), Arc::new(FakeEmbedder), "model", 3, 2);
        store.upsert_functions(vec![function("A.a"), function("A.b")]).await.unwrap();
        assert_eq!(index.count(FUNCTION_TABLE).await.unwrap(), 2);

        let rebuilt = store.ensure_function_table(&[function("A.a")]).await.unwrap();
        assert!(rebuilt);
    }
}
