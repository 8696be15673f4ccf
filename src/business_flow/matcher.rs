//! Step -> function-id resolution (spec §4.D): exact match first, then a
//! semantic fallback over the `name_embedding` column.

use crate::llm::EmbeddingProvider;
use crate::model::function::Function;
use crate::vector::index::VectorIndex;
use crate::vector::embedding_store::{FUNCTION_TABLE, NAME_EMBEDDING};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

pub struct StepMatcher<'a> {
    functions_by_id: HashMap<&'a str, &'a Function>,
    vector_index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    embedding_model: String,
    semantic_threshold: f32,
}

impl<'a> StepMatcher<'a> {
    pub fn new(
        functions: &'a [Function],
        vector_index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        embedding_model: impl Into<String>,
        semantic_threshold: f32,
    ) -> Self {
        Self {
            functions_by_id: functions.iter().map(|f| (f.id.as_str(), f)).collect(),
            vector_index,
            embedder,
            embedding_model: embedding_model.into(),
            semantic_threshold,
        }
    }

    /// Exact match against the function id table (spec §4.D: "match
    /// `Contract.fn` or `File.fn` against the function id table").
    pub fn exact_match(&self, step: &str) -> Option<&'a Function> {
        self.functions_by_id.get(step).copied()
    }

    /// Embed `step` and query `name_embedding`; accept the top match above
    /// the configured threshold, else drop the step (spec §4.D).
    pub async fn semantic_match(&self, step: &str) -> Option<String> {
        let vector = match self.embedder.embed(step, &self.embedding_model).await {
            Ok(v) => v,
            Err(err) => {
                warn!("semantic fallback embedding failed for step '{step}': {err}");
                return None;
            }
        };

        let results = self.vector_index.search(FUNCTION_TABLE, NAME_EMBEDDING, &vector, 1).await.ok()?;
        let top = results.into_iter().next()?;
        if top.score >= self.semantic_threshold { Some(top.id) } else { None }
    }

    /// Resolve one step, preferring the exact match, falling back to
    /// semantic search (spec §4.D two-stage strategy).
    pub async fn resolve(&self, step: &str) -> Option<String> {
        if let Some(function) = self.exact_match(step) {
            return Some(function.id.clone());
        }
        self.semantic_match(step).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::model::function::{StateMutability, Visibility};
    use crate::vector::index::{InMemoryVectorIndex, VectorRow};
    use async_trait::async_trait;

    fn function(id: &str) -> Function {
        Function {
            id: id.to_string(),
            name: id.split('.').next_back().unwrap().to_string(),
            content: String::new(),
            start_line: 1,
            end_line: 1,
            relative_file_path: "X.sol".to_string(),
            absolute_file_path: "/X.sol".to_string(),
            contract_name: id.split('.').next().unwrap().to_string(),
            contract_code: String::new(),
            modifiers: Vec::new(),
            visibility: Visibility::Public,
            state_mutability: StateMutability::Nonpayable,
            description: None,
        }
    }

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        async fn embed(&self, _text: &str, _model_id: &str) -> Result<Vec<f32>, LlmError> {
            Ok(vec![1.0, 0.0])
        }
        fn dimension(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn exact_match_wins_over_semantic() {
        let functions = vec![function("TokenVault.deposit")];
        let index = Arc::new(InMemoryVectorIndex::new());
        let matcher = StepMatcher::new(&functions, index, Arc::new(FakeEmbedder), "model", 0.7);
        let resolved = matcher.resolve("TokenVault.deposit").await;
        assert_eq!(resolved, Some("TokenVault.deposit".to_string()));
    }

    #[tokio::test]
    async fn unresolved_below_threshold_drops_the_step() {
        let functions = vec![function("A.transfer")];
        let index: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new());
        index.create_table("functions", 2).await.unwrap();
        index
            .upsert("functions", "name_embedding", vec![VectorRow { id: "A.transfer".into(), vector: vec![0.0, 1.0], payload: serde_json::json!({}) }])
            .await
            .unwrap();
        let matcher = StepMatcher::new(&functions, index, Arc::new(FakeEmbedder), "model", 0.99);
        let resolved = matcher.resolve("transfer").await;
        assert_eq!(resolved, None);
    }
}
