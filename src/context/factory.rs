//! Context Factory: the single retrieval surface consumed by the planner
//! and validator, unifying RAG neighbor search, call-tree formatting, and
//! business-flow concatenation behind one set of operations.
//!
//! Adapted from the teacher's `claude::context_manager::OptimizedContext`
//! shape — there a conversation's message history was trimmed to a token
//! budget with a compression ratio reported back; here a function's
//! retrieval context is assembled from multiple sources and trimmed the
//! same way via [`size_optimizer`](super::size_optimizer).

use crate::call_tree::builder::{CallTreeNode, FunctionCallInfo};
use crate::context::size_optimizer::{SECTION_BUSINESS_FLOW, SECTION_CALL_TREE, SECTION_FUNCTION_BODY, SECTION_RAG_NEIGHBORS, SizeOptimizer};
use crate::error::{LlmError, VectorIndexError};
use crate::llm::EmbeddingProvider;
use crate::model::flow::BusinessFlow;
use crate::model::function::{Function, SourceFile};
use crate::vector::embedding_store::{CONTENT_EMBEDDING, FILE_TABLE, FUNCTION_TABLE, NAME_EMBEDDING, NATURAL_EMBEDDING};
use crate::vector::index::{ScoredRow, VectorIndex};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Which embedding column a `rag_context` call should search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Content,
    Name,
    Natural,
    FileContent,
    FileNatural,
}

impl Modality {
    fn table_and_column(self) -> (&'static str, &'static str) {
        match self {
            Modality::Content => (FUNCTION_TABLE, CONTENT_EMBEDDING),
            Modality::Name => (FUNCTION_TABLE, NAME_EMBEDDING),
            Modality::Natural => (FUNCTION_TABLE, NATURAL_EMBEDDING),
            Modality::FileContent => (FILE_TABLE, CONTENT_EMBEDDING),
            Modality::FileNatural => (FILE_TABLE, NATURAL_EMBEDDING),
        }
    }

    pub const ALL: [Modality; 5] =
        [Modality::Content, Modality::Name, Modality::Natural, Modality::FileContent, Modality::FileNatural];
}

#[derive(Debug, Clone, Default)]
pub struct HybridOptions {
    pub include_rag: bool,
    pub include_tree: bool,
    pub include_flow: bool,
    pub k: usize,
    pub depth: u32,
}

pub struct ContextFactory {
    functions_by_id: HashMap<String, Function>,
    files_by_path: HashMap<String, SourceFile>,
    flows_by_id: HashMap<uuid::Uuid, BusinessFlow>,
    call_info: HashMap<String, FunctionCallInfo>,
    vector_index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    embedding_model: String,
    optimizer: SizeOptimizer,
    cache: DashMap<(String, String), String>,
}

impl ContextFactory {
    pub fn new(
        functions: Vec<Function>,
        files: Vec<SourceFile>,
        flows: Vec<BusinessFlow>,
        call_info: HashMap<String, FunctionCallInfo>,
        vector_index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        embedding_model: impl Into<String>,
        optimizer: SizeOptimizer,
    ) -> Self {
        Self {
            functions_by_id: functions.into_iter().map(|f| (f.id.clone(), f)).collect(),
            files_by_path: files.into_iter().map(|f| (f.relative_path.clone(), f)).collect(),
            flows_by_id: flows.into_iter().map(|f| (f.id, f)).collect(),
            call_info,
            vector_index,
            embedder,
            embedding_model: embedding_model.into(),
            optimizer,
            cache: DashMap::new(),
        }
    }

    /// Top-k neighbors of `query` in the given modality (spec §4.F).
    pub async fn rag_context(&self, query: &str, k: usize, modality: Modality) -> Result<Vec<ScoredRow>, LlmError> {
        let vector = self.embedder.embed(query, &self.embedding_model).await?;
        let (table, column) = modality.table_and_column();
        self.vector_index
            .search(table, column, &vector, k)
            .await
            .map_err(|e: VectorIndexError| LlmError::ProviderUnavailable(e.to_string()))
    }

    /// Formatted upstream + downstream call tree for `function_id` (spec
    /// §4.F).
    pub fn call_tree_context(&self, function_id: &str, depth: u32) -> String {
        let Some(info) = self.call_info.get(function_id) else {
            return String::new();
        };
        let mut out = format!("Call tree for {function_id} (depth {depth}):\n");
        out.push_str("Upstream (callers):\n");
        append_nodes(&mut out, &info.upstream, depth, 1);
        out.push_str("Downstream (callees):\n");
        append_nodes(&mut out, &info.downstream, depth, 1);
        out
    }

    /// Flow name plus concatenated step bodies, in step order (spec §4.F,
    /// §5c order-preservation guarantee).
    pub fn business_flow_context(&self, flow_id: uuid::Uuid) -> String {
        let Some(flow) = self.flows_by_id.get(&flow_id) else {
            return String::new();
        };
        let mut out = format!("Business flow: {}\n", flow.name);
        for id in flow.resolved_function_ids() {
            if let Some(function) = self.functions_by_id.get(id) {
                out.push_str(&format!("// --- {id} ---\n{}\n", function.content));
            }
        }
        out
    }

    /// Concatenation of function body, call tree, RAG neighbors, and flow
    /// context per the requested options, trimmed to the configured budget
    /// (spec §4.F). Cached by `(function_id, option-fingerprint)`.
    pub async fn hybrid(&self, function_id: &str, options: &HybridOptions, flow_id: Option<uuid::Uuid>) -> Result<String, LlmError> {
        let fingerprint = format!(
            "rag={}&tree={}&flow={}&k={}&depth={}",
            options.include_rag, options.include_tree, options.include_flow, options.k, options.depth
        );
        let cache_key = (function_id.to_string(), fingerprint);
        if let Some(cached) = self.cache.get(&cache_key) {
            return Ok(cached.clone());
        }

        let mut sections = Vec::new();
        if let Some(function) = self.functions_by_id.get(function_id) {
            sections.push((SECTION_FUNCTION_BODY, function.content.clone()));
        }
        if options.include_tree {
            sections.push((SECTION_CALL_TREE, self.call_tree_context(function_id, options.depth)));
        }
        if options.include_rag {
            let query = self.functions_by_id.get(function_id).map(|f| f.qualified_name()).unwrap_or_default();
            let k = options.k.max(1);
            let content_neighbors = self.rag_context(&query, k, Modality::Content).await?;
            let name_neighbors = self.rag_context(&query, k, Modality::Name).await?;
            let formatted = merge_neighbors(content_neighbors, name_neighbors)
                .iter()
                .map(|n| format!("{} (score {:.3})", n.id, n.score))
                .collect::<Vec<_>>()
                .join("\n");
            sections.push((SECTION_RAG_NEIGHBORS, formatted));
        }
        if options.include_flow {
            if let Some(flow_id) = flow_id {
                sections.push((SECTION_BUSINESS_FLOW, self.business_flow_context(flow_id)));
            }
        }

        let trimmed = self.optimizer.trim(sections);
        self.cache.insert(cache_key, trimmed.clone());
        Ok(trimmed)
    }

    /// Dict of modality -> results for exploratory search (spec §4.F).
    pub async fn comprehensive_search(&self, query: &str, k: usize) -> Result<HashMap<String, Vec<ScoredRow>>, LlmError> {
        let mut results = HashMap::new();
        for modality in Modality::ALL {
            let hits = self.rag_context(query, k, modality).await?;
            results.insert(format!("{modality:?}"), hits);
        }
        Ok(results)
    }
}

/// Merge two RAG neighbor lists (e.g. content + name modalities, spec §4.H
/// "additional RAG neighbors: semantic + name modalities"), deduping by row
/// id and keeping the higher of the two scores, sorted best-first.
fn merge_neighbors(a: Vec<ScoredRow>, b: Vec<ScoredRow>) -> Vec<ScoredRow> {
    let mut by_id: HashMap<String, ScoredRow> = HashMap::new();
    for row in a.into_iter().chain(b) {
        by_id
            .entry(row.id.clone())
            .and_modify(|existing| {
                if row.score > existing.score {
                    existing.score = row.score;
                }
            })
            .or_insert(row);
    }
    let mut merged: Vec<ScoredRow> = by_id.into_values().collect();
    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    merged
}

fn append_nodes(out: &mut String, nodes: &[CallTreeNode], max_depth: u32, current_depth: u32) {
    if current_depth > max_depth {
        return;
    }
    for node in nodes {
        out.push_str(&"  ".repeat(current_depth as usize));
        out.push_str(&node.function_id);
        out.push('\n');
        append_nodes(out, &node.children, max_depth, current_depth + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::size_optimizer::SizeOptimizer;
    use crate::model::function::{StateMutability, Visibility};
    use crate::vector::index::{InMemoryVectorIndex, VectorRow};
    use async_trait::async_trait;

    fn function(id: &str, content: &str) -> Function {
        Function {
            id: id.to_string(),
            name: id.split('.').next_back().unwrap().to_string(),
            content: content.to_string(),
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
    async fn business_flow_context_concatenates_steps_in_order() {
        let functions = vec![function("A.one", "body one"), function("A.two", "body two")];
        let flow = BusinessFlow::new(
            "flow",
            crate::model::flow::FlowSource::JsonFile,
            vec![
                crate::model::flow::FlowStep { raw: "A.one".into(), resolved_function_id: Some("A.one".into()) },
                crate::model::flow::FlowStep { raw: "A.two".into(), resolved_function_id: Some("A.two".into()) },
            ],
        );
        let flow_id = flow.id;
        let factory = ContextFactory::new(
            functions,
            Vec::new(),
            vec![flow],
            HashMap::new(),
            Arc::new(InMemoryVectorIndex::new()),
            Arc::new(FakeEmbedder),
            "model",
            SizeOptimizer::new(10_000),
        );
        let context = factory.business_flow_context(flow_id);
        let one_pos = context.find("body one").unwrap();
        let two_pos = context.find("body two").unwrap();
        assert!(one_pos < two_pos);
    }

    #[tokio::test]
    async fn hybrid_is_cached_by_function_and_option_fingerprint() {
        let functions = vec![function("A.one", "body one")];
        let factory = ContextFactory::new(
            functions,
            Vec::new(),
            Vec::new(),
            HashMap::new(),
            Arc::new(InMemoryVectorIndex::new()),
            Arc::new(FakeEmbedder),
            "model",
            SizeOptimizer::new(10_000),
        );
        let options = HybridOptions { include_rag: false, include_tree: false, include_flow: false, k: 0, depth: 0 };
        let first = factory.hybrid("A.one", &options, None).await.unwrap();
        assert_eq!(factory.cache.len(), 1);
        let second = factory.hybrid("A.one", &options, None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(factory.cache.len(), 1);
    }

    #[tokio::test]
    async fn hybrid_rag_section_merges_content_and_name_modalities() {
        let functions = vec![function("A.one", "body one")];
        let vector_index = Arc::new(InMemoryVectorIndex::new());
        vector_index
            .upsert(
                FUNCTION_TABLE,
                CONTENT_EMBEDDING,
                vec![VectorRow { id: "A.content_neighbor".into(), vector: vec![1.0, 0.0], payload: serde_json::Value::Null }],
            )
            .await
            .unwrap();
        vector_index
            .upsert(
                FUNCTION_TABLE,
                NAME_EMBEDDING,
                vec![VectorRow { id: "A.name_neighbor".into(), vector: vec![1.0, 0.0], payload: serde_json::Value::Null }],
            )
            .await
            .unwrap();

        let factory = ContextFactory::new(
            functions,
            Vec::new(),
            Vec::new(),
            HashMap::new(),
            vector_index,
            Arc::new(FakeEmbedder),
            "model",
            SizeOptimizer::new(10_000),
        );
        let options = HybridOptions { include_rag: true, include_tree: false, include_flow: false, k: 5, depth: 0 };
        let context = factory.hybrid("A.one", &options, None).await.unwrap();
        assert!(context.contains("A.content_neighbor"));
        assert!(context.contains("A.name_neighbor"));
    }
}
