//! Planner (spec §4.G): enumerates scan-mode targets × checklist rules
//! into idempotent tasks, then runs a near-duplicate dedup pass over
//! FUNCTION-mode tasks targeting near-identical bodies.
//!
//! Grounded in the teacher's `task::manager::create_task` idempotent
//! keying and `task::tree::find_similar_tasks`'s Jaccard word-overlap
//! similarity, generalized here from task title/description text to
//! function body text.

pub mod checklist;

use crate::context::{ContextFactory, HybridOptions, Modality};
use crate::error::LlmError;
use crate::model::flow::BusinessFlow;
use crate::model::function::{Function, SourceFile};
use crate::model::task::{ChecklistRule, ScanMode, Task};
use crate::store::ProjectAuditStore;
use std::collections::{HashMap, HashSet};
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
pub struct ActiveScanModes {
    pub business_flow_code: bool,
    pub file_code: bool,
    pub function_code: bool,
}

pub struct Planner<'a> {
    store: &'a ProjectAuditStore,
    context: &'a ContextFactory,
    checklist: Vec<ChecklistRule>,
    near_duplicate_threshold: f64,
}

impl<'a> Planner<'a> {
    pub fn new(store: &'a ProjectAuditStore, context: &'a ContextFactory, checklist: Vec<ChecklistRule>, near_duplicate_threshold: f64) -> Self {
        Self { store, context, checklist, near_duplicate_threshold }
    }

    /// Enumerate every active mode's targets against the checklist,
    /// creating (and reusing) tasks idempotently, then dedup FUNCTION-mode
    /// tasks whose bodies are near-identical (spec §4.G, SPEC_FULL.md §B).
    pub async fn plan(
        &self,
        project_id: &str,
        modes: ActiveScanModes,
        functions: &[Function],
        files: &[SourceFile],
        flows: &[BusinessFlow],
    ) -> Result<Vec<Task>, LlmError> {
        let mut planned = Vec::new();
        let mut flow_covered: HashSet<&str> = HashSet::new();

        if modes.business_flow_code {
            for flow in flows.iter().filter(|f| f.is_viable()) {
                flow_covered.extend(flow.resolved_function_ids());
                planned.extend(self.plan_business_flow(project_id, flow, functions).await?);
            }
        }
        if modes.file_code {
            for file in files {
                planned.extend(self.plan_file(project_id, file, functions).await?);
            }
        }
        if modes.function_code {
            for function in functions {
                planned.extend(self.plan_function(project_id, function).await?);
            }
        } else if modes.business_flow_code {
            // Boundary behavior: a function no viable flow covers (e.g. a
            // single-file project with one function that never resolved
            // into a business flow) falls back to FUNCTION mode so it still
            // gets scanned.
            for function in functions.iter().filter(|f| !flow_covered.contains(f.id.as_str())) {
                planned.extend(self.plan_function(project_id, function).await?);
            }
        }

        let deduped = self.dedup_function_tasks(planned, functions);
        info!(project_id, count = deduped.len(), "planning complete");
        Ok(deduped)
    }

    async fn plan_business_flow(&self, project_id: &str, flow: &BusinessFlow, functions: &[Function]) -> Result<Vec<Task>, LlmError> {
        let resolved_ids = flow.resolved_function_ids();
        let payload = resolved_ids
            .iter()
            .filter_map(|id| functions.iter().find(|f| f.id == *id))
            .map(|f| format!("// --- {} ---\n{}", f.id, f.content))
            .collect::<Vec<_>>()
            .join("\n");

        let Some(first_step) = resolved_ids.first() else { return Ok(Vec::new()) };
        let options = HybridOptions { include_rag: false, include_tree: false, include_flow: true, k: 0, depth: 0 };
        let context = self.context.hybrid(first_step, &options, Some(flow.id)).await?;
        let step_list = resolved_ids.join(" -> ");
        let context_blob = format!("{context}\n\nSteps: {step_list}");

        let mut tasks = Vec::new();
        for rule in &self.checklist {
            let task = Task::new(project_id, &flow.name, rule.clone(), ScanMode::BusinessFlow, flow.id.to_string(), payload.clone(), context_blob.clone());
            tasks.push(self.store.create_task(task).await.map_err(|e| LlmError::ProviderUnavailable(e.to_string()))?);
        }
        Ok(tasks)
    }

    /// File-natural RAG neighbors plus a lightweight call-tree digest for
    /// the file's own functions (spec §4.G: FILE-mode context is "file-
    /// natural neighbors and a lightweight call-tree digest for the file's
    /// functions"), mirroring the primitives `plan_function` already pulls
    /// from [`ContextFactory`].
    async fn plan_file(&self, project_id: &str, file: &SourceFile, functions: &[Function]) -> Result<Vec<Task>, LlmError> {
        let file_functions: Vec<&Function> = functions.iter().filter(|f| f.relative_file_path == file.relative_path).collect();

        let query = file.description.clone().unwrap_or_else(|| file.relative_path.clone());
        let neighbors = self.context.rag_context(&query, 5, Modality::FileNatural).await?;
        let neighbor_digest = neighbors.iter().map(|n| format!("{} (score {:.3})", n.id, n.score)).collect::<Vec<_>>().join("\n");

        let call_tree_digest = file_functions
            .iter()
            .map(|f| self.context.call_tree_context(&f.id, 1))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        let context_blob = format!("File-natural neighbors:\n{neighbor_digest}\n\nCall tree digest:\n{call_tree_digest}");

        let mut tasks = Vec::new();
        for rule in &self.checklist {
            let task = Task::new(project_id, &file.relative_path, rule.clone(), ScanMode::File, file.relative_path.clone(), file.content.clone(), context_blob.clone());
            tasks.push(self.store.create_task(task).await.map_err(|e| LlmError::ProviderUnavailable(e.to_string()))?);
        }
        Ok(tasks)
    }

    async fn plan_function(&self, project_id: &str, function: &Function) -> Result<Vec<Task>, LlmError> {
        let options = HybridOptions { include_rag: true, include_tree: true, include_flow: false, k: 5, depth: 2 };
        let context = self.context.hybrid(&function.id, &options, None).await?;

        let mut tasks = Vec::new();
        for rule in &self.checklist {
            let task = Task::new(project_id, &function.name, rule.clone(), ScanMode::Function, function.id.clone(), function.content.clone(), context.clone());
            tasks.push(self.store.create_task(task).await.map_err(|e| LlmError::ProviderUnavailable(e.to_string()))?);
        }
        Ok(tasks)
    }

    /// Merge FUNCTION-mode tasks whose targets have near-identical bodies
    /// (e.g. proxy-forwarded clones), folding context requirements into
    /// the first task of each cluster. Does not remove any task row — it
    /// only annotates clusters for the validator to skip redundant work.
    fn dedup_function_tasks(&self, tasks: Vec<Task>, functions: &[Function]) -> Vec<Task> {
        let bodies: HashMap<&str, &str> = functions.iter().map(|f| (f.id.as_str(), f.content.as_str())).collect();
        let mut merged_away: HashSet<uuid::Uuid> = HashSet::new();
        let function_tasks: Vec<&Task> = tasks.iter().filter(|t| t.scan_mode == ScanMode::Function).collect();

        for (i, task) in function_tasks.iter().enumerate() {
            if merged_away.contains(&task.id) {
                continue;
            }
            let Some(body_a) = bodies.get(task.target_id.as_str()) else { continue };
            for other in &function_tasks[i + 1..] {
                if merged_away.contains(&other.id) || other.rule.key != task.rule.key {
                    continue;
                }
                let Some(body_b) = bodies.get(other.target_id.as_str()) else { continue };
                if word_overlap_similarity(body_a, body_b) >= self.near_duplicate_threshold {
                    merged_away.insert(other.id);
                }
            }
        }

        tasks.into_iter().filter(|t| !merged_away.contains(&t.id)).collect()
    }
}

/// Jaccard similarity over whitespace-split tokens, generalized from the
/// teacher's title/description word-overlap check to function bodies.
fn word_overlap_similarity(a: &str, b: &str) -> f64 {
    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();
    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();
    if union == 0 { 0.0 } else { intersection as f64 / union as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SizeOptimizer;
    use crate::llm::EmbeddingProvider;
    use crate::model::function::{StateMutability, Visibility};
    use crate::vector::index::InMemoryVectorIndex;
    use async_trait::async_trait;
    use std::sync::Arc;

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
    async fn plans_one_task_per_function_rule_pair() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ProjectAuditStore::new(dir.path().to_path_buf(), "proj");
        let functions = vec![function("A.one", "body one"), function("A.two", "body two")];
        let context = ContextFactory::new(
            functions.clone(),
            Vec::new(),
            Vec::new(),
            HashMap::new(),
            Arc::new(InMemoryVectorIndex::new()),
            Arc::new(FakeEmbedder),
            "model",
            SizeOptimizer::new(4000),
        );
        let checklist = vec![checklist::default_checklist()[0].clone()];
        let planner = Planner::new(&store, &context, checklist, 0.9);

        let modes = ActiveScanModes { business_flow_code: false, file_code: false, function_code: true };
        let tasks = planner.plan("proj", modes, &functions, &[], &[]).await.unwrap();
        assert_eq!(tasks.len(), 2);
    }

    #[tokio::test]
    async fn business_flow_mode_falls_back_to_function_mode_when_no_flow_is_produced() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ProjectAuditStore::new(dir.path().to_path_buf(), "proj");
        let functions = vec![function("A.one", "body one")];
        let context = ContextFactory::new(
            functions.clone(),
            Vec::new(),
            Vec::new(),
            HashMap::new(),
            Arc::new(InMemoryVectorIndex::new()),
            Arc::new(FakeEmbedder),
            "model",
            SizeOptimizer::new(4000),
        );
        let checklist = vec![checklist::default_checklist()[0].clone()];
        let planner = Planner::new(&store, &context, checklist, 0.9);

        let modes = ActiveScanModes { business_flow_code: true, file_code: false, function_code: false };
        let tasks = planner.plan("proj", modes, &functions, &[], &[]).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].scan_mode, ScanMode::Function);
        assert_eq!(tasks[0].target_id, "A.one");
    }

    #[tokio::test]
    async fn file_mode_context_carries_rag_neighbors_and_call_tree_digest() {
        use crate::call_tree::builder::{CallTreeNode, FunctionCallInfo};
        use crate::model::function::SourceFile;

        let dir = tempfile::TempDir::new().unwrap();
        let store = ProjectAuditStore::new(dir.path().to_path_buf(), "proj");
        let functions = vec![function("A.one", "body one")];
        let mut call_info = HashMap::new();
        call_info.insert(
            "A.one".to_string(),
            FunctionCallInfo {
                upstream: vec![CallTreeNode { function_id: "A.caller".into(), children: Vec::new() }],
                downstream: Vec::new(),
                state_variables: Vec::new(),
            },
        );
        let context = ContextFactory::new(
            functions.clone(),
            Vec::new(),
            Vec::new(),
            call_info,
            Arc::new(InMemoryVectorIndex::new()),
            Arc::new(FakeEmbedder),
            "model",
            SizeOptimizer::new(4000),
        );
        let checklist = vec![checklist::default_checklist()[0].clone()];
        let planner = Planner::new(&store, &context, checklist, 0.9);

        let file = SourceFile::new("X.sol".to_string(), "/X.sol".to_string(), "body one".to_string());
        let modes = ActiveScanModes { business_flow_code: false, file_code: true, function_code: false };
        let tasks = planner.plan("proj", modes, &functions, &[file], &[]).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].context_blob.contains("A.caller"));
    }

    #[tokio::test]
    async fn near_identical_function_bodies_are_deduped() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ProjectAuditStore::new(dir.path().to_path_buf(), "proj");
        let shared_body = "function withdraw() external { msg.sender.call{value: amount}(\"\"); }";
        let functions = vec![function("A.withdraw", shared_body), function("B.withdraw", shared_body)];
        let context = ContextFactory::new(
            functions.clone(),
            Vec::new(),
            Vec::new(),
            HashMap::new(),
            Arc::new(InMemoryVectorIndex::new()),
            Arc::new(FakeEmbedder),
            "model",
            SizeOptimizer::new(4000),
        );
        let checklist = vec![checklist::default_checklist()[0].clone()];
        let planner = Planner::new(&store, &context, checklist, 0.9);

        let modes = ActiveScanModes { business_flow_code: false, file_code: false, function_code: true };
        let tasks = planner.plan("proj", modes, &functions, &[], &[]).await.unwrap();
        assert_eq!(tasks.len(), 1);
    }
}
