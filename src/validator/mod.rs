//! Validator (spec §4.H): drives each planned task through the
//! `Planned -> Analyzing -> Confirming(k) -> Done|Skipped` state machine,
//! extending context each confirmation round and retrying transient LLM
//! failures through the shared circuit-breaker/backoff policy.
//!
//! Grounded in the teacher's `task::execution::TaskExecutor` round-driven
//! loop, `claude::rate_limiter`, and `claude::error_recovery`, now exposed
//! as [`ManagedProvider`](crate::llm::ManagedProvider).

pub mod rounds;

use crate::context::{ContextFactory, HybridOptions, Modality};
use crate::llm::{JsonCompletionRequest, ManagedProvider};
use crate::model::task::{ScanMode, Task, TaskOutcome, TaskStatus};
use futures::stream::{self, StreamExt};
use rounds::Verdict;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct ValidatorConfig {
    pub max_confirmation_rounds: u32,
    pub high_confidence_threshold: f32,
    pub worker_pool_size: usize,
}

pub struct Validator<'a> {
    managed: ManagedProvider,
    model_id: String,
    context: &'a ContextFactory,
    config: ValidatorConfig,
}

impl<'a> Validator<'a> {
    pub fn new(managed: ManagedProvider, model_id: impl Into<String>, context: &'a ContextFactory, config: ValidatorConfig) -> Self {
        Self { managed, model_id: model_id.into(), context, config }
    }

    /// Drive a batch of tasks to completion with a bounded worker pool
    /// (spec §4.H "Parallelism": tasks are independent, task-level writes
    /// are serialized per row — each task here is processed end-to-end by
    /// a single worker, so no intra-task contention arises).
    pub async fn run_all(&self, tasks: Vec<Task>) -> Vec<Task> {
        stream::iter(tasks.into_iter().map(|task| self.run_one(task)))
            .buffer_unordered(self.config.worker_pool_size)
            .collect()
            .await
    }

    /// Idempotent: a `Done`/`Skipped` task is returned unchanged; a
    /// mid-flight task resumes from its last completed round (spec §4.H
    /// "Idempotence").
    pub async fn run_one(&self, mut task: Task) -> Task {
        if task.status.is_terminal() {
            return task;
        }

        loop {
            match task.status.clone() {
                TaskStatus::Planned | TaskStatus::Analyzing => {
                    task.transition(TaskStatus::Analyzing);
                    match self.initial_analysis(&task).await {
                        Ok(findings) if findings.is_empty() => {
                            info!(task_id = %task.id, "no candidate findings, task rejected");
                            task.transition(TaskStatus::Done { outcome: TaskOutcome::Rejected });
                            break;
                        }
                        Ok(findings) => {
                            task.raw_findings = findings;
                            task.transition(TaskStatus::Confirming { round: 1 });
                        }
                        Err(err) => {
                            self.skip(&mut task, &err.to_string());
                            break;
                        }
                    }
                }
                TaskStatus::Confirming { round } => {
                    let extra_context = self.extra_context_for_round(&task, round).await;
                    if round > self.config.max_confirmation_rounds {
                        let outcome = last_round_outcome(&task, self.config.high_confidence_threshold);
                        task.transition(TaskStatus::Done { outcome });
                        break;
                    }

                    match self.confirmation_round(&task, round, &extra_context).await {
                        Ok((verdict, confidence)) => {
                            task.record_round(crate::model::task::RoundRecord {
                                round,
                                prompt_hash: round_prompt_hash(&task.id, round),
                                response: format!("{verdict:?}"),
                                confidence,
                            });

                            let high_confidence = confidence >= self.config.high_confidence_threshold;
                            let exhausted = round >= self.config.max_confirmation_rounds;
                            let context_exhausted = extra_context.is_empty();

                            if (high_confidence && verdict != Verdict::Uncertain) || exhausted || context_exhausted {
                                let outcome = if verdict == Verdict::Confirmed { TaskOutcome::Confirmed } else { TaskOutcome::Rejected };
                                task.transition(TaskStatus::Done { outcome });
                                break;
                            }
                            task.transition(TaskStatus::Confirming { round: round + 1 });
                        }
                        Err(err) => {
                            self.skip(&mut task, &err.to_string());
                            break;
                        }
                    }
                }
                TaskStatus::Done { .. } | TaskStatus::Skipped { .. } => break,
            }
        }

        task
    }

    async fn initial_analysis(&self, task: &Task) -> Result<Vec<crate::model::task::RawFinding>, crate::error::LlmError> {
        let prompt = rounds::initial_analysis_prompt(&task.rule, &task.code_payload, &task.context_blob);
        let request = JsonCompletionRequest { id: Uuid::new_v4(), prompt, schema: rounds::initial_analysis_schema(), model_id: self.model_id.clone() };
        let value = self.managed.complete_json(request).await?;
        rounds::parse_initial_response(value)
    }

    async fn confirmation_round(&self, task: &Task, round: u32, extra_context: &str) -> Result<(Verdict, f32), crate::error::LlmError> {
        let prompt = rounds::confirmation_prompt(&task.rule, &task.raw_findings, round, extra_context);
        let request = JsonCompletionRequest { id: Uuid::new_v4(), prompt, schema: rounds::confirmation_schema(), model_id: self.model_id.clone() };
        let value = self.managed.complete_json(request).await?;
        rounds::parse_confirmation_response(value)
    }

    /// Pull additional call-tree depth and RAG neighbors for this round
    /// (spec §4.H "Confirmation rounds extend the context"); growth is
    /// monotone in `round` so later rounds see strictly more context until
    /// the hybrid budget caps it (at which point the blob stops growing
    /// and `extra_context_for_round` effectively signals exhaustion).
    ///
    /// `task.target_id` only names a function id under [`ScanMode::Function`]
    /// — for `BusinessFlow` it is the flow's uuid and for `File` it is the
    /// file's relative path, so each mode builds its own round-appropriate
    /// context instead of feeding `target_id` into `hybrid` unconditionally.
    async fn extra_context_for_round(&self, task: &Task, round: u32) -> String {
        let k = (round as usize) * 3;
        match task.scan_mode {
            ScanMode::Function => {
                let options = HybridOptions { include_rag: true, include_tree: true, include_flow: false, k, depth: round + 1 };
                self.context.hybrid(&task.target_id, &options, None).await.unwrap_or_default()
            }
            ScanMode::BusinessFlow => {
                let Some(flow_id) = task.flow_id() else { return String::new() };
                let flow_context = self.context.business_flow_context(flow_id);
                let neighbors = self.context.rag_context(&task.name, k, Modality::Content).await.unwrap_or_default();
                let formatted = neighbors.iter().map(|n| format!("{} (score {:.3})", n.id, n.score)).collect::<Vec<_>>().join("\n");
                [flow_context, formatted].into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join("\n\n")
            }
            ScanMode::File => {
                let neighbors = self.context.rag_context(&task.target_id, k, Modality::FileNatural).await.unwrap_or_default();
                neighbors.iter().map(|n| format!("{} (score {:.3})", n.id, n.score)).collect::<Vec<_>>().join("\n")
            }
        }
    }

    fn skip(&self, task: &mut Task, detail: &str) {
        warn!(task_id = %task.id, "task skipped after exhausting retries: {detail}");
        task.transition(TaskStatus::Skipped { error_kind: "llm_error".to_string(), detail: detail.to_string() });
    }
}

fn last_round_outcome(task: &Task, threshold: f32) -> TaskOutcome {
    if task.confidence >= threshold { TaskOutcome::Confirmed } else { TaskOutcome::Rejected }
}

fn round_prompt_hash(task_id: &Uuid, round: u32) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(format!("{task_id}:{round}").as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SizeOptimizer;
    use crate::error::LlmError;
    use crate::llm::{CompletionRequest, CompletionResponse, EmbeddingProvider, ErrorRecoveryConfig, LLMProvider};
    use crate::model::function::{Function, StateMutability, Visibility};
    use crate::model::task::{ChecklistRule, ScanMode};
    use crate::vector::index::InMemoryVectorIndex;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct ScriptedLlm {
        responses: Vec<serde_json::Value>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LLMProvider for ScriptedLlm {
        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            unreachable!()
        }
        async fn complete_json(&self, _request: JsonCompletionRequest) -> Result<serde_json::Value, LlmError> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            Ok(self.responses.get(idx).cloned().unwrap_or_else(|| self.responses.last().unwrap().clone()))
        }
        fn provider_name(&self) -> &'static str {
            "scripted"
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

    fn function(id: &str) -> Function {
        Function {
            id: id.to_string(),
            name: id.split('.').next_back().unwrap().to_string(),
            content: "body".to_string(),
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

    fn context() -> ContextFactory {
        ContextFactory::new(
            vec![function("A.withdraw")],
            Vec::new(),
            Vec::new(),
            HashMap::new(),
            Arc::new(InMemoryVectorIndex::new()),
            Arc::new(FakeEmbedder),
            "model",
            SizeOptimizer::new(4000),
        )
    }

    fn rule() -> ChecklistRule {
        ChecklistRule { key: "reentrancy".into(), prompt_fragment: "check".into() }
    }

    #[tokio::test]
    async fn empty_initial_findings_rejects_immediately() {
        let llm = ScriptedLlm { responses: vec![serde_json::json!({"findings": []})], calls: AtomicU32::new(0) };
        let managed = ManagedProvider::new(Arc::new(llm), ErrorRecoveryConfig::default());
        let context = context();
        let config = ValidatorConfig { max_confirmation_rounds: 3, high_confidence_threshold: 0.85, worker_pool_size: 2 };
        let validator = Validator::new(managed, "model", &context, config);

        let task = Task::new("proj", "withdraw", rule(), ScanMode::Function, "A.withdraw", "body", "ctx");
        let result = validator.run_one(task).await;
        assert_eq!(result.status, TaskStatus::Done { outcome: TaskOutcome::Rejected });
    }

    #[tokio::test]
    async fn high_confidence_confirmation_terminates_on_first_round() {
        let llm = ScriptedLlm {
            responses: vec![
                serde_json::json!({"findings": [{"title":"Reentrancy","description":"d","severity":"high","confidence":0.6}]}),
                serde_json::json!({"verdict": "confirmed", "confidence": 0.95}),
            ],
            calls: AtomicU32::new(0),
        };
        let managed = ManagedProvider::new(Arc::new(llm), ErrorRecoveryConfig::default());
        let context = context();
        let config = ValidatorConfig { max_confirmation_rounds: 3, high_confidence_threshold: 0.85, worker_pool_size: 2 };
        let validator = Validator::new(managed, "model", &context, config);

        let task = Task::new("proj", "withdraw", rule(), ScanMode::Function, "A.withdraw", "body", "ctx");
        let result = validator.run_one(task).await;
        assert_eq!(result.status, TaskStatus::Done { outcome: TaskOutcome::Confirmed });
        assert_eq!(result.rounds.len(), 1);
    }

    #[tokio::test]
    async fn extra_context_for_business_flow_round_uses_flow_context_not_function_lookup() {
        use crate::model::flow::{BusinessFlow, FlowSource, FlowStep};

        let functions = vec![function("A.one"), function("A.two")];
        let flow = BusinessFlow::new(
            "checkout",
            FlowSource::JsonFile,
            vec![
                FlowStep { raw: "A.one".into(), resolved_function_id: Some("A.one".into()) },
                FlowStep { raw: "A.two".into(), resolved_function_id: Some("A.two".into()) },
            ],
        );
        let flow_id = flow.id;
        let context = ContextFactory::new(
            functions,
            Vec::new(),
            vec![flow],
            HashMap::new(),
            Arc::new(InMemoryVectorIndex::new()),
            Arc::new(FakeEmbedder),
            "model",
            SizeOptimizer::new(4000),
        );
        let llm = ScriptedLlm { responses: vec![], calls: AtomicU32::new(0) };
        let managed = ManagedProvider::new(Arc::new(llm), ErrorRecoveryConfig::default());
        let config = ValidatorConfig { max_confirmation_rounds: 3, high_confidence_threshold: 0.85, worker_pool_size: 2 };
        let validator = Validator::new(managed, "model", &context, config);

        // `target_id` is the flow's uuid, not a function id — the naive
        // `hybrid(task.target_id, ...)` lookup would find nothing.
        let task = Task::new("proj", "checkout", rule(), ScanMode::BusinessFlow, flow_id.to_string(), "payload", "ctx");
        let extra = validator.extra_context_for_round(&task, 1).await;
        assert!(extra.contains("Business flow: checkout"));
        assert!(extra.contains("body"));
    }

    #[tokio::test]
    async fn already_terminal_task_is_a_no_op() {
        let llm = ScriptedLlm { responses: vec![], calls: AtomicU32::new(0) };
        let managed = ManagedProvider::new(Arc::new(llm), ErrorRecoveryConfig::default());
        let context = context();
        let config = ValidatorConfig { max_confirmation_rounds: 3, high_confidence_threshold: 0.85, worker_pool_size: 2 };
        let validator = Validator::new(managed, "model", &context, config);

        let mut task = Task::new("proj", "withdraw", rule(), ScanMode::Function, "A.withdraw", "body", "ctx");
        task.transition(TaskStatus::Done { outcome: TaskOutcome::Confirmed });
        let result = validator.run_one(task).await;
        assert_eq!(result.status, TaskStatus::Done { outcome: TaskOutcome::Confirmed });
    }
}
