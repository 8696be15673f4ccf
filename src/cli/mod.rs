//! Command dispatch: wires configuration discovery, provider construction,
//! and the ingest -> summarize -> derive-flows -> plan -> validate ->
//! process pipeline behind the subcommands in [`args`].

pub mod args;
pub mod input;

use crate::business_flow::{BusinessFlowProcessor, StepMatcher};
use crate::call_tree::builder::CallTreeBuilder;
use crate::config::{ConfigDiscovery, EngineConfig};
use crate::context::{ContextFactory, SizeOptimizer};
use crate::llm::{
    AnthropicProvider, CostTable, EmbeddingProvider, ErrorRecoveryConfig, LLMProvider, ManagedProvider, OpenAiProvider, RateLimitConfig,
    RateLimiter, UsageTracker,
};
use crate::model::flow::BusinessFlow;
use crate::model::function::{Function, SourceFile};
use crate::model::task::{Task, TaskOutcome, TaskStatus};
use crate::planner::{ActiveScanModes, Planner};
use crate::result_processor::{ResultProcessor, ResultProcessorConfig};
use crate::store::ProjectAuditStore;
use crate::summarizer::{CodeSummarizer, SummaryOutcome};
use crate::validator::{Validator, ValidatorConfig};
use crate::vector::embedding_store::EmbeddingStore;
use crate::vector::index::{InMemoryVectorIndex, VectorIndex};
use args::{Args, Commands};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

const PLANNER_CONCURRENCY: usize = 4;

/// The provider/config bundle every subcommand is built from.
struct Runtime {
    completion: ManagedProvider,
    embedder: Arc<dyn EmbeddingProvider>,
    config: EngineConfig,
    recovery: ErrorRecoveryConfig,
    usage: Arc<UsageTracker>,
}

impl Runtime {
    fn assemble(args: &Args) -> anyhow::Result<Self> {
        let config = match &args.config {
            Some(path) => EngineConfig::from_toml_file(path)?.apply_env_overrides(),
            None => ConfigDiscovery::discover(),
        };

        let recovery = ErrorRecoveryConfig {
            max_retries: config.max_llm_retries,
            circuit_breaker_failure_threshold: config.circuit_breaker_failure_threshold,
            ..ErrorRecoveryConfig::default()
        };

        let usage = Arc::new(UsageTracker::new(CostTable::default()));
        let completion_provider = build_completion_provider()?;
        let completion = ManagedProvider::with_usage_tracker(completion_provider, recovery.clone(), usage.clone());

        let openai_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY is required to generate embeddings"))?;
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OpenAiProvider::new(openai_key, RateLimiter::new(RateLimitConfig::default())));

        Ok(Self { completion, embedder, config, recovery, usage })
    }

    /// A fresh [`ManagedProvider`] over the same completion provider and
    /// shared usage tracker, so every phase's accounting rolls up into one
    /// run-wide total (spec §4.H/§4.I each construct their own managed
    /// provider instance; usage must still be additive across them).
    fn managed_provider(&self) -> ManagedProvider {
        ManagedProvider::with_usage_tracker(self.completion.provider.clone(), self.recovery.clone(), self.usage.clone())
    }
}

/// Task outcome counts plus cumulative usage, surfaced at the end of a run
/// (spec §7: "the final report distinguishes three task outcomes ...
/// with counts and, for skipped tasks, the last error kind").
#[derive(Debug, serde::Serialize)]
struct RunSummary {
    confirmed: usize,
    rejected: usize,
    skipped: usize,
    skipped_error_kinds: std::collections::BTreeMap<String, usize>,
    total_tokens: u64,
    total_cost_usd: f64,
}

impl RunSummary {
    fn from_tasks(tasks: &[Task]) -> Self {
        let mut summary = RunSummary {
            confirmed: 0,
            rejected: 0,
            skipped: 0,
            skipped_error_kinds: std::collections::BTreeMap::new(),
            total_tokens: 0,
            total_cost_usd: 0.0,
        };
        for task in tasks {
            match &task.status {
                TaskStatus::Done { outcome: TaskOutcome::Confirmed } => summary.confirmed += 1,
                TaskStatus::Done { outcome: TaskOutcome::Rejected } => summary.rejected += 1,
                TaskStatus::Skipped { error_kind, .. } => {
                    summary.skipped += 1;
                    *summary.skipped_error_kinds.entry(error_kind.clone()).or_insert(0) += 1;
                }
                _ => {}
            }
        }
        summary
    }

    async fn with_usage(mut self, usage: &UsageTracker) -> Self {
        self.total_tokens = usage.total_tokens().await;
        self.total_cost_usd = usage.total_cost().await;
        self
    }
}

/// Pick Anthropic if `ANTHROPIC_API_KEY` is set, else fall back to OpenAI.
fn build_completion_provider() -> anyhow::Result<Arc<dyn LLMProvider>> {
    if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
        return Ok(Arc::new(AnthropicProvider::new(key, RateLimiter::new(RateLimitConfig::default()))));
    }
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        return Ok(Arc::new(OpenAiProvider::new(key, RateLimiter::new(RateLimitConfig::default()))));
    }
    Err(anyhow::anyhow!("set ANTHROPIC_API_KEY or OPENAI_API_KEY to select a completion provider"))
}

pub async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    match &args.command {
        Commands::Run { project_id, functions_file, scan_modes, json_flows_root, mermaid_root, translate_to } => {
            run_full_pipeline(&args, project_id, functions_file, *scan_modes, json_flows_root.as_deref(), mermaid_root.as_deref(), translate_to.clone()).await
        }
        Commands::Flows { project_id, functions_file, json_flows_root, mermaid_root } => {
            run_flows_only(&args, project_id, functions_file, json_flows_root.as_deref(), mermaid_root.as_deref()).await
        }
        Commands::Plan { project_id, functions_file, scan_modes } => run_plan_only(&args, project_id, functions_file, *scan_modes).await,
        Commands::Summarize { project_id, functions_file, mermaid_root } => run_summarize_only(&args, project_id, functions_file, mermaid_root).await,
        Commands::Report { project_id } => run_report(&args, project_id).await,
    }
}

fn ingest(store: &ProjectAuditStore, functions_file: &Path) -> anyhow::Result<(Vec<Function>, Vec<SourceFile>)> {
    let functions = input::load_functions_file(functions_file)?;
    let files = input::derive_files(&functions);
    store.load_functions_to_check(functions.clone())?;
    store.load_files(files.clone());
    info!(functions = functions.len(), files = files.len(), "ingested functions_to_check table");
    Ok((functions, files))
}

async fn build_vector_index(runtime: &Runtime, functions: &[Function], files: &[SourceFile]) -> anyhow::Result<Arc<dyn VectorIndex>> {
    let index: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new());
    let embedding_store = EmbeddingStore::new(index.clone(), runtime.embedder.clone(), runtime.config.embedding_model.clone(), runtime.config.embedding_dimension, PLANNER_CONCURRENCY);
    embedding_store.upsert_functions(functions.to_vec()).await?;
    embedding_store.upsert_files(files.to_vec()).await?;
    Ok(index)
}

async fn write_mermaid_outputs(outcome: &SummaryOutcome, mermaid_root: &Path, project_id: &str) -> anyhow::Result<Vec<std::path::PathBuf>> {
    let dir = crate::env::mermaid_dir_path(mermaid_root, project_id);
    tokio::fs::create_dir_all(&dir).await?;
    let mut written = Vec::new();
    match outcome {
        SummaryOutcome::Incremental { diagram } => {
            let path = crate::env::mermaid_business_flow_file(mermaid_root, project_id);
            tokio::fs::write(&path, diagram).await?;
            written.push(path);
        }
        SummaryOutcome::Folder { folders, overview } => {
            for folder_summary in folders {
                let path = crate::env::mermaid_folder_file(mermaid_root, project_id, &folder_summary.folder);
                tokio::fs::write(&path, &folder_summary.diagram).await?;
                written.push(path);
            }
            let path = crate::env::mermaid_global_overview_file(mermaid_root, project_id);
            tokio::fs::write(&path, overview).await?;
            written.push(path);
        }
    }
    Ok(written)
}

/// `.mmd` files directly under `dir`, used as candidate diagram inputs for
/// the Mermaid business-flow source.
async fn list_mermaid_diagrams(dir: &Path) -> anyhow::Result<Vec<std::path::PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.path().extension().and_then(|e| e.to_str()) == Some("mmd") {
            paths.push(entry.path());
        }
    }
    Ok(paths)
}

async fn derive_flows(
    runtime: &Runtime,
    functions: &[Function],
    index: Arc<dyn VectorIndex>,
    project_id: &str,
    json_flows_root: Option<&Path>,
    mermaid_paths: &[std::path::PathBuf],
) -> anyhow::Result<Vec<BusinessFlow>> {
    let matcher = StepMatcher::new(functions, index, runtime.embedder.clone(), runtime.config.embedding_model.clone(), runtime.config.semantic_match_threshold);
    let processor = BusinessFlowProcessor::new(functions, matcher, runtime.completion.provider.clone(), completion_model_id());
    let flows = processor.derive_flows(json_flows_root, project_id, mermaid_paths).await?;

    let mut split_flows = Vec::with_capacity(flows.len());
    for flow in &flows {
        for (sub_flow, _payload) in processor.assemble_payloads(flow, runtime.config.context_token_budget) {
            split_flows.push(sub_flow);
        }
    }
    Ok(split_flows)
}

/// The model id used for every completion call: description generation,
/// flow extraction, planning context, and validation all share one
/// configured model rather than a per-phase override.
fn completion_model_id() -> String {
    std::env::var("AUDIT_ENGINE_MODEL").unwrap_or_else(|_| "claude-sonnet-4-5".to_string())
}

async fn run_full_pipeline(
    args: &Args,
    project_id: &str,
    functions_file: &Path,
    scan_mode_flags: args::ScanModeFlags,
    json_flows_root: Option<&Path>,
    mermaid_root: Option<&Path>,
    translate_to: Option<String>,
) -> anyhow::Result<()> {
    let runtime = Runtime::assemble(args)?;
    let store = ProjectAuditStore::open(args.workspace.clone(), project_id.to_string()).await?;
    let (functions, files) = ingest(&store, functions_file)?;
    let index = build_vector_index(&runtime, &functions, &files).await?;

    let (call_info, ambiguities) = CallTreeBuilder::new(runtime.config.call_tree_depth).build(&functions);
    if !ambiguities.is_empty() {
        warn!(count = ambiguities.len(), "call-tree builder resolved ambiguous call sites");
    }

    let summarizer = CodeSummarizer::new(runtime.completion.provider.clone(), completion_model_id(), runtime.config.clone(), PLANNER_CONCURRENCY);
    let outcome = summarizer.summarize(&files).await?;
    let mermaid_paths = match mermaid_root {
        Some(root) => write_mermaid_outputs(&outcome, root, project_id).await?,
        None => Vec::new(),
    };

    let flows = derive_flows(&runtime, &functions, index.clone(), project_id, json_flows_root, &mermaid_paths).await?;

    let context = ContextFactory::new(
        functions.clone(),
        files.clone(),
        flows.clone(),
        call_info,
        index,
        runtime.embedder.clone(),
        runtime.config.embedding_model.clone(),
        SizeOptimizer::new(runtime.config.context_token_budget),
    );

    let modes = ActiveScanModes {
        business_flow_code: scan_mode_flags.business_flow_code || (!scan_mode_flags.any_set() && runtime.config.scan_modes.business_flow_code),
        file_code: scan_mode_flags.file_code || (!scan_mode_flags.any_set() && runtime.config.scan_modes.file_code),
        function_code: scan_mode_flags.function_code || (!scan_mode_flags.any_set() && runtime.config.scan_modes.function_code),
    };
    let planner = Planner::new(&store, &context, crate::planner::checklist::default_checklist(), runtime.config.semantic_match_threshold.into());
    let tasks = planner.plan(project_id, modes, &functions, &files, &flows).await?;
    info!(count = tasks.len(), "planning complete, entering validation");

    let validator_config = ValidatorConfig {
        max_confirmation_rounds: runtime.config.max_confirmation_rounds,
        high_confidence_threshold: runtime.config.high_confidence_threshold,
        worker_pool_size: PLANNER_CONCURRENCY,
    };
    let validator_provider = runtime.managed_provider();
    let validator = Validator::new(validator_provider, completion_model_id(), &context, validator_config);
    let validated = validator.run_all(tasks).await;

    for task in &validated {
        store.update_task_fields(task.clone()).await?;
    }

    let processor_provider = runtime.managed_provider();
    let processor_config = ResultProcessorConfig {
        max_group_size: runtime.config.max_group_size,
        clustering_rounds: runtime.config.clustering_rounds,
        worker_pool_size: PLANNER_CONCURRENCY,
        translate_to: translate_to.or(runtime.config.translate_to.clone()),
    };
    let processor = ResultProcessor::new(processor_provider, completion_model_id(), processor_config);
    let findings = processor.process(&validated).await?;
    let summary = RunSummary::from_tasks(&validated).with_usage(&runtime.usage).await;

    println!("{}", serde_json::to_string_pretty(&findings)?);
    eprintln!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn run_flows_only(args: &Args, project_id: &str, functions_file: &Path, json_flows_root: Option<&Path>, mermaid_root: Option<&Path>) -> anyhow::Result<()> {
    let runtime = Runtime::assemble(args)?;
    let store = ProjectAuditStore::new(args.workspace.clone(), project_id);
    let (functions, files) = ingest(&store, functions_file)?;
    let index = build_vector_index(&runtime, &functions, &files).await?;

    let mermaid_paths = match mermaid_root {
        Some(root) => list_mermaid_diagrams(&crate::env::mermaid_dir_path(root, project_id)).await?,
        None => Vec::new(),
    };

    let flows = derive_flows(&runtime, &functions, index, project_id, json_flows_root, &mermaid_paths).await?;
    println!("{}", serde_json::to_string_pretty(&flows)?);
    Ok(())
}

async fn run_plan_only(args: &Args, project_id: &str, functions_file: &Path, scan_mode_flags: args::ScanModeFlags) -> anyhow::Result<()> {
    let runtime = Runtime::assemble(args)?;
    let store = ProjectAuditStore::open(args.workspace.clone(), project_id.to_string()).await?;
    let (functions, files) = ingest(&store, functions_file)?;
    let index = build_vector_index(&runtime, &functions, &files).await?;
    let (call_info, _) = CallTreeBuilder::new(runtime.config.call_tree_depth).build(&functions);

    let context = ContextFactory::new(
        functions.clone(),
        files.clone(),
        Vec::new(),
        call_info,
        index,
        runtime.embedder.clone(),
        runtime.config.embedding_model.clone(),
        SizeOptimizer::new(runtime.config.context_token_budget),
    );

    let modes = ActiveScanModes {
        business_flow_code: scan_mode_flags.business_flow_code,
        file_code: scan_mode_flags.file_code,
        function_code: scan_mode_flags.function_code || !scan_mode_flags.any_set(),
    };
    let planner = Planner::new(&store, &context, crate::planner::checklist::default_checklist(), runtime.config.semantic_match_threshold.into());
    let tasks = planner.plan(project_id, modes, &functions, &files, &[]).await?;
    println!("{}", serde_json::to_string_pretty(&tasks)?);
    Ok(())
}

async fn run_summarize_only(args: &Args, project_id: &str, functions_file: &Path, mermaid_root: &Path) -> anyhow::Result<()> {
    let runtime = Runtime::assemble(args)?;
    let store = ProjectAuditStore::new(args.workspace.clone(), project_id);
    let (_functions, files) = ingest(&store, functions_file)?;
    let summarizer = CodeSummarizer::new(runtime.completion.provider.clone(), completion_model_id(), runtime.config.clone(), PLANNER_CONCURRENCY);
    let outcome = summarizer.summarize(&files).await?;
    let written = write_mermaid_outputs(&outcome, mermaid_root, project_id).await?;
    for path in &written {
        println!("wrote {}", path.display());
    }
    Ok(())
}

async fn run_report(args: &Args, project_id: &str) -> anyhow::Result<()> {
    let runtime = Runtime::assemble(args)?;
    let store = ProjectAuditStore::open(args.workspace.clone(), project_id.to_string()).await?;
    let tasks = store.get_tasks_by_project().await;
    let processor = ResultProcessor::new(
        runtime.managed_provider(),
        completion_model_id(),
        ResultProcessorConfig {
            max_group_size: runtime.config.max_group_size,
            clustering_rounds: runtime.config.clustering_rounds,
            worker_pool_size: PLANNER_CONCURRENCY,
            translate_to: runtime.config.translate_to.clone(),
        },
    );
    let findings = processor.process(&tasks).await?;
    let summary = RunSummary::from_tasks(&tasks).with_usage(&runtime.usage).await;
    println!("{}", serde_json::to_string_pretty(&findings)?);
    eprintln!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
