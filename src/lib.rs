//! # Audit Engine
//!
//! Core orchestration engine for AI-driven smart-contract auditing. Given
//! an externally-parsed `functions_to_check` table, the engine derives
//! business flows, retrieves hybrid context around each function, plans
//! and validates findings through an LLM-driven task state machine, and
//! clusters confirmed findings into a final report.
//!
//! ## Architecture Overview
//!
//! - **[`model`]**: function/file/flow/task/finding record types.
//! - **[`store`]**: durable, idempotent project state (functions, files, tasks).
//! - **[`vector`]**: the embedding index and upsert pipeline behind RAG retrieval.
//! - **[`call_tree`]**: static caller/callee graph construction.
//! - **[`business_flow`]**: flow derivation from JSON, Mermaid, or an LLM fallback.
//! - **[`summarizer`]**: incremental and folder-strategy Mermaid diagram synthesis.
//! - **[`context`]**: the hybrid retrieval surface consumed by planning and validation.
//! - **[`planner`]**: scan-mode x checklist-rule task enumeration and dedup.
//! - **[`validator`]**: the per-task confirmation state machine.
//! - **[`result_processor`]**: finding normalization, clustering, and translation.
//! - **[`llm`]**: provider abstraction plus rate limiting, retry, and usage accounting.
//! - **[`cli`]**: the command-line surface tying the pipeline together.

pub mod business_flow;
pub mod call_tree;
pub mod cli;
pub mod config;
pub mod context;
pub mod env;
pub mod error;
pub mod llm;
pub mod model;
pub mod planner;
pub mod result_processor;
pub mod store;
pub mod summarizer;
pub mod validator;
pub mod vector;

pub use config::EngineConfig;
pub use error::{EngineError, FlowError, LlmError, StoreError, VectorIndexError};
pub use model::finding::{Cluster, FinalFinding, Finding};
pub use model::flow::BusinessFlow;
pub use model::function::{Function, SourceFile};
pub use model::task::{ScanMode, Task, TaskStatus};
