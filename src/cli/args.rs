//! Command-line argument parsing: subcommands for the full pipeline
//! (`run`), individual phases (`plan`, `summarize`, `flows`), and the
//! final report (`report`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "audit-engine")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Core orchestration engine for AI-driven smart-contract auditing")]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// Path to a TOML config file, overriding the discovery hierarchy.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Workspace root under which `.audit-engine/<project_id>/` is kept.
    #[arg(long, global = true, default_value = ".")]
    pub workspace: PathBuf,
    #[command(subcommand)]
    pub command: Commands,
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }
}

#[derive(Debug, Clone, Copy, Default, clap::Args)]
pub struct ScanModeFlags {
    /// One task per business flow.
    #[arg(long)]
    pub business_flow_code: bool,
    /// One task per file.
    #[arg(long)]
    pub file_code: bool,
    /// One task per function.
    #[arg(long)]
    pub function_code: bool,
}

impl ScanModeFlags {
    pub fn any_set(&self) -> bool {
        self.business_flow_code || self.file_code || self.function_code
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the full pipeline: ingest, summarize, derive flows, plan, validate, report.
    Run {
        project_id: String,
        /// Path to the `functions_to_check` JSON table produced by the external parser.
        #[arg(long)]
        functions_file: PathBuf,
        #[command(flatten)]
        scan_modes: ScanModeFlags,
        /// Root directory of business-flow JSON files (`<root>/<project_id>/*.json`).
        #[arg(long)]
        json_flows_root: Option<PathBuf>,
        /// Root directory of Mermaid diagram inputs (`<root>/<project_id>/`).
        #[arg(long)]
        mermaid_root: Option<PathBuf>,
        /// Translate final findings to this language.
        #[arg(long)]
        translate_to: Option<String>,
    },
    /// Derive business flows only and print them as JSON.
    Flows {
        project_id: String,
        #[arg(long)]
        functions_file: PathBuf,
        #[arg(long)]
        json_flows_root: Option<PathBuf>,
        #[arg(long)]
        mermaid_root: Option<PathBuf>,
    },
    /// Enumerate and persist tasks without running the validator.
    Plan {
        project_id: String,
        #[arg(long)]
        functions_file: PathBuf,
        #[command(flatten)]
        scan_modes: ScanModeFlags,
    },
    /// Build the incremental/folder-strategy diagram and write it under `--mermaid-root`.
    Summarize {
        project_id: String,
        #[arg(long)]
        functions_file: PathBuf,
        #[arg(long)]
        mermaid_root: PathBuf,
    },
    /// Print the final clustered-findings report for an already-planned project.
    Report { project_id: String },
}
