//! Engine-wide configuration.
//!
//! An immutable record threaded through constructors (spec §9 Design Notes:
//! "implicit globals ... become an immutable configuration record"), loaded
//! via a discovery hierarchy mirroring the teacher's `cli::config` module:
//! current directory, then the user's home directory, then built-in
//! defaults, with `AUDIT_ENGINE_*` environment variables overriding the
//! scan-mode switches and numeric knobs named in spec §6.

use serde::{Deserialize, Serialize};
use std::env as std_env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Scan-mode switches (spec §4.G, §6) — any subset may be active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanModeSwitches {
    pub business_flow_code: bool,
    pub file_code: bool,
    pub function_code: bool,
}

impl Default for ScanModeSwitches {
    fn default() -> Self {
        Self {
            business_flow_code: true,
            file_code: false,
            function_code: true,
        }
    }
}

/// Per-section share of the hybrid context token budget (spec §4.F; the
/// concrete numbers are an Open Question the spec leaves to configuration —
/// see SPEC_FULL.md §D.2).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ContextBudgetShares {
    pub function_body: f32,
    pub call_tree: f32,
    pub rag_neighbors: f32,
    pub file_description: f32,
}

impl Default for ContextBudgetShares {
    fn default() -> Self {
        Self {
            function_body: 0.50,
            call_tree: 0.25,
            rag_neighbors: 0.15,
            file_description: 0.10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub scan_modes: ScanModeSwitches,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub context_token_budget: usize,
    pub context_budget_shares: ContextBudgetShares,
    pub max_confirmation_rounds: u32,
    pub high_confidence_threshold: f32,
    pub clustering_rounds: u32,
    pub max_group_size: usize,
    pub call_tree_depth: u32,
    pub semantic_match_threshold: f32,
    pub max_llm_retries: u32,
    pub circuit_breaker_failure_threshold: u32,
    pub summarizer_max_files_for_incremental: usize,
    pub summarizer_max_top_level_folders_for_incremental: usize,
    pub summarizer_reinforcement_rounds: u32,
    pub summarizer_reinforcement_candidate_count: usize,
    pub translate_to: Option<String>,
    pub json_flows_root: Option<PathBuf>,
    pub mermaid_root: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_modes: ScanModeSwitches::default(),
            embedding_model: "text-embedding-3-large".to_string(),
            embedding_dimension: 3072,
            context_token_budget: 4000,
            context_budget_shares: ContextBudgetShares::default(),
            max_confirmation_rounds: 3,
            high_confidence_threshold: 0.85,
            clustering_rounds: 3,
            max_group_size: 40,
            call_tree_depth: 3,
            semantic_match_threshold: 0.75,
            max_llm_retries: 3,
            circuit_breaker_failure_threshold: 5,
            summarizer_max_files_for_incremental: 30,
            summarizer_max_top_level_folders_for_incremental: 3,
            summarizer_reinforcement_rounds: 1,
            summarizer_reinforcement_candidate_count: 5,
            translate_to: None,
            json_flows_root: None,
            mermaid_root: None,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Apply `AUDIT_ENGINE_*` environment overrides on top of a loaded or
    /// default config (spec §6 scan-mode switches and numeric knobs).
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(v) = std_env::var("SWITCH_BUSINESS_CODE") {
            self.scan_modes.business_flow_code = parse_bool(&v, self.scan_modes.business_flow_code);
        }
        if let Ok(v) = std_env::var("SWITCH_FILE_CODE") {
            self.scan_modes.file_code = parse_bool(&v, self.scan_modes.file_code);
        }
        if let Ok(v) = std_env::var("SWITCH_FUNCTION_CODE") {
            self.scan_modes.function_code = parse_bool(&v, self.scan_modes.function_code);
        }
        if let Ok(v) = std_env::var("EMBEDDING_MODEL") {
            self.embedding_model = v;
        }
        if let Ok(v) = std_env::var("EMBEDDING_DIMENSION")
            && let Ok(n) = v.parse()
        {
            self.embedding_dimension = n;
        }
        if let Ok(v) = std_env::var("CONTEXT_TOKEN_BUDGET")
            && let Ok(n) = v.parse()
        {
            self.context_token_budget = n;
        }
        if let Ok(v) = std_env::var("MAX_CONFIRMATION_ROUNDS")
            && let Ok(n) = v.parse()
        {
            self.max_confirmation_rounds = n;
        }
        if let Ok(v) = std_env::var("CLUSTERING_ROUNDS")
            && let Ok(n) = v.parse()
        {
            self.clustering_rounds = n;
        }
        if let Ok(v) = std_env::var("MAX_GROUP_SIZE")
            && let Ok(n) = v.parse()
        {
            self.max_group_size = n;
        }
        self
    }
}

fn parse_bool(v: &str, default: bool) -> bool {
    match v.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Configuration discovery mirroring the teacher's `cli::config::ConfigDiscovery`:
/// current directory, then user home, then built-in defaults.
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    pub fn discover() -> EngineConfig {
        let config = if let Some(path) = Self::find_config_file() {
            info!("loading configuration from {:?}", path);
            EngineConfig::from_toml_file(&path).unwrap_or_else(|e| {
                tracing::warn!("failed to parse {:?}: {e}; falling back to defaults", path);
                EngineConfig::default()
            })
        } else {
            debug!("no configuration file found, using defaults");
            EngineConfig::default()
        };
        config.apply_env_overrides()
    }

    pub fn find_config_file() -> Option<PathBuf> {
        let mut candidates = Vec::new();
        if let Ok(cwd) = std_env::current_dir() {
            candidates.push(crate::env::local_config_file_path(&cwd));
        }
        if let Some(home) = Self::home_dir() {
            candidates.push(crate::env::user_config_file_path(&home));
        }
        candidates.into_iter().find(|p| p.is_file())
    }

    fn home_dir() -> Option<PathBuf> {
        std_env::var("HOME")
            .ok()
            .or_else(|| std_env::var("USERPROFILE").ok())
            .map(PathBuf::from)
    }
}
