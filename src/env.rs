//! Environment constants and path utilities for the audit engine.
//!
//! Centralizes the on-disk layout under a project's hidden `.audit-engine`
//! directory so the rest of the crate never hardcodes a path literal.

use std::path::PathBuf;

pub const ENGINE_DIR_NAME: &str = ".audit-engine";
pub const CONFIG_FILE_NAME: &str = "config.toml";

pub mod project {
    pub const TASKS_DIR_NAME: &str = "tasks";
    pub const CACHE_DIR_NAME: &str = "prompt_cache";
    pub const CHECKPOINTS_DIR_NAME: &str = "checkpoints";
    pub const VECTOR_DIR_NAME: &str = "vectors";
    pub const MERMAID_DIR_NAME: &str = "mermaid";
    pub const JSON_FLOWS_DIR_NAME: &str = "flows";
}

pub fn engine_dir_path(workspace_root: &std::path::Path) -> PathBuf {
    workspace_root.join(ENGINE_DIR_NAME)
}

pub fn project_dir_path(workspace_root: &std::path::Path, project_id: &str) -> PathBuf {
    engine_dir_path(workspace_root).join(project_id)
}

pub fn tasks_file_path(workspace_root: &std::path::Path, project_id: &str) -> PathBuf {
    project_dir_path(workspace_root, project_id)
        .join(project::TASKS_DIR_NAME)
        .join("tasks.json")
}

pub fn prompt_cache_file_path(workspace_root: &std::path::Path, project_id: &str) -> PathBuf {
    project_dir_path(workspace_root, project_id)
        .join(project::CACHE_DIR_NAME)
        .join("cache.json")
}

pub fn checkpoint_file_path(
    workspace_root: &std::path::Path,
    project_id: &str,
    checkpoint_id: &str,
) -> PathBuf {
    project_dir_path(workspace_root, project_id)
        .join(project::CHECKPOINTS_DIR_NAME)
        .join(format!("{checkpoint_id}.json"))
}

pub fn vector_dir_path(workspace_root: &std::path::Path, project_id: &str) -> PathBuf {
    project_dir_path(workspace_root, project_id).join(project::VECTOR_DIR_NAME)
}

/// `<mermaid_root>/<project_id>/` (spec §6).
pub fn mermaid_dir_path(mermaid_root: &std::path::Path, project_id: &str) -> PathBuf {
    mermaid_root.join(project_id)
}

pub fn mermaid_business_flow_file(mermaid_root: &std::path::Path, project_id: &str) -> PathBuf {
    mermaid_dir_path(mermaid_root, project_id).join(format!("{project_id}_business_flow.mmd"))
}

pub fn mermaid_folder_file(mermaid_root: &std::path::Path, project_id: &str, folder: &str) -> PathBuf {
    mermaid_dir_path(mermaid_root, project_id).join(format!("{project_id}_{folder}.mmd"))
}

pub fn mermaid_global_overview_file(mermaid_root: &std::path::Path, project_id: &str) -> PathBuf {
    mermaid_dir_path(mermaid_root, project_id).join(format!("{project_id}_global_overview.mmd"))
}

/// `<json_root>/<project_id>/*.json` (spec §4.D, §6).
pub fn json_flows_dir_path(json_root: &std::path::Path, project_id: &str) -> PathBuf {
    json_root.join(project_id)
}

pub fn user_config_file_path(home_dir: &std::path::Path) -> PathBuf {
    home_dir.join(ENGINE_DIR_NAME).join(CONFIG_FILE_NAME)
}

pub fn local_config_file_path(current_dir: &std::path::Path) -> PathBuf {
    current_dir.join(ENGINE_DIR_NAME).join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn project_paths_nest_under_engine_dir() {
        let root = Path::new("/work");
        assert_eq!(
            tasks_file_path(root, "proj-1"),
            Path::new("/work/.audit-engine/proj-1/tasks/tasks.json")
        );
        assert_eq!(
            checkpoint_file_path(root, "proj-1", "cp-1"),
            Path::new("/work/.audit-engine/proj-1/checkpoints/cp-1.json")
        );
    }

    #[test]
    fn mermaid_paths_match_spec_layout() {
        let root = Path::new("/mermaid");
        assert_eq!(
            mermaid_business_flow_file(root, "proj-1"),
            Path::new("/mermaid/proj-1/proj-1_business_flow.mmd")
        );
        assert_eq!(
            mermaid_folder_file(root, "proj-1", "contracts"),
            Path::new("/mermaid/proj-1/proj-1_contracts.mmd")
        );
        assert_eq!(
            mermaid_global_overview_file(root, "proj-1"),
            Path::new("/mermaid/proj-1/proj-1_global_overview.mmd")
        );
    }
}
