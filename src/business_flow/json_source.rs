//! JSON-file business-flow source (spec §4.D precedence step 1, §6 accepted
//! shapes). Trusted input — no LLM cleaning pass is applied.
//!
//! Adapted from the teacher's `cli::tasks::TaskLoader`, which accepted
//! several on-disk task shapes (single file, markdown list, structured
//! config) and normalized them to one `TaskSpec`; here three JSON shapes
//! normalize to one `RawFlowSpec`.

use crate::error::FlowError;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct RawFlowSpec {
    pub name: String,
    pub steps: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonFlowShape {
    Wrapped { flows: Vec<RawFlowSpec> },
    Single(RawFlowSpec),
    Array(Vec<RawFlowSpec>),
}

/// Parse one JSON flow file, accepting exactly the three shapes named in
/// spec §6.
pub fn parse_flow_file(content: &str) -> Result<Vec<RawFlowSpec>, FlowError> {
    let shape: JsonFlowShape = serde_json::from_str(content)?;
    Ok(match shape {
        JsonFlowShape::Wrapped { flows } => flows,
        JsonFlowShape::Single(spec) => vec![spec],
        JsonFlowShape::Array(specs) => specs,
    })
}

/// Load every `*.json` file under `<json_root>/<project_id>/` (spec §6
/// path layout). Returns `Ok(vec![])` when the directory doesn't exist so
/// callers can fall through to the next precedence source.
pub fn load_project_flows(json_root: &Path, project_id: &str) -> Result<Vec<RawFlowSpec>, FlowError> {
    let dir = crate::env::json_flows_dir_path(json_root, project_id);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut specs = Vec::new();
    let mut paths: Vec<_> = std::fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    paths.sort();

    for path in paths {
        let content = std::fs::read_to_string(&path)?;
        specs.extend(parse_flow_file(&content)?);
    }
    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_all_three_shapes() {
        let wrapped = r#"{"flows":[{"name":"Deposit flow","steps":["TokenVault.deposit"]}]}"#;
        assert_eq!(parse_flow_file(wrapped).unwrap().len(), 1);

        let single = r#"{"name":"Withdraw flow","steps":["TokenVault.withdraw"]}"#;
        assert_eq!(parse_flow_file(single).unwrap()[0].name, "Withdraw flow");

        let array = r#"[{"name":"A","steps":["X.a"]},{"name":"B","steps":["X.b"]}]"#;
        assert_eq!(parse_flow_file(array).unwrap().len(), 2);
    }

    #[test]
    fn loading_a_missing_directory_returns_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let flows = load_project_flows(dir.path(), "nonexistent-project").unwrap();
        assert!(flows.is_empty());
    }

    #[test]
    fn loads_and_sorts_files_from_project_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let project_dir = crate::env::json_flows_dir_path(dir.path(), "proj");
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::write(project_dir.join("b.json"), r#"{"name":"B","steps":["X.b"]}"#).unwrap();
        std::fs::write(project_dir.join("a.json"), r#"{"name":"A","steps":["X.a"]}"#).unwrap();

        let flows = load_project_flows(dir.path(), "proj").unwrap();
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0].name, "A");
    }
}
