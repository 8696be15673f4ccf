//! Ingestion of the externally-parsed `functions_to_check` table.
//!
//! The engine never parses source itself — a separate tool is assumed to
//! produce this table. The row's `name` field doubles as the function's
//! unique id (`ContractName.functionName`, or `fileName.functionName` for
//! file-scoped functions); unrecognized extra fields are ignored by serde's
//! default behavior. File records are derived by grouping functions on
//! `relative_file_path` and reading the file's content from disk, since
//! the row schema itself carries no whole-file content column.

use crate::model::function::{Function, SourceFile, StateMutability, Visibility};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RawFunctionRow {
    name: String,
    content: String,
    start_line: u32,
    end_line: u32,
    relative_file_path: String,
    absolute_file_path: String,
    contract_name: String,
    contract_code: String,
    modifiers: Vec<String>,
    visibility: Visibility,
    state_mutability: StateMutability,
}

impl From<RawFunctionRow> for Function {
    fn from(raw: RawFunctionRow) -> Self {
        let short_name = raw.name.rsplit('.').next().unwrap_or(&raw.name).to_string();
        Function {
            id: raw.name,
            name: short_name,
            content: raw.content,
            start_line: raw.start_line,
            end_line: raw.end_line,
            relative_file_path: raw.relative_file_path,
            absolute_file_path: raw.absolute_file_path,
            contract_name: raw.contract_name,
            contract_code: raw.contract_code,
            modifiers: raw.modifiers,
            visibility: raw.visibility,
            state_mutability: raw.state_mutability,
            description: None,
        }
    }
}

pub fn load_functions_file(path: &Path) -> anyhow::Result<Vec<Function>> {
    let content = std::fs::read_to_string(path)?;
    let rows: Vec<RawFunctionRow> = serde_json::from_str(&content)?;
    Ok(rows.into_iter().map(Function::from).collect())
}

/// Group the function table by `relative_file_path` and read each file's
/// content from `absolute_file_path`, producing one [`SourceFile`] per
/// distinct path. A file that can no longer be read from disk is skipped
/// with a warning rather than failing the whole ingestion.
pub fn derive_files(functions: &[Function]) -> Vec<SourceFile> {
    let mut by_path: BTreeMap<&str, (&str, Vec<String>)> = BTreeMap::new();
    for function in functions {
        let entry = by_path
            .entry(function.relative_file_path.as_str())
            .or_insert_with(|| (function.absolute_file_path.as_str(), Vec::new()));
        entry.1.push(function.id.clone());
    }

    by_path
        .into_iter()
        .filter_map(|(relative_path, (absolute_path, function_ids))| {
            match std::fs::read_to_string(absolute_path) {
                Ok(content) => {
                    let mut file = SourceFile::new(relative_path.to_string(), absolute_path.to_string(), content);
                    file.function_ids = function_ids;
                    Some(file)
                }
                Err(err) => {
                    tracing::warn!(relative_path, absolute_path, "could not read source file from disk: {err}");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_functions_to_check_table_ignoring_extra_fields() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("functions.json");
        std::fs::write(
            &path,
            r#"[
                {
                    "name": "TokenVault.deposit",
                    "content": "function deposit() external {}",
                    "start_line": 10,
                    "end_line": 12,
                    "relative_file_path": "contracts/Vault.sol",
                    "absolute_file_path": "/abs/contracts/Vault.sol",
                    "contract_name": "TokenVault",
                    "contract_code": "contract TokenVault {}",
                    "modifiers": [],
                    "visibility": "external",
                    "state_mutability": "nonpayable",
                    "solc_version": "0.8.24"
                }
            ]"#,
        )
        .unwrap();

        let functions = load_functions_file(&path).unwrap();
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].id, "TokenVault.deposit");
    }

    #[test]
    fn derive_files_groups_functions_by_relative_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let abs = dir.path().join("Vault.sol");
        std::fs::write(&abs, "contract TokenVault {}").unwrap();

        let functions = vec![
            Function {
                id: "TokenVault.deposit".into(),
                name: "deposit".into(),
                content: "function deposit() {}".into(),
                start_line: 1,
                end_line: 1,
                relative_file_path: "Vault.sol".into(),
                absolute_file_path: abs.to_string_lossy().into_owned(),
                contract_name: "TokenVault".into(),
                contract_code: String::new(),
                modifiers: Vec::new(),
                visibility: crate::model::function::Visibility::External,
                state_mutability: crate::model::function::StateMutability::Nonpayable,
                description: None,
            },
            Function {
                id: "TokenVault.withdraw".into(),
                name: "withdraw".into(),
                content: "function withdraw() {}".into(),
                start_line: 5,
                end_line: 5,
                relative_file_path: "Vault.sol".into(),
                absolute_file_path: abs.to_string_lossy().into_owned(),
                contract_name: "TokenVault".into(),
                contract_code: String::new(),
                modifiers: Vec::new(),
                visibility: crate::model::function::Visibility::External,
                state_mutability: crate::model::function::StateMutability::Nonpayable,
                description: None,
            },
        ];

        let files = derive_files(&functions);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].function_ids.len(), 2);
    }
}
