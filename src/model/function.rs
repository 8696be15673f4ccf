//! Function and file records — the unit of analysis.

use serde::{Deserialize, Serialize};

/// Visibility of a contract/file-scoped function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    External,
    Internal,
    Private,
}

/// State mutability as declared on the function signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateMutability {
    Pure,
    View,
    Payable,
    Nonpayable,
}

/// A single parsed function, as produced by the external parser's
/// `functions_to_check` table.
///
/// `id` is `ContractName.functionName`, or `fileName.functionName` when the
/// function is file-scoped (`contract_name` is empty in that case).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub id: String,
    pub name: String,
    pub content: String,
    pub start_line: u32,
    pub end_line: u32,
    pub relative_file_path: String,
    pub absolute_file_path: String,
    pub contract_name: String,
    pub contract_code: String,
    pub modifiers: Vec<String>,
    pub visibility: Visibility,
    pub state_mutability: StateMutability,
    /// Generated natural-language description, filled in during ingestion.
    pub description: Option<String>,
}

impl Function {
    /// Build the canonical id from contract/file scope and function name.
    pub fn canonical_id(contract_name: &str, file_name: &str, function_name: &str) -> String {
        let scope = if contract_name.is_empty() {
            file_name
        } else {
            contract_name
        };
        format!("{scope}.{function_name}")
    }

    pub fn is_file_scoped(&self) -> bool {
        self.contract_name.is_empty()
    }

    pub fn is_externally_reachable(&self) -> bool {
        matches!(self.visibility, Visibility::Public | Visibility::External)
    }

    /// The text embedded for the `name_embedding` column: `"Contract.function"`.
    pub fn qualified_name(&self) -> String {
        format!(
            "{}.{}",
            if self.contract_name.is_empty() {
                file_stem(&self.relative_file_path)
            } else {
                self.contract_name.clone()
            },
            self.name
        )
    }
}

fn file_stem(relative_path: &str) -> String {
    std::path::Path::new(relative_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(relative_path)
        .to_string()
}

/// A single parsed source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    pub relative_path: String,
    pub absolute_path: String,
    pub content: String,
    pub byte_len: u64,
    pub function_ids: Vec<String>,
    pub extension: String,
    pub description: Option<String>,
}

impl SourceFile {
    pub fn new(relative_path: String, absolute_path: String, content: String) -> Self {
        let byte_len = content.len() as u64;
        let extension = std::path::Path::new(&relative_path)
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_string();
        Self {
            relative_path,
            absolute_path,
            content,
            byte_len,
            function_ids: Vec::new(),
            extension,
            description: None,
        }
    }

    /// First path segment, used to group files by folder in the summarizer's
    /// folder strategy.
    pub fn top_level_folder(&self) -> Option<String> {
        std::path::Path::new(&self.relative_path)
            .components()
            .next()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .filter(|_| self.relative_path.contains('/'))
    }
}
