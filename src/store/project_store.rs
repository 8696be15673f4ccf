//! Project Audit Store (spec §4.A): the in-memory function/file table plus
//! the durable, idempotent task CRUD surface.
//!
//! Adapted from the teacher's `session::persistence::PersistenceManager` —
//! same atomic write-then-rename discipline — generalized from "one
//! session's conversation state" to "one project's function table and task
//! rows", and from `task::manager`'s idempotent `create_task` keying.

use crate::env;
use crate::error::StoreError;
use crate::model::function::{Function, SourceFile};
use crate::model::task::{ScanMode, Task, TaskId, TaskStatus};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs as async_fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// In-memory function/file table plus durable task rows for one project.
///
/// Task writes are serialized by a per-store mutex guarding the on-disk
/// tasks file (spec §4.A: "concurrent writers must be serialized per
/// project row"); function/file records are read-mostly after ingestion and
/// held in a `DashMap` for lock-free reads.
pub struct ProjectAuditStore {
    workspace_root: PathBuf,
    project_id: String,
    functions: DashMap<String, Function>,
    files: DashMap<String, SourceFile>,
    tasks: Arc<Mutex<Vec<Task>>>,
}

impl ProjectAuditStore {
    pub fn new(workspace_root: PathBuf, project_id: impl Into<String>) -> Self {
        Self {
            workspace_root,
            project_id: project_id.into(),
            functions: DashMap::new(),
            files: DashMap::new(),
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Load a previously-persisted task table for this project, if any.
    pub async fn open(workspace_root: PathBuf, project_id: impl Into<String>) -> Result<Self, StoreError> {
        let project_id = project_id.into();
        let store = Self::new(workspace_root, project_id);
        let path = env::tasks_file_path(&store.workspace_root, &store.project_id);
        if path.is_file() {
            let content = async_fs::read(&path).await?;
            let tasks: Vec<Task> = serde_json::from_slice(&content)?;
            info!(project = %store.project_id, count = tasks.len(), "loaded persisted task table");
            *store.tasks.lock().await = tasks;
        }
        Ok(store)
    }

    /// Ingest the parsed function table for this project (spec §4.A
    /// `load_functions_to_check`, invariant: id unique within a project).
    pub fn load_functions_to_check(&self, functions: Vec<Function>) -> Result<(), StoreError> {
        for function in functions {
            if self.functions.contains_key(&function.id) {
                return Err(StoreError::DuplicateFunctionId(function.id));
            }
            self.functions.insert(function.id.clone(), function);
        }
        Ok(())
    }

    pub fn load_files(&self, files: Vec<SourceFile>) {
        for file in files {
            self.files.insert(file.relative_path.clone(), file);
        }
    }

    pub fn function(&self, id: &str) -> Option<Function> {
        self.functions.get(id).map(|r| r.clone())
    }

    pub fn all_functions(&self) -> Vec<Function> {
        self.functions.iter().map(|r| r.value().clone()).collect()
    }

    pub fn all_files(&self) -> Vec<SourceFile> {
        self.files.iter().map(|r| r.value().clone()).collect()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Idempotent task creation keyed by `(project_id, target_id, rule_key,
    /// scan_mode)` (spec §4.A, §4.G, §8 "Task keying"): a duplicate create
    /// returns the existing row instead of inserting a new one.
    pub async fn create_task(&self, candidate: Task) -> Result<Task, StoreError> {
        let mut tasks = self.tasks.lock().await;
        if let Some(existing) = tasks.iter().find(|t| t.key() == candidate.key()) {
            debug!(task = %existing.id, "task already planned, reusing existing row");
            return Ok(existing.clone());
        }
        tasks.push(candidate.clone());
        drop(tasks);
        self.persist().await?;
        Ok(candidate)
    }

    pub async fn get_tasks_by_project(&self) -> Vec<Task> {
        self.tasks.lock().await.clone()
    }

    pub async fn find_task(&self, target_id: &str, rule_key: &str, scan_mode: ScanMode) -> Option<Task> {
        let key = (self.project_id.clone(), target_id.to_string(), rule_key.to_string(), scan_mode);
        self.tasks.lock().await.iter().find(|t| t.key() == key).cloned()
    }

    pub async fn update_task_fields(&self, task: Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.lock().await;
        let slot = tasks
            .iter_mut()
            .find(|t| t.id == task.id)
            .ok_or(StoreError::TaskNotFound(task.id))?;
        *slot = task;
        drop(tasks);
        self.persist().await
    }

    pub async fn task_by_id(&self, id: TaskId) -> Option<Task> {
        self.tasks.lock().await.iter().find(|t| t.id == id).cloned()
    }

    /// Tasks left in a non-terminal state after a clean shutdown would
    /// violate spec §8's "safety on failure" invariant; callers use this to
    /// assert the invariant in tests and before a graceful exit.
    pub async fn non_terminal_tasks(&self) -> Vec<Task> {
        self.tasks.lock().await.iter().filter(|t| !t.status.is_terminal()).cloned().collect()
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let path = env::tasks_file_path(&self.workspace_root, &self.project_id);
        if let Some(parent) = path.parent() {
            async_fs::create_dir_all(parent).await?;
        }
        let tasks = self.tasks.lock().await;
        let serialized = serde_json::to_vec_pretty(&*tasks)?;
        let tmp_path = path.with_extension("json.tmp");
        async_fs::write(&tmp_path, &serialized).await?;
        async_fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    /// Snapshot the task table to a named checkpoint file (SPEC_FULL.md §B
    /// "checkpointing"), generalized from the teacher's
    /// `PersistenceManager::create_checkpoint`.
    pub async fn checkpoint(&self, checkpoint_id: &str) -> Result<(), StoreError> {
        let path = env::checkpoint_file_path(&self.workspace_root, &self.project_id, checkpoint_id);
        if let Some(parent) = path.parent() {
            async_fs::create_dir_all(parent).await?;
        }
        let tasks = self.tasks.lock().await;
        let serialized = serde_json::to_vec_pretty(&*tasks)?;
        async_fs::write(&path, serialized).await?;
        info!(project = %self.project_id, checkpoint = checkpoint_id, "wrote task-table checkpoint");
        Ok(())
    }

    pub async fn restore_checkpoint(&self, checkpoint_id: &str) -> Result<(), StoreError> {
        let path = env::checkpoint_file_path(&self.workspace_root, &self.project_id, checkpoint_id);
        let content = async_fs::read(&path).await?;
        let tasks: Vec<Task> = serde_json::from_slice(&content)?;
        *self.tasks.lock().await = tasks;
        Ok(())
    }
}

/// Report tasks still sitting in `Planned`/`Analyzing`/`Confirming` — used by
/// the CLI's graceful-shutdown path to verify spec §8's safety invariant.
pub fn assert_no_stuck_tasks(tasks: &[Task]) -> Result<(), StoreError> {
    for task in tasks {
        if !task.status.is_terminal() {
            if let TaskStatus::Planned = task.status {
                continue;
            }
            return Err(StoreError::TaskNotFound(task.id));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::function::{StateMutability, Visibility};
    use crate::model::task::ChecklistRule;

    fn function(id: &str) -> Function {
        Function {
            id: id.to_string(),
            name: "deposit".to_string(),
            content: "function deposit() {}".to_string(),
            start_line: 1,
            end_line: 1,
            relative_file_path: "Vault.sol".to_string(),
            absolute_file_path: "/x/Vault.sol".to_string(),
            contract_name: "TokenVault".to_string(),
            contract_code: "contract TokenVault {}".to_string(),
            modifiers: Vec::new(),
            visibility: Visibility::Public,
            state_mutability: StateMutability::Nonpayable,
            description: None,
        }
    }

    fn rule() -> ChecklistRule {
        ChecklistRule { key: "reentrancy".into(), prompt_fragment: "check reentrancy".into() }
    }

    #[tokio::test]
    async fn duplicate_function_ids_are_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ProjectAuditStore::new(dir.path().to_path_buf(), "proj");
        store.load_functions_to_check(vec![function("TokenVault.deposit")]).unwrap();
        let err = store.load_functions_to_check(vec![function("TokenVault.deposit")]).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateFunctionId(_)));
    }

    #[tokio::test]
    async fn creating_a_task_twice_returns_the_existing_row() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ProjectAuditStore::new(dir.path().to_path_buf(), "proj");
        let task = Task::new("proj", "deposit", rule(), ScanMode::Function, "TokenVault.deposit", "body", "ctx");
        let first = store.create_task(task.clone()).await.unwrap();
        let second = store.create_task(Task::new(
            "proj", "deposit", rule(), ScanMode::Function, "TokenVault.deposit", "different body", "ctx",
        ))
        .await
        .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.get_tasks_by_project().await.len(), 1);
    }

    #[tokio::test]
    async fn tasks_survive_a_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        {
            let store = ProjectAuditStore::new(root.clone(), "proj");
            let task = Task::new("proj", "deposit", rule(), ScanMode::Function, "TokenVault.deposit", "body", "ctx");
            store.create_task(task).await.unwrap();
        }
        let reopened = ProjectAuditStore::open(root, "proj").await.unwrap();
        assert_eq!(reopened.get_tasks_by_project().await.len(), 1);
    }
}
