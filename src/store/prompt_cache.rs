//! Read-through prompt cache (spec §3 "Prompt cache entry", §5 "shared
//! resource policy"): keyed by a hash of (prompt text, model id, temperature
//! class); never evicted within a project run.
//!
//! Adapted from the teacher's `session::persistence` atomic write-then-rename
//! discipline, applied to a flat key-value table instead of a session blob.

use crate::env;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tokio::fs as async_fs;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub response: String,
    pub created_at: DateTime<Utc>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Hash a `CompletionRequest::cache_fingerprint()` string into the cache's
/// key space.
pub fn cache_key(fingerprint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct PromptCache {
    workspace_root: PathBuf,
    project_id: String,
    entries: DashMap<String, CacheEntry>,
    write_lock: Mutex<()>,
}

impl PromptCache {
    pub fn new(workspace_root: PathBuf, project_id: impl Into<String>) -> Self {
        Self {
            workspace_root,
            project_id: project_id.into(),
            entries: DashMap::new(),
            write_lock: Mutex::new(()),
        }
    }

    pub async fn open(workspace_root: PathBuf, project_id: impl Into<String>) -> Result<Self, StoreError> {
        let cache = Self::new(workspace_root, project_id);
        let path = env::prompt_cache_file_path(&cache.workspace_root, &cache.project_id);
        if path.is_file() {
            let content = async_fs::read(&path).await?;
            let entries: std::collections::HashMap<String, CacheEntry> = serde_json::from_slice(&content)?;
            for (k, v) in entries {
                cache.entries.insert(k, v);
            }
        }
        Ok(cache)
    }

    pub fn get(&self, fingerprint: &str) -> Option<CacheEntry> {
        self.entries.get(&cache_key(fingerprint)).map(|r| r.clone())
    }

    /// Last-write-wins on a collision (spec §5: "writes are last-write-wins
    /// on a collision — cache keys are pure functions of prompt + model
    /// config", so a collision only happens on true re-issue of the same
    /// logical request).
    pub async fn put(&self, fingerprint: &str, entry: CacheEntry) -> Result<(), StoreError> {
        self.entries.insert(cache_key(fingerprint), entry);
        self.persist().await
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = env::prompt_cache_file_path(&self.workspace_root, &self.project_id);
        if let Some(parent) = path.parent() {
            async_fs::create_dir_all(parent).await?;
        }
        let snapshot: std::collections::HashMap<String, CacheEntry> =
            self.entries.iter().map(|r| (r.key().clone(), r.value().clone())).collect();
        let serialized = serde_json::to_vec_pretty(&snapshot)?;
        let tmp_path = path.with_extension("json.tmp");
        async_fs::write(&tmp_path, &serialized).await?;
        async_fs::rename(&tmp_path, &path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str) -> CacheEntry {
        CacheEntry { response: text.to_string(), created_at: Utc::now(), input_tokens: 10, output_tokens: 20 }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = PromptCache::new(dir.path().to_path_buf(), "proj");
        cache.put("prompt|model|deterministic", entry("hello")).await.unwrap();
        let fetched = cache.get("prompt|model|deterministic").unwrap();
        assert_eq!(fetched.response, "hello");
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        {
            let cache = PromptCache::new(root.clone(), "proj");
            cache.put("k", entry("v")).await.unwrap();
        }
        let reopened = PromptCache::open(root, "proj").await.unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get("k").unwrap().response, "v");
    }
}
