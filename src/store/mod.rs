//! Project Audit Store (spec §4.A): function/file table plus durable,
//! idempotent task and prompt-cache persistence.

pub mod project_store;
pub mod prompt_cache;

pub use project_store::ProjectAuditStore;
pub use prompt_cache::{CacheEntry, PromptCache};
