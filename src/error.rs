//! Typed errors per component, plus the distinguished invariant-violation
//! variant that is never subject to retry/backoff (spec §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
    #[error("vector index error: {0}")]
    Vector(#[from] VectorIndexError),
    #[error("flow error: {0}")]
    Flow(#[from] FlowError),
    #[error("invariant violation: {0}")]
    Invariant(String),
}

/// A fatal, process-aborting condition (spec §7: "Invariant violation ...
/// fatal for the phase — the engine refuses to proceed rather than emit
/// silently wrong findings").
pub fn invariant(msg: impl Into<String>) -> EngineError {
    EngineError::Invariant(msg.into())
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate function id: {0}")]
    DuplicateFunctionId(String),
    #[error("task not found: {0}")]
    TaskNotFound(uuid::Uuid),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Error, Clone)]
pub enum LlmError {
    #[error("rate limit exceeded: {message}")]
    RateLimit { message: String },
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("context too large: {current} > {max}")]
    ContextTooLarge { current: u64, max: u64 },
    #[error("network error: {0}")]
    Network(String),
    #[error("structured response parse failure: {0}")]
    ParseFailure(String),
    #[error("circuit breaker open for provider {0}")]
    CircuitBreakerOpen(String),
    #[error("max retries exceeded")]
    MaxRetriesExceeded,
}

impl LlmError {
    /// Whether this failure class is transient and eligible for retry
    /// (spec §7 "Transient provider failure").
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimit { .. } | LlmError::Network(_) | LlmError::ProviderUnavailable(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum VectorIndexError {
    #[error("table not found: {0}")]
    TableNotFound(String),
    #[error("row count mismatch for {table}: expected {expected}, found {found}")]
    RowCountMismatch {
        table: String,
        expected: usize,
        found: usize,
    },
    #[error("embedding provider error: {0}")]
    Embedding(String),
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("no step resolved for flow '{0}'")]
    AllStepsUnresolved(String),
    #[error("invalid step syntax: {0}")]
    InvalidStepSyntax(String),
    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
