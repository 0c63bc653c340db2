use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Missing or empty required input; rejected before any tool runs.
    #[error("invalid query: {0}")]
    Validation(String),
    /// Client exceeded the fixed-window submission limit.
    #[error("rate limited, retry after {0:?}")]
    RateLimited(Duration),
    #[error(transparent)]
    Store(#[from] sibyl_store::StoreError),
    /// Top-level unexpected fault; per-tool failures are recorded in the
    /// trace instead of surfacing here.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type AgentResult<T> = Result<T, AgentError>;
