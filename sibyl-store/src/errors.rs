#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("namespace '{namespace}' unreachable at {endpoint}: {reason}")]
    Connection {
        namespace: String,
        endpoint: String,
        reason: String,
    },
    #[error("namespace '{0}' is not configured")]
    UnknownNamespace(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("unknown entity: {0}")]
    UnknownEntity(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
