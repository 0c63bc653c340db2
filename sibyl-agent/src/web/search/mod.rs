//! Neural web-search provider boundary.
//!
//! Provider payloads are mapped into [`SearchDocument`] at this boundary;
//! malformed entries are logged and dropped rather than propagated inward.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod neural;

/// Ranked document returned by the search provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchDocument {
    pub id: String,
    pub title: String,
    pub text: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    #[default]
    Neural,
    Keyword,
}

/// Search request with provider tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchRequest {
    pub query: String,
    pub num_results: usize,
    pub search_type: SearchType,
    pub use_autoprompt: bool,
    #[serde(default)]
    pub include_domains: Vec<String>,
}

impl WebSearchRequest {
    pub fn new(query: impl Into<String>, num_results: usize) -> Self {
        Self {
            query: query.into(),
            num_results,
            search_type: SearchType::Neural,
            use_autoprompt: true,
            include_domains: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("missing API key ({0})")]
    MissingApiKey(&'static str),
    #[error("rate limited, retry after {0:?}")]
    RateLimited(Duration),
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("content fetch is not supported by this provider")]
    ContentsUnsupported,
}

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, request: &WebSearchRequest) -> Result<Vec<SearchDocument>, SearchError>;

    /// Fetch full document contents by id, truncated to `char_cap` chars.
    async fn fetch_contents(
        &self,
        _ids: &[String],
        _char_cap: usize,
    ) -> Result<Vec<SearchDocument>, SearchError> {
        Err(SearchError::ContentsUnsupported)
    }
}
