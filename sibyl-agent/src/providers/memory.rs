//! Cross-session memory provider: tag-scoped free-text blobs per user.
//!
//! The provider is rate-limited upstream; callers must degrade to an empty
//! context when it is throttled or unauthorized, which the orchestrator does
//! by logging and continuing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use sibyl_core::MemoryProviderSettings;

use super::ProviderError;

#[async_trait::async_trait]
pub trait MemoryProvider: Send + Sync {
    /// Store a text blob under a user id and container tags.
    async fn store(&self, user_id: &str, tags: &[String], text: &str) -> Result<(), ProviderError>;

    /// Retrieve blobs relevant to `query` for a user.
    async fn search(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<String>, ProviderError>;
}

/// Disabled provider: stores nothing, recalls nothing.
#[derive(Debug, Default)]
pub struct NullMemoryProvider;

#[async_trait::async_trait]
impl MemoryProvider for NullMemoryProvider {
    async fn store(
        &self,
        _user_id: &str,
        _tags: &[String],
        _text: &str,
    ) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn search(
        &self,
        _user_id: &str,
        _query: &str,
        _limit: usize,
    ) -> Result<Vec<String>, ProviderError> {
        Ok(Vec::new())
    }
}

// ── HTTP client ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct HttpMemoryProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct StoreRequest<'a> {
    user_id: &'a str,
    tags: &'a [String],
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    user_id: &'a str,
    query: &'a str,
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    memories: Option<Vec<MemoryBlob>>,
}

#[derive(Debug, Deserialize)]
struct MemoryBlob {
    #[serde(default)]
    text: Option<String>,
}

impl HttpMemoryProvider {
    pub fn new(settings: &MemoryProviderSettings, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(settings.timeout_seconds))
                .build()
                .unwrap_or_default(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(format!("{}{path}", self.base_url));
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }
        builder
    }

    fn map_status(status: reqwest::StatusCode, body: String) -> ProviderError {
        match status {
            reqwest::StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                ProviderError::Unauthorized
            }
            _ => ProviderError::Api(format!("HTTP {status}: {body}")),
        }
    }
}

#[async_trait::async_trait]
impl MemoryProvider for HttpMemoryProvider {
    async fn store(&self, user_id: &str, tags: &[String], text: &str) -> Result<(), ProviderError> {
        let response = self
            .request("/memories")
            .json(&StoreRequest { user_id, tags, text })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, body));
        }
        Ok(())
    }

    async fn search(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<String>, ProviderError> {
        let response = self
            .request("/memories/search")
            .json(&SearchRequest {
                user_id,
                query,
                limit,
            })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, body));
        }

        let payload: SearchResponse = response.json().await?;
        Ok(payload
            .memories
            .unwrap_or_default()
            .into_iter()
            .filter_map(|blob| blob.text)
            .collect())
    }
}
