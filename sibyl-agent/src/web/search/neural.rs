//! Exa-style neural search client.
//!
//! One retry on throttle: when the provider answers 429 the client sleeps
//! for the advertised Retry-After (capped) and resends once before giving
//! up with [`SearchError::RateLimited`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use sibyl_core::SearchProviderSettings;

use super::{SearchDocument, SearchError, SearchProvider, SearchType, WebSearchRequest};

const MAX_RETRY_AFTER: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct NeuralSearchClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct SearchPayload<'a> {
    query: &'a str,
    #[serde(rename = "numResults")]
    num_results: usize,
    #[serde(rename = "type")]
    search_type: &'static str,
    #[serde(rename = "useAutoprompt")]
    use_autoprompt: bool,
    #[serde(rename = "includeDomains", skip_serializing_if = "<[_]>::is_empty")]
    include_domains: &'a [String],
}

#[derive(Debug, Serialize)]
struct ContentsPayload<'a> {
    ids: &'a [String],
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<WireResult>,
}

#[derive(Debug, Deserialize)]
struct WireResult {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl NeuralSearchClient {
    pub fn new(settings: &SearchProviderSettings, api_key: Option<String>) -> Result<Self, SearchError> {
        let api_key = api_key.ok_or(SearchError::MissingApiKey("SIBYL_SEARCH_API_KEY"))?;
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(settings.timeout_seconds))
                .build()
                .unwrap_or_default(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<SearchResponse, SearchError> {
        let url = format!("{}{path}", self.base_url);
        let mut attempted_retry = false;

        loop {
            let response = self
                .client
                .post(&url)
                .header("x-api-key", &self.api_key)
                .json(payload)
                .send()
                .await
                .map_err(|err| SearchError::RequestFailed(err.to_string()))?;

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let wait = retry_after(&response).unwrap_or(Duration::from_secs(1));
                if attempted_retry {
                    return Err(SearchError::RateLimited(wait));
                }
                attempted_retry = true;
                let wait = wait.min(MAX_RETRY_AFTER);
                warn!("search provider throttled, retrying after {wait:?}");
                tokio::time::sleep(wait).await;
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SearchError::RequestFailed(format!("HTTP {status}: {body}")));
            }

            return response
                .json()
                .await
                .map_err(|err| SearchError::RequestFailed(err.to_string()));
        }
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn into_documents(results: Vec<WireResult>, char_cap: Option<usize>) -> Vec<SearchDocument> {
    results
        .into_iter()
        .filter_map(|result| {
            let Some(url) = result.url else {
                debug!("dropping search result without a url");
                return None;
            };
            let mut text = result.text.unwrap_or_default();
            if let Some(cap) = char_cap {
                if text.len() > cap {
                    let mut cut = cap;
                    while cut > 0 && !text.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    text.truncate(cut);
                }
            }
            Some(SearchDocument {
                id: result.id.unwrap_or_else(|| url.clone()),
                title: result.title.unwrap_or_else(|| url.clone()),
                text,
                url,
            })
        })
        .collect()
}

#[async_trait::async_trait]
impl SearchProvider for NeuralSearchClient {
    async fn search(&self, request: &WebSearchRequest) -> Result<Vec<SearchDocument>, SearchError> {
        let payload = SearchPayload {
            query: &request.query,
            num_results: request.num_results,
            search_type: match request.search_type {
                SearchType::Neural => "neural",
                SearchType::Keyword => "keyword",
            },
            use_autoprompt: request.use_autoprompt,
            include_domains: &request.include_domains,
        };
        let response = self.post_json("/search", &payload).await?;
        Ok(into_documents(response.results, None))
    }

    async fn fetch_contents(
        &self,
        ids: &[String],
        char_cap: usize,
    ) -> Result<Vec<SearchDocument>, SearchError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let response = self.post_json("/contents", &ContentsPayload { ids }).await?;
        Ok(into_documents(response.results, Some(char_cap)))
    }
}
