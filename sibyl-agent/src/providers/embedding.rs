//! Embedding provider with a deterministic fallback.
//!
//! Embedding failures never surface as errors: the service falls back to a
//! hash-derived pseudo-embedding so similarity comparisons stay
//! well-defined, just lower quality. Vectors are cached by text hash to
//! avoid recomputing embeddings for repeated text within a session.

use std::time::Duration;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::warn;

use sibyl_core::{CacheSettings, EmbeddingSettings};

use super::ProviderError;
use crate::cache::TimedCache;

#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// HTTP embedding client.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Debug, serde::Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Option<Vec<Vec<f32>>>,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

impl HttpEmbeddingClient {
    pub fn new(settings: &EmbeddingSettings) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(settings.timeout_seconds))
                .build()
                .unwrap_or_default(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
        }
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let url = format!("{}/api/embed", self.base_url);
        let body = EmbedRequest {
            model: &self.model,
            input: text,
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(format!("HTTP {status}: {body}")));
        }

        let payload: EmbedResponse = response.json().await?;
        if let Some(mut embeddings) = payload.embeddings {
            if !embeddings.is_empty() {
                return Ok(embeddings.swap_remove(0));
            }
        }
        if let Some(embedding) = payload.embedding {
            return Ok(embedding);
        }
        Err(ProviderError::InvalidFormat(
            "embedding response missing vectors".to_string(),
        ))
    }
}

/// Cache + fallback wrapper around an [`EmbeddingProvider`].
pub struct EmbeddingService {
    provider: Box<dyn EmbeddingProvider>,
    cache: TimedCache<String, Vec<f32>>,
    dimension: usize,
}

impl EmbeddingService {
    pub fn new(provider: Box<dyn EmbeddingProvider>, settings: &EmbeddingSettings, cache: &CacheSettings) -> Self {
        Self {
            provider,
            cache: TimedCache::new(Duration::from_secs(cache.embedding_ttl_seconds)),
            dimension: settings.dimension,
        }
    }

    /// Embed text, consulting the hash-keyed cache first. Infallible: on
    /// provider failure the deterministic pseudo-embedding is used.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        let key = text_hash(text);
        if let Some(cached) = self.cache.get(&key).await {
            return cached;
        }

        let vector = match self.provider.embed(text).await {
            Ok(vector) if !vector.is_empty() => vector,
            Ok(_) => {
                warn!("embedding provider returned an empty vector, using fallback");
                pseudo_embedding(text, self.dimension)
            }
            Err(err) => {
                warn!("embedding provider failed ({err}), using fallback");
                pseudo_embedding(text, self.dimension)
            }
        };

        self.cache.set(key, vector.clone()).await;
        vector
    }

    /// Clear the embedding cache (tests).
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }
}

/// Stable cache key for a text.
pub fn text_hash(text: &str) -> String {
    let digest = Sha256::digest(text.trim().to_lowercase().as_bytes());
    hex::encode(digest)
}

/// Deterministic unit-norm vector derived from repeated hashing of the text.
pub fn pseudo_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let normalized = text.trim().to_lowercase();
    let mut values = Vec::with_capacity(dimension);
    let mut counter: u32 = 0;
    while values.len() < dimension {
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hasher.update(counter.to_le_bytes());
        let digest = hasher.finalize();
        for byte in digest {
            if values.len() >= dimension {
                break;
            }
            // Map bytes into [-1, 1].
            values.push(byte as f32 / 127.5 - 1.0);
        }
        counter += 1;
    }

    let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut values {
            *value /= norm;
        }
    }
    values
}

/// Cosine similarity between two vectors; zero when lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingProvider;

    #[async_trait::async_trait]
    impl EmbeddingProvider for FailingProvider {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            Err(ProviderError::Api("down".to_string()))
        }
    }

    #[test]
    fn pseudo_embedding_is_deterministic_and_normalized() {
        let a = pseudo_embedding("Ada Lovelace", 64);
        let b = pseudo_embedding("ada lovelace  ", 64);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn different_texts_diverge() {
        let a = pseudo_embedding("alpha", 64);
        let b = pseudo_embedding("beta", 64);
        assert!(cosine_similarity(&a, &b) < 0.9);
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.1, 0.2, 0.3];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_length_mismatch_is_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn service_falls_back_and_caches() {
        let service = EmbeddingService::new(
            Box::new(FailingProvider),
            &EmbeddingSettings::default(),
            &CacheSettings::default(),
        );
        let first = service.embed("query").await;
        let second = service.embed("query").await;
        assert_eq!(first, second);
        assert_eq!(first.len(), EmbeddingSettings::default().dimension);
    }
}
