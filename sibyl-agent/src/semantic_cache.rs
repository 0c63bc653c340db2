//! Answer cache with similarity reads.
//!
//! Writes are keyed exactly by (user, namespace, query) so a repeat of the
//! same question overwrites in place. Reads match by embedding similarity,
//! so a paraphrase of a recently answered question can reuse its answer.
//! Expired entries are purged lazily during reads.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use sibyl_core::CacheSettings;

use crate::providers::embedding::cosine_similarity;
use crate::trace::ToolUsage;

/// One cached answer with the trace that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedAnswer {
    pub query: String,
    #[serde(skip)]
    pub query_embedding: Vec<f32>,
    pub answer_text: String,
    /// Where the answer came from ("local", "web", "cache" is never stored).
    pub source_tag: String,
    pub reasoning: String,
    pub tool_trace: Vec<ToolUsage>,
    pub timestamp: DateTime<Utc>,
}

struct Entry {
    answer: CachedAnswer,
    stored_at: Instant,
    sequence: u64,
}

/// Similarity hit: the answer plus how close the query matched.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub answer: CachedAnswer,
    pub similarity: f32,
}

pub struct ResponseSemanticCache {
    entries: RwLock<HashMap<(String, String), Vec<Entry>>>,
    ttl: Duration,
    similarity_threshold: f32,
    sequence: std::sync::atomic::AtomicU64,
}

impl ResponseSemanticCache {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Duration::from_secs(settings.answer_ttl_seconds),
            similarity_threshold: settings.answer_similarity_threshold,
            sequence: std::sync::atomic::AtomicU64::new(0),
        }
    }

    fn scope(user_id: &str, namespace: &str) -> (String, String) {
        (user_id.to_string(), namespace.to_string())
    }

    /// Store an answer under its exact query key, replacing any previous
    /// answer for the same (user, namespace, query).
    pub async fn store(&self, user_id: &str, namespace: &str, answer: CachedAnswer) {
        let sequence = self
            .sequence
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let mut entries = self.entries.write().await;
        let bucket = entries.entry(Self::scope(user_id, namespace)).or_default();
        bucket.retain(|entry| entry.answer.query != answer.query);
        bucket.push(Entry {
            answer,
            stored_at: Instant::now(),
            sequence,
        });
    }

    /// Find the most similar live answer for a query embedding. Ties in
    /// similarity keep the earlier-stored answer.
    pub async fn lookup(
        &self,
        user_id: &str,
        namespace: &str,
        query_embedding: &[f32],
    ) -> Option<CacheHit> {
        let mut entries = self.entries.write().await;
        let bucket = entries.get_mut(&Self::scope(user_id, namespace))?;
        bucket.retain(|entry| entry.stored_at.elapsed() < self.ttl);

        let mut best: Option<(&Entry, f32)> = None;
        for entry in bucket.iter() {
            let similarity = cosine_similarity(query_embedding, &entry.answer.query_embedding);
            if similarity < self.similarity_threshold {
                continue;
            }
            let better = match best {
                None => true,
                Some((current, current_similarity)) => {
                    similarity > current_similarity
                        || (similarity == current_similarity && entry.sequence < current.sequence)
                }
            };
            if better {
                best = Some((entry, similarity));
            }
        }

        best.map(|(entry, similarity)| {
            debug!(
                similarity,
                query = %entry.answer.query,
                "semantic cache hit"
            );
            CacheHit {
                answer: entry.answer.clone(),
                similarity,
            }
        })
    }

    /// Exact-query lookup, still TTL-bounded.
    pub async fn lookup_exact(
        &self,
        user_id: &str,
        namespace: &str,
        query: &str,
    ) -> Option<CachedAnswer> {
        let mut entries = self.entries.write().await;
        let bucket = entries.get_mut(&Self::scope(user_id, namespace))?;
        bucket.retain(|entry| entry.stored_at.elapsed() < self.ttl);
        bucket
            .iter()
            .find(|entry| entry.answer.query == query)
            .map(|entry| entry.answer.clone())
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Live entry count across all scopes (tests).
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::embedding::pseudo_embedding;

    fn answer(query: &str, text: &str, dimension: usize) -> CachedAnswer {
        CachedAnswer {
            query: query.to_string(),
            query_embedding: pseudo_embedding(query, dimension),
            answer_text: text.to_string(),
            source_tag: "local".to_string(),
            reasoning: String::new(),
            tool_trace: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    fn cache(ttl_seconds: u64, threshold: f32) -> ResponseSemanticCache {
        ResponseSemanticCache::new(&CacheSettings {
            answer_ttl_seconds: ttl_seconds,
            answer_similarity_threshold: threshold,
            embedding_ttl_seconds: 3600,
        })
    }

    #[tokio::test]
    async fn identical_query_is_a_hit() {
        let cache = cache(300, 0.7);
        cache
            .store("u1", "general", answer("who is ada", "Ada.", 64))
            .await;
        let probe = pseudo_embedding("who is ada", 64);
        let hit = cache.lookup("u1", "general", &probe).await.expect("hit");
        assert_eq!(hit.answer.answer_text, "Ada.");
        assert!(hit.similarity > 0.99);
    }

    #[tokio::test]
    async fn scopes_do_not_leak_across_users_or_namespaces() {
        let cache = cache(300, 0.7);
        cache
            .store("u1", "general", answer("who is ada", "Ada.", 64))
            .await;
        let probe = pseudo_embedding("who is ada", 64);
        assert!(cache.lookup("u2", "general", &probe).await.is_none());
        assert!(cache.lookup("u1", "research", &probe).await.is_none());
    }

    #[tokio::test]
    async fn same_query_overwrites_in_place() {
        let cache = cache(300, 0.7);
        cache
            .store("u1", "general", answer("who is ada", "old", 64))
            .await;
        cache
            .store("u1", "general", answer("who is ada", "new", 64))
            .await;
        assert_eq!(cache.len().await, 1);
        let stored = cache
            .lookup_exact("u1", "general", "who is ada")
            .await
            .expect("exact");
        assert_eq!(stored.answer_text, "new");
    }

    #[tokio::test]
    async fn entries_expire() {
        let cache = cache(0, 0.7);
        cache
            .store("u1", "general", answer("who is ada", "Ada.", 64))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let probe = pseudo_embedding("who is ada", 64);
        assert!(cache.lookup("u1", "general", &probe).await.is_none());
        assert!(cache.lookup_exact("u1", "general", "who is ada").await.is_none());
    }

    #[tokio::test]
    async fn dissimilar_query_misses() {
        let cache = cache(300, 0.7);
        cache
            .store("u1", "general", answer("who is ada", "Ada.", 64))
            .await;
        let probe = pseudo_embedding("capital of mongolia", 64);
        assert!(cache.lookup("u1", "general", &probe).await.is_none());
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let cache = cache(300, 0.7);
        cache
            .store("u1", "general", answer("who is ada", "Ada.", 64))
            .await;
        cache.clear().await;
        assert_eq!(cache.len().await, 0);
    }
}
