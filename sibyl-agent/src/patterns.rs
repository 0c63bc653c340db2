//! Learned query patterns.
//!
//! When web escalation answers a templated question ("who is X"), the
//! template and the canonical target that worked are remembered. A later
//! question with the same shape replays a local search for the remembered
//! target instead of going straight back to the web.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use sibyl_store::matching::{extract_query_target, template_key};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnedPattern {
    /// Query that produced an adequate answer.
    pub canonical_query: String,
    /// Target extracted from that query, if any.
    pub canonical_target: Option<String>,
}

#[derive(Default)]
pub struct PatternLearner {
    patterns: RwLock<HashMap<String, LearnedPattern>>,
}

impl PatternLearner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember that `query` was answered successfully. Untemplated queries
    /// (no recognizable shape) are not learned.
    pub async fn learn(&self, query: &str) {
        let Some(key) = template_key(query) else {
            return;
        };
        let pattern = LearnedPattern {
            canonical_query: query.to_string(),
            canonical_target: extract_query_target(query),
        };
        debug!(template = %key, query, "learned query pattern");
        self.patterns.write().await.insert(key, pattern);
    }

    /// Look up a previously successful query with the same template shape.
    /// Returns nothing when the template is known but the stored query is
    /// the same one being asked, since replaying it would loop.
    pub async fn replay(&self, query: &str) -> Option<LearnedPattern> {
        let key = template_key(query)?;
        let patterns = self.patterns.read().await;
        let pattern = patterns.get(&key)?;
        if pattern.canonical_query.eq_ignore_ascii_case(query) {
            return None;
        }
        Some(pattern.clone())
    }

    pub async fn reset(&self) {
        self.patterns.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.patterns.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn learned_template_replays_for_a_different_target() {
        let learner = PatternLearner::new();
        learner.learn("who is Ada Lovelace").await;

        let pattern = learner.replay("who is Alan Turing").await.expect("replay");
        assert_eq!(pattern.canonical_query, "who is Ada Lovelace");
        assert_eq!(pattern.canonical_target.as_deref(), Some("Ada Lovelace"));
    }

    #[tokio::test]
    async fn same_query_does_not_replay_itself() {
        let learner = PatternLearner::new();
        learner.learn("who is Ada Lovelace").await;
        assert!(learner.replay("who is ada lovelace").await.is_none());
    }

    #[tokio::test]
    async fn untemplated_queries_are_not_learned() {
        let learner = PatternLearner::new();
        learner.learn("random words with no shape").await;
        assert_eq!(learner.len().await, 0);
    }

    #[tokio::test]
    async fn reset_clears_learned_patterns() {
        let learner = PatternLearner::new();
        learner.learn("what is Rust").await;
        learner.reset().await;
        assert_eq!(learner.len().await, 0);
    }
}
