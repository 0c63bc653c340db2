//! Session snapshots persisted to a JSON file.
//!
//! Best-effort persistence: the file is loaded once at startup and
//! rewritten after each query. Concurrent processes may race on the file;
//! the in-memory view always wins for this process.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

const MAX_RECENT_QUERIES: usize = 20;

/// Per-user slice of session state.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SessionSnapshot {
    #[serde(default)]
    pub recent_queries: Vec<String>,
    #[serde(default)]
    pub preferences: HashMap<String, String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

pub struct SessionStore {
    path: PathBuf,
    sessions: RwLock<HashMap<String, SessionSnapshot>>,
}

impl SessionStore {
    /// Load the snapshot file if present; a missing or unreadable file
    /// starts an empty store.
    pub fn load(path: PathBuf) -> Self {
        let sessions = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(sessions) => sessions,
                Err(err) => {
                    warn!("session snapshot at {} is malformed ({err}), starting fresh", path.display());
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            sessions: RwLock::new(sessions),
        }
    }

    pub async fn snapshot(&self, user_id: &str) -> SessionSnapshot {
        self.sessions
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Record a completed query with the topic it resolved to, then rewrite
    /// the snapshot file. Write failures are logged and swallowed.
    pub async fn record_query(&self, user_id: &str, query: &str, topic: Option<&str>) {
        {
            let mut sessions = self.sessions.write().await;
            let snapshot = sessions.entry(user_id.to_string()).or_default();
            snapshot.recent_queries.push(query.to_string());
            if snapshot.recent_queries.len() > MAX_RECENT_QUERIES {
                let excess = snapshot.recent_queries.len() - MAX_RECENT_QUERIES;
                snapshot.recent_queries.drain(..excess);
            }
            if let Some(topic) = topic {
                if !snapshot.topics.iter().any(|t| t.eq_ignore_ascii_case(topic)) {
                    snapshot.topics.push(topic.to_string());
                }
            }
        }
        self.persist().await;
    }

    pub async fn set_preference(&self, user_id: &str, key: &str, value: &str) {
        {
            let mut sessions = self.sessions.write().await;
            let snapshot = sessions.entry(user_id.to_string()).or_default();
            snapshot
                .preferences
                .insert(key.to_string(), value.to_string());
        }
        self.persist().await;
    }

    async fn persist(&self) {
        let serialized = {
            let sessions = self.sessions.read().await;
            serde_json::to_string_pretty(&*sessions)
        };
        let serialized = match serialized {
            Ok(serialized) => serialized,
            Err(err) => {
                warn!("failed to serialize session snapshots: {err}");
                return;
            }
        };
        if let Some(parent) = self.path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!("failed to create session directory: {err}");
                return;
            }
        }
        if let Err(err) = std::fs::write(&self.path, serialized) {
            warn!("failed to write session snapshot to {}: {err}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_persist_across_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sessions.json");

        let store = SessionStore::load(path.clone());
        store.record_query("u1", "who is ada", Some("Ada Lovelace")).await;
        store.set_preference("u1", "verbosity", "short").await;

        let reloaded = SessionStore::load(path);
        let snapshot = reloaded.snapshot("u1").await;
        assert_eq!(snapshot.recent_queries, vec!["who is ada".to_string()]);
        assert_eq!(snapshot.topics, vec!["Ada Lovelace".to_string()]);
        assert_eq!(
            snapshot.preferences.get("verbosity").map(String::as_str),
            Some("short")
        );
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::load(dir.path().join("absent.json"));
        assert_eq!(store.snapshot("u1").await, SessionSnapshot::default());
    }

    #[tokio::test]
    async fn recent_queries_are_bounded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::load(dir.path().join("sessions.json"));
        for i in 0..30 {
            store.record_query("u1", &format!("query {i}"), None).await;
        }
        let snapshot = store.snapshot("u1").await;
        assert_eq!(snapshot.recent_queries.len(), MAX_RECENT_QUERIES);
        assert_eq!(snapshot.recent_queries.last().map(String::as_str), Some("query 29"));
    }

    #[tokio::test]
    async fn duplicate_topics_are_not_repeated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::load(dir.path().join("sessions.json"));
        store.record_query("u1", "q1", Some("Rust")).await;
        store.record_query("u1", "q2", Some("rust")).await;
        assert_eq!(store.snapshot("u1").await.topics.len(), 1);
    }
}
