//! Settings loaded from TOML.
//!
//! Non-sensitive configuration lives in the XDG config directory
//! (~/.config/sibyl/config.toml). Every field has a default so a missing or
//! partial file still yields a usable configuration.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Default TOML configuration file content, written on first run.
const DEFAULT_CONFIG_TOML: &str = r#"# sibyl configuration file
# Located at: ~/.config/sibyl/config.toml
#
# This file contains non-sensitive configuration.
# Secrets (API keys) are loaded from environment variables:
#   - SIBYL_COMPLETION_API_KEY
#   - SIBYL_SEARCH_API_KEY
#   - SIBYL_MEMORY_API_KEY

# Entity-store namespaces, one backing endpoint per namespace ("mode").
# [namespaces.general]
# host = "127.0.0.1"
# port = 7101
#
# [namespaces.research]
# host = "127.0.0.1"
# port = 7102

[store]
# request_cache_seconds = 300
# warm_refresh_seconds = 300
# growth_refresh_ratio = 0.10
# fuzzy_threshold = 0.7
# dedup_threshold = 0.8

[cache]
# answer_ttl_seconds = 300
# answer_similarity_threshold = 0.7
# embedding_ttl_seconds = 3600

[rate_limit]
# window_seconds = 60
# max_requests = 10

[providers.completion]
# base_url = "http://127.0.0.1:11434"
# model = "sibyl-summarizer"

[providers.embedding]
# base_url = "http://127.0.0.1:11434"
# model = "sibyl-embed"
# dimension = 256

[providers.search]
# base_url = "https://api.exa.ai"
# max_results = 5

[providers.memory]
# enabled = false
"#;

/// Backing-store endpoint for one namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamespaceSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

impl NamespaceSettings {
    /// Full HTTP endpoint for this namespace's backing connection.
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// EntityStore cache and matching thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreSettings {
    /// TTL for the request-level entity cache.
    #[serde(default = "default_request_cache_seconds")]
    pub request_cache_seconds: u64,
    /// Warm cache is considered stale after this many seconds.
    #[serde(default = "default_warm_refresh_seconds")]
    pub warm_refresh_seconds: u64,
    /// Re-warm when the backing count grew by more than this ratio.
    #[serde(default = "default_growth_refresh_ratio")]
    pub growth_refresh_ratio: f32,
    /// Minimum name similarity for a fuzzy search hit.
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f32,
    /// Minimum name similarity for create-time deduplication.
    #[serde(default = "default_dedup_threshold")]
    pub dedup_threshold: f32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            request_cache_seconds: default_request_cache_seconds(),
            warm_refresh_seconds: default_warm_refresh_seconds(),
            growth_refresh_ratio: default_growth_refresh_ratio(),
            fuzzy_threshold: default_fuzzy_threshold(),
            dedup_threshold: default_dedup_threshold(),
        }
    }
}

fn default_request_cache_seconds() -> u64 {
    300
}
fn default_warm_refresh_seconds() -> u64 {
    300
}
fn default_growth_refresh_ratio() -> f32 {
    0.10
}
fn default_fuzzy_threshold() -> f32 {
    0.7
}
fn default_dedup_threshold() -> f32 {
    0.8
}

/// Feature weights for the full-corpus scored ranking stage.
///
/// These are empirically tuned starting values; the relative ordering
/// matters more than the exact numbers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringWeights {
    #[serde(default = "default_exact_name")]
    pub exact_name: f32,
    #[serde(default = "default_name_containment")]
    pub name_containment: f32,
    #[serde(default = "default_name_word")]
    pub name_word: f32,
    #[serde(default = "default_description_word")]
    pub description_word: f32,
    #[serde(default = "default_category_intent")]
    pub category_intent: f32,
    #[serde(default = "default_recency_max")]
    pub recency_max: f32,
    #[serde(default = "default_source_query")]
    pub source_query: f32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            exact_name: default_exact_name(),
            name_containment: default_name_containment(),
            name_word: default_name_word(),
            description_word: default_description_word(),
            category_intent: default_category_intent(),
            recency_max: default_recency_max(),
            source_query: default_source_query(),
        }
    }
}

fn default_exact_name() -> f32 {
    100.0
}
fn default_name_containment() -> f32 {
    70.0
}
fn default_name_word() -> f32 {
    30.0
}
fn default_description_word() -> f32 {
    10.0
}
fn default_category_intent() -> f32 {
    15.0
}
fn default_recency_max() -> f32 {
    10.0
}
fn default_source_query() -> f32 {
    15.0
}

/// Edge weights and threshold for the derived relationship graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphWeights {
    #[serde(default = "default_same_category")]
    pub same_category: f32,
    #[serde(default = "default_same_source")]
    pub same_source: f32,
    #[serde(default = "default_mention")]
    pub mention: f32,
    #[serde(default = "default_temporal")]
    pub temporal: f32,
    /// Entities are connected iff combined strength reaches this value.
    #[serde(default = "default_edge_threshold")]
    pub edge_threshold: f32,
    /// Creation-time proximity window for the temporal weight.
    #[serde(default = "default_temporal_window_seconds")]
    pub temporal_window_seconds: i64,
}

impl Default for GraphWeights {
    fn default() -> Self {
        Self {
            same_category: default_same_category(),
            same_source: default_same_source(),
            mention: default_mention(),
            temporal: default_temporal(),
            edge_threshold: default_edge_threshold(),
            temporal_window_seconds: default_temporal_window_seconds(),
        }
    }
}

fn default_same_category() -> f32 {
    0.3
}
fn default_same_source() -> f32 {
    0.4
}
fn default_mention() -> f32 {
    0.5
}
fn default_temporal() -> f32 {
    0.2
}
fn default_edge_threshold() -> f32 {
    0.5
}
fn default_temporal_window_seconds() -> i64 {
    3600
}

/// Response and embedding cache tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheSettings {
    /// TTL for cached answers.
    #[serde(default = "default_answer_ttl_seconds")]
    pub answer_ttl_seconds: u64,
    /// Minimum cosine similarity for a semantic cache hit.
    #[serde(default = "default_answer_similarity_threshold")]
    pub answer_similarity_threshold: f32,
    /// TTL for cached embeddings.
    #[serde(default = "default_embedding_ttl_seconds")]
    pub embedding_ttl_seconds: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            answer_ttl_seconds: default_answer_ttl_seconds(),
            answer_similarity_threshold: default_answer_similarity_threshold(),
            embedding_ttl_seconds: default_embedding_ttl_seconds(),
        }
    }
}

fn default_answer_ttl_seconds() -> u64 {
    300
}
fn default_answer_similarity_threshold() -> f32 {
    0.7
}
fn default_embedding_ttl_seconds() -> u64 {
    3600
}

/// Fixed-window rate limit on top-level query submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitSettings {
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
            max_requests: default_max_requests(),
        }
    }
}

fn default_window_seconds() -> u64 {
    60
}
fn default_max_requests() -> u32 {
    10
}

/// Completion provider endpoint and sampling defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionSettings {
    #[serde(default = "default_completion_url")]
    pub base_url: String,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_provider_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            base_url: default_completion_url(),
            model: default_completion_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_provider_timeout_seconds(),
        }
    }
}

fn default_completion_url() -> String {
    "http://127.0.0.1:11434".to_string()
}
fn default_completion_model() -> String {
    "sibyl-summarizer".to_string()
}
fn default_temperature() -> f32 {
    0.4
}
fn default_max_tokens() -> u32 {
    512
}
fn default_provider_timeout_seconds() -> u64 {
    30
}

/// Embedding provider endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingSettings {
    #[serde(default = "default_completion_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Vector length; also the length of the fallback pseudo-embedding.
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
    #[serde(default = "default_provider_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: default_completion_url(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_seconds: default_provider_timeout_seconds(),
        }
    }
}

fn default_embedding_model() -> String {
    "sibyl-embed".to_string()
}
fn default_embedding_dimension() -> usize {
    256
}

/// Neural web-search provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchProviderSettings {
    #[serde(default = "default_search_url")]
    pub base_url: String,
    #[serde(default = "default_search_max_results")]
    pub max_results: usize,
    #[serde(default = "default_provider_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Character cap when fetching full document contents by id.
    #[serde(default = "default_content_char_cap")]
    pub content_char_cap: usize,
}

impl Default for SearchProviderSettings {
    fn default() -> Self {
        Self {
            base_url: default_search_url(),
            max_results: default_search_max_results(),
            timeout_seconds: default_provider_timeout_seconds(),
            content_char_cap: default_content_char_cap(),
        }
    }
}

fn default_search_url() -> String {
    "https://api.exa.ai".to_string()
}
fn default_search_max_results() -> usize {
    5
}
fn default_content_char_cap() -> usize {
    2000
}

/// Cross-session memory provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryProviderSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_memory_url")]
    pub base_url: String,
    #[serde(default = "default_provider_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for MemoryProviderSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_memory_url(),
            timeout_seconds: default_provider_timeout_seconds(),
        }
    }
}

fn default_memory_url() -> String {
    "https://api.mem.example".to_string()
}

/// External provider endpoints grouped.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProviderSettings {
    #[serde(default)]
    pub completion: CompletionSettings,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub search: SearchProviderSettings,
    #[serde(default)]
    pub memory: MemoryProviderSettings,
}

/// Session snapshot file location.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SessionSettings {
    /// Overrides the default data-dir location when set.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

/// Full application settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub namespaces: BTreeMap<String, NamespaceSettings>,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub scoring: ScoringWeights,
    #[serde(default)]
    pub graph: GraphWeights,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub providers: ProviderSettings,
    #[serde(default)]
    pub session: SessionSettings,
}

impl Settings {
    /// Resolve the config file path. `SIBYL_CONFIG_PATH` overrides the XDG
    /// default (used by tests).
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        if let Ok(path) = std::env::var("SIBYL_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }
        let base = dirs::config_dir().ok_or(ConfigError::MissingConfigDir)?;
        Ok(base.join("sibyl").join("config.toml"))
    }

    /// Load settings from the config file, writing the commented default
    /// file on first run.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, DEFAULT_CONFIG_TOML)?;
            tracing::info!("wrote default configuration to {}", path.display());
        }
        let raw = fs::read_to_string(&path)?;
        let settings = toml::from_str(&raw)?;
        Ok(settings)
    }

    /// Look up the backing endpoint for a namespace.
    pub fn namespace(&self, name: &str) -> Option<&NamespaceSettings> {
        self.namespaces.get(name)
    }

    /// Resolve the session snapshot path, defaulting to the XDG data dir.
    pub fn snapshot_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.session.snapshot_path {
            return Ok(path.clone());
        }
        let base = dirs::data_dir().ok_or(ConfigError::MissingConfigDir)?;
        Ok(base.join("sibyl").join("sessions.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_toml_parses() {
        let settings: Settings = toml::from_str(DEFAULT_CONFIG_TOML).expect("default toml");
        assert!(settings.namespaces.is_empty());
        assert_eq!(settings.rate_limit.max_requests, 10);
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let settings: Settings = toml::from_str("").expect("empty toml");
        assert_eq!(settings.store.request_cache_seconds, 300);
        assert_eq!(settings.cache.answer_ttl_seconds, 300);
        assert!((settings.cache.answer_similarity_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(settings.providers.embedding.dimension, 256);
    }

    #[test]
    fn namespace_endpoint_formats_host_and_port() {
        let ns: NamespaceSettings = toml::from_str("port = 7101").expect("ns toml");
        assert_eq!(ns.endpoint(), "http://127.0.0.1:7101");
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [store]
            fuzzy_threshold = 0.75

            [namespaces.general]
            port = 7101
            "#,
        )
        .expect("toml");
        assert!((settings.store.fuzzy_threshold - 0.75).abs() < f32::EPSILON);
        assert_eq!(settings.store.warm_refresh_seconds, 300);
        assert_eq!(
            settings.namespace("general").map(|ns| ns.endpoint()),
            Some("http://127.0.0.1:7101".to_string())
        );
    }
}
