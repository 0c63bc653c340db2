//! Shared configuration and primitives for the Sibyl workspace.

pub mod config;

pub use config::settings::{
    CacheSettings, CompletionSettings, EmbeddingSettings, GraphWeights, MemoryProviderSettings,
    NamespaceSettings, ProviderSettings, RateLimitSettings, ScoringWeights,
    SearchProviderSettings, SessionSettings, Settings, StoreSettings,
};
pub use config::{Config, ConfigError};

/// Load `.env` into the process environment, ignoring a missing file.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}
