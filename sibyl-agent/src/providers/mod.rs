//! External provider clients: completion, embedding, cross-session memory.
//!
//! Each provider is a trait seam so the orchestrator can be tested with
//! scripted doubles. Every call site tolerates provider failure with a
//! deterministic fallback; none of these providers is load-bearing for
//! correctness, only for answer quality.

pub mod completion;
pub mod embedding;
pub mod memory;

pub use completion::{ChatMessage, ChatRole, CompletionProvider, OpenAiCompatibleClient, SamplingParams};
pub use embedding::{EmbeddingProvider, EmbeddingService, HttpEmbeddingClient};
pub use memory::{HttpMemoryProvider, MemoryProvider, NullMemoryProvider};

/// Provider error taxonomy shared by completion/embedding/memory clients.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {0}")]
    Api(String),
    #[error("no content in response")]
    NoContent,
    #[error("rate limited")]
    RateLimited,
    #[error("unauthorized")]
    Unauthorized,
    #[error("invalid response format: {0}")]
    InvalidFormat(String),
}
