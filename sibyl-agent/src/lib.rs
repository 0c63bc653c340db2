//! Agent orchestration for Sibyl: response caching, retrieval tool planning,
//! evaluation, and escalation to external providers.

pub mod cache;
pub mod context;
pub mod errors;
pub mod evaluate;
pub mod orchestrator;
pub mod patterns;
pub mod providers;
pub mod query;
pub mod rate_limit;
pub mod semantic_cache;
pub mod session;
pub mod tools;
pub mod trace;
pub mod web;

pub use context::AgentContext;
pub use errors::{AgentError, AgentResult};
pub use orchestrator::{AgentOrchestrator, AgentReply, AnswerSource};
pub use semantic_cache::{CachedAnswer, ResponseSemanticCache};
pub use trace::{AgentDecision, Evaluation, Quality, ToolUsage};
