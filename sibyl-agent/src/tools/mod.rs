//! Retrieval tools the orchestrator can plan over.
//!
//! Each tool is one strategy for answering a query. Tools return
//! `Ok(None)` for a clean miss and `Err` for an execution failure; the
//! orchestrator records either outcome and moves on to the next tool.

use serde::{Deserialize, Serialize};

use crate::context::AgentContext;
use crate::web::search::SearchDocument;

pub mod local_search;
pub mod pattern_replay;
pub mod web_search;

pub use local_search::LocalSearchTool;
pub use pattern_replay::PatternReplayTool;
pub use web_search::WebSearchTool;

/// Where an answer ultimately came from. `None` marks the exhausted-run
/// apology, which no retrieval tool produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnswerSource {
    Cache,
    Local,
    Web,
    None,
}

impl AnswerSource {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Local => "local",
            Self::Web => "web",
            Self::None => "none",
        }
    }
}

/// Per-query inputs shared by every tool execution.
pub struct ToolContext<'a> {
    pub app: &'a AgentContext,
    pub user_id: &'a str,
    pub namespace: &'a str,
    pub query: &'a str,
    /// Recent queries and recalled memories, offered to the summarizer.
    pub session_context: &'a [String],
}

/// A candidate answer produced by a tool.
#[derive(Debug, Clone)]
pub struct ToolAnswer {
    pub text: String,
    pub source: AnswerSource,
    pub reasoning: String,
    /// Entity name the answer resolved to, when known.
    pub canonical_target: Option<String>,
    /// Web documents backing the answer; empty for local answers.
    pub documents: Vec<SearchDocument>,
}

#[async_trait::async_trait]
pub trait RetrievalTool: Send + Sync {
    /// Stable identifier used in the tool trace.
    fn name(&self) -> &'static str;

    /// Action label for the trace ("search", "replay", ...).
    fn action(&self) -> &'static str;

    /// Run the tool. `Ok(None)` means the tool found nothing; `Err` means
    /// the tool itself failed. Neither aborts the orchestrator loop.
    async fn execute(&self, ctx: &ToolContext<'_>) -> Result<Option<ToolAnswer>, String>;
}
