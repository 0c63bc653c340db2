//! Per-query observability records.
//!
//! Every orchestrator run accumulates a tool-usage trace and a decision
//! list, returned to the caller alongside the answer. The trace must be
//! complete even on failure paths; it is never persisted beyond the reply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Self-assessed answer quality.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Excellent,
    Good,
    Poor,
    Unacceptable,
}

/// Evaluation of one tool execution's result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub quality: Quality,
    pub confidence: f32,
    pub issues: Vec<String>,
    pub should_retry: bool,
}

impl Evaluation {
    /// Whether this result is good enough to stop the tool loop.
    pub fn is_adequate(&self) -> bool {
        !matches!(self.quality, Quality::Unacceptable)
    }
}

/// One tool execution, timed and tagged with its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUsage {
    pub tool: String,
    pub action: String,
    pub parameters: Value,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    /// Result summary on success, error message on failure.
    pub outcome: String,
}

/// In-flight usage record; call one of the finish methods to seal it.
#[derive(Debug)]
pub struct UsageRecorder {
    tool: String,
    action: String,
    parameters: Value,
    started_at: DateTime<Utc>,
}

impl UsageRecorder {
    pub fn begin(tool: &str, action: &str, parameters: Value) -> Self {
        Self {
            tool: tool.to_string(),
            action: action.to_string(),
            parameters,
            started_at: Utc::now(),
        }
    }

    pub fn success(self, outcome: impl Into<String>) -> ToolUsage {
        self.finish(true, outcome.into())
    }

    pub fn failure(self, error: impl Into<String>) -> ToolUsage {
        self.finish(false, error.into())
    }

    fn finish(self, success: bool, outcome: String) -> ToolUsage {
        ToolUsage {
            tool: self.tool,
            action: self.action,
            parameters: self.parameters,
            started_at: self.started_at,
            finished_at: Utc::now(),
            success,
            outcome,
        }
    }
}

/// Planning record: which tool was chosen, why, and how it went.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDecision {
    pub tool: String,
    pub reason: String,
    pub confidence: f32,
    pub executed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
}
