//! Per-query state machine: cache check, tool loop, evaluation, escalation.
//!
//! Terminal states are Answered and Exhausted. The exhausted path is a
//! normal response (templated apology, confidence 0) so callers always get
//! a structured payload with the full trace; only validation, rate-limit,
//! and first-connect failures surface as errors.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::context::AgentContext;
use crate::errors::{AgentError, AgentResult};
use crate::evaluate::evaluate_answer;
use crate::providers::completion::{ChatMessage, SamplingParams};
use crate::query::{QueryKind, classify_query};
use crate::semantic_cache::CachedAnswer;
use crate::tools::{
    LocalSearchTool, PatternReplayTool, RetrievalTool, ToolAnswer, ToolContext, WebSearchTool,
};
use crate::trace::{AgentDecision, Evaluation, ToolUsage, UsageRecorder};

pub use crate::tools::AnswerSource;

/// Final payload for one query.
#[derive(Debug, Clone, Serialize)]
pub struct AgentReply {
    pub answer: String,
    pub source: AnswerSource,
    pub cached: bool,
    pub confidence: f32,
    pub reasoning: String,
    pub follow_up_questions: Vec<String>,
    pub tool_trace: Vec<ToolUsage>,
    pub decisions: Vec<AgentDecision>,
}

pub struct AgentOrchestrator {
    ctx: Arc<AgentContext>,
    tools: Vec<Box<dyn RetrievalTool>>,
}

impl AgentOrchestrator {
    pub fn new(ctx: Arc<AgentContext>) -> Self {
        Self {
            ctx,
            tools: vec![
                Box::new(LocalSearchTool),
                Box::new(PatternReplayTool),
                Box::new(WebSearchTool),
            ],
        }
    }

    pub fn context(&self) -> &AgentContext {
        &self.ctx
    }

    /// Answer one query for one user in one namespace.
    pub async fn answer(
        &self,
        user_id: &str,
        namespace: &str,
        query: &str,
    ) -> AgentResult<AgentReply> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AgentError::Validation("query must not be empty".to_string()));
        }
        if user_id.trim().is_empty() {
            return Err(AgentError::Validation("user id must not be empty".to_string()));
        }
        if let Err(wait) = self.ctx.limiter.check(user_id).await {
            return Err(AgentError::RateLimited(wait));
        }

        // First-connect failure is fatal for this namespace's request.
        self.ctx.store.connect(namespace).await?;

        let mut trace: Vec<ToolUsage> = Vec::new();
        let mut decisions: Vec<AgentDecision> = Vec::new();

        let session_context = self.recall_context(user_id, query, &mut trace).await;

        // Cache check: exact key first, then embedding similarity.
        let embedding = self.ctx.embeddings.embed(query).await;
        let recorder = UsageRecorder::begin("semantic_cache", "lookup", json!({ "query": query }));
        let cache_hit = match self
            .ctx
            .answer_cache
            .lookup_exact(user_id, namespace, query)
            .await
        {
            Some(answer) => Some((answer, 1.0_f32)),
            None => self
                .ctx
                .answer_cache
                .lookup(user_id, namespace, &embedding)
                .await
                .map(|hit| (hit.answer, hit.similarity)),
        };
        if let Some((cached, similarity)) = cache_hit {
            trace.push(recorder.success(format!("hit (similarity {similarity:.2})")));
            let evaluation = evaluate_answer(query, &cached.answer_text);
            decisions.push(AgentDecision {
                tool: "semantic_cache".to_string(),
                reason: format!("live cached answer for \"{}\"", cached.query),
                confidence: similarity,
                executed: true,
                evaluation: Some(evaluation.clone()),
            });
            self.ctx.sessions.record_query(user_id, query, None).await;
            info!(query, similarity, "answered from cache");
            return Ok(AgentReply {
                answer: cached.answer_text,
                source: AnswerSource::Cache,
                cached: true,
                confidence: evaluation.confidence,
                reasoning: format!(
                    "reused a cached answer originally sourced from {}",
                    cached.source_tag
                ),
                follow_up_questions: Vec::new(),
                tool_trace: trace,
                decisions,
            });
        }
        trace.push(recorder.success("miss"));

        let kind = classify_query(query);
        let tool_ctx = ToolContext {
            app: &self.ctx,
            user_id,
            namespace,
            query,
            session_context: &session_context,
        };

        for tool in &self.tools {
            let (reason, confidence) = plan_reason(tool.name(), &kind);
            let outcome = self
                .run_tool(tool.as_ref(), &tool_ctx, reason, confidence, &mut trace, &mut decisions)
                .await;
            if let Some((answer, evaluation)) = outcome {
                if evaluation.is_adequate() {
                    return Ok(self
                        .finish(user_id, namespace, query, embedding, answer, evaluation, trace, decisions)
                        .await);
                }
            }
        }

        // One model-driven retry before giving up.
        if let Some(choice) = self.pick_next_tool(query, &trace).await {
            if let Some(tool) = self.tools.iter().find(|tool| tool.name() == choice) {
                let outcome = self
                    .run_tool(
                        tool.as_ref(),
                        &tool_ctx,
                        "model-selected retry after inadequate results".to_string(),
                        0.4,
                        &mut trace,
                        &mut decisions,
                    )
                    .await;
                if let Some((answer, evaluation)) = outcome {
                    if evaluation.is_adequate() {
                        return Ok(self
                            .finish(user_id, namespace, query, embedding, answer, evaluation, trace, decisions)
                            .await);
                    }
                }
            }
        }

        self.ctx.sessions.record_query(user_id, query, None).await;
        info!(query, "all retrieval tools exhausted");
        Ok(AgentReply {
            answer: format!(
                "I couldn't find a satisfactory answer to \"{query}\". \
                 Try rephrasing the question or asking about something else."
            ),
            source: AnswerSource::None,
            cached: false,
            confidence: 0.0,
            reasoning: "every retrieval tool was tried without an adequate result".to_string(),
            follow_up_questions: Vec::new(),
            tool_trace: trace,
            decisions,
        })
    }

    /// Session snapshot plus cross-session memory recall, best effort. A
    /// throttled or unauthorized memory provider degrades to less context.
    async fn recall_context(
        &self,
        user_id: &str,
        query: &str,
        trace: &mut Vec<ToolUsage>,
    ) -> Vec<String> {
        let mut context: Vec<String> = Vec::new();
        let snapshot = self.ctx.sessions.snapshot(user_id).await;
        context.extend(snapshot.recent_queries.iter().rev().take(3).cloned());

        let recorder = UsageRecorder::begin("memory", "recall", json!({ "query": query }));
        match self.ctx.memory.search(user_id, query, 3).await {
            Ok(blobs) => {
                trace.push(recorder.success(format!("{} memories", blobs.len())));
                context.extend(blobs);
            }
            Err(err) => {
                debug!("memory recall degraded: {err}");
                trace.push(recorder.failure(err.to_string()));
            }
        }
        context
    }

    /// Run one tool with its own try/catch. A failing tool is recorded as
    /// `success=false` and the loop continues.
    async fn run_tool(
        &self,
        tool: &dyn RetrievalTool,
        ctx: &ToolContext<'_>,
        reason: String,
        confidence: f32,
        trace: &mut Vec<ToolUsage>,
        decisions: &mut Vec<AgentDecision>,
    ) -> Option<(ToolAnswer, Evaluation)> {
        let recorder = UsageRecorder::begin(
            tool.name(),
            tool.action(),
            json!({ "namespace": ctx.namespace, "query": ctx.query }),
        );
        let mut decision = AgentDecision {
            tool: tool.name().to_string(),
            reason,
            confidence,
            executed: true,
            evaluation: None,
        };

        match tool.execute(ctx).await {
            Ok(Some(answer)) => {
                trace.push(recorder.success(format!("answer via {}", answer.source.tag())));
                let evaluation = evaluate_answer(ctx.query, &answer.text);
                decision.evaluation = Some(evaluation.clone());
                decisions.push(decision);
                Some((answer, evaluation))
            }
            Ok(None) => {
                trace.push(recorder.success("no result"));
                decisions.push(decision);
                None
            }
            Err(err) => {
                warn!(tool = tool.name(), "tool execution failed: {err}");
                trace.push(recorder.failure(err));
                decisions.push(decision);
                None
            }
        }
    }

    /// Seal an answered run: cache the answer, learn the query shape, update
    /// session and cross-session memory, and generate follow-ups for fresh
    /// web answers.
    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        user_id: &str,
        namespace: &str,
        query: &str,
        embedding: Vec<f32>,
        answer: ToolAnswer,
        evaluation: Evaluation,
        trace: Vec<ToolUsage>,
        decisions: Vec<AgentDecision>,
    ) -> AgentReply {
        let follow_ups = if answer.source == AnswerSource::Web {
            self.follow_up_questions(query, &answer.text).await
        } else {
            Vec::new()
        };

        self.ctx
            .answer_cache
            .store(
                user_id,
                namespace,
                CachedAnswer {
                    query: query.to_string(),
                    query_embedding: embedding,
                    answer_text: answer.text.clone(),
                    source_tag: answer.source.tag().to_string(),
                    reasoning: answer.reasoning.clone(),
                    tool_trace: trace.clone(),
                    timestamp: Utc::now(),
                },
            )
            .await;
        self.ctx.patterns.learn(query).await;
        self.ctx
            .sessions
            .record_query(user_id, query, answer.canonical_target.as_deref())
            .await;
        if let Err(err) = self
            .ctx
            .memory
            .store(user_id, &["queries".to_string()], query)
            .await
        {
            debug!("cross-session memory store degraded: {err}");
        }

        info!(query, source = answer.source.tag(), "query answered");
        AgentReply {
            answer: answer.text,
            source: answer.source,
            cached: false,
            confidence: evaluation.confidence,
            reasoning: answer.reasoning,
            follow_up_questions: follow_ups,
            tool_trace: trace,
            decisions,
        }
    }

    /// Free-form "pick next tool" call against the completion provider.
    /// Any provider failure or unparseable reply means giving up instead.
    async fn pick_next_tool(&self, query: &str, trace: &[ToolUsage]) -> Option<&'static str> {
        let summary: Vec<String> = trace
            .iter()
            .map(|usage| {
                format!(
                    "{}/{}: {}",
                    usage.tool,
                    usage.action,
                    if usage.success { "ok" } else { "failed" }
                )
            })
            .collect();
        let messages = [
            ChatMessage::system(
                "You pick the next retrieval tool for an unanswered question. \
                 Reply with exactly one word: local_search, pattern_replay, \
                 web_search, or none.",
            ),
            ChatMessage::user(format!(
                "Question: {query}\nAttempts so far:\n{}",
                summary.join("\n")
            )),
        ];
        let params = SamplingParams {
            temperature: 0.0,
            max_tokens: 16,
        };
        let reply = match self.ctx.completion.complete(&messages, params).await {
            Ok(reply) => reply.to_lowercase(),
            Err(err) => {
                debug!("next-tool selection unavailable: {err}");
                return None;
            }
        };
        ["web_search", "pattern_replay", "local_search"]
            .into_iter()
            .find(|name| reply.contains(name))
    }

    /// Follow-up suggestions for a fresh web answer; none on provider
    /// failure.
    async fn follow_up_questions(&self, query: &str, answer: &str) -> Vec<String> {
        let messages = [
            ChatMessage::system(
                "Suggest two short follow-up questions the user might ask next. \
                 One per line, no numbering.",
            ),
            ChatMessage::user(format!("Question: {query}\nAnswer: {answer}")),
        ];
        let params = SamplingParams {
            temperature: 0.7,
            max_tokens: 96,
        };
        match self.ctx.completion.complete(&messages, params).await {
            Ok(reply) => reply
                .lines()
                .map(|line| line.trim_start_matches(['-', '*', ' ']).trim().to_string())
                .filter(|line| !line.is_empty())
                .take(2)
                .collect(),
            Err(err) => {
                debug!("follow-up generation unavailable: {err}");
                Vec::new()
            }
        }
    }
}

/// A priori decision reason and confidence per tool, shaped by the query
/// classification.
fn plan_reason(tool: &str, kind: &QueryKind) -> (String, f32) {
    match tool {
        "local_search" => match kind {
            QueryKind::Recency => (
                "local store rarely holds fresh information, checking anyway".to_string(),
                0.3,
            ),
            _ => ("the local entity store is the cheapest source".to_string(), 0.8),
        },
        "pattern_replay" => (
            "the query shape may match an earlier successful question".to_string(),
            0.5,
        ),
        "web_search" => match kind {
            QueryKind::Recency => (
                "recency-flavored query, the web is the authoritative source".to_string(),
                0.8,
            ),
            _ => ("no adequate local knowledge, escalating to web search".to_string(), 0.6),
        },
        _ => ("fallback tool".to_string(), 0.3),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_reason_prefers_web_for_recency() {
        let (_, local) = plan_reason("local_search", &QueryKind::Recency);
        let (_, web) = plan_reason("web_search", &QueryKind::Recency);
        assert!(web > local);
    }
}
