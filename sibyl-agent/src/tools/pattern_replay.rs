//! Replay of previously successful query shapes.

use tracing::debug;

use super::local_search::LocalSearchTool;
use super::{RetrievalTool, ToolAnswer, ToolContext};

#[derive(Debug, Default)]
pub struct PatternReplayTool;

#[async_trait::async_trait]
impl RetrievalTool for PatternReplayTool {
    fn name(&self) -> &'static str {
        "pattern_replay"
    }

    fn action(&self) -> &'static str {
        "replay"
    }

    async fn execute(&self, ctx: &ToolContext<'_>) -> Result<Option<ToolAnswer>, String> {
        let Some(pattern) = ctx.app.patterns.replay(ctx.query).await else {
            return Ok(None);
        };

        let replay_query = pattern
            .canonical_target
            .as_deref()
            .unwrap_or(&pattern.canonical_query);
        debug!(
            query = ctx.query,
            replay_query, "replaying learned query pattern"
        );

        let mut answer = LocalSearchTool::search_described(ctx, replay_query).await?;
        if let Some(answer) = &mut answer {
            answer.reasoning = format!(
                "query shape matched earlier question \"{}\"; {}",
                pattern.canonical_query, answer.reasoning
            );
        }
        Ok(answer)
    }
}
