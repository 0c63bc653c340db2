//! Local entity-store lookup.

use tracing::debug;

use super::{AnswerSource, RetrievalTool, ToolAnswer, ToolContext};

const SEARCH_LIMIT: usize = 5;

#[derive(Debug, Default)]
pub struct LocalSearchTool;

impl LocalSearchTool {
    /// Shared by the replay tool, which re-runs a local search under a
    /// different query string.
    pub async fn search_described(
        ctx: &ToolContext<'_>,
        query: &str,
    ) -> Result<Option<ToolAnswer>, String> {
        let outcome = ctx
            .app
            .store
            .search(ctx.namespace, query, SEARCH_LIMIT)
            .await
            .map_err(|err| err.to_string())?;

        let Some(entity) = outcome
            .entities
            .into_iter()
            .find(|entity| !entity.description.trim().is_empty())
        else {
            debug!(query, "local search found no described entity");
            return Ok(None);
        };

        Ok(Some(ToolAnswer {
            text: entity.description.clone(),
            source: AnswerSource::Local,
            reasoning: format!("matched stored entity \"{}\"", entity.name),
            canonical_target: Some(entity.name),
            documents: Vec::new(),
        }))
    }
}

#[async_trait::async_trait]
impl RetrievalTool for LocalSearchTool {
    fn name(&self) -> &'static str {
        "local_search"
    }

    fn action(&self) -> &'static str {
        "search"
    }

    async fn execute(&self, ctx: &ToolContext<'_>) -> Result<Option<ToolAnswer>, String> {
        Self::search_described(ctx, ctx.query).await
    }
}
