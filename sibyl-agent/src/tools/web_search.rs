//! Web escalation: tuned search, summarization, and knowledge capture.
//!
//! The summary entity is persisted synchronously so a local search issued
//! right after escalation can see it. Auxiliary per-document entities are
//! persisted by a background job that logs and drops its own failures.

use std::sync::Arc;

use tracing::{debug, warn};

use sibyl_store::matching::extract_query_target;
use sibyl_store::{EntityCategory, EntityStore, NewEntity};

use crate::providers::completion::{ChatMessage, SamplingParams};
use crate::query::{guess_category, tune_web_query};
use crate::web::search::{SearchDocument, WebSearchRequest};

use super::{AnswerSource, RetrievalTool, ToolAnswer, ToolContext};

const AUX_DESCRIPTION_CAP: usize = 500;

#[derive(Debug, Default)]
pub struct WebSearchTool;

impl WebSearchTool {
    async fn summarize(
        ctx: &ToolContext<'_>,
        documents: &[SearchDocument],
    ) -> (String, &'static str) {
        let completion = &ctx.app.settings.providers.completion;
        let mut corpus = String::new();
        for document in documents {
            corpus.push_str(&format!("## {}\n{}\n\n", document.title, document.text));
        }

        let mut prompt = format!("Question: {}\n\nSearch results:\n{corpus}", ctx.query);
        if !ctx.session_context.is_empty() {
            prompt.push_str(&format!(
                "\nRecent user context:\n{}\n",
                ctx.session_context.join("\n")
            ));
        }
        let messages = [
            ChatMessage::system(
                "Summarize the provided web search results into a direct, factual \
                 answer to the user's question. Two to four sentences, no preamble.",
            ),
            ChatMessage::user(prompt),
        ];
        let params = SamplingParams {
            temperature: completion.temperature,
            max_tokens: completion.max_tokens,
        };

        match ctx.app.completion.complete(&messages, params).await {
            Ok(summary) => (summary.trim().to_string(), "summarized search results"),
            Err(err) => {
                warn!("summarization failed ({err}), falling back to result titles");
                let titles: Vec<&str> = documents
                    .iter()
                    .map(|document| document.title.as_str())
                    .collect();
                (
                    format!("Top sources: {}", titles.join("; ")),
                    "summarization unavailable, joined result titles",
                )
            }
        }
    }

    fn persist_auxiliary(
        store: Arc<EntityStore>,
        namespace: String,
        query: String,
        documents: Vec<SearchDocument>,
    ) {
        tokio::spawn(async move {
            for document in documents {
                let mut description = document.text;
                if description.len() > AUX_DESCRIPTION_CAP {
                    let mut cut = AUX_DESCRIPTION_CAP;
                    while cut > 0 && !description.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    description.truncate(cut);
                }
                let result = store
                    .create_entity(
                        &namespace,
                        NewEntity {
                            name: document.title,
                            category: EntityCategory::Other,
                            source_query: query.clone(),
                            description,
                        },
                    )
                    .await;
                if let Err(err) = result {
                    warn!(namespace, "background entity persistence failed: {err}");
                }
            }
        });
    }
}

#[async_trait::async_trait]
impl RetrievalTool for WebSearchTool {
    fn name(&self) -> &'static str {
        "web_search"
    }

    fn action(&self) -> &'static str {
        "search"
    }

    async fn execute(&self, ctx: &ToolContext<'_>) -> Result<Option<ToolAnswer>, String> {
        let Some(provider) = &ctx.app.search else {
            return Err("web search provider not configured".to_string());
        };

        let tuned = tune_web_query(ctx.query);
        debug!(query = ctx.query, tuned, "escalating to web search");
        let request = WebSearchRequest::new(
            tuned.clone(),
            ctx.app.settings.providers.search.max_results,
        );
        let documents = provider
            .search(&request)
            .await
            .map_err(|err| err.to_string())?;
        if documents.is_empty() {
            return Ok(None);
        }

        let (summary, how) = Self::summarize(ctx, &documents).await;

        let target = extract_query_target(ctx.query)
            .unwrap_or_else(|| ctx.query.trim_end_matches(['?', ' ']).to_string());
        let persisted = ctx
            .app
            .store
            .create_entity(
                ctx.namespace,
                NewEntity {
                    name: target.clone(),
                    category: guess_category(ctx.query),
                    source_query: ctx.query.to_string(),
                    description: summary.clone(),
                },
            )
            .await;
        if let Err(err) = &persisted {
            warn!(namespace = ctx.namespace, "failed to persist web summary entity: {err}");
        }

        if documents.len() > 1 {
            Self::persist_auxiliary(
                ctx.app.store.clone(),
                ctx.namespace.to_string(),
                ctx.query.to_string(),
                documents[1..].to_vec(),
            );
        }

        Ok(Some(ToolAnswer {
            text: summary,
            source: AnswerSource::Web,
            reasoning: format!("web search for \"{tuned}\" returned {} documents; {how}", documents.len()),
            canonical_target: Some(target),
            documents,
        }))
    }
}
