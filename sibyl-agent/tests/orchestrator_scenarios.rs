//! End-to-end orchestrator scenarios against an in-memory backing store and
//! scripted providers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use sibyl_agent::context::AgentContext;
use sibyl_agent::errors::AgentError;
use sibyl_agent::orchestrator::{AgentOrchestrator, AnswerSource};
use sibyl_agent::providers::ProviderError;
use sibyl_agent::providers::completion::{ChatMessage, CompletionProvider, SamplingParams};
use sibyl_agent::providers::embedding::{EmbeddingProvider, EmbeddingService};
use sibyl_agent::providers::memory::NullMemoryProvider;
use sibyl_agent::session::SessionStore;
use sibyl_agent::web::search::{SearchDocument, SearchError, SearchProvider, WebSearchRequest};
use sibyl_core::Settings;
use sibyl_store::{Entity, EntityCategory, EntityStore, MemoryConnector, NewEntity, StoreError};

const ADA_DESCRIPTION: &str = "Ada Lovelace was an English mathematician and writer \
     known for her work on Charles Babbage's Analytical Engine, often regarded as \
     the first computer programmer.";

const HOPPER_SUMMARY: &str = "Grace Hopper was a United States Navy rear admiral and \
     computer scientist who pioneered machine-independent programming languages and \
     led the team behind the first compiler.";

/// Embedding provider that always fails, forcing the deterministic
/// pseudo-embedding fallback so similarity is stable across runs.
struct OfflineEmbedder;

#[async_trait::async_trait]
impl EmbeddingProvider for OfflineEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Err(ProviderError::Api("offline".to_string()))
    }
}

struct ScriptedCompletion {
    reply: String,
    system_prompts: std::sync::Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            system_prompts: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn summarize_calls(&self) -> usize {
        self.system_prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|prompt| prompt.starts_with("Summarize"))
            .count()
    }
}

#[async_trait::async_trait]
impl CompletionProvider for ScriptedCompletion {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        _params: SamplingParams,
    ) -> Result<String, ProviderError> {
        if let Some(first) = messages.first() {
            self.system_prompts.lock().unwrap().push(first.content.clone());
        }
        Ok(self.reply.clone())
    }
}

struct ScriptedSearch {
    documents: Vec<SearchDocument>,
    calls: AtomicUsize,
}

impl ScriptedSearch {
    fn new(documents: Vec<SearchDocument>) -> Self {
        Self {
            documents,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SearchProvider for ScriptedSearch {
    async fn search(&self, _request: &WebSearchRequest) -> Result<Vec<SearchDocument>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.documents.clone())
    }
}

struct Harness {
    orchestrator: AgentOrchestrator,
    connector: Arc<MemoryConnector>,
    search: Arc<ScriptedSearch>,
    completion: Arc<ScriptedCompletion>,
    _dir: tempfile::TempDir,
}

fn harness(settings: Settings, documents: Vec<SearchDocument>, completion_reply: &str) -> Harness {
    let connector = Arc::new(MemoryConnector::new());
    let store = Arc::new(EntityStore::new(
        settings.store.clone(),
        settings.scoring.clone(),
        settings.graph.clone(),
        connector.clone(),
    ));
    let embeddings = EmbeddingService::new(
        Box::new(OfflineEmbedder),
        &settings.providers.embedding,
        &settings.cache,
    );
    let completion = Arc::new(ScriptedCompletion::new(completion_reply));
    let completion_provider: Arc<dyn CompletionProvider> = completion.clone();
    let search = Arc::new(ScriptedSearch::new(documents));
    let search_provider: Arc<dyn SearchProvider> = search.clone();
    let dir = tempfile::tempdir().expect("tempdir");
    let sessions = SessionStore::load(dir.path().join("sessions.json"));

    let ctx = Arc::new(AgentContext::new(
        settings,
        store,
        embeddings,
        completion_provider,
        Some(search_provider),
        Arc::new(NullMemoryProvider),
        sessions,
    ));
    Harness {
        orchestrator: AgentOrchestrator::new(ctx),
        connector,
        search,
        completion,
        _dir: dir,
    }
}

async fn seed_ada(harness: &Harness, namespace: &str) {
    let backend = harness.connector.backend(namespace).await;
    backend
        .seed(vec![Entity::new(NewEntity {
            name: "Ada Lovelace".to_string(),
            category: EntityCategory::Person,
            source_query: "who is ada lovelace".to_string(),
            description: ADA_DESCRIPTION.to_string(),
        })])
        .await;
}

fn hopper_documents() -> Vec<SearchDocument> {
    vec![SearchDocument {
        id: "doc-1".to_string(),
        title: "Grace Hopper".to_string(),
        text: "Grace Hopper (1906-1992) was a pioneer of computer programming."
            .to_string(),
        url: "https://example.org/grace-hopper".to_string(),
    }]
}

#[tokio::test]
async fn known_entity_is_answered_locally_without_web_escalation() {
    let h = harness(Settings::default(), hopper_documents(), "unused");
    seed_ada(&h, "general").await;

    let reply = h
        .orchestrator
        .answer("u1", "general", "Who is Ada Lovelace?")
        .await
        .expect("reply");

    assert_eq!(reply.source, AnswerSource::Local);
    assert!(!reply.cached);
    assert_eq!(reply.answer, ADA_DESCRIPTION);
    assert_eq!(h.search.calls(), 0);
    assert!(!reply.tool_trace.is_empty());
}

#[tokio::test]
async fn repeated_query_is_served_from_cache_without_store_searches() {
    let h = harness(Settings::default(), Vec::new(), "unused");
    seed_ada(&h, "general").await;

    let first = h
        .orchestrator
        .answer("u1", "general", "Who is Ada Lovelace?")
        .await
        .expect("first reply");
    let stats_after_first = h.orchestrator.context().store.stats();

    let second = h
        .orchestrator
        .answer("u1", "general", "Who is Ada Lovelace?")
        .await
        .expect("second reply");

    assert!(second.cached);
    assert_eq!(second.source, AnswerSource::Cache);
    assert_eq!(second.answer, first.answer);
    assert_eq!(h.orchestrator.context().store.stats(), stats_after_first);
}

#[tokio::test]
async fn case_variant_paraphrase_hits_the_semantic_cache() {
    let h = harness(Settings::default(), Vec::new(), "unused");
    seed_ada(&h, "general").await;

    h.orchestrator
        .answer("u1", "general", "Who is Ada Lovelace?")
        .await
        .expect("first reply");
    let second = h
        .orchestrator
        .answer("u1", "general", "who is ada lovelace?")
        .await
        .expect("second reply");

    assert!(second.cached);
    assert_eq!(second.answer, ADA_DESCRIPTION);
}

#[tokio::test]
async fn cache_entries_expire_after_ttl() {
    let mut settings = Settings::default();
    settings.cache.answer_ttl_seconds = 0;
    let h = harness(settings, Vec::new(), "unused");
    seed_ada(&h, "general").await;

    h.orchestrator
        .answer("u1", "general", "Who is Ada Lovelace?")
        .await
        .expect("first reply");
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = h
        .orchestrator
        .answer("u1", "general", "Who is Ada Lovelace?")
        .await
        .expect("second reply");

    assert!(!second.cached);
    assert_eq!(second.source, AnswerSource::Local);
}

#[tokio::test]
async fn unknown_entity_escalates_to_one_web_search_and_persists_the_summary() {
    let h = harness(Settings::default(), hopper_documents(), HOPPER_SUMMARY);

    let reply = h
        .orchestrator
        .answer("u1", "general", "who is Grace Hopper?")
        .await
        .expect("reply");

    assert_eq!(reply.source, AnswerSource::Web);
    assert!(!reply.cached);
    assert_eq!(reply.answer, HOPPER_SUMMARY);
    assert_eq!(h.search.calls(), 1);
    assert_eq!(h.completion.summarize_calls(), 1);

    let entities = h
        .orchestrator
        .context()
        .store
        .get_all_entities("general")
        .await
        .expect("entities");
    let persisted = entities
        .iter()
        .find(|entity| entity.name == "Grace Hopper")
        .expect("persisted summary entity");
    assert_eq!(persisted.source_query, "who is Grace Hopper?");
    assert_eq!(persisted.description, HOPPER_SUMMARY);
}

#[tokio::test]
async fn exhausted_run_returns_a_structured_apology_with_a_complete_trace() {
    let h = harness(Settings::default(), Vec::new(), "nothing helpful");

    let reply = h
        .orchestrator
        .answer("u1", "general", "who is Zebulon Nimblewick?")
        .await
        .expect("reply");

    assert_eq!(reply.source, AnswerSource::None);
    assert_eq!(reply.confidence, 0.0);
    assert!(!reply.cached);
    assert!(reply.answer.contains("who is Zebulon Nimblewick?"));
    assert!(!reply.tool_trace.is_empty());
    assert!(!reply.decisions.is_empty());
    for usage in &reply.tool_trace {
        assert!(usage.finished_at >= usage.started_at);
    }
}

#[tokio::test]
async fn empty_query_is_rejected_before_any_tool_runs() {
    let h = harness(Settings::default(), Vec::new(), "unused");

    let err = h
        .orchestrator
        .answer("u1", "general", "   ")
        .await
        .expect_err("validation error");
    assert!(matches!(err, AgentError::Validation(_)));
    assert_eq!(h.search.calls(), 0);
}

#[tokio::test]
async fn over_budget_client_is_rate_limited() {
    let mut settings = Settings::default();
    settings.rate_limit.max_requests = 1;
    let h = harness(settings, Vec::new(), "nothing helpful");
    seed_ada(&h, "general").await;

    h.orchestrator
        .answer("u1", "general", "Who is Ada Lovelace?")
        .await
        .expect("first reply");
    let err = h
        .orchestrator
        .answer("u1", "general", "Who is Ada Lovelace?")
        .await
        .expect_err("rate limited");
    assert!(matches!(err, AgentError::RateLimited(_)));
}

#[tokio::test]
async fn unreachable_namespace_surfaces_a_connection_error() {
    let h = harness(Settings::default(), Vec::new(), "unused");
    h.connector.refuse("broken").await;

    let err = h
        .orchestrator
        .answer("u1", "broken", "who is anyone?")
        .await
        .expect_err("connection error");
    assert!(matches!(
        err,
        AgentError::Store(StoreError::Connection { .. })
    ));
}
