//! Application context: every service the orchestrator needs, constructed
//! explicitly and passed through rather than reached for as globals. Tests
//! build their own context with in-memory doubles.

use std::sync::Arc;

use sibyl_core::Settings;
use sibyl_store::EntityStore;

use crate::patterns::PatternLearner;
use crate::providers::completion::CompletionProvider;
use crate::providers::embedding::EmbeddingService;
use crate::providers::memory::MemoryProvider;
use crate::rate_limit::FixedWindowLimiter;
use crate::semantic_cache::ResponseSemanticCache;
use crate::session::SessionStore;
use crate::web::search::SearchProvider;

pub struct AgentContext {
    pub settings: Settings,
    pub store: Arc<EntityStore>,
    pub answer_cache: ResponseSemanticCache,
    pub embeddings: EmbeddingService,
    pub completion: Arc<dyn CompletionProvider>,
    /// Absent when no search API key is configured; escalation is then
    /// skipped rather than failing.
    pub search: Option<Arc<dyn SearchProvider>>,
    pub memory: Arc<dyn MemoryProvider>,
    pub patterns: PatternLearner,
    pub limiter: FixedWindowLimiter,
    pub sessions: SessionStore,
}

impl AgentContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Settings,
        store: Arc<EntityStore>,
        embeddings: EmbeddingService,
        completion: Arc<dyn CompletionProvider>,
        search: Option<Arc<dyn SearchProvider>>,
        memory: Arc<dyn MemoryProvider>,
        sessions: SessionStore,
    ) -> Self {
        Self {
            answer_cache: ResponseSemanticCache::new(&settings.cache),
            limiter: FixedWindowLimiter::new(&settings.rate_limit),
            patterns: PatternLearner::new(),
            settings,
            store,
            embeddings,
            completion,
            search,
            memory,
            sessions,
        }
    }

    /// Drop all learned and cached state. Test hook.
    pub async fn reset(&self) {
        self.answer_cache.clear().await;
        self.embeddings.clear_cache().await;
        self.patterns.reset().await;
        self.limiter.reset().await;
        self.store.reset_stats();
    }
}
