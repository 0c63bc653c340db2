//! The per-namespace entity store.
//!
//! Each namespace owns a backing connection, a warm in-memory cache of the
//! full entity set, and a normalized-name index. Connection establishment is
//! serialized per namespace: concurrent callers share one in-flight attempt.
//! The first connect blocks on the initial warm; later refreshes are
//! fire-and-forget background jobs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

use sibyl_core::{GraphWeights, ScoringWeights, StoreSettings};

use crate::backend::{BackendConnector, EntityBackend};
use crate::errors::{StoreError, StoreResult};
use crate::graph;
use crate::matching::{extract_query_target, name_similarity, normalize_name};
use crate::models::{DuplicateReport, Entity, GraphView, NewEntity, SearchOutcome};
use crate::scoring::{QueryProfile, score_entity};

#[derive(Debug, Default)]
struct WarmCache {
    entities: Vec<Entity>,
    /// normalized name -> entity ids with that name.
    name_index: HashMap<String, Vec<String>>,
    warmed_at: Option<Instant>,
    /// When the backing store count was last checked for growth.
    growth_checked_at: Option<Instant>,
    refresh_running: bool,
}

impl WarmCache {
    fn rebuild(&mut self, entities: Vec<Entity>) {
        let mut name_index: HashMap<String, Vec<String>> = HashMap::new();
        for entity in &entities {
            name_index
                .entry(normalize_name(&entity.name))
                .or_default()
                .push(entity.id.clone());
        }
        self.entities = entities;
        self.name_index = name_index;
        self.warmed_at = Some(Instant::now());
        self.growth_checked_at = None;
    }

    fn insert(&mut self, entity: Entity) {
        self.name_index
            .entry(normalize_name(&entity.name))
            .or_default()
            .push(entity.id.clone());
        self.entities.push(entity);
    }

    fn remove_ids(&mut self, ids: &HashSet<String>) {
        self.entities.retain(|entity| !ids.contains(&entity.id));
        for bucket in self.name_index.values_mut() {
            bucket.retain(|id| !ids.contains(id));
        }
        self.name_index.retain(|_, bucket| !bucket.is_empty());
    }

    fn by_id(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.id == id)
    }
}

struct NamespaceState {
    name: String,
    backend: OnceCell<Arc<dyn EntityBackend>>,
    warm: RwLock<WarmCache>,
}

/// Point-in-time snapshot of search-path counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStatsSnapshot {
    pub exact_hits: u64,
    pub fuzzy_hits: u64,
    /// Number of times the full-corpus scored ranking ran. The cheaper
    /// stages short-circuit it whenever they already satisfy the limit.
    pub ranked_scans: u64,
}

#[derive(Debug, Default)]
struct SearchStats {
    exact_hits: AtomicU64,
    fuzzy_hits: AtomicU64,
    ranked_scans: AtomicU64,
}

/// Namespace-partitioned entity store.
pub struct EntityStore {
    settings: StoreSettings,
    weights: ScoringWeights,
    graph_weights: GraphWeights,
    connector: Arc<dyn BackendConnector>,
    namespaces: RwLock<HashMap<String, Arc<NamespaceState>>>,
    stats: SearchStats,
}

impl EntityStore {
    pub fn new(
        settings: StoreSettings,
        weights: ScoringWeights,
        graph_weights: GraphWeights,
        connector: Arc<dyn BackendConnector>,
    ) -> Self {
        Self {
            settings,
            weights,
            graph_weights,
            connector,
            namespaces: RwLock::new(HashMap::new()),
            stats: SearchStats::default(),
        }
    }

    async fn state(&self, namespace: &str) -> Arc<NamespaceState> {
        let mut namespaces = self.namespaces.write().await;
        namespaces
            .entry(namespace.to_string())
            .or_insert_with(|| {
                Arc::new(NamespaceState {
                    name: namespace.to_string(),
                    backend: OnceCell::new(),
                    warm: RwLock::new(WarmCache::default()),
                })
            })
            .clone()
    }

    /// Idempotent connect. Concurrent callers for the same namespace await
    /// the same in-flight attempt; a failed attempt can be retried.
    pub async fn connect(&self, namespace: &str) -> StoreResult<()> {
        self.ensure_ready(namespace).await.map(|_| ())
    }

    async fn ensure_ready(
        &self,
        namespace: &str,
    ) -> StoreResult<(Arc<NamespaceState>, Arc<dyn EntityBackend>)> {
        let state = self.state(namespace).await;

        // The initial warm runs inside the shared connect attempt, so every
        // caller awaiting the first connect observes a populated index and
        // the backing store is fetched exactly once.
        let backend = state
            .backend
            .get_or_try_init(|| async {
                info!(namespace, "connecting entity store namespace");
                let backend = self.connector.connect(&state.name).await?;
                warm_namespace(&state, &backend).await?;
                Ok::<_, StoreError>(backend)
            })
            .await?
            .clone();

        self.maybe_refresh(&state, &backend).await;
        Ok((state, backend))
    }

    /// Kick off a background re-warm when the cache is empty or stale, or a
    /// growth check against the backing store once the warm set is past the
    /// request-cache window. Never blocks the request path.
    async fn maybe_refresh(&self, state: &Arc<NamespaceState>, backend: &Arc<dyn EntityBackend>) {
        let mut warm = state.warm.write().await;
        if warm.refresh_running {
            return;
        }
        let age = warm.warmed_at.map(|at| at.elapsed().as_secs());
        let stale = match age {
            None => true,
            Some(age) => age > self.settings.warm_refresh_seconds,
        };
        // Growth is checked at most once per request-cache window; within
        // the window the warm set is trusted as-is.
        let checked_age = warm
            .growth_checked_at
            .or(warm.warmed_at)
            .map(|at| at.elapsed().as_secs());
        let check_growth = !stale
            && matches!(checked_age, Some(age) if age >= self.settings.request_cache_seconds);
        if !stale && !check_growth {
            return;
        }

        warm.refresh_running = true;
        let known = warm.entities.len();
        drop(warm);

        let state = state.clone();
        let backend = backend.clone();
        let growth_ratio = self.settings.growth_refresh_ratio;
        tokio::spawn(async move {
            let result = if stale {
                warm_namespace(&state, &backend).await
            } else {
                rewarm_if_grown(&state, &backend, known, growth_ratio).await
            };
            if let Err(err) = result {
                warn!(namespace = %state.name, "background cache warm failed: {err}");
            }
            state.warm.write().await.refresh_running = false;
        });
    }

    /// Multi-stage search: exact name index, fuzzy/pattern name match, then
    /// full-corpus scored ranking. Each stage short-circuits once `limit`
    /// high-confidence matches exist, so the expensive ranking stage only
    /// runs when the cheaper stages come up short.
    pub async fn search(
        &self,
        namespace: &str,
        query: &str,
        limit: usize,
    ) -> StoreResult<SearchOutcome> {
        let (state, _backend) = self.ensure_ready(namespace).await?;
        let warm = state.warm.read().await;

        let mut matched: Vec<Entity> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        // Stage (a): exact normalized-name hit.
        let normalized_query = normalize_name(query);
        if let Some(ids) = warm.name_index.get(&normalized_query) {
            for id in ids {
                if let Some(entity) = warm.by_id(id) {
                    if seen.insert(entity.id.clone()) {
                        matched.push(entity.clone());
                    }
                }
            }
            if !matched.is_empty() {
                self.stats.exact_hits.fetch_add(1, Ordering::Relaxed);
            }
        }

        // Stage (b): substring / fuzzy name match, preferring the
        // pattern-extracted target when the query looks like a template.
        if matched.len() < limit {
            let target = extract_query_target(query);
            let needle = normalize_name(target.as_deref().unwrap_or(query));
            if !needle.is_empty() {
                let mut fuzzy_found = false;
                for entity in &warm.entities {
                    if seen.contains(&entity.id) {
                        continue;
                    }
                    let name = normalize_name(&entity.name);
                    let substring_hit = !name.is_empty()
                        && (name.contains(&needle) || needle.contains(&name));
                    let fuzzy_hit = substring_hit
                        || name_similarity(&entity.name, &needle) >= self.settings.fuzzy_threshold;
                    if fuzzy_hit {
                        seen.insert(entity.id.clone());
                        matched.push(entity.clone());
                        fuzzy_found = true;
                    }
                }
                if fuzzy_found {
                    self.stats.fuzzy_hits.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        // Short-circuit: skip the O(corpus) ranking when already satisfied.
        if matched.len() >= limit {
            let total = matched.len();
            matched.truncate(limit);
            debug!(namespace, query, total, "search satisfied before ranking");
            return Ok(SearchOutcome {
                entities: matched,
                total,
            });
        }

        // Stage (c): full-corpus scored ranking.
        self.stats.ranked_scans.fetch_add(1, Ordering::Relaxed);
        let profile = QueryProfile::new(query);
        let now = Utc::now();
        let mut scored: Vec<(f32, &Entity)> = warm
            .entities
            .iter()
            .filter(|entity| !seen.contains(&entity.id))
            .map(|entity| (score_entity(entity, &profile, &self.weights, now), entity))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let total = matched.len() + scored.len();
        for (_, entity) in scored {
            if matched.len() >= limit {
                break;
            }
            matched.push(entity.clone());
        }

        Ok(SearchOutcome {
            entities: matched,
            total,
        })
    }

    /// Create an entity, deduplicating first by exact normalized name and
    /// then by fuzzy similarity within the same category. A duplicate hit
    /// returns the existing record instead of creating a new one.
    pub async fn create_entity(&self, namespace: &str, params: NewEntity) -> StoreResult<Entity> {
        let (state, backend) = self.ensure_ready(namespace).await?;

        {
            let warm = state.warm.read().await;
            if let Some(existing) = find_duplicate(&warm, &params, self.settings.dedup_threshold) {
                debug!(
                    namespace,
                    name = %params.name,
                    existing_id = %existing.id,
                    "create deduplicated to existing entity"
                );
                return Ok(existing.clone());
            }
        }

        let entity = Entity::new(params);
        let created = backend.create_entity(entity).await?;

        // Synchronous index update: a read following this create in the same
        // call chain must observe the new entity.
        state.warm.write().await.insert(created.clone());
        Ok(created)
    }

    pub async fn get_all_entities(&self, namespace: &str) -> StoreResult<Vec<Entity>> {
        let (state, _backend) = self.ensure_ready(namespace).await?;
        let entities = state.warm.read().await.entities.clone();
        Ok(entities)
    }

    pub async fn get_entity_by_id(
        &self,
        namespace: &str,
        entity_id: &str,
    ) -> StoreResult<Option<Entity>> {
        let (state, backend) = self.ensure_ready(namespace).await?;
        if let Some(entity) = state.warm.read().await.by_id(entity_id) {
            return Ok(Some(entity.clone()));
        }
        backend.get_entity_by_id(entity_id).await
    }

    /// Rank other entities by description-level bag-of-words cosine
    /// similarity. Purely local, no embedding provider involved.
    pub async fn find_similar_entities(
        &self,
        namespace: &str,
        entity_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<Entity>> {
        let (state, _backend) = self.ensure_ready(namespace).await?;
        let warm = state.warm.read().await;
        let base = warm
            .by_id(entity_id)
            .ok_or_else(|| StoreError::UnknownEntity(entity_id.to_string()))?;

        let mut ranked: Vec<(f32, &Entity)> = warm
            .entities
            .iter()
            .filter(|entity| entity.id != base.id)
            .map(|entity| {
                (
                    crate::matching::bow_cosine(&base.description, &entity.description),
                    entity,
                )
            })
            .filter(|(similarity, _)| *similarity > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(ranked
            .into_iter()
            .take(limit)
            .map(|(_, entity)| entity.clone())
            .collect())
    }

    /// Group records by (normalized name, category), keep the oldest in each
    /// group, and best-effort delete the rest from the backing store.
    pub async fn cleanup_duplicates(&self, namespace: &str) -> StoreResult<DuplicateReport> {
        let (state, backend) = self.ensure_ready(namespace).await?;

        let groups: HashMap<(String, String), Vec<Entity>> = {
            let warm = state.warm.read().await;
            let mut groups: HashMap<(String, String), Vec<Entity>> = HashMap::new();
            for entity in &warm.entities {
                let key = (
                    normalize_name(&entity.name),
                    entity.category.label().to_string(),
                );
                groups.entry(key).or_default().push(entity.clone());
            }
            groups
        };

        let mut report = DuplicateReport::default();
        let mut removed_ids: HashSet<String> = HashSet::new();
        for (_, mut group) in groups {
            if group.len() < 2 {
                continue;
            }
            report.duplicate_groups += 1;
            group.sort_by_key(|entity| entity.created_at);
            for duplicate in group.into_iter().skip(1) {
                report.duplicates += 1;
                match backend.delete_entity(&duplicate.id).await {
                    Ok(true) => {
                        report.deleted += 1;
                        removed_ids.insert(duplicate.id);
                    }
                    Ok(false) => {
                        debug!(namespace, id = %duplicate.id, "backing store kept duplicate (deletion unsupported)");
                    }
                    Err(err) => {
                        warn!(namespace, id = %duplicate.id, "duplicate deletion failed: {err}");
                    }
                }
            }
        }

        if !removed_ids.is_empty() {
            state.warm.write().await.remove_ids(&removed_ids);
        }
        info!(
            namespace,
            groups = report.duplicate_groups,
            deleted = report.deleted,
            "duplicate cleanup finished"
        );
        Ok(report)
    }

    /// Bounded breadth-first traversal over the derived relationship graph,
    /// built from the current warm snapshot.
    pub async fn traverse_graph(
        &self,
        namespace: &str,
        start_name: &str,
        max_depth: usize,
        limit: usize,
    ) -> StoreResult<GraphView> {
        let (state, _backend) = self.ensure_ready(namespace).await?;
        let warm = state.warm.read().await;
        Ok(graph::traverse(
            &warm.entities,
            &self.graph_weights,
            start_name,
            max_depth,
            limit,
            self.settings.fuzzy_threshold,
        ))
    }

    pub fn stats(&self) -> SearchStatsSnapshot {
        SearchStatsSnapshot {
            exact_hits: self.stats.exact_hits.load(Ordering::Relaxed),
            fuzzy_hits: self.stats.fuzzy_hits.load(Ordering::Relaxed),
            ranked_scans: self.stats.ranked_scans.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        self.stats.exact_hits.store(0, Ordering::Relaxed);
        self.stats.fuzzy_hits.store(0, Ordering::Relaxed);
        self.stats.ranked_scans.store(0, Ordering::Relaxed);
    }
}

async fn warm_namespace(
    state: &Arc<NamespaceState>,
    backend: &Arc<dyn EntityBackend>,
) -> StoreResult<()> {
    let entities = backend.get_all_entities().await?;
    let count = entities.len();
    state.warm.write().await.rebuild(entities);
    debug!(namespace = %state.name, count, "entity cache warmed");
    Ok(())
}

/// Growth check: fetch the backing set and rebuild only when it grew past
/// the configured ratio, so records written by other processes become
/// visible before the staleness TTL.
async fn rewarm_if_grown(
    state: &Arc<NamespaceState>,
    backend: &Arc<dyn EntityBackend>,
    known: usize,
    growth_ratio: f32,
) -> StoreResult<()> {
    let entities = backend.get_all_entities().await?;
    let count = entities.len();
    let grown = count as f32 > known as f32 * (1.0 + growth_ratio);
    let mut warm = state.warm.write().await;
    if grown {
        warm.rebuild(entities);
        debug!(namespace = %state.name, known, count, "backing growth re-warmed entity cache");
    } else {
        warm.growth_checked_at = Some(Instant::now());
    }
    Ok(())
}

fn find_duplicate<'a>(
    warm: &'a WarmCache,
    params: &NewEntity,
    dedup_threshold: f32,
) -> Option<&'a Entity> {
    let normalized = normalize_name(&params.name);

    // Exact normalized-name match first.
    if let Some(ids) = warm.name_index.get(&normalized) {
        for id in ids {
            if let Some(entity) = warm.by_id(id) {
                if entity.category == params.category {
                    return Some(entity);
                }
            }
        }
    }

    // Then fuzzy similarity within the same category.
    warm.entities
        .iter()
        .filter(|entity| entity.category == params.category)
        .map(|entity| (name_similarity(&entity.name, &params.name), entity))
        .filter(|(similarity, _)| *similarity >= dedup_threshold)
        .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(_, entity)| entity)
}
