//! Backing-store connectors.
//!
//! The backing knowledge store is an external graph-capable database reached
//! over a local RPC-style connection, one endpoint per namespace. The store
//! only ever talks to it through the [`EntityBackend`] trait, so tests and
//! embedded deployments can swap in [`MemoryBackend`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

use sibyl_core::Settings;

use crate::errors::{StoreError, StoreResult};
use crate::models::Entity;

/// Named operations supported by the backing store.
#[async_trait::async_trait]
pub trait EntityBackend: std::fmt::Debug + Send + Sync {
    async fn get_all_entities(&self) -> StoreResult<Vec<Entity>>;

    async fn create_entity(&self, entity: Entity) -> StoreResult<Entity>;

    async fn get_entity_by_id(&self, entity_id: &str) -> StoreResult<Option<Entity>>;

    /// Physically delete an entity. Returns `Ok(false)` when the backing
    /// store does not support deletion.
    async fn delete_entity(&self, entity_id: &str) -> StoreResult<bool>;
}

/// Maps a namespace to a connected backend.
#[async_trait::async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(&self, namespace: &str) -> StoreResult<Arc<dyn EntityBackend>>;
}

// ── HTTP connector ─────────────────────────────────────────────────

/// RPC-over-HTTP backend for one namespace endpoint.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
    namespace: String,
}

#[derive(Debug, Serialize)]
struct OpRequest<'a> {
    op: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    entity: Option<&'a Entity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entity_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EntitiesResponse {
    #[serde(default)]
    entities: Option<Vec<WireEntity>>,
}

#[derive(Debug, Deserialize)]
struct EntityResponse {
    #[serde(default)]
    entity: Option<WireEntity>,
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    #[serde(default)]
    deleted: Option<bool>,
}

/// Lenient wire shape; malformed records are logged and dropped at the
/// boundary instead of propagating untyped data inward.
#[derive(Debug, Deserialize)]
struct WireEntity {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    source_query: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

impl WireEntity {
    fn into_entity(self, namespace: &str) -> Option<Entity> {
        let id = self.id?;
        let Some(name) = self.name else {
            warn!(namespace, id, "dropping backing-store entity without a name");
            return None;
        };
        let created_at = self
            .created_at
            .as_deref()
            .and_then(|raw| chrono::DateTime::parse_from_rfc3339(raw).ok())
            .map(|parsed| parsed.with_timezone(&chrono::Utc))
            .unwrap_or_else(chrono::Utc::now);
        Some(Entity {
            id,
            name,
            category: crate::models::EntityCategory::parse(self.category.as_deref().unwrap_or("")),
            source_query: self.source_query.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            created_at,
        })
    }
}

impl HttpBackend {
    pub fn new(namespace: &str, endpoint: &str, timeout: Duration) -> StoreResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            namespace: namespace.to_string(),
        })
    }

    async fn call<T: for<'de> Deserialize<'de>>(&self, request: OpRequest<'_>) -> StoreResult<T> {
        let url = format!("{}/rpc", self.endpoint);
        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Backend(format!(
                "{} op '{}' failed: HTTP {status} {body}",
                self.namespace, request.op
            )));
        }
        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl EntityBackend for HttpBackend {
    async fn get_all_entities(&self) -> StoreResult<Vec<Entity>> {
        let payload: EntitiesResponse = self
            .call(OpRequest {
                op: "get_all_entities",
                entity: None,
                entity_id: None,
            })
            .await?;
        Ok(payload
            .entities
            .unwrap_or_default()
            .into_iter()
            .filter_map(|wire| wire.into_entity(&self.namespace))
            .collect())
    }

    async fn create_entity(&self, entity: Entity) -> StoreResult<Entity> {
        let payload: EntityResponse = self
            .call(OpRequest {
                op: "create_entity",
                entity: Some(&entity),
                entity_id: None,
            })
            .await?;
        // The store echoes the created record; fall back to what we sent.
        Ok(payload
            .entity
            .and_then(|wire| wire.into_entity(&self.namespace))
            .unwrap_or(entity))
    }

    async fn get_entity_by_id(&self, entity_id: &str) -> StoreResult<Option<Entity>> {
        let payload: EntityResponse = self
            .call(OpRequest {
                op: "get_entity_by_id",
                entity: None,
                entity_id: Some(entity_id),
            })
            .await?;
        Ok(payload
            .entity
            .and_then(|wire| wire.into_entity(&self.namespace)))
    }

    async fn delete_entity(&self, entity_id: &str) -> StoreResult<bool> {
        let payload: DeleteResponse = self
            .call(OpRequest {
                op: "delete_entity",
                entity: None,
                entity_id: Some(entity_id),
            })
            .await?;
        Ok(payload.deleted.unwrap_or(false))
    }
}

/// Connects namespaces to their configured HTTP endpoints.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    settings: Settings,
}

impl HttpConnector {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

#[async_trait::async_trait]
impl BackendConnector for HttpConnector {
    async fn connect(&self, namespace: &str) -> StoreResult<Arc<dyn EntityBackend>> {
        let ns = self
            .settings
            .namespace(namespace)
            .ok_or_else(|| StoreError::UnknownNamespace(namespace.to_string()))?;
        let endpoint = ns.endpoint();
        let timeout = Duration::from_secs(self.settings.providers.search.timeout_seconds);
        let backend = HttpBackend::new(namespace, &endpoint, timeout)?;

        // Probe the endpoint so an unreachable namespace fails at connect
        // time with an error naming the namespace and expected endpoint.
        let health_url = format!("{}/health", endpoint);
        let probe = backend.client.get(&health_url).send().await;
        match probe {
            Ok(response) if response.status().is_success() => Ok(Arc::new(backend)),
            Ok(response) => Err(StoreError::Connection {
                namespace: namespace.to_string(),
                endpoint,
                reason: format!("health check returned HTTP {}", response.status()),
            }),
            Err(err) => Err(StoreError::Connection {
                namespace: namespace.to_string(),
                endpoint,
                reason: err.to_string(),
            }),
        }
    }
}

// ── In-memory backend ──────────────────────────────────────────────

/// Embedded backend holding entities in memory. Used by tests and by
/// deployments without an external backing store. Supports deletion.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entities: RwLock<Vec<Entity>>,
    fetches: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the backend with existing records.
    pub async fn seed(&self, entities: Vec<Entity>) {
        let mut guard = self.entities.write().await;
        guard.extend(entities);
    }

    /// Number of full-set fetches served, which is how tests observe cache
    /// warms against this backend.
    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl EntityBackend for MemoryBackend {
    async fn get_all_entities(&self) -> StoreResult<Vec<Entity>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        Ok(self.entities.read().await.clone())
    }

    async fn create_entity(&self, entity: Entity) -> StoreResult<Entity> {
        let mut guard = self.entities.write().await;
        guard.push(entity.clone());
        Ok(entity)
    }

    async fn get_entity_by_id(&self, entity_id: &str) -> StoreResult<Option<Entity>> {
        Ok(self
            .entities
            .read()
            .await
            .iter()
            .find(|entity| entity.id == entity_id)
            .cloned())
    }

    async fn delete_entity(&self, entity_id: &str) -> StoreResult<bool> {
        let mut guard = self.entities.write().await;
        let before = guard.len();
        guard.retain(|entity| entity.id != entity_id);
        Ok(guard.len() < before)
    }
}

/// Connector that lazily creates one [`MemoryBackend`] per namespace.
///
/// Tracks connect attempts and can refuse namespaces, which is how the tests
/// exercise connection failures and the single-in-flight-connect guarantee.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    backends: RwLock<HashMap<String, Arc<MemoryBackend>>>,
    refused: RwLock<Vec<String>>,
    attempts: AtomicU64,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the backend for a namespace without counting as a
    /// connection attempt (used to seed data before connecting).
    pub async fn backend(&self, namespace: &str) -> Arc<MemoryBackend> {
        let mut backends = self.backends.write().await;
        backends
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(MemoryBackend::new()))
            .clone()
    }

    /// Make future connects to `namespace` fail with a connection error.
    pub async fn refuse(&self, namespace: &str) {
        self.refused.write().await.push(namespace.to_string());
    }

    /// Number of connection attempts made through this connector.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl BackendConnector for MemoryConnector {
    async fn connect(&self, namespace: &str) -> StoreResult<Arc<dyn EntityBackend>> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if self.refused.read().await.iter().any(|ns| ns == namespace) {
            return Err(StoreError::Connection {
                namespace: namespace.to_string(),
                endpoint: "memory".to_string(),
                reason: "refused".to_string(),
            });
        }
        Ok(self.backend(namespace).await)
    }
}
