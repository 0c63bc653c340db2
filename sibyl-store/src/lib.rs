//! Entity store for Sibyl: namespace-partitioned in-memory knowledge index
//! with fuzzy matching, scored ranking, and a derived relationship graph.

pub mod backend;
pub mod errors;
pub mod graph;
pub mod matching;
pub mod models;
pub mod scoring;
pub mod store;

pub use backend::{BackendConnector, EntityBackend, HttpConnector, MemoryBackend, MemoryConnector};
pub use errors::{StoreError, StoreResult};
pub use models::{
    DuplicateReport, Entity, EntityCategory, GraphView, NewEntity, Relationship, SearchOutcome,
};
pub use store::{EntityStore, SearchStatsSnapshot};
