use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of a knowledge entity.
///
/// The known variants cover the common cases; anything else is carried as a
/// dynamic category so discovered knowledge is never forced into `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityCategory {
    Person,
    Organization,
    Place,
    Concept,
    Other,
    Custom(String),
}

impl EntityCategory {
    /// String representation used on the wire and in dedup keys.
    pub fn label(&self) -> &str {
        match self {
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Place => "place",
            Self::Concept => "concept",
            Self::Other => "other",
            Self::Custom(label) => label,
        }
    }

    /// Parse a category label, mapping unknown labels to `Custom`.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "person" => Self::Person,
            "organization" => Self::Organization,
            "place" => Self::Place,
            "concept" => Self::Concept,
            "other" | "" => Self::Other,
            custom => Self::Custom(custom.to_string()),
        }
    }
}

impl From<String> for EntityCategory {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<EntityCategory> for String {
    fn from(value: EntityCategory) -> Self {
        value.label().to_string()
    }
}

impl std::fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A named, categorized knowledge record with provenance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub category: EntityCategory,
    /// Query that led to this entity's discovery.
    pub source_query: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Entity {
    /// Build a fresh entity with a generated id and the current timestamp.
    pub fn new(params: NewEntity) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: params.name,
            category: params.category,
            source_query: params.source_query,
            description: params.description,
            created_at: Utc::now(),
        }
    }
}

/// Parameters for entity creation; the store assigns id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntity {
    pub name: String,
    pub category: EntityCategory,
    pub source_query: String,
    pub description: String,
}

/// Result of an entity search: returned page plus total match count.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchOutcome {
    pub entities: Vec<Entity>,
    pub total: usize,
}

/// A derived (not persisted) similarity edge between two entities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    pub from_id: String,
    pub to_id: String,
    pub strength: f32,
}

/// Bounded traversal result over the derived relationship graph.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GraphView {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub total: usize,
}

/// Outcome of a duplicate-cleanup pass.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DuplicateReport {
    /// Number of (normalized-name, category) groups with more than one record.
    pub duplicate_groups: usize,
    /// Records beyond the kept-oldest in those groups.
    pub duplicates: usize,
    /// Records the backing store actually deleted.
    pub deleted: usize,
}
