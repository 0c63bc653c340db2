//! Derived relationship graph.
//!
//! Relationships are a view computed from the current entity snapshot at
//! traversal time, never persisted. Derivation is O(n²) over the snapshot,
//! which keeps the graph always consistent with the store.

use std::collections::{HashMap, HashSet, VecDeque};

use sibyl_core::GraphWeights;

use crate::matching::{name_similarity, normalize_name};
use crate::models::{Entity, GraphView, Relationship};

/// Combined similarity strength for one entity pair.
fn pair_strength(a: &Entity, b: &Entity, weights: &GraphWeights) -> f32 {
    let mut strength = 0.0;

    if a.category == b.category {
        strength += weights.same_category;
    }

    if !a.source_query.trim().is_empty()
        && normalize_name(&a.source_query) == normalize_name(&b.source_query)
    {
        strength += weights.same_source;
    }

    let name_a = normalize_name(&a.name);
    let name_b = normalize_name(&b.name);
    let description_a = normalize_name(&a.description);
    let description_b = normalize_name(&b.description);
    let mentions = (name_a.len() > 2 && description_b.contains(&name_a))
        || (name_b.len() > 2 && description_a.contains(&name_b));
    if mentions {
        strength += weights.mention;
    }

    let age_gap = (a.created_at - b.created_at).num_seconds().abs();
    if age_gap <= weights.temporal_window_seconds {
        strength += weights.temporal;
    }

    strength
}

/// Derive every edge whose combined strength reaches the threshold.
pub fn derive_relationships(entities: &[Entity], weights: &GraphWeights) -> Vec<Relationship> {
    let mut relationships = Vec::new();
    for (i, a) in entities.iter().enumerate() {
        for b in entities.iter().skip(i + 1) {
            let strength = pair_strength(a, b, weights);
            if strength >= weights.edge_threshold {
                relationships.push(Relationship {
                    from_id: a.id.clone(),
                    to_id: b.id.clone(),
                    strength,
                });
            }
        }
    }
    relationships
}

/// Find the traversal start entity by exact normalized name, falling back to
/// the best fuzzy match at or above `fuzzy_threshold`.
fn find_start<'a>(
    entities: &'a [Entity],
    start_name: &str,
    fuzzy_threshold: f32,
) -> Option<&'a Entity> {
    let normalized = normalize_name(start_name);
    if let Some(exact) = entities
        .iter()
        .find(|entity| normalize_name(&entity.name) == normalized)
    {
        return Some(exact);
    }

    entities
        .iter()
        .map(|entity| (entity, name_similarity(&entity.name, start_name)))
        .filter(|(_, similarity)| *similarity >= fuzzy_threshold)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(entity, _)| entity)
}

/// Breadth-first traversal bounded by `max_depth` and `limit`.
///
/// An unmatched start name is a legitimate "nothing found" outcome and
/// returns an empty view, not an error.
pub fn traverse(
    entities: &[Entity],
    weights: &GraphWeights,
    start_name: &str,
    max_depth: usize,
    limit: usize,
    fuzzy_threshold: f32,
) -> GraphView {
    let Some(start) = find_start(entities, start_name, fuzzy_threshold) else {
        return GraphView::default();
    };
    if limit == 0 {
        return GraphView::default();
    }

    let by_id: HashMap<&str, &Entity> = entities
        .iter()
        .map(|entity| (entity.id.as_str(), entity))
        .collect();
    let relationships = derive_relationships(entities, weights);

    let mut adjacency: HashMap<&str, Vec<(&str, f32)>> = HashMap::new();
    for relationship in &relationships {
        adjacency
            .entry(relationship.from_id.as_str())
            .or_default()
            .push((relationship.to_id.as_str(), relationship.strength));
        adjacency
            .entry(relationship.to_id.as_str())
            .or_default()
            .push((relationship.from_id.as_str(), relationship.strength));
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut collected: Vec<Entity> = Vec::new();
    let mut traversed_edges: Vec<Relationship> = Vec::new();
    let mut queue: VecDeque<(&str, usize)> = VecDeque::new();

    visited.insert(start.id.as_str());
    collected.push(start.clone());
    queue.push_back((start.id.as_str(), 0));

    while let Some((current_id, depth)) = queue.pop_front() {
        if depth >= max_depth || collected.len() >= limit {
            continue;
        }
        let Some(neighbors) = adjacency.get(current_id) else {
            continue;
        };
        for (neighbor_id, strength) in neighbors.iter().copied() {
            if collected.len() >= limit {
                break;
            }
            if !visited.insert(neighbor_id) {
                continue;
            }
            if let Some(entity) = by_id.get(neighbor_id) {
                traversed_edges.push(Relationship {
                    from_id: current_id.to_string(),
                    to_id: neighbor_id.to_string(),
                    strength,
                });
                collected.push((*entity).clone());
                queue.push_back((neighbor_id, depth + 1));
            }
        }
    }

    let total = collected.len();
    GraphView {
        entities: collected,
        relationships: traversed_edges,
        total,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::models::{EntityCategory, NewEntity};

    fn entity(name: &str, category: EntityCategory, source: &str, description: &str) -> Entity {
        Entity::new(NewEntity {
            name: name.to_string(),
            category,
            source_query: source.to_string(),
            description: description.to_string(),
        })
    }

    #[test]
    fn same_source_and_category_connects() {
        let weights = GraphWeights::default();
        let a = entity("Ada Lovelace", EntityCategory::Person, "victorian computing", "");
        let b = entity("Charles Babbage", EntityCategory::Person, "victorian computing", "");

        let relationships = derive_relationships(&[a, b], &weights);
        assert_eq!(relationships.len(), 1);
        assert!(relationships[0].strength >= weights.edge_threshold);
    }

    #[test]
    fn unrelated_entities_stay_disconnected() {
        let mut weights = GraphWeights::default();
        // Push creation-time proximity below the threshold on its own.
        weights.temporal = 0.1;
        let mut a = entity("Ada Lovelace", EntityCategory::Person, "q1", "");
        let b = entity("Mount Fuji", EntityCategory::Place, "q2", "");
        a.created_at = Utc::now() - Duration::hours(5);

        assert!(derive_relationships(&[a, b], &weights).is_empty());
    }

    #[test]
    fn mention_in_description_adds_strength() {
        let weights = GraphWeights::default();
        let a = entity("Analytical Engine", EntityCategory::Concept, "q1", "");
        let b = entity(
            "Ada Lovelace",
            EntityCategory::Person,
            "q2",
            "Wrote the first program for the Analytical Engine",
        );

        let relationships = derive_relationships(&[a, b], &weights);
        assert_eq!(relationships.len(), 1);
    }

    #[test]
    fn traversal_respects_limit_and_depth() {
        let weights = GraphWeights::default();
        // A chain of entities all sharing category + source, so everything
        // connects to everything: limit must still cap the result.
        let entities: Vec<Entity> = (0..10)
            .map(|i| entity(&format!("node {i}"), EntityCategory::Concept, "chain", ""))
            .collect();

        let view = traverse(&entities, &weights, "node 0", 2, 5, 0.7);
        assert!(view.entities.len() <= 5);
        assert_eq!(view.total, view.entities.len());
        assert_eq!(view.relationships.len(), view.entities.len() - 1);
    }

    #[test]
    fn depth_zero_returns_only_start() {
        let weights = GraphWeights::default();
        let entities = vec![
            entity("a", EntityCategory::Concept, "q", ""),
            entity("b", EntityCategory::Concept, "q", ""),
        ];
        let view = traverse(&entities, &weights, "a", 0, 10, 0.7);
        assert_eq!(view.entities.len(), 1);
        assert!(view.relationships.is_empty());
    }

    #[test]
    fn missing_start_is_empty_not_error() {
        let weights = GraphWeights::default();
        let entities = vec![entity("a", EntityCategory::Concept, "q", "")];
        let view = traverse(&entities, &weights, "completely different", 2, 5, 0.7);
        assert!(view.entities.is_empty());
        assert_eq!(view.total, 0);
    }

    #[test]
    fn fuzzy_start_match_is_used() {
        let weights = GraphWeights::default();
        let entities = vec![entity("Ada Lovelace", EntityCategory::Person, "q", "")];
        let view = traverse(&entities, &weights, "Ada Lovelase", 2, 5, 0.7);
        assert_eq!(view.entities.len(), 1);
        assert_eq!(view.entities[0].name, "Ada Lovelace");
    }
}
