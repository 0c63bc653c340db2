//! Full-corpus relevance scoring: a weighted feature sum over name,
//! description, category intent, recency and provenance.

use chrono::{DateTime, Utc};
use sibyl_core::ScoringWeights;

use crate::matching::{normalize_name, tokenize};
use crate::models::{Entity, EntityCategory};

/// Pre-tokenized query features shared across one ranking pass.
#[derive(Debug, Clone)]
pub struct QueryProfile {
    pub normalized: String,
    pub tokens: Vec<String>,
    pub intent: Option<EntityCategory>,
}

impl QueryProfile {
    pub fn new(query: &str) -> Self {
        Self {
            normalized: normalize_name(query),
            tokens: tokenize(query),
            intent: category_intent(query),
        }
    }
}

/// Guess the entity category a query is asking about from its phrasing.
pub fn category_intent(query: &str) -> Option<EntityCategory> {
    let lower = query.to_lowercase();
    if lower.starts_with("who ") || lower.contains("person") {
        return Some(EntityCategory::Person);
    }
    if lower.starts_with("where ")
        || lower.contains(" city")
        || lower.contains(" country")
        || lower.contains(" located")
    {
        return Some(EntityCategory::Place);
    }
    if lower.contains("company") || lower.contains("organization") || lower.contains("startup") {
        return Some(EntityCategory::Organization);
    }
    if lower.starts_with("what is") || lower.starts_with("what are") {
        return Some(EntityCategory::Concept);
    }
    None
}

/// Score one entity against a query profile. Zero means no signal at all.
pub fn score_entity(
    entity: &Entity,
    profile: &QueryProfile,
    weights: &ScoringWeights,
    now: DateTime<Utc>,
) -> f32 {
    let mut score = 0.0;
    let name = normalize_name(&entity.name);

    if !name.is_empty() && name == profile.normalized {
        score += weights.exact_name;
    } else if !name.is_empty()
        && (profile.normalized.contains(&name) || name.contains(&profile.normalized))
        && !profile.normalized.is_empty()
    {
        score += weights.name_containment;
    }

    let name_tokens = tokenize(&entity.name);
    for token in &profile.tokens {
        if name_tokens.iter().any(|name_token| name_token == token) {
            score += weights.name_word;
        }
    }

    let description_tokens = tokenize(&entity.description);
    for token in &profile.tokens {
        // Skip ultra-short tokens to keep stopwords from dominating.
        if token.len() > 2 && description_tokens.iter().any(|word| word == token) {
            score += weights.description_word;
        }
    }

    if let Some(intent) = &profile.intent {
        if intent == &entity.category {
            score += weights.category_intent;
        }
    }

    let source = normalize_name(&entity.source_query);
    if !source.is_empty() && (source == profile.normalized || source.contains(&profile.normalized))
    {
        score += weights.source_query;
    }

    score += recency_bonus(entity.created_at, now, weights.recency_max);
    score
}

/// Linear decay from `max` (just created) to zero after 24 hours.
fn recency_bonus(created_at: DateTime<Utc>, now: DateTime<Utc>, max: f32) -> f32 {
    let age_seconds = (now - created_at).num_seconds();
    if age_seconds < 0 {
        return max;
    }
    const DAY_SECONDS: f32 = 86_400.0;
    let remaining = 1.0 - (age_seconds as f32 / DAY_SECONDS);
    (remaining.clamp(0.0, 1.0)) * max
}
