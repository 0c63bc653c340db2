//! Name normalization and lightweight string matching.
//!
//! No trained models here: matching is edit-distance ratios, substring
//! checks, and bag-of-words cosine over tokenized text.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// Normalize a name for index keys and comparisons: lowercase, punctuation
/// stripped, whitespace collapsed.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_space = true;
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Levenshtein distance over chars.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut prev_diag = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            let candidate = prev_diag + cost;
            prev_diag = row[j + 1];
            row[j + 1] = candidate.min(row[j] + 1).min(prev_diag + 1);
        }
    }
    row[b.len()]
}

/// Edit-distance similarity ratio in [0, 1] over normalized names.
pub fn name_similarity(a: &str, b: &str) -> f32 {
    let a = normalize_name(a);
    let b = normalize_name(b);
    if a == b {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f32 / max_len as f32
}

fn target_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)^\s*who\s+(?:is|was|are)\s+(?P<target>.+?)\s*\??\s*$",
            r"(?i)^\s*what\s+(?:is|was|are)\s+(?:an?\s+|the\s+)?(?P<target>.+?)\s*\??\s*$",
            r"(?i)^\s*where\s+is\s+(?P<target>.+?)\s*\??\s*$",
            r"(?i)^\s*tell\s+me\s+about\s+(?P<target>.+?)\s*\??\s*$",
            r"(?i)^\s*what\s+do\s+you\s+know\s+about\s+(?P<target>.+?)\s*\??\s*$",
            r"(?i)^\s*(?:search\s+for|find|look\s+up)\s+(?P<target>.+?)\s*\??\s*$",
        ]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("valid target pattern"))
        .collect()
    })
}

/// Extract the likely entity name from question templates like
/// "who is X" or "tell me about X". Returns `None` for free-form queries.
pub fn extract_query_target(query: &str) -> Option<String> {
    for pattern in target_patterns() {
        if let Some(captures) = pattern.captures(query) {
            let target = captures.name("target")?.as_str().trim();
            if !target.is_empty() {
                return Some(target.to_string());
            }
        }
    }
    None
}

/// Normalized template key for pattern learning: the query with its extracted
/// target replaced by a placeholder. `None` when no template matches.
pub fn template_key(query: &str) -> Option<String> {
    let target = extract_query_target(query)?;
    let normalized_query = normalize_name(query);
    let normalized_target = normalize_name(&target);
    if normalized_target.is_empty() {
        return None;
    }
    Some(normalized_query.replace(&normalized_target, "{}"))
}

/// Lowercased alphanumeric tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    normalize_name(text)
        .split_whitespace()
        .map(|token| token.to_string())
        .collect()
}

fn term_frequencies(text: &str) -> HashMap<String, f32> {
    let mut frequencies = HashMap::new();
    for token in tokenize(text) {
        *frequencies.entry(token).or_insert(0.0) += 1.0;
    }
    frequencies
}

/// Cosine similarity between bag-of-words frequency vectors of two texts.
pub fn bow_cosine(a: &str, b: &str) -> f32 {
    let freq_a = term_frequencies(a);
    let freq_b = term_frequencies(b);
    if freq_a.is_empty() || freq_b.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0;
    for (term, weight) in &freq_a {
        if let Some(other) = freq_b.get(term) {
            dot += weight * other;
        }
    }
    let norm_a: f32 = freq_a.values().map(|w| w * w).sum::<f32>().sqrt();
    let norm_b: f32 = freq_b.values().map(|w| w * w).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
