//! Heuristic answer evaluation.
//!
//! No model call here: the evaluator scores an answer by shape (length,
//! refusal phrasing, overlap with the question) so tool results can be
//! ranked and retried without another provider round trip.

use sibyl_store::matching::tokenize;

use crate::trace::{Evaluation, Quality};

const REFUSAL_MARKERS: &[&str] = &[
    "couldn't find",
    "could not find",
    "i don't know",
    "i do not know",
    "no results",
    "no information",
    "unable to find",
];

/// Score an answer against the query it is supposed to address.
pub fn evaluate_answer(query: &str, answer: &str) -> Evaluation {
    let trimmed = answer.trim();
    let mut issues = Vec::new();

    if trimmed.is_empty() {
        return Evaluation {
            quality: Quality::Unacceptable,
            confidence: 0.0,
            issues: vec!["answer is empty".to_string()],
            should_retry: true,
        };
    }

    let lowered = trimmed.to_lowercase();
    if REFUSAL_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return Evaluation {
            quality: Quality::Unacceptable,
            confidence: 0.1,
            issues: vec!["answer is a refusal".to_string()],
            should_retry: true,
        };
    }

    let query_tokens: Vec<String> = tokenize(query)
        .into_iter()
        .filter(|token| token.len() > 2)
        .collect();
    let answer_tokens = tokenize(&lowered);
    let overlap = if query_tokens.is_empty() {
        1.0
    } else {
        let matched = query_tokens
            .iter()
            .filter(|token| answer_tokens.contains(token))
            .count();
        matched as f32 / query_tokens.len() as f32
    };

    if trimmed.len() < 20 {
        issues.push("answer is very short".to_string());
    }
    if overlap < 0.25 {
        issues.push("answer barely mentions the question terms".to_string());
    }

    let quality = match issues.len() {
        0 if trimmed.len() >= 80 && overlap >= 0.5 => Quality::Excellent,
        0 => Quality::Good,
        1 => Quality::Poor,
        _ => Quality::Unacceptable,
    };

    let length_score = (trimmed.len() as f32 / 200.0).min(1.0);
    let confidence = match quality {
        Quality::Excellent => 0.9,
        Quality::Good => 0.55 + 0.25 * length_score * overlap.max(0.2),
        Quality::Poor => 0.35,
        Quality::Unacceptable => 0.1,
    };

    Evaluation {
        should_retry: matches!(quality, Quality::Poor | Quality::Unacceptable),
        quality,
        confidence,
        issues,
    }
}
