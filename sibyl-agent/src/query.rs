//! Query analysis and web-query tuning.

use chrono::{Datelike, Utc};

use sibyl_store::matching::extract_query_target;
use sibyl_store::EntityCategory;

const CONVERSATIONAL_PREFIXES: &[&str] = &[
    "hey",
    "hi",
    "hello",
    "please",
    "can you",
    "could you",
    "would you",
    "i want to know",
    "i was wondering",
];

const RECENCY_MARKERS: &[&str] = &["latest", "recent", "current", "newest", "today"];

/// Broad shape of a query, used to pick tool order and summarizer framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    /// Asks about a specific named thing ("who is X").
    Lookup { target: String },
    /// Asks about fresh information ("latest news on X").
    Recency,
    /// Anything else.
    Freeform,
}

pub fn classify_query(query: &str) -> QueryKind {
    let lowered = query.to_lowercase();
    if RECENCY_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return QueryKind::Recency;
    }
    if let Some(target) = extract_query_target(query) {
        return QueryKind::Lookup { target };
    }
    QueryKind::Freeform
}

/// Heuristic category guess for an entity created from a query, mirroring
/// the category-intent signals used in store scoring.
pub fn guess_category(query: &str) -> EntityCategory {
    let lowered = query.to_lowercase();
    if lowered.starts_with("who") {
        EntityCategory::Person
    } else if lowered.starts_with("where")
        || lowered.contains("city")
        || lowered.contains("country")
    {
        EntityCategory::Place
    } else if lowered.contains("company") || lowered.contains("organization") {
        EntityCategory::Organization
    } else {
        EntityCategory::Concept
    }
}

/// A short multi-word capitalized phrase reads as a proper name and is
/// worth quoting for keyword-leaning search providers. Single words stay
/// unquoted; capitalization alone is too weak a signal for them.
pub fn looks_like_proper_name(text: &str) -> bool {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() < 2 || words.len() > 4 {
        return false;
    }
    words.iter().all(|word| {
        word.chars()
            .next()
            .map(|first| first.is_uppercase())
            .unwrap_or(false)
    })
}

/// Rewrite a conversational query into a search-provider query: strip
/// greeting prefixes, quote proper-name targets, and pin recency-flavored
/// queries to the current year.
pub fn tune_web_query(query: &str) -> String {
    let mut tuned = query.trim().to_string();

    let mut stripped = true;
    while stripped {
        stripped = false;
        let lowered = tuned.to_lowercase();
        for prefix in CONVERSATIONAL_PREFIXES {
            if !lowered.starts_with(prefix) {
                continue;
            }
            // Word boundary: "hi there" strips, "history" does not.
            let boundary = lowered[prefix.len()..]
                .chars()
                .next()
                .map(|ch| ch == ' ' || ch == ',')
                .unwrap_or(false);
            if !boundary {
                continue;
            }
            let Some(rest) = tuned.get(prefix.len()..) else {
                continue;
            };
            let rest = rest.trim_start_matches([',', ' ']);
            if !rest.is_empty() {
                tuned = rest.to_string();
                stripped = true;
            }
            break;
        }
    }

    if let Some(target) = extract_query_target(&tuned) {
        if looks_like_proper_name(&target) && !tuned.contains('"') {
            tuned = tuned.replace(&target, &format!("\"{target}\""));
        }
    }

    let lowered = tuned.to_lowercase();
    if RECENCY_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        let year = Utc::now().year();
        if !tuned.contains(&year.to_string()) {
            tuned = format!("{} {}", tuned.trim_end_matches('?'), year);
        }
    }

    tuned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_conversational_prefixes() {
        assert_eq!(
            tune_web_query("hey, can you tell me about Rust"),
            "tell me about Rust"
        );
    }

    #[test]
    fn prefix_strip_respects_word_boundaries() {
        assert_eq!(tune_web_query("history of Rome"), "history of Rome");
    }

    #[test]
    fn quotes_proper_name_targets() {
        let tuned = tune_web_query("who is Ada Lovelace?");
        assert!(tuned.contains("\"Ada Lovelace\""));
    }

    #[test]
    fn lowercase_targets_are_not_quoted() {
        let tuned = tune_web_query("what is entropy?");
        assert!(!tuned.contains('"'));
    }

    #[test]
    fn recency_queries_get_the_current_year() {
        let tuned = tune_web_query("latest Rust release");
        assert!(tuned.contains(&Utc::now().year().to_string()));
    }

    #[test]
    fn classification_covers_the_three_shapes() {
        assert_eq!(classify_query("latest Rust news"), QueryKind::Recency);
        assert_eq!(
            classify_query("who is Ada Lovelace?"),
            QueryKind::Lookup {
                target: "Ada Lovelace".to_string()
            }
        );
        assert_eq!(classify_query("thoughts on breakfast"), QueryKind::Freeform);
    }

    #[test]
    fn proper_name_detection() {
        assert!(looks_like_proper_name("Ada Lovelace"));
        assert!(!looks_like_proper_name("entropy"));
        assert!(!looks_like_proper_name("Rust"));
        assert!(!looks_like_proper_name("the quick brown fox jumps"));
    }

    #[test]
    fn single_capitalized_targets_are_not_quoted() {
        assert_eq!(tune_web_query("what is Rust?"), "what is Rust?");
    }

    #[test]
    fn category_guesses_follow_question_words() {
        assert_eq!(guess_category("who is Ada?"), EntityCategory::Person);
        assert_eq!(guess_category("where is Oslo?"), EntityCategory::Place);
        assert_eq!(guess_category("what is entropy?"), EntityCategory::Concept);
    }
}
