//! Secret values are never stored in the TOML config; they come from the
//! environment (optionally via a `.env` file loaded at startup).

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// API key for the completion provider (`SIBYL_COMPLETION_API_KEY`).
pub fn completion_api_key() -> Option<String> {
    env_non_empty("SIBYL_COMPLETION_API_KEY")
}

/// API key for the neural web-search provider (`SIBYL_SEARCH_API_KEY`).
pub fn search_api_key() -> Option<String> {
    env_non_empty("SIBYL_SEARCH_API_KEY")
}

/// API key for the cross-session memory provider (`SIBYL_MEMORY_API_KEY`).
pub fn memory_api_key() -> Option<String> {
    env_non_empty("SIBYL_MEMORY_API_KEY")
}
