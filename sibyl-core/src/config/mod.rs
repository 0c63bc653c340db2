//! Configuration loading: TOML settings plus env-sourced secrets.

pub mod secrets;
pub mod settings;

use settings::Settings;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not resolve config directory")]
    MissingConfigDir,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Loaded configuration: non-sensitive settings plus secret accessors.
#[derive(Debug, Clone)]
pub struct Config {
    pub settings: Settings,
}

impl Config {
    /// Load settings from the config file, creating a default file on first run.
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Settings::load()?;
        Ok(Self { settings })
    }

    /// Build a config from explicit settings (tests, embedded use).
    pub fn from_settings(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn completion_api_key(&self) -> Option<String> {
        secrets::completion_api_key()
    }

    pub fn search_api_key(&self) -> Option<String> {
        secrets::search_api_key()
    }

    pub fn memory_api_key(&self) -> Option<String> {
        secrets::memory_api_key()
    }
}
