//! Application Configuration Module
//!
//! Loads the voice agent's settings from environment variables into a single
//! struct that is handed to `main`.

use std::env;
use std::path::PathBuf;

use secrecy::SecretString;
use tracing::Level;

/// Where the settings file lives unless `VOICE_AGENT_SETTINGS` says otherwise.
pub const DEFAULT_SETTINGS_PATH: &str = "voice-agent-settings.json";
pub const DEFAULT_CATALOG_PATH: &str = "catalog.json";
pub const DEFAULT_PROMPTS_DIR: &str = "prompts";

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: SecretString,
    pub live_model: String,
    pub voice: Option<String>,
    pub log_level: Level,
    pub settings_path: PathBuf,
    pub catalog_path: PathBuf,
    pub prompts_dir: PathBuf,
    /// Base URL of the learning platform API, for preference sync.
    pub api_base_url: Option<String>,
    pub user_id: Option<String>,
    pub api_token: Option<SecretString>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
}

impl Config {
    /// Loads configuration from environment variables, after reading `.env` if present.
    ///
    // *   `GEMINI_API_KEY`: Required.
    // *   `LIVE_MODEL`: (Optional) Defaults to the client's default live model.
    // *   `LIVE_VOICE`: (Optional) Prebuilt voice name.
    // *   `RUST_LOG`: (Optional) Defaults to "INFO".
    // *   `VOICE_AGENT_SETTINGS`, `LESSON_CATALOG`, `PROMPTS_DIR`: (Optional) file locations.
    // *   `API_BASE_URL`, `USER_ID`, `API_TOKEN`: (Optional) enable language sync.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let gemini_api_key = var("GEMINI_API_KEY")
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))?;

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            gemini_api_key,
            live_model: var("LIVE_MODEL").unwrap_or_else(|| live_voice::DEFAULT_MODEL.to_string()),
            voice: var("LIVE_VOICE"),
            log_level,
            settings_path: var("VOICE_AGENT_SETTINGS")
                .unwrap_or_else(|| DEFAULT_SETTINGS_PATH.to_string())
                .into(),
            catalog_path: var("LESSON_CATALOG")
                .unwrap_or_else(|| DEFAULT_CATALOG_PATH.to_string())
                .into(),
            prompts_dir: var("PROMPTS_DIR")
                .unwrap_or_else(|| DEFAULT_PROMPTS_DIR.to_string())
                .into(),
            api_base_url: var("API_BASE_URL"),
            user_id: var("USER_ID"),
            api_token: var("API_TOKEN").map(SecretString::from),
        })
    }

    /// Base URL and user id, when both are set.
    pub fn preference_sync(&self) -> Option<(&str, &str)> {
        Some((self.api_base_url.as_deref()?, self.user_id.as_deref()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("GEMINI_API_KEY", "k")])).unwrap();

        assert_eq!(config.gemini_api_key.expose_secret(), "k");
        assert_eq!(config.live_model, live_voice::DEFAULT_MODEL);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.settings_path, PathBuf::from(DEFAULT_SETTINGS_PATH));
        assert!(config.preference_sync().is_none());
    }

    #[test]
    fn test_missing_api_key() {
        let result = Config::from_lookup(lookup(&[("GEMINI_API_KEY", "  ")]));
        assert!(matches!(result, Err(ConfigError::MissingVar(_))));
    }

    #[test]
    fn test_invalid_log_level() {
        let result = Config::from_lookup(lookup(&[("GEMINI_API_KEY", "k"), ("RUST_LOG", "loud")]));
        assert!(matches!(result, Err(ConfigError::InvalidLogLevel(_))));
    }

    #[test]
    fn test_preference_sync_needs_url_and_user() {
        let config = Config::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "k"),
            ("API_BASE_URL", "https://api.example.com"),
            ("USER_ID", "u1"),
            ("LIVE_MODEL", "custom-live"),
        ]))
        .unwrap();

        assert_eq!(config.preference_sync(), Some(("https://api.example.com", "u1")));
        assert_eq!(config.live_model, "custom-live");
    }
}
