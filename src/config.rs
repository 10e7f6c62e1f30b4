//! Configuration and settings management
//!
//! Loads layered settings from config files and environment variables.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Key of the module's configuration section and of the per-user session-id
/// field (`gemini_conversation_id`).
pub const MODULE_KEY: &str = "gemini";

/// Application settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Per-module enable switches, keyed by module name
    #[serde(default)]
    pub modules: HashMap<String, bool>,

    /// File-system locations
    pub files: FilesSettings,

    /// Language used when a user record carries no usable `lang` field
    #[serde(default = "default_lang")]
    pub default_lang: String,

    /// Gemini model client settings
    pub gemini: GeminiSettings,
}

/// File-system locations used by the module
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FilesSettings {
    /// Directory holding one JSON transcript per session
    pub conversations_dir: PathBuf,
}

/// Settings for the Gemini model client
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GeminiSettings {
    /// Gemini API key
    pub api_key: String,

    /// Optional HTTP proxy URL; the sentinel `"auto"` means "not configured"
    pub proxy: Option<String>,

    /// Minimum interval between model calls, in seconds
    pub cooldown_seconds: u64,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Nucleus sampling cutoff
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Top-k sampling cutoff
    #[serde(default = "default_top_k")]
    pub top_k: u32,

    /// Maximum tokens in a generated reply
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Model used for text conversations
    #[serde(default = "default_model")]
    pub model: String,

    /// Model used for image+text requests
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
}

fn default_lang() -> String {
    "en".to_string()
}

const fn default_temperature() -> f32 {
    0.9
}

const fn default_top_p() -> f32 {
    1.0
}

const fn default_top_k() -> u32 {
    1
}

const fn default_max_output_tokens() -> u32 {
    2048
}

fn default_model() -> String {
    "gemini-pro".to_string()
}

fn default_vision_model() -> String {
    "gemini-pro-vision".to_string()
}

impl Settings {
    /// Create new settings by loading from config files and environment
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use gemini_bridge::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading or deserialization fails.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(File::with_name("config/default").required(false))
            // Add in the current environment file
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked into git
            .add_source(File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of APP)
            // Eg. `APP__GEMINI__API_KEY=... ./target/app` sets `gemini.api_key`
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Whether the named module is switched on in configuration
    ///
    /// Modules absent from the switch table are off.
    #[must_use]
    pub fn module_enabled(&self, name: &str) -> bool {
        self.modules.get(name).copied().unwrap_or(false)
    }

    /// Cooldown interval between Gemini calls
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.gemini.cooldown_seconds)
    }
}

impl GeminiSettings {
    /// Configured proxy URL, treating the `"auto"` sentinel and blank values
    /// as "not configured"
    #[must_use]
    pub fn proxy_url(&self) -> Option<&str> {
        self.proxy
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty() && !p.eq_ignore_ascii_case("auto"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    const FULL_CONFIG: &str = r#"
        default_lang = "en"

        [modules]
        gemini = true

        [files]
        conversations_dir = "data/conversations"

        [gemini]
        api_key = "test-key"
        proxy = "auto"
        cooldown_seconds = 30
        temperature = 0.5
    "#;

    fn parse(toml: &str) -> Settings {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .expect("Should build config")
            .try_deserialize()
            .expect("Should deserialize settings")
    }

    #[test]
    fn parses_full_config() {
        let settings = parse(FULL_CONFIG);

        assert!(settings.module_enabled("gemini"));
        assert_eq!(
            settings.files.conversations_dir,
            PathBuf::from("data/conversations")
        );
        assert_eq!(settings.gemini.api_key, "test-key");
        assert_eq!(settings.cooldown(), Duration::from_secs(30));
        assert!((settings.gemini.temperature - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn generation_parameters_have_documented_defaults() {
        let settings = parse(FULL_CONFIG);

        assert!((settings.gemini.top_p - 1.0).abs() < f32::EPSILON);
        assert_eq!(settings.gemini.top_k, 1);
        assert_eq!(settings.gemini.max_output_tokens, 2048);
        assert_eq!(settings.gemini.model, "gemini-pro");
        assert_eq!(settings.gemini.vision_model, "gemini-pro-vision");
    }

    #[test]
    fn unknown_modules_are_disabled() {
        let settings = parse(FULL_CONFIG);
        assert!(!settings.module_enabled("no-such-module"));
    }

    #[test]
    fn proxy_sentinel_counts_as_unset() {
        let mut settings = parse(FULL_CONFIG);

        assert_eq!(settings.gemini.proxy_url(), None);

        settings.gemini.proxy = Some(" AUTO ".to_string());
        assert_eq!(settings.gemini.proxy_url(), None);

        settings.gemini.proxy = Some(String::new());
        assert_eq!(settings.gemini.proxy_url(), None);

        settings.gemini.proxy = Some("http://127.0.0.1:8080".to_string());
        assert_eq!(settings.gemini.proxy_url(), Some("http://127.0.0.1:8080"));

        settings.gemini.proxy = None;
        assert_eq!(settings.gemini.proxy_url(), None);
    }
}
