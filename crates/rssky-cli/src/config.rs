//! File-based configuration with sensible defaults.
//!
//! [`Config`] mirrors the TOML layout (`[api]`, `[settings]`, `[prompts]`,
//! `[cache]`) and converts into the library types via
//! [`model_settings`](Config::model_settings),
//! [`prompt_templates`](Config::prompt_templates) and
//! [`cache_settings`](Config::cache_settings). Every key is optional; a
//! partial file is completed from the defaults.

use std::fs;
use std::path::{Path, PathBuf};

use rssky::cache::{DEFAULT_RETENTION_DAYS, DEFAULT_SNAPSHOT_MAX_AGE_HOURS};
use rssky::pipeline::prompt::{
    DEFAULT_IMPORTANCE_CRITERIA, DEFAULT_REPORT_PROMPT, DEFAULT_SUMMARY_PROMPT,
};
use rssky::prelude::*;
use rssky::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Default configuration file name.
pub const DEFAULT_CONFIG_PATH: &str = "rssky.toml";

/// Environment variable overriding `[api].key`.
pub const API_KEY_ENV: &str = "RSSKY_API_KEY";

pub const DEFAULT_API_URL: &str = "http://localhost:4000";

const DEFAULT_API_TEMPERATURE: f64 = 0.7;

/// Failure to read or write the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to render default config: {0}")]
    Render(#[from] toml::ser::Error),
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub settings: SettingsConfig,
    pub prompts: PromptsConfig,
    pub cache: CacheConfig,
}

/// Upstream endpoint and sampling parameters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL; `/v1/chat/completions` is appended when missing.
    pub url: String,
    pub key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_API_URL.to_string(),
            key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_API_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SettingsConfig {
    pub importance_criteria: String,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            importance_criteria: DEFAULT_IMPORTANCE_CRITERIA.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PromptsConfig {
    pub summary: String,
    pub report: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            summary: DEFAULT_SUMMARY_PROMPT.to_string(),
            report: DEFAULT_REPORT_PROMPT.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
    pub retention_days: u64,
    pub snapshot_max_age_hours: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".cache"),
            retention_days: DEFAULT_RETENTION_DAYS,
            snapshot_max_age_hours: DEFAULT_SNAPSHOT_MAX_AGE_HOURS,
        }
    }
}

impl Config {
    /// Read `path`, or write the defaults there and return them when the
    /// file does not exist yet.
    pub fn load_or_init(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(path, &text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.write(path)?;
                info!("Wrote default config to {}", path.display());
                Ok(config)
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn parse(path: &Path, text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write this configuration as TOML, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(self)?;
        let io = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io)?;
        }
        fs::write(path, text).map_err(io)
    }

    /// Replace the API key with `key` when it is set and non-empty.
    pub fn apply_key_override(&mut self, key: Option<String>) {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.api.key = key;
        }
    }

    /// The API key, warning when none is configured.
    pub fn api_key(&self) -> &str {
        if self.api.key.trim().is_empty() {
            warn!("No API key configured; set [api].key or {API_KEY_ENV}");
        }
        &self.api.key
    }

    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            model: self.api.model.clone(),
            temperature: self.api.temperature as f32,
            max_tokens: self.api.max_tokens,
        }
    }

    pub fn prompt_templates(&self) -> PromptTemplates {
        PromptTemplates {
            importance_criteria: self.settings.importance_criteria.clone(),
            summary: self.prompts.summary.clone(),
            report: self.prompts.report.clone(),
        }
    }

    pub fn cache_settings(&self, clear_on_start: bool) -> CacheSettings {
        CacheSettings {
            clear_on_start,
            retention_days: self.cache.retention_days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_writes_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("rssky.toml");

        let config = Config::load_or_init(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        // The written file loads back to the same values.
        let reloaded = Config::load_or_init(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn partial_file_is_completed_from_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("rssky.toml");
        fs::write(
            &path,
            r#"
[api]
model = "gemini-1.5-flash"
max_tokens = 2048

[cache]
retention_days = 3
"#,
        )
        .unwrap();

        let config = Config::load_or_init(&path).unwrap();
        assert_eq!(config.api.model, "gemini-1.5-flash");
        assert_eq!(config.api.max_tokens, 2048);
        assert_eq!(config.api.url, DEFAULT_API_URL);
        assert_eq!(config.cache.retention_days, 3);
        assert_eq!(config.cache.snapshot_max_age_hours, DEFAULT_SNAPSHOT_MAX_AGE_HOURS);
        assert_eq!(config.prompt_templates(), PromptTemplates::default());
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("rssky.toml");
        fs::write(&path, "[api\nmodel = ").unwrap();
        let err = Config::load_or_init(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "{err:?}");
    }

    #[test]
    fn key_override_ignores_empty_values() {
        let mut config = Config::default();
        config.api.key = "from-file".into();

        config.apply_key_override(Some("  ".into()));
        assert_eq!(config.api_key(), "from-file");
        config.apply_key_override(None);
        assert_eq!(config.api_key(), "from-file");
        config.apply_key_override(Some("from-env".into()));
        assert_eq!(config.api_key(), "from-env");
    }

    #[test]
    fn converts_to_library_types() {
        let mut config = Config::default();
        config.api.model = "claude-3".into();
        config.api.temperature = 0.2;
        config.settings.importance_criteria = "Only space news.".into();
        config.cache.retention_days = 30;

        let settings = config.model_settings();
        assert_eq!(settings.model, "claude-3");
        assert!((settings.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(
            config.prompt_templates().importance_criteria,
            "Only space news."
        );
        let cache = config.cache_settings(true);
        assert!(cache.clear_on_start);
        assert_eq!(cache.retention_days, 30);
    }
}
