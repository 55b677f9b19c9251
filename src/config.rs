/// Configuration module for difftour.
///
/// Handles loading, validating, and providing default configuration values.
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::diff::parser::PathFilter;

pub const DEFAULT_CONFIG_PATH: &str = "difftour.json";

// ── Default value functions ──────────────────────────────────────────

fn default_proximity_threshold() -> usize {
    crate::tour::grouping::DEFAULT_PROXIMITY_THRESHOLD
}

fn default_exclude_patterns() -> Vec<String> {
    vec!["*.md".to_string(), "*.markdown".to_string()]
}

fn default_cache_path() -> String {
    ".difftour/explanations.json".to_string()
}

fn default_provider() -> String {
    "placeholder".to_string()
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    400
}

fn default_timeout_secs() -> u64 {
    60
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TourConfig {
    /// Largest line gap between units that still share a group.
    #[serde(default = "default_proximity_threshold")]
    pub proximity_threshold: usize,

    /// Globs of files the diff parser drops.
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Explanation cache, relative to the workspace root unless absolute.
    #[serde(default = "default_cache_path")]
    pub cache_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,

    #[serde(default)]
    pub explainer: ExplainerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Placeholder,
    Openai,
}

impl Provider {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "placeholder" => Some(Self::Placeholder),
            "openai" => Some(Self::Openai),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExplainerConfig {
    /// `placeholder` or `openai`; kept as text so a typo fails `validate`
    /// instead of discarding the whole file.
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for TourConfig {
    fn default() -> Self {
        Self {
            proximity_threshold: default_proximity_threshold(),
            exclude_patterns: default_exclude_patterns(),
            cache_path: default_cache_path(),
            intent: None,
            explainer: ExplainerConfig::default(),
        }
    }
}

impl Default for ExplainerConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ExplainerConfig {
    /// The configured provider, or `None` when the name is not known.
    pub fn provider_kind(&self) -> Option<Provider> {
        Provider::parse(&self.provider)
    }
}

// ── Config implementation ────────────────────────────────────────────

impl TourConfig {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"difftour.json"`.
    /// If the file does not exist, returns a default config and generates a
    /// template only when the default path was used.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: TourConfig = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.explainer.provider_kind().is_some(),
            "unknown explainer.provider {:?} (expected \"placeholder\" or \"openai\")",
            self.explainer.provider
        );
        anyhow::ensure!(
            self.explainer.timeout_secs > 0,
            "explainer.timeout_secs must be positive"
        );
        anyhow::ensure!(
            self.explainer.max_tokens > 0,
            "explainer.max_tokens must be positive"
        );
        anyhow::ensure!(!self.cache_path.is_empty(), "cache_path must not be empty");
        self.path_filter()?;
        Ok(())
    }

    /// Compile `exclude_patterns`.
    pub fn path_filter(&self) -> Result<PathFilter> {
        PathFilter::new(&self.exclude_patterns).context("invalid exclude pattern")
    }

    /// Cache location resolved against `root`.
    #[must_use]
    pub fn cache_file(&self, root: &Path) -> std::path::PathBuf {
        let path = Path::new(&self.cache_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TourConfig::default();
        assert_eq!(config.proximity_threshold, 5);
        assert_eq!(config.exclude_patterns, vec!["*.md", "*.markdown"]);
        assert_eq!(config.cache_path, ".difftour/explanations.json");
        assert_eq!(config.explainer.provider_kind(), Some(Provider::Placeholder));
        assert_eq!(config.explainer.api_key_env, "OPENAI_API_KEY");
        assert!(config.intent.is_none());
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{"proximity_threshold": 8, "explainer": {"provider": "openai"}}"#;
        let config: TourConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.proximity_threshold, 8);
        assert_eq!(config.explainer.provider_kind(), Some(Provider::Openai));
        // Other fields should have defaults
        assert_eq!(config.explainer.max_tokens, 400);
        assert_eq!(config.exclude_patterns.len(), 2);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let json = r#"{"explainer": {"provider": "carrier-pigeon"}}"#;
        let config: TourConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.explainer.provider_kind(), None);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("carrier-pigeon"));
    }

    #[test]
    fn test_misspelled_provider_keeps_other_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("difftour.json");
        std::fs::write(
            &path,
            r#"{"proximity_threshold": 9, "explainer": {"provider": "opneai", "model": "m"}}"#,
        )
        .unwrap();
        let config = TourConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.proximity_threshold, 9);
        assert_eq!(config.explainer.model, "m");
        assert_eq!(config.explainer.provider, "opneai");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_ok() {
        assert!(TourConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_bad_values() {
        let mut config = TourConfig::default();
        config.explainer.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = TourConfig::default();
        config.explainer.max_tokens = 0;
        assert!(config.validate().is_err());

        let mut config = TourConfig::default();
        config.exclude_patterns = vec!["a{".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cache_file_resolution() {
        let config = TourConfig::default();
        assert_eq!(
            config.cache_file(Path::new("/repo")),
            Path::new("/repo/.difftour/explanations.json")
        );
    }

    #[test]
    fn test_missing_and_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("none.json");
        let config = TourConfig::load(missing.to_str().unwrap()).unwrap();
        assert_eq!(config, TourConfig::default());
        assert!(!missing.exists(), "template only for the default path");

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        let config = TourConfig::load(broken.to_str().unwrap()).unwrap();
        assert_eq!(config, TourConfig::default());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut config = TourConfig::default();
        config.intent = Some("refactor".to_string());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        config.save(path.to_str().unwrap()).unwrap();
        let loaded = TourConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded, config);
    }
}
