//! Configuration management.
//!
//! Settings come from an optional TOML file with environment-variable
//! overrides on top (`INVOX_*`). Every field has a default, so the binary
//! runs with no config file at all.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::extraction::LlmConfig;
use crate::ocr::OcrConfig;
use crate::pipeline::DEFAULT_REVIEW_THRESHOLD;
use crate::repository::Database;

/// Top-level application settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_path: PathBuf,
    pub data_dir: PathBuf,
    pub server: ServerConfig,
    pub ocr: OcrConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Overall-confidence threshold below which review is required.
    pub confidence_threshold: u8,
    /// Automatic retry budget for new jobs.
    pub max_retries: u32,
    /// Lifetime of signed download references, in seconds.
    pub url_ttl_secs: i64,
    /// Delay between automatic retry attempts, in seconds.
    pub retry_delay_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_REVIEW_THRESHOLD,
            max_retries: 3,
            url_ttl_secs: 300,
            retry_delay_secs: 5,
        }
    }
}

impl Settings {
    /// Load settings from an optional TOML file, then apply environment
    /// overrides.
    pub fn load(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let mut settings = match config_path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    anyhow::anyhow!("cannot read config file {}: {e}", path.display())
                })?;
                toml::from_str(&raw)
                    .map_err(|e| anyhow::anyhow!("invalid config file {}: {e}", path.display()))?
            }
            None => Self::default(),
        };
        settings.apply_env_overrides();
        if settings.database_path.as_os_str().is_empty() {
            settings.database_path = PathBuf::from("invox.db");
        }
        if settings.data_dir.as_os_str().is_empty() {
            settings.data_dir = PathBuf::from("invox-files");
        }
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("INVOX_DATABASE_PATH") {
            self.database_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("INVOX_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("INVOX_OCR_ENDPOINT") {
            self.ocr.endpoint = v;
        }
        if let Ok(v) = std::env::var("INVOX_LLM_ENDPOINT") {
            self.llm.endpoint = v;
        }
        if let Ok(v) = std::env::var("INVOX_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("INVOX_LLM_API_KEY") {
            self.llm.api_key = Some(v);
        }
    }

    /// Open the configured database, creating schema on first use.
    pub fn database(&self) -> anyhow::Result<Database> {
        Ok(Database::open(&self.database_path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_usable() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.pipeline.confidence_threshold, 80);
        assert_eq!(settings.pipeline.max_retries, 3);
        assert!(!settings.database_path.as_os_str().is_empty());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invox.toml");
        std::fs::write(
            &path,
            r#"
database_path = "/tmp/custom.db"

[server]
port = 9090

[pipeline]
confidence_threshold = 85
"#,
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.database_path, PathBuf::from("/tmp/custom.db"));
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.pipeline.confidence_threshold, 85);
        assert_eq!(settings.pipeline.max_retries, 3);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invox.toml");
        std::fs::write(&path, "server = 12").unwrap();
        assert!(Settings::load(Some(&path)).is_err());
    }
}
