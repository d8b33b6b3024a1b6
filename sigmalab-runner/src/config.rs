//! Engine configuration, loaded from TOML.
//!
//! Every section and field has a default, so an empty file is a valid
//! configuration:
//!
//! ```toml
//! schema_version = 1
//!
//! [ai_review]
//! enabled = true
//! timeout_ms = 15000
//! endpoint = "http://localhost:8080/review"
//!
//! [dataset]
//! prefer_file = true
//! max_preview_rows = 50
//!
//! [logging]
//! level = "info"
//! json = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

/// Current schema version for engine configuration files.
pub const SCHEMA_VERSION: u32 = 1;

/// Default bound on a single AI review call.
pub const DEFAULT_AI_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read engine config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse engine config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid engine config: {0}")]
    Invalid(String),
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub ai_review: AiReviewConfig,
    pub dataset: DatasetConfig,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            ai_review: AiReviewConfig::default(),
            dataset: DatasetConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Optional second-opinion reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiReviewConfig {
    pub enabled: bool,
    pub timeout_ms: u64,
    /// Endpoint for the HTTP reviewer. Other reviewers ignore it.
    pub endpoint: Option<String>,
}

impl Default for AiReviewConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: DEFAULT_AI_TIMEOUT_MS,
            endpoint: None,
        }
    }
}

impl AiReviewConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// How a dataset snapshot is turned back into a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Read the referenced file before considering preview rows.
    pub prefer_file: bool,
    /// Cap on preview rows used when the file is unavailable.
    pub max_preview_rows: Option<usize>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            prefer_file: true,
            max_preview_rows: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schema_version == 0 || self.schema_version > SCHEMA_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported schema_version {} (supported: 1..={SCHEMA_VERSION})",
                self.schema_version
            )));
        }
        if self.ai_review.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "ai_review.timeout_ms must be positive".into(),
            ));
        }
        if let Some(endpoint) = &self.ai_review.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "ai_review.endpoint must be an http(s) URL, got '{endpoint}'"
                )));
            }
        }
        if self.dataset.max_preview_rows == Some(0) {
            return Err(ConfigError::Invalid(
                "dataset.max_preview_rows must be positive when set".into(),
            ));
        }
        if self.logging.level.parse::<LevelFilter>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "logging.level '{}' is not a level (trace, debug, info, warn, error, off)",
                self.logging.level
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_the_default() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.ai_review.timeout(), Duration::from_millis(15_000));
        assert!(config.dataset.prefer_file);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            [ai_review]
            enabled = true
            endpoint = "https://reviewer.internal/review"

            [logging]
            json = true
            "#,
        )
        .unwrap();
        assert!(config.ai_review.enabled);
        assert_eq!(config.ai_review.timeout_ms, DEFAULT_AI_TIMEOUT_MS);
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn rejects_bad_values() {
        for doc in [
            "schema_version = 9",
            "[ai_review]\ntimeout_ms = 0",
            "[ai_review]\nendpoint = \"ftp://x\"",
            "[dataset]\nmax_preview_rows = 0",
            "[logging]\nlevel = \"loud\"",
        ] {
            assert!(
                matches!(EngineConfig::from_toml(doc), Err(ConfigError::Invalid(_))),
                "{doc}"
            );
        }
        assert!(matches!(
            EngineConfig::from_toml("[ai_review"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn round_trips_through_toml() {
        let mut config = EngineConfig::default();
        config.dataset.max_preview_rows = Some(50);
        let text = config.to_toml().unwrap();
        assert_eq!(EngineConfig::from_toml(&text).unwrap(), config);
    }
}
