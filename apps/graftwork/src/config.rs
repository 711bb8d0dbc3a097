//! # CLI Configuration
//!
//! Optional `graftwork.toml` settings for the binary.
//!
//! Resolution order:
//! 1. Built-in defaults
//! 2. The config file (`--config <file>`, else `graftwork.toml` if present)
//! 3. `GRAFTWORK_LOG_FORMAT` overrides `log_format`

use graftwork_core::{ArtifactFormat, GraftError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "graftwork.toml";

/// Environment variable overriding the log format.
pub const LOG_FORMAT_ENV: &str = "GRAFTWORK_LOG_FORMAT";

/// Default tracing filter directive.
pub const DEFAULT_LOG_FILTER: &str = "graftwork=info,graftwork_core=info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parse an environment value; anything but `json` is text.
    #[must_use]
    pub fn from_env_value(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Settings read from the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// Log output format.
    pub log_format: LogFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Bundle encoding used by `freeze` unless `--text` is given.
    pub artifact_format: ArtifactFormat,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Text,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            artifact_format: ArtifactFormat::Binary,
        }
    }
}

impl CliConfig {
    /// Parse config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, GraftError> {
        toml::from_str(content)
            .map_err(|e| GraftError::SerializationError(format!("Invalid config: {}", e)))
    }

    /// Load config from `path`.
    pub fn from_file(path: &Path) -> Result<Self, GraftError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GraftError::IoError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Resolve the effective config.
    ///
    /// An explicit path must exist. Without one, `graftwork.toml` is used if
    /// present, otherwise the defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, GraftError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::from_file(fallback)?
                } else {
                    Self::default()
                }
            }
        };

        if let Ok(value) = std::env::var(LOG_FORMAT_ENV) {
            config.log_format = LogFormat::from_env_value(&value);
        }
        Ok(config)
    }
}

// =============================================================================
// TESTS
// =============================================================================
