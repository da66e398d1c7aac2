//! Dispatch configuration.
//!
//! Loaded from the TOML file named by `FIRELINE_CONFIG`, falling back to the
//! embedded `config/default.toml`. `ASSIGNMENT_STRATEGY` and
//! `ASSIGNMENT_SERVICE_URL` override the file.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Which [`crate::strategy::AssignmentStrategy`] the coordinator runs.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum StrategyKind {
    /// Nearest active responder from the station roster.
    #[default]
    Local,
    /// External assignment service over HTTP.
    Delegated,
}

/// Settings for the external assignment service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DelegatedConfig {
    /// Endpoint receiving the assignment POST.
    pub url: String,
    /// Time budget for one call in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for DelegatedConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl DelegatedConfig {
    /// Call time budget.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

const fn default_timeout_ms() -> u64 {
    5000
}

/// Top-level dispatch settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DispatchConfig {
    /// Strategy selection.
    #[serde(default)]
    pub strategy: StrategyKind,
    /// Delegated strategy settings.
    #[serde(default)]
    pub delegated: DelegatedConfig,
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The TOML did not match [`DispatchConfig`].
    #[error("Invalid dispatch config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is present but unusable.
    #[error("Invalid dispatch config: {message}")]
    Invalid {
        /// What is wrong.
        message: String,
    },
}

impl DispatchConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document is malformed.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::de::from_str(text)?)
    }

    /// The embedded defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the embedded file is malformed.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_toml(DEFAULT_CONFIG)
    }

    /// Loads the file named by `FIRELINE_CONFIG` (or the embedded defaults)
    /// and applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file can't be read or parsed, or an
    /// override is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("FIRELINE_CONFIG") {
            Ok(path) => {
                let path = PathBuf::from(path);
                log::info!("Loading dispatch config from {}", path.display());
                let text = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::Io { path, source })?;
                Self::from_toml(&text)?
            }
            Err(_) => Self::embedded()?,
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        log::info!("Assignment strategy: {}", config.strategy);
        Ok(config)
    }

    /// Applies `ASSIGNMENT_STRATEGY` / `ASSIGNMENT_SERVICE_URL` from `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unknown strategy name.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(raw) = lookup("ASSIGNMENT_STRATEGY") {
            self.strategy = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                message: format!("unknown ASSIGNMENT_STRATEGY '{raw}' (expected local or delegated)"),
            })?;
        }
        if let Some(url) = lookup("ASSIGNMENT_SERVICE_URL") {
            self.delegated.url = url;
        }
        Ok(())
    }

    /// Checks cross-field requirements.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the delegated strategy has no URL
    /// or a zero timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.strategy == StrategyKind::Delegated {
            if self.delegated.url.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    message: "delegated strategy requires delegated.url".to_string(),
                });
            }
            if self.delegated.timeout_ms == 0 {
                return Err(ConfigError::Invalid {
                    message: "delegated.timeout_ms must be positive".to_string(),
                });
            }
        }
        Ok(())
    }
}
