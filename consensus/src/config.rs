//! Engine configuration with TOML file support.

use serde::{Deserialize, Serialize};
use snowstorm_types::Parameters;
use snowstorm_utils::LogFormat;
use std::path::Path;

use crate::ConsensusError;

/// Configuration for a consensus instance.
///
/// Can be loaded from a TOML file via [`ConsensusConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). Every field has a default, so an
/// empty file is a valid configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// How many recently decided ids are remembered after leaving the registry.
    #[serde(default = "default_decided_cache_capacity")]
    pub decided_cache_capacity: usize,

    /// Log format: "human" or "json".
    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Sampling and confidence thresholds.
    #[serde(default)]
    pub params: Parameters,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_decided_cache_capacity() -> usize {
    16_384
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl ConsensusConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConsensusError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConsensusError::Config(format!("{}: {e}", path.as_ref().display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConsensusError> {
        toml::from_str(s).map_err(|e| ConsensusError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, ConsensusError> {
        toml::to_string_pretty(self).map_err(|e| ConsensusError::Config(e.to_string()))
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            decided_cache_capacity: default_decided_cache_capacity(),
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            params: Parameters::default(),
        }
    }
}
