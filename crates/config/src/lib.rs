//! Configuration loading and validation for memwell.
//!
//! Loads configuration from `~/.memwell/config.toml`. Every field has a
//! serde default, so a missing file or an empty table yields a working
//! configuration. Validated at load time.

use chrono::Duration;
use memwell_core::ScoringPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.memwell/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemwellConfig {
    /// Working store limits
    #[serde(default)]
    pub store: StoreConfig,

    /// Relevance scoring weights
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Durable ledger settings
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Context assembly budgets
    #[serde(default)]
    pub assembly: AssemblyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

fn default_max_entries() -> usize {
    100
}
fn default_max_content_chars() -> usize {
    500_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_content_chars: default_max_content_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_importance_weight")]
    pub importance_weight: f64,

    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,

    /// Age at which recency bottoms out at zero.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: f64,
}

fn default_importance_weight() -> f64 {
    0.6
}
fn default_recency_weight() -> f64 {
    0.4
}
fn default_max_age_days() -> f64 {
    7.0
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            importance_weight: default_importance_weight(),
            recency_weight: default_recency_weight(),
            max_age_days: default_max_age_days(),
        }
    }
}

impl From<&ScoringConfig> for ScoringPolicy {
    fn from(config: &ScoringConfig) -> Self {
        ScoringPolicy {
            importance_weight: config.importance_weight,
            recency_weight: config.recency_weight,
            max_age: Duration::milliseconds((config.max_age_days * 86_400_000.0) as i64),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// SQLite database path. Supports `sqlite::memory:` for ephemeral use.
    #[serde(default = "default_ledger_path")]
    pub path: String,
}

fn default_ledger_path() -> String {
    "sqlite://context.db".into()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyConfig {
    /// Maximum entries per assembled context.
    #[serde(default = "default_entry_limit")]
    pub entry_limit: usize,

    /// Token budget per assembled context.
    #[serde(default = "default_token_budget")]
    pub token_budget: u64,

    /// Continue in-memory when the ledger fails instead of erroring.
    #[serde(default)]
    pub degrade_on_storage_error: bool,
}

fn default_entry_limit() -> usize {
    50
}
fn default_token_budget() -> u64 {
    8_192
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            entry_limit: default_entry_limit(),
            token_budget: default_token_budget(),
            degrade_on_storage_error: false,
        }
    }
}

impl MemwellConfig {
    /// Load configuration from the default path (~/.memwell/config.toml).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_dir().join("config.toml"))
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".memwell")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.max_entries == 0 {
            return Err(ConfigError::ValidationError(
                "store.max_entries must be at least 1".into(),
            ));
        }
        if self.store.max_content_chars == 0 {
            return Err(ConfigError::ValidationError(
                "store.max_content_chars must be at least 1".into(),
            ));
        }
        if self.scoring.importance_weight < 0.0 || self.scoring.recency_weight < 0.0 {
            return Err(ConfigError::ValidationError(
                "scoring weights must be non-negative".into(),
            ));
        }
        if self.scoring.importance_weight + self.scoring.recency_weight <= 0.0 {
            return Err(ConfigError::ValidationError(
                "importance_weight + recency_weight must be > 0".into(),
            ));
        }
        if self.scoring.max_age_days <= 0.0 {
            return Err(ConfigError::ValidationError(
                "scoring.max_age_days must be > 0".into(),
            ));
        }
        if self.assembly.entry_limit == 0 {
            return Err(ConfigError::ValidationError(
                "assembly.entry_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for MemwellConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            scoring: ScoringConfig::default(),
            ledger: LedgerConfig::default(),
            assembly: AssemblyConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
