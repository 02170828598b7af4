//! Keep-alive configuration, read from TOML

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::world::TicketLevel;

/// When residency tickets are taken for a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquirePolicy {
    /// One ticket per held region: acquire when the first loader arrives,
    /// release when the last one leaves
    #[default]
    OnFirstHolder,
    /// Acquire on every registration, release when the last loader leaves.
    /// Only balanced against residency managers that treat repeated acquires
    /// of the same region as one ticket.
    PerRegistration,
}

/// When dirty registries are written to durable storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Flush after every mutation
    #[default]
    Immediate,
    /// Flush only on explicit flush calls and world unload
    Deferred,
}

/// Configuration for the keep-alive manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepaliveConfig {
    /// Durable storage key used in every world
    pub storage_key: String,
    /// Root directory for file-backed storage
    pub save_dir: PathBuf,
    /// Level passed with every acquire and release
    pub ticket_level: TicketLevel,
    pub acquire_policy: AcquirePolicy,
    pub flush_policy: FlushPolicy,
    /// Take tickets for persisted regions when a world is loaded
    pub restore_residency_on_load: bool,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            storage_key: "region_keepalive".to_string(),
            save_dir: PathBuf::from("saves/keepalive"),
            ticket_level: TicketLevel::KEEPALIVE,
            acquire_policy: AcquirePolicy::OnFirstHolder,
            flush_policy: FlushPolicy::Immediate,
            restore_residency_on_load: true,
        }
    }
}

impl KeepaliveConfig {
    /// Parse a TOML document; absent keys keep their defaults
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: KeepaliveConfig =
            toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let key = self.storage_key.as_str();
        if key.is_empty() {
            return Err(ConfigError::Invalid("storage_key cannot be empty".to_string()));
        }
        if !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(ConfigError::Invalid(format!(
                "storage_key {:?} may only contain [A-Za-z0-9_.-]",
                key
            )));
        }
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
