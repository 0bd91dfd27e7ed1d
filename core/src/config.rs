//! Ledger configuration loading
//!
//! Loads configuration from `~/.config/parking-ledger/config.toml` (or the
//! `PARKING_LEDGER_CONFIG` env var). Every field has a default, so a missing
//! file is not an error.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::{LedgerError, Result};
use crate::retry::RetryConfig;
use crate::sync::WriteFailurePolicy;

/// Root configuration shared by the server and the CLI
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ParkingConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub client: ClientConfig,
}

/// HTTP service settings
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// SQLite store settings
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Database file; a leading `~/` expands to the home directory
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "~/.local/share/parking-ledger/ledger.db".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl StoreConfig {
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_home(&self.db_path)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegistryConfig {
    /// Reject writes to identifiers outside the floor plan
    #[serde(default = "default_enforce")]
    pub enforce: bool,
}

fn default_enforce() -> bool {
    true
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            enforce: default_enforce(),
        }
    }
}

/// Caller-side sync settings
#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default)]
    pub write_failure_policy: WriteFailurePolicy,

    /// Seconds after the last successful load before the local copy counts as stale
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_stale_after_secs() -> u64 {
    30
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            write_failure_policy: WriteFailurePolicy::default(),
            stale_after_secs: default_stale_after_secs(),
            retry: RetryConfig::default(),
        }
    }
}

/// HTTP client settings (CLI side)
#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ParkingConfig {
    /// Environment variable for config path override
    pub const ENV_CONFIG_PATH: &'static str = "PARKING_LEDGER_CONFIG";

    pub const DEFAULT_CONFIG_FILENAME: &'static str = "config.toml";

    /// Load configuration.
    ///
    /// Resolution order:
    /// 1. `PARKING_LEDGER_CONFIG` environment variable
    /// 2. `~/.config/parking-ledger/config.toml`
    ///
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        let path = Self::resolve_config_path();

        if !path.exists() {
            tracing::info!(
                path = %path.display(),
                "ledger config not found, using defaults"
            );
            return Ok(Self::default());
        }

        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            LedgerError::config_with_source(
                format!("failed to read config at {}", path.display()),
                e,
            )
        })?;

        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let cfg: ParkingConfig = toml::from_str(contents)
            .map_err(|e| LedgerError::config_with_source("failed to parse config", e))?;

        cfg.validate()?;
        Ok(cfg)
    }

    fn resolve_config_path() -> PathBuf {
        if let Ok(path) = std::env::var(Self::ENV_CONFIG_PATH) {
            return PathBuf::from(path);
        }

        dirs::home_dir()
            .map(|h| {
                h.join(".config")
                    .join("parking-ledger")
                    .join(Self::DEFAULT_CONFIG_FILENAME)
            })
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_CONFIG_FILENAME))
    }

    pub fn validate(&self) -> Result<()> {
        self.sync.retry.validate()?;

        if self.client.timeout_secs == 0 {
            return Err(LedgerError::config("client.timeout_secs must be > 0"));
        }
        if self.server.bind.trim().is_empty() {
            return Err(LedgerError::config("server.bind must not be empty"));
        }
        if !self.registry.enforce {
            tracing::warn!("registry enforcement disabled, any spot identifier is accepted");
        }
        Ok(())
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}
