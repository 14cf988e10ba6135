//! Shell configuration.
//!
//! Read from `config.toml` in the platform config directory (or `--config`).
//! A missing default file is not an error; every section has defaults.
//!
//! ```toml
//! platform = "desktop"
//! key_store = "keyring"
//!
//! [proxy]
//! check_url = "https://check.torproject.org/"
//! probe_timeout_ms = 10000
//!
//! [session]
//! debounce_ms = 300
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shallot_proxy::ProxyConfig;
use shallot_storage::SessionConfig;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const APP_DIR: &str = "shallot";
const CONFIG_FILE: &str = "config.toml";

/// Which proxy platform capability to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    /// No proxy integration
    None,
    /// Local tor daemon
    #[default]
    Desktop,
}

/// Where the session key lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStoreKind {
    /// OS keychain
    #[default]
    Keyring,
    /// Process memory; sessions never survive a restart
    Memory,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Profile data directory (defaults to the platform data dir)
    pub data_dir: Option<PathBuf>,
    pub platform: PlatformKind,
    pub key_store: KeyStoreKind,
    pub proxy: ProxyConfig,
    pub session: SessionConfig,
}

impl ShellConfig {
    /// Load from an explicit path, or from the default location if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_toml_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_toml_file(&path),
                _ => {
                    debug!("No config file, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Profile data directory.
    pub fn resolve_data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join(APP_DIR)))
            .unwrap_or_else(|| PathBuf::from(".").join(APP_DIR))
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE))
}
