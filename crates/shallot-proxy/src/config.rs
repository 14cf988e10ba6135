//! Proxy Configuration
//!
//! Every field has a default, so an empty `[proxy]` table is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Package id of the Orbot proxy app
pub const ORBOT_PACKAGE: &str = "org.torproject.android";

/// Page that confirms whether the request arrived over Tor
pub const DEFAULT_CHECK_URL: &str = "https://check.torproject.org/";

/// Proxy integration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Package id of the proxy app
    pub package: String,
    /// Store deep link tried when the app cannot be launched
    pub store_deep_link: String,
    /// Web store page, last launch fallback
    pub store_web_url: String,
    /// Connectivity check page
    pub check_url: String,
    /// Case-insensitive phrases proving the check page saw proxied traffic
    pub proof_phrases: Vec<String>,
    /// Connectivity probe timeout (ms)
    pub probe_timeout_ms: u64,
    /// Upper bound for any single platform call (ms)
    pub platform_timeout_ms: u64,
    /// User-Agent sent by the probe
    pub user_agent: String,
    /// Explicit path to the desktop proxy daemon (searched in PATH otherwise)
    pub tor_binary: Option<PathBuf>,
    /// Extra arguments for the desktop proxy daemon
    pub tor_args: Vec<String>,
}

impl ProxyConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn platform_timeout(&self) -> Duration {
        Duration::from_millis(self.platform_timeout_ms)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            package: ORBOT_PACKAGE.to_string(),
            store_deep_link: format!("market://details?id={}", ORBOT_PACKAGE),
            store_web_url: format!(
                "https://play.google.com/store/apps/details?id={}",
                ORBOT_PACKAGE
            ),
            check_url: DEFAULT_CHECK_URL.to_string(),
            proof_phrases: vec!["congratulation".to_string(), "you are using tor".to_string()],
            probe_timeout_ms: 10_000,
            platform_timeout_ms: 5_000,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; rv:128.0) Gecko/20100101 Firefox/128.0"
                .to_string(),
            tor_binary: None,
            tor_args: Vec::new(),
        }
    }
}
