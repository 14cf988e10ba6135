use crate::platform::PlatformError;
use thiserror::Error;

/// Proxy controller errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProxyError {
    #[error("Proxy app '{0}' is not installed")]
    NotInstalled(String),

    #[error("Could not open proxy app or store: {}", .attempts.join("; "))]
    LaunchFailed { attempts: Vec<String> },

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Platform call '{0}' timed out")]
    Timeout(&'static str),

    #[error("Invalid probe URL '{url}': {reason}")]
    InvalidProbeUrl { url: String, reason: String },
}
