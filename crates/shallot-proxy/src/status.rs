//! Proxy lifecycle status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the external routing service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProxyStatus {
    /// No signal received yet, or the last signal was not understood
    #[default]
    Unknown,
    Off,
    Starting,
    On,
    Stopping,
}

impl ProxyStatus {
    /// Map a raw status label to a status.
    ///
    /// Matching ignores case and surrounding whitespace. Anything
    /// unrecognized is `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "ON" => Self::On,
            "OFF" => Self::Off,
            "STARTING" => Self::Starting,
            "STOPPING" => Self::Stopping,
            _ => Self::Unknown,
        }
    }

    /// Wire label, as sent by the proxy app.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Off => "OFF",
            Self::Starting => "STARTING",
            Self::On => "ON",
            Self::Stopping => "STOPPING",
        }
    }

    /// Traffic can currently be routed through the proxy.
    pub fn is_routable(&self) -> bool {
        matches!(self, Self::On)
    }
}

impl fmt::Display for ProxyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
