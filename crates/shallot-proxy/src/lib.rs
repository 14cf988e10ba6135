//! Shallot Proxy
//!
//! Tracks and drives the external anonymizing proxy (Orbot on Android, a
//! local `tor` daemon on desktop).
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────┐   labels    ┌────────────────────┐   ProxyStatus
//! │ StatusSignalSource│────────────▶│ ProxyStatusMonitor │──────────────▶ subscribers
//! └───────────────────┘             └─────────▲──────────┘
//!                                             │ refresh_status()
//! ┌───────────────────┐             ┌─────────┴──────────┐
//! │  ProxyPlatform    │◀────────────│  ProxyController   │──▶ ConnectivityProbe
//! │ (OS capability)   │             │                    │    (check page)
//! └───────────────────┘             └────────────────────┘
//! ```
//!
//! Status transitions come only from signals or explicit polls. A start
//! request succeeding means "dispatched", never "running".

mod config;
mod controller;
mod error;
mod monitor;
mod platform;
mod probe;
mod signal;
mod status;

pub use config::{ProxyConfig, DEFAULT_CHECK_URL, ORBOT_PACKAGE};
pub use controller::{LaunchOutcome, ProxyController};
pub use error::ProxyError;
pub use monitor::ProxyStatusMonitor;
pub use platform::{DesktopPlatform, PlatformError, ProxyPlatform, UnsupportedPlatform};
pub use probe::{Connectivity, ConnectivityProbe};
pub use signal::{ChannelSignalSource, NullSignalSource, SignalHandler, StatusSignalSource};
pub use status::ProxyStatus;
