//! Proxy Controller
//!
//! Front door for everything proxy related: install detection, start
//! requests, opening the app (or its store page) and connectivity checks.
//! Status itself is owned by the [`ProxyStatusMonitor`]; the controller only
//! feeds it when asked to poll.

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::monitor::ProxyStatusMonitor;
use crate::platform::{PlatformError, ProxyPlatform};
use crate::probe::{Connectivity, ConnectivityProbe};
use crate::status::ProxyStatus;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Which launch tier succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The proxy app itself was opened
    Launched,
    /// The app store opened on the proxy app's page
    StoreOpened,
    /// The store web page opened in a browser
    WebStoreOpened,
}

pub struct ProxyController {
    platform: Arc<dyn ProxyPlatform>,
    config: ProxyConfig,
    monitor: ProxyStatusMonitor,
    probe: ConnectivityProbe,
}

impl ProxyController {
    pub fn new(platform: Arc<dyn ProxyPlatform>, config: ProxyConfig) -> Self {
        Self::with_monitor(platform, config, ProxyStatusMonitor::new())
    }

    /// Use an existing monitor (already attached to a signal source).
    pub fn with_monitor(
        platform: Arc<dyn ProxyPlatform>,
        config: ProxyConfig,
        monitor: ProxyStatusMonitor,
    ) -> Self {
        info!(
            "Proxy controller initialized (platform: {}, package: {})",
            platform.name(),
            config.package
        );
        let probe = ConnectivityProbe::new(&config);
        Self {
            platform,
            config,
            monitor,
            probe,
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn monitor(&self) -> &ProxyStatusMonitor {
        &self.monitor
    }

    /// Last known status.
    pub fn status(&self) -> ProxyStatus {
        self.monitor.current()
    }

    /// Whether the proxy app is installed. Errors and timeouts read as `false`.
    pub async fn is_installed(&self) -> bool {
        let package = &self.config.package;
        match self
            .bounded("is_package_installed", self.platform.is_package_installed(package))
            .await
        {
            Ok(installed) => installed,
            Err(e) => {
                warn!("Install check failed: {}", e);
                false
            }
        }
    }

    /// Ask the proxy app to start.
    ///
    /// `Ok` only confirms the request was dispatched; `ON` arrives later
    /// through the monitor.
    pub async fn request_start(&self) -> Result<(), ProxyError> {
        if !self.is_installed().await {
            return Err(ProxyError::NotInstalled(self.config.package.clone()));
        }

        let package = &self.config.package;
        self.bounded("send_start_request", self.platform.send_start_request(package))
            .await?;
        info!("Start request sent to {}", package);
        Ok(())
    }

    /// Probe whether traffic is routed through the proxy.
    pub async fn check_connectivity(&self, timeout: Duration) -> Result<Connectivity, ProxyError> {
        self.probe.check(timeout).await
    }

    /// Open the proxy app, falling back to the store deep link and then the
    /// store web page.
    pub async fn open_app_or_store(&self) -> Result<LaunchOutcome, ProxyError> {
        let mut attempts = Vec::with_capacity(3);

        match self
            .bounded("launch_app", self.platform.launch_app(&self.config.package))
            .await
        {
            Ok(()) => return Ok(LaunchOutcome::Launched),
            Err(e) => attempts.push(format!("launch: {e}")),
        }

        match self
            .bounded("open_url", self.platform.open_url(&self.config.store_deep_link))
            .await
        {
            Ok(()) => {
                debug!("Opened store deep link");
                return Ok(LaunchOutcome::StoreOpened);
            }
            Err(e) => attempts.push(format!("store: {e}")),
        }

        match self
            .bounded("open_url", self.platform.open_url(&self.config.store_web_url))
            .await
        {
            Ok(()) => {
                debug!("Opened store web page");
                Ok(LaunchOutcome::WebStoreOpened)
            }
            Err(e) => {
                attempts.push(format!("web store: {e}"));
                warn!("All launch tiers failed: {}", attempts.join("; "));
                Err(ProxyError::LaunchFailed { attempts })
            }
        }
    }

    /// Poll the platform for the current status and feed it to the monitor.
    ///
    /// Platforms that cannot answer leave the status unchanged.
    pub async fn refresh_status(&self) -> Result<ProxyStatus, ProxyError> {
        let label = self
            .bounded("query_status", self.platform.query_status(&self.config.package))
            .await?;
        Ok(match label {
            Some(label) => self.monitor.handle_signal(&label),
            None => self.monitor.current(),
        })
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, PlatformError>>,
    ) -> Result<T, ProxyError> {
        match tokio::time::timeout(self.config.platform_timeout(), call).await {
            Ok(result) => result.map_err(ProxyError::from),
            Err(_) => Err(ProxyError::Timeout(operation)),
        }
    }
}

impl std::fmt::Debug for ProxyController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyController")
            .field("platform", &self.platform.name())
            .field("package", &self.config.package)
            .field("status", &self.status())
            .finish()
    }
}
