//! Platform capability for talking to the proxy app.
//!
//! The controller never touches OS facilities directly. A [`ProxyPlatform`] is
//! chosen once at startup:
//!
//! - [`UnsupportedPlatform`]: nothing available; every request fails cleanly
//! - [`DesktopPlatform`]: a local `tor` daemon found on `PATH`

use crate::config::ProxyConfig;
use async_trait::async_trait;
use crossbeam_channel::Sender;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Failure reported by a platform call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("not supported on this platform")]
    Unsupported,

    #[error("{0}")]
    Failed(String),
}

/// OS facilities needed to manage the proxy app.
#[async_trait]
pub trait ProxyPlatform: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    async fn is_package_installed(&self, package: &str) -> Result<bool, PlatformError>;

    /// Ask the proxy app to start. Success means the request was dispatched,
    /// not that the proxy is running.
    async fn send_start_request(&self, package: &str) -> Result<(), PlatformError>;

    /// Bring the proxy app to the foreground.
    async fn launch_app(&self, package: &str) -> Result<(), PlatformError>;

    /// Open a URL with the system handler (store links, web pages).
    async fn open_url(&self, url: &str) -> Result<(), PlatformError>;

    /// Current raw status label, if the platform can answer a poll.
    async fn query_status(&self, _package: &str) -> Result<Option<String>, PlatformError> {
        Ok(None)
    }
}

/// Platform without proxy support.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedPlatform;

#[async_trait]
impl ProxyPlatform for UnsupportedPlatform {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    async fn is_package_installed(&self, _package: &str) -> Result<bool, PlatformError> {
        Ok(false)
    }

    async fn send_start_request(&self, _package: &str) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported)
    }

    async fn launch_app(&self, _package: &str) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported)
    }

    async fn open_url(&self, _url: &str) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported)
    }
}

/// Desktop platform driving a local `tor` daemon.
///
/// The daemon stands in for the proxy app: "installed" means the binary can
/// be found, and starting it spawns the process. Bootstrap progress on the
/// daemon's stdout is translated into status labels on `signals`.
///
/// Lookups and process spawns run on the blocking pool so callers can bound
/// them with a timeout.
pub struct DesktopPlatform {
    tor_binary: Option<PathBuf>,
    tor_args: Vec<String>,
    signals: Option<Sender<String>>,
    child: Arc<Mutex<Option<Child>>>,
}

impl DesktopPlatform {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            tor_binary: config.tor_binary.clone(),
            tor_args: config.tor_args.clone(),
            signals: None,
            child: Arc::new(Mutex::new(None)),
        }
    }

    /// Emit status labels on `signals` while the daemon runs.
    pub fn with_signals(mut self, signals: Sender<String>) -> Self {
        self.signals = Some(signals);
        self
    }

    /// Find the tor binary at the configured path or in PATH.
    pub fn find_tor_binary(&self) -> Option<PathBuf> {
        self.launcher().find_tor_binary()
    }

    fn launcher(&self) -> Launcher {
        Launcher {
            tor_binary: self.tor_binary.clone(),
            tor_args: self.tor_args.clone(),
            signals: self.signals.clone(),
            child: self.child.clone(),
        }
    }
}

/// Owned handle used on the blocking pool.
struct Launcher {
    tor_binary: Option<PathBuf>,
    tor_args: Vec<String>,
    signals: Option<Sender<String>>,
    child: Arc<Mutex<Option<Child>>>,
}

impl Launcher {
    fn find_tor_binary(&self) -> Option<PathBuf> {
        if let Some(ref path) = self.tor_binary {
            if path.exists() {
                return Some(path.clone());
            }
        }

        let candidates: &[&str] = if cfg!(windows) {
            &["tor.exe", "Tor\\tor.exe"]
        } else {
            &["tor", "/usr/bin/tor", "/usr/local/bin/tor"]
        };
        candidates.iter().find_map(|c| which::which(c).ok())
    }

    fn emit(&self, label: &str) {
        if let Some(ref signals) = self.signals {
            let _ = signals.send(label.to_string());
        }
    }

    fn is_running(&self) -> bool {
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        poll_child(&mut child)
    }

    /// Start the daemon unless one is already running. The child slot stays
    /// locked from the check until the new process is stored.
    fn spawn_daemon(&self) -> Result<(), PlatformError> {
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        if poll_child(&mut child) {
            debug!("tor already running");
            return Ok(());
        }

        let binary = self
            .find_tor_binary()
            .ok_or_else(|| PlatformError::Failed("tor binary not found".to_string()))?;

        info!("Starting {}", binary.display());
        let mut process = Command::new(&binary)
            .args(&self.tor_args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| PlatformError::Failed(format!("spawn {}: {}", binary.display(), e)))?;

        self.emit("STARTING");

        if let Some(stdout) = process.stdout.take() {
            let signals = self.signals.clone();
            let reader = thread::Builder::new()
                .name("tor-output".to_string())
                .spawn(move || {
                    let reader = BufReader::new(stdout);
                    for line in reader.lines().map_while(Result::ok) {
                        if let Some(label) = bootstrap_label(&line) {
                            if let Some(ref signals) = signals {
                                let _ = signals.send(label.to_string());
                            }
                        }
                        if line.contains("[warn]") || line.contains("[err]") {
                            warn!("tor: {}", line);
                        } else {
                            debug!("tor: {}", line);
                        }
                    }
                    if let Some(ref signals) = signals {
                        let _ = signals.send("OFF".to_string());
                    }
                });
            if let Err(e) = reader {
                let _ = process.kill();
                let _ = process.wait();
                return Err(PlatformError::Failed(format!("output reader: {e}")));
            }
        }

        *child = Some(process);
        Ok(())
    }

    fn open_with_system(url: &str) -> Result<(), PlatformError> {
        let mut command = if cfg!(target_os = "macos") {
            Command::new("open")
        } else if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.args(["/C", "start", ""]);
            c
        } else {
            Command::new("xdg-open")
        };

        command
            .arg(url)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|e| PlatformError::Failed(format!("open {url}: {e}")))
    }
}

/// Whether the process in `slot` is alive. Reaps and clears an exited one.
fn poll_child(slot: &mut Option<Child>) -> bool {
    match slot.as_mut().map(|c| c.try_wait()) {
        Some(Ok(None)) => true,
        Some(Ok(Some(status))) => {
            debug!("tor exited with {}", status);
            *slot = None;
            false
        }
        Some(Err(e)) => {
            warn!("Failed to poll tor process: {}", e);
            false
        }
        None => false,
    }
}

/// Status label for a line of tor's log output.
fn bootstrap_label(line: &str) -> Option<&'static str> {
    if line.contains("Bootstrapped 100%") {
        Some("ON")
    } else if line.contains("Bootstrapped") {
        Some("STARTING")
    } else if line.contains("Interrupt: exiting cleanly") || line.contains("Catching signal TERM")
    {
        Some("STOPPING")
    } else {
        None
    }
}

async fn run_blocking<T, F>(work: F) -> Result<T, PlatformError>
where
    F: FnOnce() -> Result<T, PlatformError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| PlatformError::Failed(format!("platform task failed: {e}")))?
}

#[async_trait]
impl ProxyPlatform for DesktopPlatform {
    fn name(&self) -> &'static str {
        "desktop"
    }

    async fn is_package_installed(&self, _package: &str) -> Result<bool, PlatformError> {
        let launcher = self.launcher();
        run_blocking(move || Ok(launcher.find_tor_binary().is_some())).await
    }

    async fn send_start_request(&self, _package: &str) -> Result<(), PlatformError> {
        let launcher = self.launcher();
        run_blocking(move || launcher.spawn_daemon()).await
    }

    async fn launch_app(&self, _package: &str) -> Result<(), PlatformError> {
        let launcher = self.launcher();
        run_blocking(move || launcher.spawn_daemon()).await
    }

    async fn open_url(&self, url: &str) -> Result<(), PlatformError> {
        // Store deep links have no desktop handler
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(PlatformError::Unsupported);
        }
        let url = url.to_string();
        run_blocking(move || Launcher::open_with_system(&url)).await
    }

    async fn query_status(&self, _package: &str) -> Result<Option<String>, PlatformError> {
        if self.launcher().is_running() {
            // Running but bootstrap progress only arrives as signals
            Ok(None)
        } else {
            Ok(Some("OFF".to_string()))
        }
    }
}

impl std::fmt::Debug for DesktopPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DesktopPlatform")
            .field("tor_binary", &self.tor_binary)
            .field("tor_args", &self.tor_args)
            .finish_non_exhaustive()
    }
}
