//! Command line surface of the shell.

use crate::app::Shell;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use shallot_identity::ExitAction;
use shallot_proxy::{ProxyStatus, ProxyError};
use shallot_storage::{
    normalize_origin, PartialSettings, Permission, SessionRecord, SitePreference,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "shallot")]
#[command(about = "Privacy browser shell: proxy control, encrypted session, identity reset")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides the platform config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Profile directory (overrides the config file)
    #[arg(long, global = true, env = "SHALLOT_PROFILE")]
    pub profile: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show proxy status and whether the proxy is installed
    Status,

    /// Fetch the check page through the current network path
    Check {
        /// Request timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Ask the proxy to start
    Start {
        /// Wait up to this many seconds for the proxy to report ON
        #[arg(long, default_value_t = 0)]
        wait: u64,

        /// Stay in the foreground until interrupted, then apply the exit policy
        #[arg(long)]
        foreground: bool,
    },

    /// Open the proxy app, or its store page if it is not installed
    OpenProxy,

    /// Manage the saved tab session
    #[command(subcommand)]
    Tabs(TabsCommands),

    /// Read or change settings
    #[command(subcommand)]
    Settings(SettingsCommands),

    /// Manage per-site preferences
    #[command(subcommand)]
    SitePrefs(SitePrefsCommands),

    /// Read or toggle feature flags
    #[command(subcommand)]
    Flags(FlagsCommands),

    /// Reset settings, destroy the session and clear site preferences
    Reset,

    /// Apply the exit policy (wipe or flush the session)
    Shutdown,
}

#[derive(Subcommand)]
pub enum TabsCommands {
    /// List saved tabs
    List,
    /// Save a tab
    Add {
        url: String,
        #[arg(long)]
        title: Option<String>,
    },
    /// Remove a tab by id
    Remove { id: String },
}

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Print effective settings as JSON
    Get,
    /// Merge a JSON patch, e.g. '{"useTor": true}'
    Set { patch: String },
}

#[derive(Subcommand)]
pub enum SitePrefsCommands {
    /// List every site preference
    List,
    /// Create or update the preference for an origin
    Set {
        origin: String,
        /// Disable JavaScript on this origin
        #[arg(long)]
        js: Option<JsArg>,
        #[arg(long)]
        camera: Option<PermissionArg>,
        #[arg(long)]
        mic: Option<PermissionArg>,
        #[arg(long)]
        notifications: Option<PermissionArg>,
    },
    /// Remove the preference for an origin
    Remove { origin: String },
}

#[derive(Subcommand)]
pub enum FlagsCommands {
    /// List stored flags
    List,
    /// Turn a flag on or off
    Set {
        name: String,
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum JsArg {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PermissionArg {
    Allow,
    Block,
    Ask,
}

impl From<PermissionArg> for Permission {
    fn from(arg: PermissionArg) -> Self {
        match arg {
            PermissionArg::Allow => Permission::Allow,
            PermissionArg::Block => Permission::Block,
            PermissionArg::Ask => Permission::Ask,
        }
    }
}

/// Run one command against `shell`. Pending session writes are flushed
/// before returning.
pub async fn run(shell: &Shell, command: Commands) -> Result<()> {
    let result = dispatch(shell, command).await;
    if let Err(e) = shell.session.flush().await {
        warn!("Failed to flush session: {}", e);
    }
    result
}

async fn dispatch(shell: &Shell, command: Commands) -> Result<()> {
    match command {
        Commands::Status => cmd_status(shell).await,
        Commands::Check { timeout_ms } => cmd_check(shell, timeout_ms).await,
        Commands::Start { wait, foreground } => cmd_start(shell, wait, foreground).await,
        Commands::OpenProxy => {
            let outcome = shell.proxy.open_app_or_store().await?;
            println!("{:?}", outcome);
            Ok(())
        }
        Commands::Tabs(cmd) => cmd_tabs(shell, cmd).await,
        Commands::Settings(cmd) => cmd_settings(shell, cmd),
        Commands::SitePrefs(cmd) => cmd_site_prefs(shell, cmd),
        Commands::Flags(cmd) => cmd_flags(shell, cmd),
        Commands::Reset => {
            let report = shell.identity.reset_identity().await;
            println!("{}", report);
            if !report.is_complete() {
                bail!("identity reset incomplete");
            }
            Ok(())
        }
        Commands::Shutdown => cmd_shutdown(shell).await,
    }
}

async fn cmd_status(shell: &Shell) -> Result<()> {
    let installed = shell.proxy.is_installed().await;
    let status = match shell.proxy.refresh_status().await {
        Ok(status) => status,
        Err(e) => {
            warn!("Status query failed: {}", e);
            shell.proxy.status()
        }
    };
    println!("installed: {}", installed);
    println!("status: {}", status);
    println!("routable: {}", status.is_routable());
    Ok(())
}

async fn cmd_check(shell: &Shell, timeout_ms: Option<u64>) -> Result<()> {
    let timeout = timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| shell.proxy.config().probe_timeout());
    let result = shell.proxy.check_connectivity(timeout).await?;
    println!("{}: {}", if result.ok { "ok" } else { "not routed" }, result.detail);
    Ok(())
}

async fn cmd_start(shell: &Shell, wait: u64, foreground: bool) -> Result<()> {
    // Subscribe before dispatch so no transition is missed
    let (tx, mut rx) = watch::channel(shell.proxy.status());
    let _sub = shell.proxy.monitor().subscribe(move |status: &ProxyStatus| {
        let _ = tx.send(*status);
    });

    match shell.proxy.request_start().await {
        Ok(()) => info!("Start request dispatched"),
        Err(ProxyError::NotInstalled(package)) => {
            bail!("{} is not installed; try `shallot open-proxy`", package)
        }
        Err(e) => return Err(e.into()),
    }

    if wait > 0 {
        let reached = tokio::time::timeout(
            Duration::from_secs(wait),
            rx.wait_for(|status| *status == ProxyStatus::On),
        )
        .await;
        match reached {
            Ok(Ok(_)) => println!("status: {}", ProxyStatus::On),
            _ => bail!(
                "proxy did not report ON within {}s (last status: {})",
                wait,
                shell.proxy.status()
            ),
        }
    } else {
        println!("status: {}", shell.proxy.status());
    }

    if foreground {
        info!("Running until interrupted");
        tokio::signal::ctrl_c()
            .await
            .context("waiting for interrupt")?;
        cmd_shutdown(shell).await?;
    }
    Ok(())
}

async fn cmd_tabs(shell: &Shell, cmd: TabsCommands) -> Result<()> {
    let loaded = shell.session.load().await?;
    if let Some(warning) = loaded.warning {
        warn!("{}", warning);
    }

    match cmd {
        TabsCommands::List => {
            for record in loaded.session.iter() {
                println!(
                    "{}  {}  {}",
                    record.id,
                    record.url,
                    record.title.as_deref().unwrap_or("")
                );
            }
        }
        TabsCommands::Add { url, title } => {
            let record = SessionRecord::new(url, title);
            let id = record.id.clone();
            shell.session.add(record);
            println!("{}", id);
        }
        TabsCommands::Remove { id } => {
            if !shell.session.remove(&id) {
                bail!("no tab with id {}", id);
            }
        }
    }
    Ok(())
}

fn cmd_settings(shell: &Shell, cmd: SettingsCommands) -> Result<()> {
    let settings = match cmd {
        SettingsCommands::Get => shell.settings.get(),
        SettingsCommands::Set { patch } => {
            let patch: PartialSettings =
                serde_json::from_str(&patch).context("parsing settings patch")?;
            shell.settings.set(&patch)?
        }
    };
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

fn cmd_site_prefs(shell: &Shell, cmd: SitePrefsCommands) -> Result<()> {
    match cmd {
        SitePrefsCommands::List => {
            let prefs = shell.site_prefs.get_all()?;
            println!("{}", serde_json::to_string_pretty(&prefs)?);
        }
        SitePrefsCommands::Set {
            origin,
            js,
            camera,
            mic,
            notifications,
        } => {
            let origin = normalize_origin(&origin)?;
            let mut pref = shell
                .site_prefs
                .get(&origin)?
                .unwrap_or_else(|| SitePreference::new(origin));
            if let Some(js) = js {
                pref.disable_js = Some(js == JsArg::Off);
            }
            pref.camera = camera.map(Into::into).or(pref.camera);
            pref.mic = mic.map(Into::into).or(pref.mic);
            pref.notifications = notifications.map(Into::into).or(pref.notifications);

            let saved = shell.site_prefs.set(pref)?;
            println!("{}", serde_json::to_string_pretty(&saved)?);
        }
        SitePrefsCommands::Remove { origin } => {
            if !shell.site_prefs.remove(&origin)? {
                bail!("no preference for {}", origin);
            }
        }
    }
    Ok(())
}

fn cmd_flags(shell: &Shell, cmd: FlagsCommands) -> Result<()> {
    match cmd {
        FlagsCommands::List => {
            for (name, enabled) in shell.flags.get_all() {
                println!("{}: {}", name, enabled);
            }
        }
        FlagsCommands::Set { name, enabled } => shell.flags.set(&name, enabled)?,
    }
    Ok(())
}

async fn cmd_shutdown(shell: &Shell) -> Result<()> {
    match shell.identity.apply_exit_policy().await? {
        ExitAction::Wiped => println!("session wiped"),
        ExitAction::Flushed => println!("session saved"),
    }
    Ok(())
}
