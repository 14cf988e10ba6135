//! Shallot - privacy browser shell
//!
//! Command line front end over the proxy, session and identity layers.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod app;
mod cli;
mod config;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::app::Shell;
use crate::cli::Cli;
use crate::config::ShellConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    info!("Shallot v{}", env!("CARGO_PKG_VERSION"));

    let mut config = ShellConfig::load(cli.config.as_deref())?;
    if let Some(profile) = cli.profile {
        config.data_dir = Some(profile);
    }

    let shell = Shell::build(&config)?;
    cli::run(&shell, cli.command).await
}
