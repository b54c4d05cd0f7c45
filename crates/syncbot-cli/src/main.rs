//! SyncBot CLI - Command-line interface for SyncBot
//!
//! Provides commands for:
//! - Signing in to Google Drive
//! - Running a sync and viewing its status
//! - Managing tracked paths
//! - Viewing and changing configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use syncbot_ipc::AppPaths;
use tracing_subscriber::EnvFilter;

mod backend;
mod commands;
mod output;

use commands::{
    auth::AuthCommand, config::ConfigCommand, paths::PathsCommand, status::StatusCommand,
    sync::SyncCommand, CliContext,
};
use output::{get_formatter, OutputFormat};

#[derive(Debug, Parser)]
#[command(name = "syncbot", version, about = "Mirror local files to Google Drive")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Authentication commands
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Sync tracked paths to Google Drive now
    Sync(SyncCommand),
    /// Show sync status
    Status(StatusCommand),
    /// Manage tracked paths
    #[command(subcommand)]
    Paths(PathsCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

async fn run(cli: Cli, ctx: &CliContext) -> Result<()> {
    match cli.command {
        Commands::Auth(cmd) => cmd.execute(ctx).await,
        Commands::Sync(cmd) => cmd.execute(ctx).await,
        Commands::Status(cmd) => cmd.execute(ctx).await,
        Commands::Paths(cmd) => cmd.execute(ctx).await,
        Commands::Config(cmd) => cmd.execute(ctx).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_filter(cli.verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let ctx = CliContext {
        format: OutputFormat::from_flag(cli.json),
        paths: AppPaths::resolve(cli.config.clone()),
    };

    if let Err(e) = run(cli, &ctx).await {
        get_formatter(ctx.format).error(&format!("{e:#}"));
        std::process::exit(1);
    }
}
