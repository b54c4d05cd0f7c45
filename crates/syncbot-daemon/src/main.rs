//! SyncBot Daemon - Background sync service
//!
//! This binary runs as a user service and handles:
//! - The auto-sync timer and externally signalled syncs
//! - The D-Bus interface used by the CLI and desktop clients
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon wires the application together, claims the D-Bus name, and
//! forwards status changes as signals until a `CancellationToken` is
//! cancelled by SIGTERM or SIGINT. The sync orchestrator then finishes its
//! in-flight run before the process exits.

use anyhow::{Context, Result};
use syncbot_core::config::Config;
use syncbot_ipc::{bootstrap, App, AppPaths, DbusService, RunMode, DBUS_NAME};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Returns true when a D-Bus error means another instance owns the name
fn is_name_taken(message: &str) -> bool {
    ["already taken", "already owned", "NameTaken", "name already", "Exists"]
        .iter()
        .any(|needle| message.contains(needle))
}

struct DaemonService {
    paths: AppPaths,
    shutdown: CancellationToken,
}

impl DaemonService {
    fn new(paths: AppPaths, shutdown: CancellationToken) -> Self {
        Self { paths, shutdown }
    }

    async fn run(&self) -> Result<()> {
        info!(
            config_path = %self.paths.config_path.display(),
            data_dir = %self.paths.data_dir.display(),
            "Starting"
        );

        let App {
            commands,
            orchestrator,
        } = bootstrap(&self.paths, RunMode::Daemon, self.shutdown.clone())
            .await
            .context("Failed to initialise SyncBot")?;

        // Owning the name is the single-instance lock
        let dbus = DbusService::new(commands.clone());
        let connection = match dbus.start().await {
            Ok(connection) => connection,
            Err(e) => {
                self.shutdown.cancel();
                let _ = orchestrator.await;
                let message = format!("{e:#}");
                if is_name_taken(&message) {
                    error!("Another instance of syncbotd is already running (D-Bus name {DBUS_NAME} is taken)");
                    anyhow::bail!("Another instance of syncbotd is already running");
                }
                return Err(e).context("Failed to start D-Bus service");
            }
        };

        if !commands.check_auth_status() {
            warn!("Not authenticated; run 'syncbot auth login' to enable syncing");
        }

        let forward_shutdown = self.shutdown.clone();
        let forwarder = tokio::spawn(async move {
            if let Err(e) = dbus.forward_signals(connection, forward_shutdown).await {
                warn!(error = %e, "Signal forwarding stopped");
            }
        });

        self.shutdown.cancelled().await;
        info!("Shutting down, waiting for the in-flight sync");

        if let Err(e) = orchestrator.await {
            error!(error = %e, "Sync orchestrator task failed");
        }
        let _ = forwarder.await;
        Ok(())
    }
}

/// Waits for SIGTERM or SIGINT and cancels `token`
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }

    token.cancel();
}

/// `RUST_LOG` wins over the configured level
fn env_filter(config_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config_level))
}

#[tokio::main]
async fn main() -> Result<()> {
    let paths = AppPaths::resolve(None);
    let config = Config::load_or_default(&paths.config_path);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(&config.logging.level))
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "SyncBot daemon starting (syncbotd)");

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let result = DaemonService::new(paths, shutdown).run().await;
    match &result {
        Ok(()) => info!("SyncBot daemon shut down gracefully"),
        Err(e) => error!(error = %e, "SyncBot daemon exiting with error"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_taken_detection() {
        assert!(is_name_taken(
            "org.freedesktop.DBus.Error.NameTaken: name already owned"
        ));
        assert!(is_name_taken("Name request failed: Exists"));
        assert!(!is_name_taken("Failed to connect to session bus"));
    }

    #[test]
    fn test_cancellation_token_child_propagation() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_config_level_is_a_valid_filter() {
        let config = Config::default();
        let filter = env_filter(&config.logging.level);
        assert!(!filter.to_string().is_empty());
    }
}
