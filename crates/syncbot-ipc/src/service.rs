//! D-Bus service for SyncBot
//!
//! Exposes [`CommandService`] on the session bus as
//! `org.syncbot.SyncBot.Controller`. Structured results are returned as JSON
//! strings and failures as `org.freedesktop.DBus.Error.Failed` carrying the
//! error message. Status and auth-state changes are broadcast as signals.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use syncbot_core::domain::{InteractiveAuth, PathKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zbus::fdo;

use crate::commands::{CommandError, CommandService};

/// D-Bus well-known name for the SyncBot daemon
pub const DBUS_NAME: &str = "org.syncbot.SyncBot";

/// D-Bus object path for the service
pub const DBUS_PATH: &str = "/org/syncbot/SyncBot";

pub const DBUS_INTERFACE: &str = "org.syncbot.SyncBot.Controller";

fn failed(e: CommandError) -> fdo::Error {
    fdo::Error::Failed(e.to_string())
}

fn to_json<T: Serialize>(value: &T) -> fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| fdo::Error::Failed(format!("serialization: {e}")))
}

fn parse_kind(kind: &str) -> fdo::Result<Option<PathKind>> {
    match kind.trim() {
        "" | "auto" => Ok(None),
        "file" => Ok(Some(PathKind::File)),
        "directory" | "dir" => Ok(Some(PathKind::Directory)),
        other => Err(fdo::Error::InvalidArgs(format!("unknown path kind '{other}'"))),
    }
}

// ============================================================================
// SyncBotInterface
// ============================================================================

/// The command boundary as a D-Bus object
pub struct SyncBotInterface {
    commands: Arc<CommandService>,
}

impl SyncBotInterface {
    pub fn new(commands: Arc<CommandService>) -> Self {
        Self { commands }
    }
}

#[zbus::interface(name = "org.syncbot.SyncBot.Controller")]
impl SyncBotInterface {
    // -- Configuration --

    async fn get_config(&self) -> fdo::Result<String> {
        to_json(&self.commands.get_config().await.map_err(failed)?)
    }

    /// Sets one setting by key and returns the updated configuration
    async fn set_config(&self, key: &str, value: &str) -> fdo::Result<String> {
        let view = self.commands.set_field(key, value).await.map_err(failed)?;
        to_json(&view)
    }

    /// Problems with the stored configuration as a JSON array
    async fn validate_config(&self) -> fdo::Result<String> {
        to_json(&self.commands.validate_config().await.map_err(failed)?)
    }

    // -- Tracked paths --

    async fn get_tracked_paths(&self) -> fdo::Result<String> {
        to_json(&self.commands.get_tracked_paths().await)
    }

    /// `kind` is `file`, `directory`, or empty to detect it
    async fn add_tracked_path(&self, path: &str, kind: &str) -> fdo::Result<String> {
        let kind = parse_kind(kind)?;
        let outcome = self
            .commands
            .add_tracked_path(&PathBuf::from(path), kind)
            .await
            .map_err(failed)?;
        to_json(&outcome)
    }

    async fn remove_tracked_path(&self, path: &str) -> fdo::Result<()> {
        self.commands
            .remove_tracked_path(&PathBuf::from(path))
            .await
            .map_err(failed)
    }

    // -- Sync --

    async fn get_sync_status(&self) -> fdo::Result<String> {
        to_json(&self.commands.get_sync_status())
    }

    async fn sync_now(&self) -> fdo::Result<String> {
        let report = self.commands.sync_now().await.map_err(failed)?;
        to_json(&report)
    }

    /// Delivers the external "scheduled-sync" signal
    async fn get_archive_count(&self) -> fdo::Result<u32> {
        let count = self.commands.get_archive_count().await.map_err(failed)?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn trigger_scheduled_sync(&self) -> fdo::Result<()> {
        self.commands.trigger_scheduled_sync().map_err(failed)
    }

    // -- Authentication --

    async fn get_auth_url(&self) -> fdo::Result<String> {
        self.commands.get_auth_url().await.map_err(failed)
    }

    async fn open_url(&self, url: &str) -> fdo::Result<()> {
        self.commands.open_url(url).map_err(failed)
    }

    async fn begin_auth(&self) -> fdo::Result<String> {
        self.commands.begin_auth().await.map_err(failed)
    }

    /// Waits for the redirect; `timeout_secs` of 0 uses the configured timeout
    ///
    /// Returns `{"outcome":"captured","code":...}` or
    /// `{"outcome":"requires_manual_entry","reason":...}`.
    async fn listen_for_oauth_code(&self, timeout_secs: u64) -> fdo::Result<String> {
        let timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));
        let result = self
            .commands
            .listen_for_oauth_code(timeout)
            .await
            .map_err(failed)?;
        let value = match result {
            InteractiveAuth::CapturedAutomatically(code) => {
                json!({ "outcome": "captured", "code": code.as_str() })
            }
            InteractiveAuth::RequiresManualEntry { reason } => {
                json!({ "outcome": "requires_manual_entry", "reason": reason })
            }
        };
        Ok(value.to_string())
    }

    /// Full interactive login; `timeout_secs` of 0 uses the configured timeout
    async fn login(&self, timeout_secs: u64) -> fdo::Result<String> {
        let timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));
        let outcome = self.commands.login(timeout).await.map_err(failed)?;
        to_json(&outcome)
    }

    async fn handle_oauth_code(&self, code: &str) -> fdo::Result<()> {
        self.commands.handle_oauth_code(code).await.map_err(failed)
    }

    /// Abandons a pending login and returns the settled state
    async fn cancel_pending_auth(&self) -> String {
        self.commands.cancel_pending_auth().await.to_string()
    }

    async fn check_auth_status(&self) -> bool {
        self.commands.check_auth_status()
    }

    async fn auth_state(&self) -> String {
        self.commands.auth_state().to_string()
    }

    // -- Signals --

    /// Emitted with the JSON status after every status change
    #[zbus(signal)]
    async fn status_changed(signal_ctxt: &zbus::SignalContext<'_>, status: &str)
        -> zbus::Result<()>;

    #[zbus(signal)]
    async fn auth_state_changed(
        signal_ctxt: &zbus::SignalContext<'_>,
        state: &str,
    ) -> zbus::Result<()>;
}

// ============================================================================
// DbusService
// ============================================================================

/// Owns the session-bus registration
pub struct DbusService {
    commands: Arc<CommandService>,
}

impl DbusService {
    pub fn new(commands: Arc<CommandService>) -> Self {
        Self { commands }
    }

    /// Registers the interface and requests the well-known name
    ///
    /// The returned connection must be kept alive for the service to stay
    /// reachable. Fails if the name is already owned, which is how a second
    /// daemon instance detects the first.
    pub async fn start(&self) -> anyhow::Result<zbus::Connection> {
        info!("Starting D-Bus service on session bus");

        let connection = zbus::connection::Builder::session()?
            .name(DBUS_NAME)?
            .serve_at(DBUS_PATH, SyncBotInterface::new(Arc::clone(&self.commands)))?
            .build()
            .await?;

        info!(name = DBUS_NAME, path = DBUS_PATH, "D-Bus service started");
        Ok(connection)
    }

    /// Broadcasts status and auth-state changes until `shutdown`
    pub async fn forward_signals(
        &self,
        connection: zbus::Connection,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let ctxt = zbus::SignalContext::new(&connection, DBUS_PATH)?;
        let mut status = self.commands.subscribe_status();
        let mut auth = self.commands.subscribe_auth();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = status.changed() => {
                    if changed.is_err() {
                        debug!("Status channel closed");
                        break;
                    }
                    let snapshot = status.borrow_and_update().clone();
                    let payload = serde_json::to_string(&snapshot)?;
                    if let Err(e) = SyncBotInterface::status_changed(&ctxt, &payload).await {
                        warn!(error = %e, "Failed to emit StatusChanged");
                    }
                }
                changed = auth.changed() => {
                    if changed.is_err() {
                        debug!("Auth channel closed");
                        break;
                    }
                    let state = *auth.borrow_and_update();
                    if let Err(e) = SyncBotInterface::auth_state_changed(&ctxt, state.as_str()).await {
                        warn!(error = %e, "Failed to emit AuthStateChanged");
                    }
                }
            }
        }
        Ok(())
    }
}
