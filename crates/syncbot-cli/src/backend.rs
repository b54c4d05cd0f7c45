//! Where commands are executed
//!
//! When `syncbotd` owns its D-Bus name every command is sent to it, so the
//! daemon's in-memory state stays authoritative. Otherwise the CLI assembles
//! the application in-process for the duration of one command.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use syncbot_core::{
    domain::{AuthState, LoginOutcome, PathKind, SyncReport, SyncStatus, TrackedPath},
    usecases::AddOutcome,
};
use syncbot_ipc::{
    bootstrap, App, AppPaths, CommandService, ConfigView, RunMode, DBUS_INTERFACE, DBUS_NAME,
    DBUS_PATH,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

// ============================================================================
// DaemonClient
// ============================================================================

/// Proxy to a running `syncbotd`
pub struct DaemonClient {
    proxy: zbus::Proxy<'static>,
}

impl DaemonClient {
    /// Connects if the daemon currently owns its name
    pub async fn connect() -> Result<Option<Self>> {
        let connection = match zbus::Connection::session().await {
            Ok(connection) => connection,
            Err(e) => {
                debug!(error = %e, "No session bus, running in-process");
                return Ok(None);
            }
        };

        let dbus = zbus::fdo::DBusProxy::new(&connection).await?;
        if !dbus.name_has_owner(DBUS_NAME.try_into()?).await? {
            debug!("Daemon not running, running in-process");
            return Ok(None);
        }

        let proxy = zbus::Proxy::new(&connection, DBUS_NAME, DBUS_PATH, DBUS_INTERFACE)
            .await
            .context("Failed to create daemon proxy")?;
        debug!("Using running daemon");
        Ok(Some(Self { proxy }))
    }

    async fn call<B, R>(&self, method: &'static str, body: &B) -> Result<R>
    where
        B: serde::Serialize + zbus::zvariant::DynamicType,
        R: for<'d> zbus::zvariant::DynamicDeserialize<'d>,
    {
        self.proxy
            .call(method, body)
            .await
            .map_err(|e| anyhow::anyhow!(daemon_error_message(&e)))
    }

    async fn call_json<B, T>(&self, method: &'static str, body: &B) -> Result<T>
    where
        B: serde::Serialize + zbus::zvariant::DynamicType,
        T: DeserializeOwned,
    {
        let json: String = self.call(method, body).await?;
        serde_json::from_str(&json)
            .with_context(|| format!("Unexpected reply from daemon to {method}"))
    }
}

/// The error text carried by a D-Bus error reply
fn daemon_error_message(error: &zbus::Error) -> String {
    match error {
        zbus::Error::MethodError(_, Some(detail), _) => detail.clone(),
        zbus::Error::FDO(fdo) => match fdo.as_ref() {
            zbus::fdo::Error::Failed(detail) | zbus::fdo::Error::InvalidArgs(detail) => {
                detail.clone()
            }
            other => other.to_string(),
        },
        other => format!("daemon call failed: {other}"),
    }
}

// ============================================================================
// Backend
// ============================================================================

/// An in-process application, torn down by [`Backend::close`]
pub struct LocalBackend {
    commands: Arc<CommandService>,
    shutdown: CancellationToken,
    orchestrator: JoinHandle<()>,
}

pub enum Backend {
    Local(LocalBackend),
    Daemon(DaemonClient),
}

impl Backend {
    /// Prefers the running daemon, falling back to an in-process application
    pub async fn open(paths: &AppPaths) -> Result<Self> {
        if let Some(client) = DaemonClient::connect().await.unwrap_or_else(|e| {
            debug!(error = %e, "Daemon connection failed, running in-process");
            None
        }) {
            return Ok(Self::Daemon(client));
        }
        Self::local(paths).await
    }

    pub async fn local(paths: &AppPaths) -> Result<Self> {
        let shutdown = CancellationToken::new();
        let App {
            commands,
            orchestrator,
        } = bootstrap(paths, RunMode::OneShot, shutdown.clone()).await?;
        Ok(Self::Local(LocalBackend {
            commands,
            shutdown,
            orchestrator,
        }))
    }

    pub fn is_daemon(&self) -> bool {
        matches!(self, Self::Daemon(_))
    }

    /// Stops the in-process orchestrator, if any
    pub async fn close(self) {
        if let Self::Local(local) = self {
            local.shutdown.cancel();
            let _ = local.orchestrator.await;
        }
    }

    // -- Configuration --

    pub async fn config(&self) -> Result<ConfigView> {
        match self {
            Self::Local(l) => Ok(l.commands.get_config().await?),
            Self::Daemon(d) => d.call_json("GetConfig", &()).await,
        }
    }

    pub async fn set_config(&self, key: &str, value: &str) -> Result<ConfigView> {
        match self {
            Self::Local(l) => Ok(l.commands.set_field(key, value).await?),
            Self::Daemon(d) => d.call_json("SetConfig", &(key, value)).await,
        }
    }

    pub async fn validate_config(&self) -> Result<Vec<String>> {
        match self {
            Self::Local(l) => Ok(l.commands.validate_config().await?),
            Self::Daemon(d) => d.call_json("ValidateConfig", &()).await,
        }
    }

    // -- Tracked paths --

    pub async fn tracked_paths(&self) -> Result<Vec<TrackedPath>> {
        match self {
            Self::Local(l) => Ok(l.commands.get_tracked_paths().await),
            Self::Daemon(d) => d.call_json("GetTrackedPaths", &()).await,
        }
    }

    /// `path` must be absolute
    pub async fn add_path(&self, path: &Path, kind: Option<PathKind>) -> Result<AddOutcome> {
        match self {
            Self::Local(l) => Ok(l.commands.add_tracked_path(path, kind).await?),
            Self::Daemon(d) => {
                let kind = kind.map(|k| k.as_str()).unwrap_or("");
                d.call_json("AddTrackedPath", &(path_arg(path)?, kind)).await
            }
        }
    }

    pub async fn remove_path(&self, path: &Path) -> Result<()> {
        match self {
            Self::Local(l) => Ok(l.commands.remove_tracked_path(path).await?),
            Self::Daemon(d) => d.call("RemoveTrackedPath", &(path_arg(path)?,)).await,
        }
    }

    // -- Sync --

    pub async fn sync_status(&self) -> Result<SyncStatus> {
        match self {
            Self::Local(l) => Ok(l.commands.get_sync_status()),
            Self::Daemon(d) => d.call_json("GetSyncStatus", &()).await,
        }
    }

    pub async fn sync_now(&self) -> Result<SyncReport> {
        match self {
            Self::Local(l) => Ok(l.commands.sync_now().await?),
            Self::Daemon(d) => d.call_json("SyncNow", &()).await,
        }
    }

    // -- Authentication --

    pub async fn auth_url(&self) -> Result<String> {
        match self {
            Self::Local(l) => Ok(l.commands.get_auth_url().await?),
            Self::Daemon(d) => d.call("GetAuthUrl", &()).await,
        }
    }

    pub async fn auth_state(&self) -> Result<AuthState> {
        match self {
            Self::Local(l) => Ok(l.commands.auth_state()),
            Self::Daemon(d) => {
                let state: String = d.call("AuthState", &()).await?;
                serde_json::from_value(serde_json::Value::String(state))
                    .context("Unexpected auth state from daemon")
            }
        }
    }

    pub async fn begin_auth(&self) -> Result<String> {
        match self {
            Self::Local(l) => Ok(l.commands.begin_auth().await?),
            Self::Daemon(d) => d.call("BeginAuth", &()).await,
        }
    }

    pub async fn login(&self, timeout: Option<Duration>) -> Result<LoginOutcome> {
        match self {
            Self::Local(l) => Ok(l.commands.login(timeout).await?),
            Self::Daemon(d) => {
                let secs = timeout.map(|t| t.as_secs().max(1)).unwrap_or(0);
                d.call_json("Login", &(secs,)).await
            }
        }
    }

    pub async fn archive_count(&self) -> Result<usize> {
        match self {
            Self::Local(l) => Ok(l.commands.get_archive_count().await?),
            Self::Daemon(d) => {
                let count: u32 = d.call("GetArchiveCount", &()).await?;
                Ok(count as usize)
            }
        }
    }

    pub async fn cancel_pending_auth(&self) -> Result<AuthState> {
        match self {
            Self::Local(l) => Ok(l.commands.cancel_pending_auth().await),
            Self::Daemon(d) => {
                let state: String = d.call("CancelPendingAuth", &()).await?;
                serde_json::from_value(serde_json::Value::String(state))
                    .context("Unexpected auth state from daemon")
            }
        }
    }

    pub async fn handle_code(&self, code: &str) -> Result<()> {
        match self {
            Self::Local(l) => Ok(l.commands.handle_oauth_code(code).await?),
            Self::Daemon(d) => d.call("HandleOauthCode", &(code,)).await,
        }
    }
}

fn path_arg(path: &Path) -> Result<&str> {
    path.to_str()
        .with_context(|| format!("{} is not valid UTF-8", path.display()))
}
