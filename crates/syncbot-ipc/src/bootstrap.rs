//! Application wiring
//!
//! Builds the store, the Google adapters, the auth controller, the tracked
//! path set and the sync orchestrator, then hands them to a
//! [`CommandService`]. Both the daemon and the CLI start from here.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use syncbot_core::{
    config::Config,
    ports::{IBrowserLauncher, IConfigStore, IOAuthProvider, IRedirectListener, ISyncEngine},
    store::FileConfigStore,
    usecases::{AuthController, TrackedPathSet},
};
use syncbot_drive::{
    DriveClient, GoogleDriveProvider, GoogleOAuthConfig, GoogleOAuthProvider, LocalCallbackServer,
    SystemBrowser,
};
use syncbot_sync::{
    archive::archives_dir, StagingSyncEngine, SyncDeps, SyncOrchestrator, SyncSchedule,
    VersionHistory,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::commands::CommandService;

/// Where settings and state live on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    pub fn new(config_path: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            data_dir: data_dir.into(),
        }
    }

    /// XDG defaults, with an optional config file override
    pub fn resolve(config_override: Option<PathBuf>) -> Self {
        Self::new(
            config_override.unwrap_or_else(Config::default_path),
            Config::default_data_dir(),
        )
    }
}

/// Whether the process should own the auto-sync timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Long-lived process; the timer follows the configured schedule
    Daemon,
    /// Short-lived client process; syncs only on request
    OneShot,
}

/// Port implementations used by the application
pub struct Adapters {
    pub store: Arc<dyn IConfigStore>,
    pub provider: Arc<dyn IOAuthProvider>,
    pub browser: Arc<dyn IBrowserLauncher>,
    pub listener: Arc<dyn IRedirectListener>,
    pub engine: Arc<dyn ISyncEngine>,
}

impl Adapters {
    /// Google OAuth and Drive adapters over `store`
    ///
    /// Staging archives go to `<data_dir>/archives`.
    pub fn google(store: Arc<dyn IConfigStore>, config: &Config, data_dir: &Path) -> Result<Self> {
        let port = config.auth.redirect_port;
        let provider = GoogleOAuthProvider::new(GoogleOAuthConfig::new(port))
            .context("Failed to create OAuth provider")?;
        let drive = GoogleDriveProvider::new(DriveClient::new());

        Ok(Self {
            store,
            provider: Arc::new(provider),
            browser: Arc::new(SystemBrowser),
            listener: Arc::new(LocalCallbackServer::new(port)),
            engine: Arc::new(
                StagingSyncEngine::new(Arc::new(drive))
                    .with_history(VersionHistory::new(archives_dir(data_dir))),
            ),
        })
    }
}

/// A running application
pub struct App {
    pub commands: Arc<CommandService>,
    /// Completes once `shutdown` is cancelled and the in-flight run resolves
    pub orchestrator: JoinHandle<()>,
}

/// Wires `adapters` together and starts the orchestrator
///
/// Restores the stored token and tracked paths first, so the initial
/// status reflects what is on disk.
pub async fn assemble(
    adapters: Adapters,
    data_dir: PathBuf,
    mode: RunMode,
    shutdown: CancellationToken,
) -> Result<App> {
    let Adapters {
        store,
        provider,
        browser,
        listener,
        engine,
    } = adapters;

    let config = store
        .load_config()
        .await
        .context("Failed to load configuration")?;
    for problem in config.validate() {
        warn!(%problem, "Invalid configuration value");
    }

    let auth = Arc::new(AuthController::new(
        store.clone(),
        provider,
        browser.clone(),
        listener,
    ));
    let state = match auth.restore().await {
        Ok(state) => state,
        Err(e) => {
            warn!(error = %e, "Stored token unavailable, sign in again");
            auth.status()
        }
    };
    let paths = Arc::new(TrackedPathSet::load(store.clone()).await?);
    info!(auth = %state, tracked = paths.len().await, "State restored");

    let schedule = match mode {
        RunMode::Daemon => SyncSchedule::from_config(&config.sync).unwrap_or_else(|e| {
            warn!(error = %e, "Auto-sync disabled until the interval is fixed");
            SyncSchedule::manual_only()
        }),
        RunMode::OneShot => SyncSchedule::manual_only(),
    };

    // Capacity 1: a signal arriving while one is queued is coalesced
    let (signal_tx, signal_rx) = mpsc::channel(1);
    let deps = SyncDeps {
        auth: auth.clone(),
        paths: paths.clone(),
        store: store.clone(),
        engine,
        data_dir: data_dir.clone(),
    };
    let (handle, orchestrator) =
        SyncOrchestrator::spawn(deps, schedule, Some(signal_rx), shutdown.clone());

    let commands = Arc::new(CommandService::new(
        store, auth, paths, handle, browser, signal_tx, data_dir, shutdown,
    ));
    Ok(App {
        commands,
        orchestrator,
    })
}

/// File-backed store plus Google adapters
pub async fn bootstrap(
    paths: &AppPaths,
    mode: RunMode,
    shutdown: CancellationToken,
) -> Result<App> {
    let store: Arc<dyn IConfigStore> = Arc::new(FileConfigStore::new(
        paths.config_path.clone(),
        paths.data_dir.clone(),
    ));
    let config = store
        .load_config()
        .await
        .context("Failed to load configuration")?;
    let adapters = Adapters::google(store, &config, &paths.data_dir)?;
    assemble(adapters, paths.data_dir.clone(), mode, shutdown).await
}

#[cfg(test)]
mod tests {
    use syncbot_core::{
        config::ConfigBuilder,
        domain::{AuthState, Token},
        ports::ITokenVault,
        store::InMemoryConfigStore,
    };

    use super::*;
    use crate::test_support::{fake_adapters, valid_token};

    struct LockedVault;

    impl ITokenVault for LockedVault {
        fn load(&self) -> Result<Option<Token>> {
            anyhow::bail!("keyring is locked")
        }

        fn store(&self, _token: &Token) -> Result<()> {
            anyhow::bail!("keyring is locked")
        }
    }

    #[tokio::test]
    async fn unreadable_token_starts_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::with_token_vault(
            dir.path().join("config.yaml"),
            dir.path().join("data"),
            Arc::new(LockedVault),
        );
        let (adapters, _) = fake_adapters(Arc::new(store));
        let shutdown = CancellationToken::new();

        let app = assemble(adapters, dir.path().join("data"), RunMode::Daemon, shutdown.clone())
            .await
            .unwrap();
        assert_eq!(app.commands.auth_state(), AuthState::Unauthenticated);

        shutdown.cancel();
        app.orchestrator.await.unwrap();
    }

    #[test]
    fn resolve_honours_override() {
        let paths = AppPaths::resolve(Some(PathBuf::from("/tmp/custom.yaml")));
        assert_eq!(paths.config_path, PathBuf::from("/tmp/custom.yaml"));
        assert_eq!(paths.data_dir, Config::default_data_dir());
    }

    #[tokio::test]
    async fn restores_stored_token() {
        let store = InMemoryConfigStore::new().with_token(valid_token());
        let (adapters, _) = fake_adapters(Arc::new(store));
        let shutdown = CancellationToken::new();

        let app = assemble(adapters, PathBuf::from("/tmp/data"), RunMode::Daemon, shutdown.clone())
            .await
            .unwrap();
        assert_eq!(app.commands.auth_state(), AuthState::Authenticated);

        shutdown.cancel();
        app.orchestrator.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn auto_sync_is_armed_from_config() {
        let config = ConfigBuilder::new()
            .sync_auto_sync(true)
            .sync_interval_minutes(5)
            .build();
        let (adapters, _) = fake_adapters(Arc::new(InMemoryConfigStore::with_config(config)));
        let shutdown = CancellationToken::new();

        let app = assemble(adapters, PathBuf::from("/tmp/data"), RunMode::Daemon, shutdown.clone())
            .await
            .unwrap();
        assert!(app.commands.get_sync_status().next_sync.is_some());

        shutdown.cancel();
        app.orchestrator.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_never_arms_the_timer() {
        let config = ConfigBuilder::new().sync_auto_sync(true).build();
        let (adapters, _) = fake_adapters(Arc::new(InMemoryConfigStore::with_config(config)));
        let shutdown = CancellationToken::new();

        let app = assemble(adapters, PathBuf::from("/tmp/data"), RunMode::OneShot, shutdown.clone())
            .await
            .unwrap();
        assert!(app.commands.get_sync_status().next_sync.is_none());

        shutdown.cancel();
        app.orchestrator.await.unwrap();
    }

    #[tokio::test]
    async fn zero_interval_falls_back_to_manual() {
        let config = ConfigBuilder::new()
            .sync_auto_sync(true)
            .sync_interval_minutes(0)
            .build();
        let (adapters, _) = fake_adapters(Arc::new(InMemoryConfigStore::with_config(config)));
        let shutdown = CancellationToken::new();

        let app = assemble(adapters, PathBuf::from("/tmp/data"), RunMode::Daemon, shutdown.clone())
            .await
            .unwrap();
        assert!(app.commands.get_sync_status().next_sync.is_none());

        shutdown.cancel();
        app.orchestrator.await.unwrap();
    }
}
