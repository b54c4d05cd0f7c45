//! Command boundary
//!
//! [`CommandService`] is the single entry point used by the D-Bus interface
//! and the CLI. Each call maps onto one use-case operation and reports its
//! own [`CommandError`]; nothing here aborts the process.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use syncbot_core::{
    config::Config,
    domain::{
        AuthError, AuthState, AuthorizationCode, InteractiveAuth, LoginOutcome, PathKind,
        PathSetError, SyncReport, SyncStatus, SyncTrigger, TrackedPath,
    },
    ports::{IBrowserLauncher, IConfigStore},
    usecases::{AddOutcome, AuthController, TrackedPathSet},
};
use syncbot_sync::{
    archive::archives_dir, OrchestratorHandle, SyncError, SyncSchedule, VersionHistory,
};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Errors reported by [`CommandService`]
#[derive(Debug, Error)]
pub enum CommandError {
    /// Invalid or missing settings
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Paths(#[from] PathSetError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Reading or writing persisted settings failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// A malformed argument (unknown key, unparsable value, bad code)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

// ============================================================================
// Config view
// ============================================================================

/// Settings as shown to clients; the client secret is never included
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigView {
    pub staging_dir: Option<PathBuf>,
    /// Directory actually used, after env and default resolution
    pub effective_staging_dir: PathBuf,
    pub drive_folder: String,
    pub interval_minutes: u64,
    pub auto_sync: bool,
    pub client_id: Option<String>,
    pub client_secret_set: bool,
    pub redirect_port: u16,
    pub listen_timeout_secs: u64,
    pub log_level: String,
    /// Where staging archives are kept
    pub archives_dir: PathBuf,
}

impl ConfigView {
    fn new(config: &Config, data_dir: &Path) -> Self {
        Self {
            staging_dir: config.sync.staging_dir.clone(),
            effective_staging_dir: config.resolve_staging_dir(data_dir),
            drive_folder: config.sync.drive_folder.clone(),
            interval_minutes: config.sync.interval_minutes,
            auto_sync: config.sync.auto_sync,
            client_id: config.auth.client_id.clone(),
            client_secret_set: config
                .auth
                .client_secret
                .as_deref()
                .is_some_and(|s| !s.trim().is_empty()),
            redirect_port: config.auth.redirect_port,
            listen_timeout_secs: config.auth.listen_timeout_secs,
            log_level: config.logging.level.clone(),
            archives_dir: archives_dir(data_dir),
        }
    }
}

/// Settings that can be changed by key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    StagingDir,
    DriveFolder,
    IntervalMinutes,
    AutoSync,
    ClientId,
    ClientSecret,
    LogLevel,
}

impl ConfigField {
    pub const ALL: [ConfigField; 7] = [
        Self::StagingDir,
        Self::DriveFolder,
        Self::IntervalMinutes,
        Self::AutoSync,
        Self::ClientId,
        Self::ClientSecret,
        Self::LogLevel,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::StagingDir => "staging_dir",
            Self::DriveFolder => "drive_folder",
            Self::IntervalMinutes => "interval_minutes",
            Self::AutoSync => "auto_sync",
            Self::ClientId => "client_id",
            Self::ClientSecret => "client_secret",
            Self::LogLevel => "log_level",
        }
    }
}

impl FromStr for ConfigField {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|f| f.key() == key)
            .or(match key.as_str() {
                "sync_interval" | "interval" => Some(Self::IntervalMinutes),
                _ => None,
            })
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|f| f.key()).collect();
                CommandError::InvalidInput(format!(
                    "unknown setting '{s}' (expected one of: {})",
                    known.join(", ")
                ))
            })
    }
}

fn parse_bool(value: &str) -> Result<bool, CommandError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        other => Err(CommandError::InvalidInput(format!(
            "expected true or false, got '{other}'"
        ))),
    }
}

// ============================================================================
// CommandService
// ============================================================================

pub struct CommandService {
    store: Arc<dyn IConfigStore>,
    auth: Arc<AuthController>,
    paths: Arc<TrackedPathSet>,
    sync: OrchestratorHandle,
    browser: Arc<dyn IBrowserLauncher>,
    external_signals: mpsc::Sender<()>,
    data_dir: PathBuf,
    shutdown: CancellationToken,
    /// Serializes read-modify-write of the configuration
    config_lock: Mutex<()>,
}

impl CommandService {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        store: Arc<dyn IConfigStore>,
        auth: Arc<AuthController>,
        paths: Arc<TrackedPathSet>,
        sync: OrchestratorHandle,
        browser: Arc<dyn IBrowserLauncher>,
        external_signals: mpsc::Sender<()>,
        data_dir: PathBuf,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            auth,
            paths,
            sync,
            browser,
            external_signals,
            data_dir,
            shutdown,
            config_lock: Mutex::new(()),
        }
    }

    // ------------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------------

    pub async fn get_config(&self) -> Result<ConfigView, CommandError> {
        let config = self.load_config().await?;
        Ok(ConfigView::new(&config, &self.data_dir))
    }

    /// Sets the staging directory; `None` restores the default location
    pub async fn set_staging_dir(&self, dir: Option<PathBuf>) -> Result<ConfigView, CommandError> {
        if let Some(dir) = &dir {
            if !dir.is_absolute() {
                return Err(CommandError::Config(format!(
                    "staging directory must be absolute: {}",
                    dir.display()
                )));
            }
        }
        self.update_config(|c| c.sync.staging_dir = dir).await
    }

    pub async fn set_drive_folder(&self, folder: &str) -> Result<ConfigView, CommandError> {
        let folder = folder.trim().to_string();
        self.update_config(|c| c.sync.drive_folder = folder).await
    }

    /// Changes the interval; the timer is rescheduled at once
    pub async fn set_sync_interval(&self, minutes: u64) -> Result<ConfigView, CommandError> {
        self.update_config(|c| c.sync.interval_minutes = minutes).await
    }

    pub async fn set_auto_sync(&self, enabled: bool) -> Result<ConfigView, CommandError> {
        self.update_config(|c| c.sync.auto_sync = enabled).await
    }

    pub async fn set_client_id(&self, client_id: &str) -> Result<ConfigView, CommandError> {
        let client_id = client_id.trim().to_string();
        self.update_config(|c| c.auth.client_id = Some(client_id)).await
    }

    pub async fn set_client_secret(&self, client_secret: &str) -> Result<ConfigView, CommandError> {
        let client_secret = client_secret.trim().to_string();
        self.update_config(|c| c.auth.client_secret = Some(client_secret))
            .await
    }

    pub async fn set_log_level(&self, level: &str) -> Result<ConfigView, CommandError> {
        let level = level.trim().to_ascii_lowercase();
        self.update_config(|c| c.logging.level = level).await
    }

    /// Sets one field from its textual key and value
    pub async fn set_field(&self, key: &str, value: &str) -> Result<ConfigView, CommandError> {
        match key.parse::<ConfigField>()? {
            ConfigField::StagingDir => {
                let dir = (!value.trim().is_empty()).then(|| PathBuf::from(value.trim()));
                self.set_staging_dir(dir).await
            }
            ConfigField::DriveFolder => self.set_drive_folder(value).await,
            ConfigField::IntervalMinutes => {
                let minutes = value.trim().parse::<u64>().map_err(|_| {
                    CommandError::Config(format!(
                        "sync interval must be a positive whole number of minutes, got '{value}'"
                    ))
                })?;
                self.set_sync_interval(minutes).await
            }
            ConfigField::AutoSync => self.set_auto_sync(parse_bool(value)?).await,
            ConfigField::ClientId => self.set_client_id(value).await,
            ConfigField::ClientSecret => self.set_client_secret(value).await,
            ConfigField::LogLevel => self.set_log_level(value).await,
        }
    }

    /// Every problem with the stored configuration, empty when valid
    pub async fn validate_config(&self) -> Result<Vec<String>, CommandError> {
        let config = self.load_config().await?;
        Ok(config.validate().iter().map(ToString::to_string).collect())
    }

    async fn load_config(&self) -> Result<Config, CommandError> {
        self.store
            .load_config()
            .await
            .map_err(|e| CommandError::Storage(format!("{e:#}")))
    }

    /// Applies `change`, validates, persists, and reschedules when needed
    async fn update_config<F>(&self, change: F) -> Result<ConfigView, CommandError>
    where
        F: FnOnce(&mut Config),
    {
        let _guard = self.config_lock.lock().await;
        let mut config = self.load_config().await?;
        let before = config.sync.clone();
        change(&mut config);

        let problems = config.validate();
        if !problems.is_empty() {
            let message = problems
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(CommandError::Config(message));
        }

        self.store
            .save_config(&config)
            .await
            .map_err(|e| CommandError::Storage(format!("{e:#}")))?;
        debug!("Configuration saved");

        if before.interval_minutes != config.sync.interval_minutes
            || before.auto_sync != config.sync.auto_sync
        {
            let schedule = SyncSchedule::from_config(&config.sync)?;
            self.sync.reconfigure(schedule).await?;
            info!(
                auto_sync = schedule.auto_sync,
                interval_minutes = config.sync.interval_minutes,
                "Sync schedule updated"
            );
        }

        Ok(ConfigView::new(&config, &self.data_dir))
    }

    // ------------------------------------------------------------------------
    // Tracked paths
    // ------------------------------------------------------------------------

    pub async fn get_tracked_paths(&self) -> Vec<TrackedPath> {
        self.paths.list().await
    }

    /// Tracks a path; the kind is detected when not given
    pub async fn add_tracked_path(
        &self,
        path: &Path,
        kind: Option<PathKind>,
    ) -> Result<AddOutcome, CommandError> {
        let outcome = match kind {
            Some(kind) => self.paths.add(path, kind).await?,
            None => self.paths.add_detected(path).await?,
        };
        Ok(outcome)
    }

    pub async fn remove_tracked_path(&self, path: &Path) -> Result<(), CommandError> {
        Ok(self.paths.remove(path).await?)
    }

    // ------------------------------------------------------------------------
    // Sync
    // ------------------------------------------------------------------------

    pub fn get_sync_status(&self) -> SyncStatus {
        self.sync.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.sync.subscribe()
    }

    /// Runs a manual sync and waits for its result
    pub async fn sync_now(&self) -> Result<SyncReport, CommandError> {
        Ok(self.sync.request_sync(SyncTrigger::Manual).await?)
    }

    /// Number of staging archives kept as version history
    pub async fn get_archive_count(&self) -> Result<usize, CommandError> {
        let history = VersionHistory::new(archives_dir(&self.data_dir));
        tokio::task::spawn_blocking(move || history.count())
            .await
            .map_err(|e| CommandError::Storage(e.to_string()))?
            .map_err(|e| CommandError::Storage(format!("{e:#}")))
    }

    /// Delivers the external "scheduled-sync" signal
    ///
    /// Signals arriving while one is already queued are coalesced.
    pub fn trigger_scheduled_sync(&self) -> Result<(), CommandError> {
        match self.external_signals.try_send(()) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(())) => {
                debug!("Scheduled sync signal already pending");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(())) => Err(SyncError::Stopped.into()),
        }
    }

    // ------------------------------------------------------------------------
    // Authentication
    // ------------------------------------------------------------------------

    pub async fn get_auth_url(&self) -> Result<String, CommandError> {
        Ok(self.auth.authorization_url().await?)
    }

    pub fn open_url(&self, url: &str) -> Result<(), CommandError> {
        let url = url.trim();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(CommandError::InvalidInput(format!(
                "only http(s) URLs can be opened: {url}"
            )));
        }
        self.browser
            .open(url)
            .map_err(|e| CommandError::InvalidInput(format!("{e:#}")))
    }

    /// Opens the consent page and marks authorization pending
    pub async fn begin_auth(&self) -> Result<String, CommandError> {
        Ok(self.auth.begin_interactive_auth().await?)
    }

    /// Waits for the redirect code; `None` uses the configured timeout
    pub async fn listen_for_oauth_code(
        &self,
        timeout: Option<Duration>,
    ) -> Result<InteractiveAuth, CommandError> {
        let timeout = self.listen_timeout(timeout).await?;
        let cancel = self.shutdown.child_token();
        Ok(self.auth.await_redirect_code(timeout, &cancel).await?)
    }

    /// Exchanges a code captured automatically or pasted by the user
    pub async fn handle_oauth_code(&self, code: &str) -> Result<(), CommandError> {
        let code =
            AuthorizationCode::new(code).map_err(|e| CommandError::InvalidInput(e.to_string()))?;
        Ok(self.auth.exchange_code(code).await?)
    }

    /// Full interactive login: browser, redirect capture and exchange
    pub async fn login(&self, timeout: Option<Duration>) -> Result<LoginOutcome, CommandError> {
        let timeout = self.listen_timeout(timeout).await?;
        let cancel = self.shutdown.child_token();
        Ok(self.auth.run_interactive(timeout, &cancel).await?)
    }

    /// Abandons a pending login; a stored token stays in use
    pub async fn cancel_pending_auth(&self) -> AuthState {
        self.auth.cancel_pending_auth().await
    }

    pub fn check_auth_status(&self) -> bool {
        self.auth.status().is_authenticated()
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth.status()
    }

    pub fn subscribe_auth(&self) -> watch::Receiver<AuthState> {
        self.auth.subscribe()
    }

    async fn listen_timeout(&self, requested: Option<Duration>) -> Result<Duration, CommandError> {
        match requested {
            Some(timeout) if timeout.is_zero() => Err(CommandError::InvalidInput(
                "timeout must be positive".to_string(),
            )),
            Some(timeout) => Ok(timeout),
            None => Ok(Duration::from_secs(
                self.load_config().await?.auth.listen_timeout_secs.max(1),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use syncbot_core::domain::SyncState;

    use super::*;
    use crate::test_support::Harness;

    #[tokio::test]
    async fn fresh_install_has_no_auth_url() {
        let h = Harness::new().await;
        let err = h.commands.get_auth_url().await.unwrap_err();
        assert!(matches!(err, CommandError::Auth(AuthError::Config(_))));
    }

    #[tokio::test]
    async fn get_config_hides_the_secret() {
        let h = Harness::new().await;
        h.commands.set_client_id("client-1").await.unwrap();
        let view = h.commands.set_client_secret("hunter2").await.unwrap();

        assert_eq!(view.client_id.as_deref(), Some("client-1"));
        assert!(view.client_secret_set);
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("hunter2"));
    }

    #[tokio::test]
    async fn invalid_settings_are_rejected_not_coerced() {
        let h = Harness::new().await;

        assert!(matches!(
            h.commands.set_sync_interval(0).await,
            Err(CommandError::Config(_))
        ));
        assert!(matches!(
            h.commands.set_drive_folder("   ").await,
            Err(CommandError::Config(_))
        ));
        assert!(matches!(
            h.commands.set_client_id("").await,
            Err(CommandError::Config(_))
        ));
        assert!(matches!(
            h.commands.set_field("interval_minutes", "-5").await,
            Err(CommandError::Config(_))
        ));
        assert!(matches!(
            h.commands.set_staging_dir(Some(PathBuf::from("relative/dir"))).await,
            Err(CommandError::Config(_))
        ));

        let view = h.commands.get_config().await.unwrap();
        assert_eq!(view.interval_minutes, 60);
        assert_eq!(view.drive_folder, "sync-bot-backups");
    }

    #[tokio::test]
    async fn set_field_dispatches_by_key() {
        let h = Harness::new().await;
        let view = h.commands.set_field("drive-folder", "Backups").await.unwrap();
        assert_eq!(view.drive_folder, "Backups");

        let view = h.commands.set_field("auto_sync", "yes").await.unwrap();
        assert!(view.auto_sync);

        let err = h.commands.set_field("colour", "blue").await.unwrap_err();
        assert!(matches!(err, CommandError::InvalidInput(msg) if msg.contains("drive_folder")));
    }

    #[tokio::test(start_paused = true)]
    async fn enabling_auto_sync_schedules_next_run() {
        let h = Harness::new().await;
        assert!(h.commands.get_sync_status().next_sync.is_none());

        h.commands.set_sync_interval(15).await.unwrap();
        h.commands.set_auto_sync(true).await.unwrap();
        assert!(h.commands.get_sync_status().next_sync.is_some());

        h.commands.set_auto_sync(false).await.unwrap();
        assert!(h.commands.get_sync_status().next_sync.is_none());
    }

    #[tokio::test]
    async fn tracked_paths_round_trip() {
        let h = Harness::new().await;
        let file = h.file("notes.txt");

        let outcome = h.commands.add_tracked_path(&file, None).await.unwrap();
        assert_eq!(outcome, AddOutcome::Added);
        let again = h
            .commands
            .add_tracked_path(&file, Some(PathKind::File))
            .await
            .unwrap();
        assert_eq!(again, AddOutcome::AlreadyTracked);
        assert_eq!(h.commands.get_tracked_paths().await.len(), 1);

        h.commands.remove_tracked_path(&file).await.unwrap();
        assert!(matches!(
            h.commands.remove_tracked_path(&file).await,
            Err(CommandError::Paths(PathSetError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn sync_requires_authentication() {
        let h = Harness::new().await;
        let err = h.commands.sync_now().await.unwrap_err();
        assert!(matches!(err, CommandError::Sync(SyncError::NotAuthenticated)));
        assert_eq!(h.engine.calls(), 0);
    }

    #[tokio::test]
    async fn manual_login_then_sync() {
        let h = Harness::with_credentials().await;
        h.listener.unavailable("port 14242 in use");

        let url = h.commands.begin_auth().await.unwrap();
        assert_eq!(h.browser.opened(), vec![url]);
        assert_eq!(h.commands.auth_state(), AuthState::AuthorizationPending);

        match h.commands.listen_for_oauth_code(None).await.unwrap() {
            InteractiveAuth::RequiresManualEntry { reason } => assert!(reason.contains("in use")),
            other => panic!("unexpected {other:?}"),
        }
        h.commands.handle_oauth_code("valid-code").await.unwrap();
        assert!(h.commands.check_auth_status());

        let a = h.file("a.txt");
        let b = h.file("b.txt");
        h.commands.add_tracked_path(&a, None).await.unwrap();
        h.commands.add_tracked_path(&b, None).await.unwrap();

        let report = h.commands.sync_now().await.unwrap();
        assert_eq!(report.files_synced, 2);
        assert_eq!(h.commands.get_sync_status().state, SyncState::Success);
    }

    #[tokio::test]
    async fn login_captures_code_automatically() {
        let h = Harness::with_credentials().await;
        h.listener.capture("valid-code");

        let outcome = h.commands.login(Some(Duration::from_secs(5))).await.unwrap();
        assert_eq!(outcome, LoginOutcome::Authenticated);
        assert_eq!(h.commands.auth_state(), AuthState::Authenticated);
    }

    #[tokio::test]
    async fn rejected_code_leaves_unauthenticated() {
        let h = Harness::with_credentials().await;
        h.commands.begin_auth().await.unwrap();

        let err = h.commands.handle_oauth_code("expired-code").await.unwrap_err();
        assert!(matches!(err, CommandError::Auth(AuthError::Exchange(_))));
        assert_eq!(h.commands.auth_state(), AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn abandoned_reauth_keeps_syncing_with_stored_token() {
        let h = Harness::authenticated().await;
        h.listener.unavailable("port in use");
        let a = h.file("a.txt");
        h.commands.add_tracked_path(&a, None).await.unwrap();

        h.commands.begin_auth().await.unwrap();
        assert!(matches!(
            h.commands.listen_for_oauth_code(None).await.unwrap(),
            InteractiveAuth::RequiresManualEntry { .. }
        ));
        assert_eq!(h.commands.auth_state(), AuthState::AuthorizationPending);

        let report = h.commands.sync_now().await.unwrap();
        assert_eq!(report.files_synced, 1);

        assert_eq!(
            h.commands.cancel_pending_auth().await,
            AuthState::Authenticated
        );
        assert!(h.commands.check_auth_status());
    }

    #[tokio::test]
    async fn archive_count_reads_the_archives_dir() {
        let h = Harness::new().await;
        assert_eq!(h.commands.get_archive_count().await.unwrap(), 0);

        let dir = h.commands.get_config().await.unwrap().archives_dir;
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("sync-2026-01-01_00-00-00.zip"), "").unwrap();
        std::fs::write(dir.join("sync-2026-01-02_00-00-00.zip"), "").unwrap();
        assert_eq!(h.commands.get_archive_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn blank_code_is_invalid_input() {
        let h = Harness::with_credentials().await;
        assert!(matches!(
            h.commands.handle_oauth_code("  ").await,
            Err(CommandError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn open_url_only_accepts_http() {
        let h = Harness::new().await;
        assert!(h.commands.open_url("file:///etc/passwd").is_err());
        h.commands.open_url("https://example.com").unwrap();
        assert_eq!(h.browser.opened(), vec!["https://example.com".to_string()]);
    }

    #[tokio::test]
    async fn scheduled_sync_signal_runs_a_sync() {
        let h = Harness::authenticated().await;
        let mut status = h.commands.subscribe_status();

        h.commands.trigger_scheduled_sync().unwrap();
        let finished = status
            .wait_for(|s| s.state == SyncState::Success)
            .await
            .unwrap()
            .clone();
        assert_eq!(finished.last_trigger, Some(SyncTrigger::ExternalSignal));
        assert_eq!(h.engine.calls(), 0, "empty set does not reach the engine");
    }

    #[test]
    fn config_field_aliases() {
        assert_eq!(
            "sync_interval".parse::<ConfigField>().unwrap(),
            ConfigField::IntervalMinutes
        );
        assert_eq!(
            "Client-Secret".parse::<ConfigField>().unwrap(),
            ConfigField::ClientSecret
        );
        assert!(parse_bool("maybe").is_err());
        assert!(parse_bool("ON").unwrap());
    }
}
