//! Configuration module for SyncBot.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, saving, validation, defaults, and a builder pattern for
//! programmatic use.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::domain::Credentials;

/// Environment variable that overrides the configured staging directory.
pub const STAGING_DIR_ENV: &str = "SYNCBOT_STAGING_DIR";

/// Default name of the remote folder that receives mirrored files.
pub const DEFAULT_DRIVE_FOLDER: &str = "sync-bot-backups";

/// Default port of the loopback OAuth redirect listener.
pub const DEFAULT_REDIRECT_PORT: u16 = 14242;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for SyncBot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// Synchronization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Local working directory. `None` resolves to `$XDG_DATA_HOME/syncbot/staging`.
    pub staging_dir: Option<PathBuf>,
    /// Name of the remote folder that receives mirrored files.
    pub drive_folder: String,
    /// Minutes between scheduled sync runs.
    pub interval_minutes: u64,
    /// Whether the periodic timer is armed.
    pub auto_sync: bool,
}

/// Authentication / OAuth settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OAuth client ID. `None` until the user configures it.
    pub client_id: Option<String>,
    /// OAuth client secret. Never logged.
    pub client_secret: Option<String>,
    /// Loopback port the redirect listener binds to.
    pub redirect_port: u16,
    /// Seconds to wait for the provider redirect before giving up.
    pub listen_timeout_secs: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("redirect_port", &self.redirect_port)
            .field("listen_timeout_secs", &self.listen_timeout_secs)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Loading and saving
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Serialize to YAML and write atomically to `path`, creating parent
    /// directories as needed.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize configuration")?;
        crate::store::write_atomic(path, yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {}", path.display()))
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/syncbot/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("syncbot")
            .join("config.yaml")
    }

    /// Platform-appropriate directory for tracked paths, tokens and staging.
    ///
    /// Typically `$XDG_DATA_HOME/syncbot` on Linux.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("syncbot")
    }

    /// OAuth client credentials, if both halves are configured and non-empty.
    pub fn credentials(&self) -> Option<Credentials> {
        let id = self.auth.client_id.as_deref().map(str::trim)?;
        let secret = self.auth.client_secret.as_deref().map(str::trim)?;
        if id.is_empty() || secret.is_empty() {
            return None;
        }
        Some(Credentials::new(id, secret))
    }

    /// Resolve the staging directory.
    ///
    /// Precedence: `SYNCBOT_STAGING_DIR`, then `sync.staging_dir`, then
    /// `<data_dir>/staging`.
    pub fn resolve_staging_dir(&self, data_dir: &Path) -> PathBuf {
        let from_env = std::env::var_os(STAGING_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        resolve_staging(from_env, self.sync.staging_dir.as_deref(), data_dir)
    }
}

fn resolve_staging(from_env: Option<PathBuf>, configured: Option<&Path>, data_dir: &Path) -> PathBuf {
    from_env
        .or_else(|| configured.map(Path::to_path_buf))
        .unwrap_or_else(|| data_dir.join("staging"))
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            staging_dir: None,
            drive_folder: DEFAULT_DRIVE_FOLDER.to_string(),
            interval_minutes: 60,
            auto_sync: false,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_port: DEFAULT_REDIRECT_PORT,
            listen_timeout_secs: 300,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.interval_minutes"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        if self.sync.interval_minutes == 0 {
            errors.push(ValidationError {
                field: "sync.interval_minutes".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.sync.drive_folder.trim().is_empty() {
            errors.push(ValidationError {
                field: "sync.drive_folder".into(),
                message: "must not be empty".into(),
            });
        }
        if let Some(dir) = &self.sync.staging_dir {
            if dir.as_os_str().is_empty() {
                errors.push(ValidationError {
                    field: "sync.staging_dir".into(),
                    message: "must not be empty when set".into(),
                });
            }
        }

        // --- auth ---
        if self.auth.redirect_port == 0 {
            errors.push(ValidationError {
                field: "auth.redirect_port".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.auth.listen_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "auth.listen_timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        for (field, value) in [
            ("auth.client_id", &self.auth.client_id),
            ("auth.client_secret", &self.auth.client_secret),
        ] {
            if matches!(value, Some(v) if v.trim().is_empty()) {
                errors.push(ValidationError {
                    field: field.into(),
                    message: "must not be empty when set".into(),
                });
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}', expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use syncbot_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .sync_interval_minutes(15)
///     .sync_auto_sync(true)
///     .auth_client_id("my-client")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn sync_staging_dir(mut self, dir: PathBuf) -> Self {
        self.config.sync.staging_dir = Some(dir);
        self
    }

    pub fn sync_drive_folder(mut self, folder: impl Into<String>) -> Self {
        self.config.sync.drive_folder = folder.into();
        self
    }

    pub fn sync_interval_minutes(mut self, minutes: u64) -> Self {
        self.config.sync.interval_minutes = minutes;
        self
    }

    pub fn sync_auto_sync(mut self, enabled: bool) -> Self {
        self.config.sync.auto_sync = enabled;
        self
    }

    // --- auth ---

    pub fn auth_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.auth.client_id = Some(client_id.into());
        self
    }

    pub fn auth_client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.config.auth.client_secret = Some(client_secret.into());
        self
    }

    pub fn auth_redirect_port(mut self, port: u16) -> Self {
        self.config.auth.redirect_port = port;
        self
    }

    pub fn auth_listen_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.auth.listen_timeout_secs = seconds;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
