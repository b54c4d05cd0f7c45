//! Configuration store implementations
//!
//! - [`FileConfigStore`] - YAML config and JSON tracked paths on disk, token
//!   in an [`ITokenVault`] (the OS keyring by default)
//! - [`KeyringTokenVault`] - token kept in the system credential store
//! - [`InMemoryConfigStore`], [`InMemoryTokenVault`] - volatile, for tests
//!
//! All file writes go through [`write_atomic`]: write to a sibling temp file,
//! fsync, then rename over the target.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::config::Config;
use crate::domain::{Token, TrackedPath};
use crate::ports::{IConfigStore, ITokenVault};

const TRACKED_PATHS_FILE: &str = "tracked_paths.json";

/// Service name of keyring entries
pub const KEYRING_SERVICE: &str = "syncbot";

// ============================================================================
// Atomic writes
// ============================================================================

/// Writes `data` to `path` via temp file + rename, creating parent directories.
pub fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Same directory, so the rename stays on one filesystem.
    let tmp_path = {
        let mut p = path.as_os_str().to_owned();
        p.push(".tmp");
        PathBuf::from(p)
    };

    let mut file = std::fs::File::create(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&tmp_path, path)
}

async fn write_blocking(path: PathBuf, data: Vec<u8>) -> Result<()> {
    let display = path.display().to_string();
    tokio::task::spawn_blocking(move || write_atomic(&path, &data))
        .await
        .context("Write task panicked")?
        .with_context(|| format!("Failed to write {display}"))
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(anyhow::Error::new(e).context(format!("Failed to read {}", path.display()))),
    }
}

// ============================================================================
// KeyringTokenVault
// ============================================================================

/// Stores the token in the system keyring
///
/// The token is serialized as JSON under the service [`KEYRING_SERVICE`].
/// The username is the data directory, so separate profiles keep separate
/// tokens. The keyring entry is created on first use and then reused.
pub struct KeyringTokenVault {
    service: String,
    username: String,
    entry: Mutex<Option<keyring::Entry>>,
}

impl KeyringTokenVault {
    pub fn new(service: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            username: username.into(),
            entry: Mutex::new(None),
        }
    }

    /// Vault for the profile rooted at `data_dir`
    pub fn for_data_dir(data_dir: &Path) -> Self {
        Self::new(KEYRING_SERVICE, data_dir.display().to_string())
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    fn with_entry<T>(
        &self,
        f: impl FnOnce(&keyring::Entry) -> keyring::Result<T>,
    ) -> keyring::Result<T> {
        let mut slot = lock(&self.entry);
        let entry = match slot.take() {
            Some(entry) => entry,
            None => keyring::Entry::new(&self.service, &self.username)?,
        };
        let result = f(&entry);
        *slot = Some(entry);
        result
    }
}

impl ITokenVault for KeyringTokenVault {
    fn load(&self) -> Result<Option<Token>> {
        match self.with_entry(|entry| entry.get_password()) {
            Ok(json) => {
                let token = serde_json::from_str(&json)
                    .context("Failed to deserialize token from keyring")?;
                debug!(user = %self.username, "Loaded token from keyring");
                Ok(Some(token))
            }
            Err(keyring::Error::NoEntry) => {
                debug!(user = %self.username, "No token in keyring");
                Ok(None)
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to read from keyring")),
        }
    }

    fn store(&self, token: &Token) -> Result<()> {
        let json = serde_json::to_string(token).context("Failed to serialize token")?;
        self.with_entry(|entry| entry.set_password(&json))
            .context("Failed to store token in keyring")?;
        debug!(user = %self.username, "Stored token in keyring");
        Ok(())
    }
}

/// Volatile vault
#[derive(Default)]
pub struct InMemoryTokenVault {
    token: Mutex<Option<Token>>,
}

impl ITokenVault for InMemoryTokenVault {
    fn load(&self) -> Result<Option<Token>> {
        Ok(lock(&self.token).clone())
    }

    fn store(&self, token: &Token) -> Result<()> {
        *lock(&self.token) = Some(token.clone());
        Ok(())
    }
}

// ============================================================================
// FileConfigStore
// ============================================================================

/// On-disk store
///
/// Layout:
/// - `<config_path>` - YAML [`Config`]
/// - `<data_dir>/tracked_paths.json` - JSON array of tracked paths
/// - the token - in the store's [`ITokenVault`]
pub struct FileConfigStore {
    config_path: PathBuf,
    data_dir: PathBuf,
    tokens: Arc<dyn ITokenVault>,
    /// Serializes writes from concurrent callers
    write_lock: tokio::sync::Mutex<()>,
}

impl FileConfigStore {
    /// Store keeping its token in the system keyring
    pub fn new(config_path: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let tokens = Arc::new(KeyringTokenVault::for_data_dir(&data_dir));
        Self::with_token_vault(config_path, data_dir, tokens)
    }

    pub fn with_token_vault(
        config_path: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        tokens: Arc<dyn ITokenVault>,
    ) -> Self {
        Self {
            config_path: config_path.into(),
            data_dir: data_dir.into(),
            tokens,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn tracked_paths_file(&self) -> PathBuf {
        self.data_dir.join(TRACKED_PATHS_FILE)
    }
}

#[async_trait]
impl IConfigStore for FileConfigStore {
    async fn load_config(&self) -> Result<Config> {
        match read_optional(&self.config_path).await? {
            Some(bytes) => {
                let config = serde_yaml::from_slice(&bytes).with_context(|| {
                    format!("Invalid configuration file {}", self.config_path.display())
                })?;
                Ok(config)
            }
            None => {
                debug!(path = %self.config_path.display(), "No configuration file, using defaults");
                Ok(Config::default())
            }
        }
    }

    async fn save_config(&self, config: &Config) -> Result<()> {
        let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
        let _guard = self.write_lock.lock().await;
        write_blocking(self.config_path.clone(), yaml.into_bytes()).await
    }

    async fn load_tracked_paths(&self) -> Result<Vec<TrackedPath>> {
        let path = self.tracked_paths_file();
        match read_optional(&path).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Invalid tracked paths file {}", path.display())),
            None => Ok(Vec::new()),
        }
    }

    async fn save_tracked_paths(&self, paths: &[TrackedPath]) -> Result<()> {
        let json = serde_json::to_vec_pretty(paths).context("Failed to serialize tracked paths")?;
        let _guard = self.write_lock.lock().await;
        write_blocking(self.tracked_paths_file(), json).await
    }

    async fn load_token(&self) -> Result<Option<Token>> {
        let tokens = self.tokens.clone();
        tokio::task::spawn_blocking(move || tokens.load())
            .await
            .context("Token read task panicked")?
    }

    async fn save_token(&self, token: &Token) -> Result<()> {
        let tokens = self.tokens.clone();
        let token = token.clone();
        let _guard = self.write_lock.lock().await;
        tokio::task::spawn_blocking(move || tokens.store(&token))
            .await
            .context("Token write task panicked")?
    }
}

// ============================================================================
// InMemoryConfigStore
// ============================================================================

/// Volatile store
///
/// [`InMemoryConfigStore::fail_writes`] makes every save fail, which lets
/// callers exercise their storage-error paths.
#[derive(Default)]
pub struct InMemoryConfigStore {
    config: Mutex<Config>,
    tracked: Mutex<Vec<TrackedPath>>,
    token: Mutex<Option<Token>>,
    fail_writes: AtomicBool,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config: Mutex::new(config),
            ..Self::default()
        }
    }

    pub fn with_token(self, token: Token) -> Self {
        *lock(&self.token) = Some(token);
        self
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Current token without going through the async port
    pub fn token(&self) -> Option<Token> {
        lock(&self.token).clone()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("store is read-only");
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl IConfigStore for InMemoryConfigStore {
    async fn load_config(&self) -> Result<Config> {
        Ok(lock(&self.config).clone())
    }

    async fn save_config(&self, config: &Config) -> Result<()> {
        self.check_writable()?;
        *lock(&self.config) = config.clone();
        Ok(())
    }

    async fn load_tracked_paths(&self) -> Result<Vec<TrackedPath>> {
        Ok(lock(&self.tracked).clone())
    }

    async fn save_tracked_paths(&self, paths: &[TrackedPath]) -> Result<()> {
        self.check_writable()?;
        *lock(&self.tracked) = paths.to_vec();
        Ok(())
    }

    async fn load_token(&self) -> Result<Option<Token>> {
        Ok(lock(&self.token).clone())
    }

    async fn save_token(&self, token: &Token) -> Result<()> {
        self.check_writable()?;
        *lock(&self.token) = Some(token.clone());
        Ok(())
    }
}
