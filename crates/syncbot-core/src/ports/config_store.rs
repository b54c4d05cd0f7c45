//! Configuration store port (driven/secondary port)
//!
//! Durable storage for settings, the tracked path list and the OAuth token.
//! Implementations serialize their own writes; callers may invoke any
//! method concurrently.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage failures are adapter-specific;
//!   use cases map them to `StorageError` variants.

use async_trait::async_trait;

use crate::config::Config;
use crate::domain::{Token, TrackedPath};

/// Persistent store for configuration, tracked paths and token
#[async_trait]
pub trait IConfigStore: Send + Sync {
    /// Loads the configuration, returning defaults if none was saved
    async fn load_config(&self) -> anyhow::Result<Config>;

    /// Persists the whole configuration
    async fn save_config(&self, config: &Config) -> anyhow::Result<()>;

    /// Loads the tracked paths in insertion order
    async fn load_tracked_paths(&self) -> anyhow::Result<Vec<TrackedPath>>;

    /// Replaces the persisted tracked paths
    async fn save_tracked_paths(&self, paths: &[TrackedPath]) -> anyhow::Result<()>;

    /// Loads the stored token, if any
    async fn load_token(&self) -> anyhow::Result<Option<Token>>;

    /// Overwrites the stored token
    async fn save_token(&self, token: &Token) -> anyhow::Result<()>;
}
