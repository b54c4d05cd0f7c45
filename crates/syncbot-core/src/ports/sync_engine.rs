//! Sync engine port (driven/secondary port)
//!
//! Performs the actual transfer of one sync run. Retry policy, diffing and
//! chunking are the engine's concern; the orchestrator only awaits a single
//! result per run.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::domain::{SyncReport, Token, TrackedPath};

/// Snapshot handed to the engine at the start of a run
#[derive(Debug, Clone)]
pub struct SyncRequest {
    /// Tracked entries; directories are expanded by the engine
    pub paths: Vec<TrackedPath>,
    /// Local working directory
    pub staging_dir: PathBuf,
    /// Name of the remote folder receiving files
    pub drive_folder: String,
    /// Valid token for the duration of the run
    pub token: Token,
}

#[async_trait]
pub trait ISyncEngine: Send + Sync {
    async fn run(&self, request: &SyncRequest) -> anyhow::Result<SyncReport>;
}
