//! SyncBot Sync - Sync orchestration
//!
//! Provides:
//! - Single-flight sync execution driven by manual, timer and external triggers
//! - The auto-sync timer policy
//! - A staging sync engine mirroring tracked paths to a remote drive
//!
//! ## Modules
//!
//! - [`orchestrator`] - Actor owning the sync status and the in-flight run
//! - [`scheduler`] - Auto-sync schedule and timer arithmetic
//! - [`engine`] - Staging copy, SHA-256 change detection and upload
//! - [`archive`] - Timestamped zip archives of the staged tree

pub mod archive;
pub mod engine;
pub mod orchestrator;
pub mod scheduler;

use thiserror::Error;

/// Errors returned to callers requesting a sync
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Another run is in flight; its result is what gets recorded
    #[error("A sync is already running")]
    AlreadyRunning,

    /// No authenticated session; run the authentication flow first
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Invalid schedule or settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// The run executed and failed; the message is recorded in the status
    #[error("Sync failed: {0}")]
    Failed(String),

    /// The orchestrator has shut down
    #[error("Sync orchestrator is not running")]
    Stopped,
}

pub use archive::VersionHistory;
pub use engine::StagingSyncEngine;
pub use orchestrator::{OrchestratorHandle, SyncDeps, SyncOrchestrator};
pub use scheduler::SyncSchedule;
