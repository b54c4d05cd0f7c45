//! Sync status snapshot
//!
//! [`SyncStatus`] has exactly one live instance, owned by the orchestrator.
//! Everything else receives clones.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What caused a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    /// Explicit user request
    Manual,
    /// The periodic auto-sync timer
    Timer,
    /// A "scheduled-sync" signal pushed from outside the process
    ExternalSignal,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::Manual => "manual",
            SyncTrigger::Timer => "timer",
            SyncTrigger::ExternalSignal => "external_signal",
        }
    }
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse state of the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Syncing,
    Success,
    Failed,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Syncing => "syncing",
            SyncState::Success => "success",
            SyncState::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recorded result of the last completed run
///
/// Serializes as `{"files_synced": n}` or `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SyncOutcome {
    Synced { files_synced: u64 },
    Failed { error: String },
}

/// What a sync engine reports for a successful run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Files transferred during this run
    pub files_synced: u64,
    /// Files found unchanged and skipped
    pub files_skipped: u64,
}

/// Point-in-time view of the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub state: SyncState,
    /// When the last run resolved
    pub last_sync: Option<DateTime<Utc>>,
    /// When the timer fires next; `None` while auto-sync is off
    pub next_sync: Option<DateTime<Utc>>,
    pub last_result: Option<SyncOutcome>,
    /// Trigger of the last accepted run
    pub last_trigger: Option<SyncTrigger>,
}

impl SyncStatus {
    pub fn is_syncing(&self) -> bool {
        self.state == SyncState::Syncing
    }
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            state: SyncState::Idle,
            last_sync: None,
            next_sync: None,
            last_result: None,
            last_trigger: None,
        }
    }
}
