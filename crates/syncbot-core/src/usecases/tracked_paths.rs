//! Tracked path set use case
//!
//! A deduplicated, insertion-ordered set of files and directories to mirror.
//! Every mutation is persisted before it becomes visible, so a storage
//! failure leaves the in-memory set unchanged. Sync runs take a
//! [`snapshot`](TrackedPathSet::snapshot) at start and are unaffected by
//! later mutations.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    domain::{normalize_path, PathKind, PathSetError, TrackedPath},
    ports::IConfigStore,
};

/// Result of [`TrackedPathSet::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOutcome {
    Added,
    /// The path was already tracked; nothing changed
    AlreadyTracked,
}

pub struct TrackedPathSet {
    store: Arc<dyn IConfigStore>,
    entries: Mutex<Vec<TrackedPath>>,
}

impl TrackedPathSet {
    /// Loads the persisted set, dropping duplicates left by older versions
    pub async fn load(store: Arc<dyn IConfigStore>) -> Result<Self, PathSetError> {
        let stored = store
            .load_tracked_paths()
            .await
            .map_err(|e| PathSetError::Storage(format!("{e:#}")))?;

        let mut entries: Vec<TrackedPath> = Vec::with_capacity(stored.len());
        for entry in stored {
            if !entries.iter().any(|e| e.path() == entry.path()) {
                entries.push(entry);
            }
        }
        debug!(count = entries.len(), "Loaded tracked paths");

        Ok(Self {
            store,
            entries: Mutex::new(entries),
        })
    }

    /// Adds an existing file or directory
    ///
    /// Adding a path that is already tracked succeeds without changes.
    ///
    /// # Errors
    ///
    /// - [`PathSetError::InvalidPath`] if the path is relative, missing, or
    ///   not of the given kind
    /// - [`PathSetError::Storage`] if the set cannot be persisted
    pub async fn add(&self, path: &Path, kind: PathKind) -> Result<AddOutcome, PathSetError> {
        let entry = TrackedPath::new(path, kind)?;
        if self.contains(entry.path()).await {
            return Ok(AddOutcome::AlreadyTracked);
        }
        let actual = PathKind::detect(entry.path())?;
        if actual != kind {
            return Err(PathSetError::InvalidPath(format!(
                "{} is a {actual}, not a {kind}",
                entry.path().display()
            )));
        }
        self.insert(entry).await
    }

    /// Adds an existing path, detecting whether it is a file or directory
    pub async fn add_detected(&self, path: &Path) -> Result<AddOutcome, PathSetError> {
        let normalized = normalize_path(path)?;
        if self.contains(&normalized).await {
            return Ok(AddOutcome::AlreadyTracked);
        }
        let kind = PathKind::detect(&normalized)?;
        self.insert(TrackedPath::new(normalized, kind)?).await
    }

    async fn contains(&self, path: &Path) -> bool {
        self.entries.lock().await.iter().any(|e| e.path() == path)
    }

    async fn insert(&self, entry: TrackedPath) -> Result<AddOutcome, PathSetError> {
        let mut entries = self.entries.lock().await;
        if entries.iter().any(|e| e.path() == entry.path()) {
            debug!(path = %entry.path().display(), "Path already tracked");
            return Ok(AddOutcome::AlreadyTracked);
        }

        let mut next = entries.clone();
        next.push(entry.clone());
        self.persist(&next).await?;
        *entries = next;

        info!(path = %entry.path().display(), kind = %entry.kind(), "Tracking path");
        Ok(AddOutcome::Added)
    }

    /// Stops tracking a path; the path need not exist on disk any more
    ///
    /// # Errors
    ///
    /// - [`PathSetError::NotFound`] if the path is not tracked
    /// - [`PathSetError::Storage`] if the set cannot be persisted
    pub async fn remove(&self, path: &Path) -> Result<(), PathSetError> {
        let normalized = normalize_path(path)?;
        let mut entries = self.entries.lock().await;

        let next: Vec<TrackedPath> = entries
            .iter()
            .filter(|e| e.path() != normalized.as_path())
            .cloned()
            .collect();
        if next.len() == entries.len() {
            return Err(PathSetError::NotFound(normalized.display().to_string()));
        }

        self.persist(&next).await?;
        *entries = next;

        info!(path = %normalized.display(), "Stopped tracking path");
        Ok(())
    }

    /// Entries in insertion order
    pub async fn list(&self) -> Vec<TrackedPath> {
        self.entries.lock().await.clone()
    }

    /// Point-in-time copy for a sync run
    pub async fn snapshot(&self) -> Vec<TrackedPath> {
        self.list().await
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    async fn persist(&self, entries: &[TrackedPath]) -> Result<(), PathSetError> {
        self.store
            .save_tracked_paths(entries)
            .await
            .map_err(|e| PathSetError::Storage(format!("{e:#}")))
    }
}
