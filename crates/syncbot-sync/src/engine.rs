//! Staging sync engine
//!
//! Mirrors tracked entries into `<staging>/tracked/` and uploads the files
//! whose content changed since the last successful upload.
//!
//! ## Layout
//!
//! - file entry `/home/me/notes.txt` -> `tracked/notes.txt`
//! - directory entry `/home/me/docs` -> `tracked/docs/<relative path>`
//!
//! The remote folder mirrors the same tree under `drive_folder`.
//!
//! ## Change detection
//!
//! SHA-256 digests of uploaded files are kept in
//! `<staging>/.syncbot-manifest.json`. The manifest is written after every
//! run, including failed ones, so files that did upload are not re-sent.
//!
//! ## Version history
//!
//! With a [`VersionHistory`] attached, the staged tree is archived before
//! anything is uploaded. A failed archive is logged and does not fail the run.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use syncbot_core::{
    domain::{PathKind, SyncReport, TrackedPath},
    ports::{IRemoteDrive, ISyncEngine, SyncRequest},
    store::write_atomic,
};
use tracing::{debug, info, instrument, warn};

use crate::archive::VersionHistory;

const TRACKED_DIR: &str = "tracked";
const MANIFEST_FILE: &str = ".syncbot-manifest.json";

/// Digests of the files last uploaded to `drive_folder`
#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    drive_folder: String,
    files: BTreeMap<String, String>,
}

/// A file copied into the staging tree
#[derive(Debug)]
struct StagedFile {
    /// `/`-separated path relative to `tracked/`
    key: String,
    staged: PathBuf,
    digest: String,
}

#[derive(Debug, Default)]
struct Staging {
    files: Vec<StagedFile>,
    failures: Vec<String>,
}

pub struct StagingSyncEngine {
    drive: Arc<dyn IRemoteDrive>,
    history: Option<VersionHistory>,
}

impl StagingSyncEngine {
    pub fn new(drive: Arc<dyn IRemoteDrive>) -> Self {
        Self {
            drive,
            history: None,
        }
    }

    /// Archives the staged tree before each upload
    pub fn with_history(mut self, history: VersionHistory) -> Self {
        self.history = Some(history);
        self
    }

    async fn archive_staged(&self, staging_dir: &Path) {
        let Some(history) = self.history.clone() else {
            return;
        };
        let tracked = staging_dir.join(TRACKED_DIR);
        match tokio::task::spawn_blocking(move || history.archive(&tracked)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to archive staging tree"),
            Err(e) => warn!(error = %e, "Archive task panicked"),
        }
    }

    /// Creates the remote folder chain for `key`, returning the parent ID
    async fn ensure_parent(
        &self,
        access_token: &str,
        root_id: &str,
        key: &str,
        folders: &mut HashMap<String, String>,
    ) -> Result<String> {
        let mut parent = root_id.to_string();
        let mut prefix = String::new();
        let segments: Vec<&str> = key.split('/').collect();

        for segment in &segments[..segments.len().saturating_sub(1)] {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);

            parent = match folders.get(&prefix) {
                Some(id) => id.clone(),
                None => {
                    let id = self
                        .drive
                        .ensure_folder(access_token, segment, Some(&parent))
                        .await
                        .with_context(|| format!("Failed to create remote folder {prefix}"))?;
                    folders.insert(prefix.clone(), id.clone());
                    id
                }
            };
        }
        Ok(parent)
    }
}

#[async_trait]
impl ISyncEngine for StagingSyncEngine {
    #[instrument(skip_all, fields(entries = request.paths.len(), drive_folder = %request.drive_folder))]
    async fn run(&self, request: &SyncRequest) -> Result<SyncReport> {
        let staging_dir = request.staging_dir.clone();
        let paths = request.paths.clone();
        let staging = tokio::task::spawn_blocking(move || stage(&paths, &staging_dir))
            .await
            .context("Staging task panicked")??;

        if !staging.files.is_empty() {
            self.archive_staged(&request.staging_dir).await;
        }

        let manifest_path = request.staging_dir.join(MANIFEST_FILE);
        let mut manifest = load_manifest(&manifest_path, &request.drive_folder).await;

        // Forget files that are no longer tracked so re-adding uploads them again.
        let current: HashSet<&str> = staging.files.iter().map(|f| f.key.as_str()).collect();
        manifest.files.retain(|key, _| current.contains(key.as_str()));

        let changed: Vec<&StagedFile> = staging
            .files
            .iter()
            .filter(|f| manifest.files.get(&f.key) != Some(&f.digest))
            .collect();
        let skipped = (staging.files.len() - changed.len()) as u64;
        let mut failures = staging.failures;
        let mut synced = 0u64;

        if !changed.is_empty() {
            let access_token = request.token.access_token.as_str();
            match self
                .drive
                .ensure_folder(access_token, &request.drive_folder, None)
                .await
            {
                Ok(root_id) => {
                    let mut folders = HashMap::new();
                    for file in changed {
                        match upload(self, access_token, &root_id, file, &mut folders).await {
                            Ok(()) => {
                                manifest.files.insert(file.key.clone(), file.digest.clone());
                                synced += 1;
                            }
                            Err(e) => {
                                warn!(file = %file.key, error = %e, "Upload failed");
                                failures.push(format!("{}: {e:#}", file.key));
                            }
                        }
                    }
                }
                Err(e) => failures.push(format!(
                    "remote folder {}: {e:#}",
                    request.drive_folder
                )),
            }
        }

        save_manifest(&manifest_path, &manifest).await?;

        if !failures.is_empty() {
            return Err(anyhow!(
                "{} item(s) failed, {synced} uploaded: {}",
                failures.len(),
                failures.join("; ")
            ));
        }

        info!(synced, skipped, "Sync engine run complete");
        Ok(SyncReport {
            files_synced: synced,
            files_skipped: skipped,
        })
    }
}

async fn upload(
    engine: &StagingSyncEngine,
    access_token: &str,
    root_id: &str,
    file: &StagedFile,
    folders: &mut HashMap<String, String>,
) -> Result<()> {
    let parent = engine
        .ensure_parent(access_token, root_id, &file.key, folders)
        .await?;
    let name = file.key.rsplit('/').next().unwrap_or(&file.key);
    let data = tokio::fs::read(&file.staged)
        .await
        .with_context(|| format!("Failed to read {}", file.staged.display()))?;
    debug!(file = %file.key, bytes = data.len(), "Uploading");
    engine
        .drive
        .upload_file(access_token, &parent, name, data)
        .await?;
    Ok(())
}

// ============================================================================
// Staging (blocking)
// ============================================================================

fn stage(paths: &[TrackedPath], staging_dir: &Path) -> Result<Staging> {
    let tracked_root = staging_dir.join(TRACKED_DIR);
    std::fs::create_dir_all(&tracked_root)
        .with_context(|| format!("Failed to create {}", tracked_root.display()))?;

    let mut staging = Staging::default();
    let mut seen = HashSet::new();

    for entry in paths {
        let name = entry.name();
        if !seen.insert(name.clone()) {
            staging.failures.push(format!(
                "{}: another tracked entry is already staged as '{name}'",
                entry.path().display()
            ));
            continue;
        }

        let mut sources = Vec::new();
        let collected = match entry.kind() {
            PathKind::File => {
                if entry.path().is_file() {
                    sources.push((entry.path().to_path_buf(), name));
                    Ok(())
                } else {
                    Err(io::Error::new(io::ErrorKind::NotFound, "file no longer exists"))
                }
            }
            PathKind::Directory => collect_dir(entry.path(), &name, &mut sources),
        };
        if let Err(e) = collected {
            staging
                .failures
                .push(format!("{}: {e}", entry.path().display()));
            continue;
        }

        for (source, key) in sources {
            let staged = tracked_root.join(&key);
            match copy_and_digest(&source, &staged) {
                Ok(digest) => staging.files.push(StagedFile {
                    key,
                    staged,
                    digest,
                }),
                Err(e) => staging
                    .failures
                    .push(format!("{}: {e}", source.display())),
            }
        }
    }

    debug!(
        files = staging.files.len(),
        failures = staging.failures.len(),
        "Staging complete"
    );
    Ok(staging)
}

/// Recursively lists regular files under `dir`, sorted, skipping symlinks
fn collect_dir(dir: &Path, prefix: &str, out: &mut Vec<(PathBuf, String)>) -> io::Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let file_type = entry.file_type()?;
        let key = format!("{prefix}/{}", entry.file_name().to_string_lossy());
        if file_type.is_dir() {
            collect_dir(&entry.path(), &key, out)?;
        } else if file_type.is_file() {
            out.push((entry.path(), key));
        } else {
            debug!(path = %entry.path().display(), "Skipping non-regular file");
        }
    }
    Ok(())
}

fn copy_and_digest(source: &Path, staged: &Path) -> io::Result<String> {
    if let Some(parent) = staged.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // A read-only copy from a previous run would make the copy fail.
    if staged.exists() {
        std::fs::remove_file(staged)?;
    }
    std::fs::copy(source, staged)?;

    let mut hasher = Sha256::new();
    let mut file = std::fs::File::open(staged)?;
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// Manifest
// ============================================================================

async fn load_manifest(path: &Path, drive_folder: &str) -> Manifest {
    let manifest = match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice::<Manifest>(&bytes).unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring unreadable sync manifest");
            Manifest::default()
        }),
        Err(_) => Manifest::default(),
    };

    if manifest.drive_folder != drive_folder {
        debug!("Remote folder changed, every file will be uploaded");
        return Manifest {
            drive_folder: drive_folder.to_string(),
            files: BTreeMap::new(),
        };
    }
    manifest
}

async fn save_manifest(path: &Path, manifest: &Manifest) -> Result<()> {
    let json = serde_json::to_vec_pretty(manifest).context("Failed to serialize sync manifest")?;
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomic(&path, &json))
        .await
        .context("Manifest write task panicked")?
        .context("Failed to write sync manifest")
}
