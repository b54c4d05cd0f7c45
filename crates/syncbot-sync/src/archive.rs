//! Version history of the staging tree
//!
//! Before each upload the staged `tracked/` tree is zipped into
//! `<data_dir>/archives/sync-YYYY-MM-DD_HH-MM-SS.zip` and only the newest
//! archives are kept. Names sort in creation order; archives created within
//! the same second get a `_NN` suffix.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Archives kept after pruning
pub const DEFAULT_KEEP: usize = 4;

const ARCHIVES_DIR: &str = "archives";
const PREFIX: &str = "sync-";
const EXTENSION: &str = "zip";

/// `<data_dir>/archives`
pub fn archives_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(ARCHIVES_DIR)
}

/// Timestamped zip archives of the staging tree, newest `keep` retained
#[derive(Debug, Clone)]
pub struct VersionHistory {
    dir: PathBuf,
    keep: usize,
}

impl VersionHistory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            keep: DEFAULT_KEEP,
        }
    }

    /// Keeps at least one archive
    pub fn with_keep(mut self, keep: usize) -> Self {
        self.keep = keep.max(1);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Zips `source` into a new archive, then prunes old ones
    ///
    /// Blocking; run it on a blocking thread.
    pub fn archive(&self, source: &Path) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let path = self.next_path();
        let file = fs::File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let mut zip = ZipWriter::new(file);
        if source.is_dir() {
            add_dir(&mut zip, source, "").context("Failed to add files to archive")?;
        }
        zip.finish().context("Failed to finalize archive")?;
        info!(archive = %path.display(), "Archived staging tree");

        let removed = self.prune()?;
        if removed > 0 {
            debug!(removed, "Pruned old archives");
        }
        Ok(path)
    }

    /// Number of archives currently kept
    pub fn count(&self) -> Result<usize> {
        Ok(self.list()?.len())
    }

    /// Deletes all but the newest `keep` archives, returning how many went
    pub fn prune(&self) -> Result<usize> {
        let archives = self.list()?;
        let excess = archives.len().saturating_sub(self.keep);
        for path in &archives[..excess] {
            fs::remove_file(path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        Ok(excess)
    }

    /// Archive paths, oldest first
    fn list(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.dir.display()))
            }
        };

        let mut archives = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_archive = path.extension().is_some_and(|ext| ext == EXTENSION)
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(PREFIX));
            if is_archive && path.is_file() {
                archives.push(path);
            }
        }
        archives.sort();
        Ok(archives)
    }

    fn next_path(&self) -> PathBuf {
        let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
        let base = self.dir.join(format!("{PREFIX}{stamp}.{EXTENSION}"));
        if !base.exists() {
            return base;
        }
        (1u32..)
            .map(|n| self.dir.join(format!("{PREFIX}{stamp}_{n:02}.{EXTENSION}")))
            .find(|candidate| !candidate.exists())
            .unwrap_or(base)
    }
}

fn file_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Adds the contents of `dir` under `prefix`, in sorted order
fn add_dir(zip: &mut ZipWriter<fs::File>, dir: &Path, prefix: &str) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = format!("{prefix}{}", entry.file_name().to_string_lossy());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            zip.add_directory(format!("{name}/"), file_options())?;
            add_dir(zip, &entry.path(), &format!("{name}/"))?;
        } else if file_type.is_file() {
            zip.start_file(name, file_options())?;
            let mut file = fs::File::open(entry.path())?;
            io::copy(&mut file, zip)?;
        }
    }
    Ok(())
}
