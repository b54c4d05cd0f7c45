//! CLI subcommands
//!
//! Each subcommand opens a [`Backend`], runs one or more operations on it
//! and closes it again.

pub mod auth;
pub mod config;
pub mod paths;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use syncbot_ipc::AppPaths;

use crate::backend::Backend;
use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Global options shared by every subcommand
pub struct CliContext {
    pub format: OutputFormat,
    pub paths: AppPaths,
}

impl CliContext {
    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.format)
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    pub async fn backend(&self) -> Result<Backend> {
        Backend::open(&self.paths)
            .await
            .context("Failed to initialise SyncBot")
    }
}

/// Resolves `path` against the current directory
pub fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Failed to read the current directory")?;
    Ok(cwd.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_keeps_absolute_paths() {
        assert_eq!(
            absolute(Path::new("/srv/data")).unwrap(),
            PathBuf::from("/srv/data")
        );
    }

    #[test]
    fn test_absolute_joins_relative_paths() {
        let resolved = absolute(Path::new("notes.txt")).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("notes.txt"));
    }
}
