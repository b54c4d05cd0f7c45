//! Paths commands - Manage the tracked path set

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use syncbot_core::{domain::PathKind, usecases::AddOutcome};

use super::{absolute, CliContext};

#[derive(Debug, Subcommand)]
pub enum PathsCommand {
    /// List tracked files and directories
    List,
    /// Start tracking a file or directory
    Add {
        path: PathBuf,
        /// `file` or `directory`; detected when omitted
        #[arg(long)]
        kind: Option<String>,
    },
    /// Stop tracking a path
    Remove { path: PathBuf },
}

impl PathsCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let fmt = ctx.formatter();
        let backend = ctx.backend().await?;

        let result = async {
            match self {
                PathsCommand::List => {
                    let paths = backend.tracked_paths().await?;
                    fmt.print_json(&serde_json::to_value(&paths)?);
                    if paths.is_empty() {
                        fmt.info("No tracked paths. Add one with 'syncbot paths add <PATH>'");
                    }
                    for entry in &paths {
                        fmt.info(&format!("{:<9} {}", entry.kind().as_str(), entry.path().display()));
                    }
                }
                PathsCommand::Add { path, kind } => {
                    let kind = kind
                        .as_deref()
                        .map(str::parse::<PathKind>)
                        .transpose()
                        .context("Invalid --kind")?;
                    let path = absolute(path)?;
                    let outcome = backend.add_path(&path, kind).await?;
                    fmt.print_json(&serde_json::json!({
                        "path": path,
                        "outcome": outcome,
                    }));
                    match outcome {
                        AddOutcome::Added => fmt.success(&format!("Tracking {}", path.display())),
                        AddOutcome::AlreadyTracked => {
                            fmt.info(&format!("{} is already tracked", path.display()))
                        }
                    }
                }
                PathsCommand::Remove { path } => {
                    let path = absolute(path)?;
                    backend.remove_path(&path).await?;
                    fmt.print_json(&serde_json::json!({"path": path, "removed": true}));
                    fmt.success(&format!("No longer tracking {}", path.display()));
                }
            }
            Ok::<(), anyhow::Error>(())
        }
        .await;

        backend.close().await;
        result
    }
}
