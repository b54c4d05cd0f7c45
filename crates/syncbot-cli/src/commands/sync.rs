//! Sync command - Mirror tracked paths to Google Drive now
//!
//! Runs a manual sync on the daemon when it is running, in-process
//! otherwise, and reports how many files were uploaded.

use anyhow::Result;
use clap::Args;
use tracing::info;

use super::CliContext;

#[derive(Debug, Args)]
pub struct SyncCommand {}

impl SyncCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let fmt = ctx.formatter();
        let backend = ctx.backend().await?;
        info!(daemon = backend.is_daemon(), "Requesting manual sync");

        if !ctx.is_json() {
            let tracked = backend.tracked_paths().await?.len();
            fmt.info(&format!("Syncing {tracked} tracked path(s)..."));
        }
        let result = backend.sync_now().await;
        backend.close().await;

        let report = result?;
        fmt.print_json(&serde_json::json!({
            "files_synced": report.files_synced,
            "files_skipped": report.files_skipped,
        }));
        fmt.success(&format!(
            "Sync complete: {} uploaded, {} unchanged",
            report.files_synced, report.files_skipped
        ));
        Ok(())
    }
}
