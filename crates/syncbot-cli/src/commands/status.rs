//! Status command - Show sync and authentication state
//!
//! Combines the orchestrator status, the auth state, the schedule and the
//! number of tracked paths into one report.

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use clap::Args;
use syncbot_core::domain::{AuthState, SyncOutcome, SyncStatus};
use syncbot_ipc::ConfigView;

use super::CliContext;

#[derive(Debug, Args)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let fmt = ctx.formatter();
        let backend = ctx.backend().await?;
        let loaded = async {
            Ok::<_, anyhow::Error>((
                backend.sync_status().await?,
                backend.auth_state().await?,
                backend.config().await?,
                backend.tracked_paths().await?.len(),
                backend.archive_count().await?,
            ))
        }
        .await;
        let daemon = backend.is_daemon();
        backend.close().await;
        let (status, auth, config, tracked, archives) = loaded?;

        fmt.print_json(&serde_json::json!({
            "daemon_running": daemon,
            "auth": auth,
            "status": status,
            "auto_sync": config.auto_sync,
            "interval_minutes": config.interval_minutes,
            "tracked_paths": tracked,
            "archives": archives,
        }));

        fmt.success("SyncBot status");
        for (label, value) in status_lines(&status, auth, &config, tracked, archives, daemon) {
            fmt.field(label, &value);
        }
        Ok(())
    }
}

fn format_time(time: Option<DateTime<Utc>>) -> Option<String> {
    time.map(|t| {
        t.with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    })
}

/// Labelled lines of the human report
fn status_lines(
    status: &SyncStatus,
    auth: AuthState,
    config: &ConfigView,
    tracked: usize,
    archives: usize,
    daemon: bool,
) -> Vec<(&'static str, String)> {
    let last_sync = match (format_time(status.last_sync), status.last_trigger) {
        (Some(at), Some(trigger)) => format!("{at} ({trigger})"),
        (Some(at), None) => at,
        (None, _) => "never".to_string(),
    };
    let result = match &status.last_result {
        Some(SyncOutcome::Synced { files_synced }) => format!("{files_synced} file(s) synced"),
        Some(SyncOutcome::Failed { error }) => format!("failed: {error}"),
        None => "-".to_string(),
    };
    let next_sync = if !config.auto_sync {
        "auto-sync off".to_string()
    } else {
        format_time(status.next_sync).unwrap_or_else(|| {
            format!("every {} min while syncbotd runs", config.interval_minutes)
        })
    };

    vec![
        ("Daemon", if daemon { "running" } else { "not running" }.to_string()),
        ("Auth", auth.to_string()),
        ("State", status.state.to_string()),
        ("Last sync", last_sync),
        ("Result", result),
        ("Next sync", next_sync),
        ("Drive folder", config.drive_folder.clone()),
        ("Tracked", format!("{tracked} path(s)")),
        ("Archives", format!("{archives} kept")),
    ]
}
