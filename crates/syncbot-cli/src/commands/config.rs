//! Config command - View and manage SyncBot configuration
//!
//! Provides the `syncbot config` CLI command which:
//! 1. Shows the effective configuration (the client secret is never shown)
//! 2. Sets one value by key, rejecting invalid values without saving
//! 3. Validates the stored configuration and reports every problem

use anyhow::{Context, Result};
use clap::Subcommand;
use syncbot_ipc::{ConfigField, ConfigView};
use tracing::info;

use super::CliContext;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Setting key (e.g. "interval_minutes", "auto_sync", "drive_folder")
        key: String,
        /// New value; an empty staging_dir restores the default
        value: String,
    },
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let fmt = ctx.formatter();
        let backend = ctx.backend().await?;

        let result = async {
            match self {
                ConfigCommand::Show => {
                    let view = backend.config().await?;
                    fmt.print_json(&serde_json::to_value(&view)?);
                    fmt.success(&format!(
                        "Configuration ({})",
                        ctx.paths.config_path.display()
                    ));
                    for line in render(&view)?.lines() {
                        fmt.info(line);
                    }
                }
                ConfigCommand::Set { key, value } => {
                    let field: ConfigField = key.parse()?;
                    info!(key = field.key(), "Setting configuration value");
                    let view = backend.set_config(key, value).await?;
                    fmt.print_json(&serde_json::json!({
                        "success": true,
                        "key": field.key(),
                        "config": view,
                    }));
                    fmt.success(&format!("Set {}", field.key()));
                }
                ConfigCommand::Validate => {
                    let problems = backend.validate_config().await?;
                    fmt.print_json(&serde_json::json!({
                        "valid": problems.is_empty(),
                        "errors": problems,
                    }));
                    if problems.is_empty() {
                        fmt.success("Configuration is valid");
                    } else {
                        for problem in &problems {
                            fmt.error(problem);
                        }
                        anyhow::bail!("{} configuration error(s)", problems.len());
                    }
                }
            }
            Ok::<(), anyhow::Error>(())
        }
        .await;

        backend.close().await;
        result
    }
}

fn render(view: &ConfigView) -> Result<String> {
    serde_yaml::to_string(view).context("Failed to render configuration")
}
