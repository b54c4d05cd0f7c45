//! Auth commands - Sign in to Google Drive
//!
//! Provides the `syncbot auth` CLI subcommands:
//! 1. `login`  - Opens the consent page and captures the redirect on the
//!    loopback listener, falling back to a pasted code when it cannot start
//! 2. `code`   - Exchanges a code copied from the browser
//! 3. `url`    - Prints the consent URL
//! 4. `status` - Shows whether a usable token is stored
//! 5. `cancel` - Abandons a login left waiting for a code

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Subcommand;
use syncbot_core::domain::LoginOutcome;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use super::CliContext;
use crate::backend::Backend;
use crate::output::OutputFormatter;

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Authenticate with Google Drive via OAuth2
    Login {
        /// Skip the loopback listener and paste the code instead
        #[arg(long)]
        manual: bool,
        /// Seconds to wait for the browser redirect
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,
    },
    /// Exchange an authorization code copied from the browser
    Code {
        /// The code, or the whole redirect URL
        code: String,
    },
    /// Print the authorization URL
    Url,
    /// Show authentication status
    Status,
    /// Abandon a pending login
    Cancel,
}

impl AuthCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let fmt = ctx.formatter();
        let backend = ctx.backend().await?;
        let result = match self {
            AuthCommand::Login { manual, timeout } => {
                login(&backend, *manual, timeout.map(Duration::from_secs), &*fmt).await
            }
            AuthCommand::Code { code } => exchange(&backend, code, &*fmt).await,
            AuthCommand::Url => show_url(&backend, &*fmt).await,
            AuthCommand::Status => show_status(&backend, &*fmt).await,
            AuthCommand::Cancel => cancel(&backend, &*fmt).await,
        };
        backend.close().await;
        result
    }
}

async fn login(
    backend: &Backend,
    manual: bool,
    timeout: Option<Duration>,
    fmt: &dyn OutputFormatter,
) -> Result<()> {
    if manual {
        let url = backend.begin_auth().await?;
        return manual_entry(backend, &url, fmt).await;
    }

    // Shown up front in case the browser does not open
    let url = backend.auth_url().await?;
    fmt.info("Opening browser for Google sign-in...");
    fmt.info(&format!("If it does not open, visit: {url}"));
    info!(daemon = backend.is_daemon(), "Starting interactive login");

    match backend.login(timeout).await? {
        LoginOutcome::Authenticated => {
            fmt.success("Authenticated with Google Drive");
            fmt.print_json(&serde_json::json!({"authenticated": true}));
            Ok(())
        }
        LoginOutcome::RequiresManualEntry { reason } => {
            fmt.warn(&format!("Automatic capture unavailable ({reason})"));
            manual_entry(backend, &url, fmt).await
        }
    }
}

async fn manual_entry(backend: &Backend, url: &str, fmt: &dyn OutputFormatter) -> Result<()> {
    fmt.info("Open this URL, approve access, then paste the code or the redirect URL:");
    fmt.info(url);
    eprint!("Code: ");
    let line = tokio::select! {
        line = read_line() => line,
        _ = tokio::signal::ctrl_c() => Err(anyhow::anyhow!("Login interrupted")),
    };
    match line {
        Ok(line) if !line.trim().is_empty() => exchange(backend, &line, fmt).await,
        Ok(_) => {
            backend.cancel_pending_auth().await?;
            anyhow::bail!("No authorization code entered")
        }
        Err(e) => {
            backend.cancel_pending_auth().await?;
            Err(e)
        }
    }
}

async fn cancel(backend: &Backend, fmt: &dyn OutputFormatter) -> Result<()> {
    let state = backend.cancel_pending_auth().await?;
    fmt.print_json(&serde_json::json!({"state": state}));
    fmt.success(&format!("No login pending ({state})"));
    Ok(())
}

async fn exchange(backend: &Backend, input: &str, fmt: &dyn OutputFormatter) -> Result<()> {
    let code = extract_code(input);
    backend.handle_code(&code).await?;
    fmt.success("Authenticated with Google Drive");
    fmt.print_json(&serde_json::json!({"authenticated": true}));
    Ok(())
}

async fn show_url(backend: &Backend, fmt: &dyn OutputFormatter) -> Result<()> {
    let url = backend.auth_url().await?;
    fmt.print_json(&serde_json::json!({"url": url}));
    fmt.info(&url);
    Ok(())
}

async fn show_status(backend: &Backend, fmt: &dyn OutputFormatter) -> Result<()> {
    let state = backend.auth_state().await?;
    fmt.print_json(&serde_json::json!({
        "state": state,
        "authenticated": state.is_authenticated(),
    }));
    if state.is_authenticated() {
        fmt.success("Authenticated");
    } else {
        fmt.warn(&format!("Not authenticated ({state}); run 'syncbot auth login'"));
    }
    Ok(())
}

async fn read_line() -> Result<String> {
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read the authorization code")?;
    Ok(line)
}

/// Accepts a bare code or a pasted redirect URL carrying `code=`
fn extract_code(input: &str) -> String {
    let trimmed = input.trim();
    url::Url::parse(trimmed)
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == "code")
                .map(|(_, value)| value.into_owned())
        })
        .unwrap_or_else(|| trimmed.to_string())
}
