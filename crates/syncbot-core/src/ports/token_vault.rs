//! Token vault port (driven/secondary port)
//!
//! Secret storage for the OAuth token, separate from plain settings so the
//! token can live in the OS credential store. Calls block; async callers
//! run them on a blocking thread.

use crate::domain::Token;

/// Secret store holding at most one token
pub trait ITokenVault: Send + Sync {
    /// Returns the stored token, or `None` if nothing was stored
    fn load(&self) -> anyhow::Result<Option<Token>>;

    /// Replaces the stored token
    fn store(&self, token: &Token) -> anyhow::Result<()>;
}
