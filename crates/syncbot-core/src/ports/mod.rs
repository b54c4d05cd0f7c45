//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IConfigStore`] - Durable settings, tracked paths and token
//! - [`ITokenVault`] - Secret storage backing the token half of a store
//! - [`IOAuthProvider`] - Authorization URL, code exchange, token refresh
//! - [`IBrowserLauncher`] - Opening URLs in the user's browser
//! - [`IRedirectListener`] - Capturing the provider redirect on loopback
//! - [`IRemoteDrive`] - Remote folder and file operations
//! - [`ISyncEngine`] - Performing a sync run

pub mod config_store;
pub mod oauth;
pub mod remote_drive;
pub mod sync_engine;
pub mod token_vault;

pub use config_store::IConfigStore;
pub use oauth::{IBrowserLauncher, IOAuthProvider, IRedirectListener, ListenError};
pub use remote_drive::IRemoteDrive;
pub use sync_engine::{ISyncEngine, SyncRequest};
pub use token_vault::ITokenVault;
