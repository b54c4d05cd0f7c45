//! Domain entities and business logic
//!
//! This module contains the core domain types for SyncBot:
//! - Authentication state, credentials and tokens
//! - Tracked paths and their kinds
//! - Sync status snapshots, triggers and outcomes
//! - Domain-specific error types

pub mod auth;
pub mod errors;
pub mod status;
pub mod tracked_path;

// Re-export commonly used types
pub use auth::{AuthState, AuthorizationCode, Credentials, InteractiveAuth, LoginOutcome, Token};
pub use errors::{AuthError, DomainError, PathSetError};
pub use status::{SyncOutcome, SyncReport, SyncState, SyncStatus, SyncTrigger};
pub use tracked_path::{normalize_path, PathKind, TrackedPath};
