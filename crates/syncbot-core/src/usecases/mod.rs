//! Use cases (interactors) for SyncBot
//!
//! This module contains the application use cases that orchestrate
//! domain entities and port interfaces.
//!
//! ## Use Cases
//!
//! - [`AuthController`] - OAuth2 state machine, code exchange, token refresh
//! - [`TrackedPathSet`] - Deduplicated, ordered set of paths to mirror

pub mod authenticate;
pub mod tracked_paths;

pub use authenticate::{ActiveSession, AuthController};
pub use tracked_paths::{AddOutcome, TrackedPathSet};
