//! SyncBot Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `AuthState`, `Token`, `TrackedPath`, `SyncStatus`
//! - **Use cases** - `AuthController`, `TrackedPathSet`
//! - **Port definitions** - Traits for adapters: `IConfigStore`, `IOAuthProvider`,
//!   `IRedirectListener`, `IRemoteDrive`, `ISyncEngine`
//! - **Configuration** - YAML config model and the file-backed store
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement.
//! Use cases orchestrate domain entities through port interfaces.

pub mod config;
pub mod domain;
pub mod ports;
pub mod store;
pub mod usecases;
