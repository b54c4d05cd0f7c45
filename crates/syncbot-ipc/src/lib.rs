//! SyncBot IPC - Command boundary and D-Bus service
//!
//! Provides:
//! - [`CommandService`], the single surface used by every client
//! - Wiring of the store, Google adapters and the sync orchestrator
//! - A D-Bus interface exposing the commands to the CLI and the desktop
//!
//! ## Modules
//!
//! - [`commands`] - Command operations and their errors
//! - [`bootstrap`] - Application assembly
//! - [`service`] - zbus interface and status signals

pub mod bootstrap;
pub mod commands;
pub mod service;

pub use bootstrap::{assemble, bootstrap, Adapters, App, AppPaths, RunMode};
pub use commands::{CommandError, CommandService, ConfigField, ConfigView};
pub use service::{DbusService, DBUS_INTERFACE, DBUS_NAME, DBUS_PATH};
