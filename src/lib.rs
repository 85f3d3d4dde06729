//! Workspace root crate.
//!
//! Re-exports the `core-service` façade so host applications can depend on
//! `dam-sync-workspace` alone and reach the engine bootstrap, service API and
//! event types without wiring each crate individually.

pub use core_service::*;
