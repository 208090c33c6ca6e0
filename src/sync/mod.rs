//! Offline-first reconciliation between the local vault and a remote store.
//!
//! - `VaultEngine`: optimistic mutations, pending-delete queue, sync passes (`engine`)
//! - `SyncReport`: per-pass counters (`report`)

pub mod engine;
pub mod report;

pub use engine::VaultEngine;
pub use report::SyncReport;
