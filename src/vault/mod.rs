//! Vault module — items, the unlocked session, and local persistence.
//!
//! This module provides:
//! - `VaultItem`, `NewItem`, `ItemPatch` and validation (`item`)
//! - The `VaultSession` lock/unlock state holder (`session`)
//! - Snapshot file format and `LocalStore` adapters (`snapshot`)

pub mod item;
pub mod session;
pub mod snapshot;

// Re-export the most commonly used items.
pub use item::{ItemPatch, NewItem, Strength, VaultItem};
pub use session::VaultSession;
pub use snapshot::{FileStore, LocalStore, MemoryStore, Snapshot, SnapshotHeader};
