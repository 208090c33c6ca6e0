//! Remote store abstraction.
//!
//! The backing service keeps one `RemoteRow` per secret.  Every call is
//! scoped to an owner identity and implementations must make rows owned
//! by anyone else invisible: they can't be listed, overwritten, or
//! deleted through another owner's calls.
//!
//! Adapters:
//! - `MemoryRemote`: in-process store with failure injection (`memory`)
//! - `OfflineRemote`: every call fails, for fully offline use (`offline`)
//! - `RestRemote`: PostgREST-style HTTP endpoint (`rest`, feature `rest-remote`)

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::is_envelope;
use crate::errors::{KeysafeError, Result};
use crate::vault::{Strength, VaultItem};

pub mod memory;
pub mod offline;
#[cfg(feature = "rest-remote")]
pub mod rest;

pub use memory::MemoryRemote;
pub use offline::OfflineRemote;
#[cfg(feature = "rest-remote")]
pub use rest::RestRemote;

/// One persisted secret as the remote store sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRow {
    pub id: String,
    pub owner_id: String,
    pub label: String,
    #[serde(default)]
    pub username: Option<String>,
    /// Always a `ks1:` envelope.
    pub value: String,
    #[serde(default)]
    pub strength: Option<Strength>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RemoteRow {
    /// Build the row for `item`, refusing anything that isn't sealed.
    pub fn from_item(item: &VaultItem, owner: &str) -> Result<Self> {
        if !is_envelope(&item.value) {
            return Err(KeysafeError::EncryptionFailed(format!(
                "refusing to transmit item '{}': value is not an envelope",
                item.id
            )));
        }
        Ok(Self {
            id: item.id.clone(),
            owner_id: owner.to_string(),
            label: item.label.clone(),
            username: item.username.clone(),
            value: item.value.clone(),
            strength: item.strength,
            created_at: item.created_at,
            updated_at: item.updated_at,
        })
    }

    pub fn into_item(self) -> VaultItem {
        VaultItem {
            id: self.id,
            label: self.label,
            username: self.username,
            value: self.value,
            created_at: self.created_at,
            updated_at: self.updated_at,
            strength: self.strength,
        }
    }
}

/// Owner-scoped CRUD against the backing service.
///
/// All failures are reported as `KeysafeError::Sync`; the engine treats
/// them as transient and retries on the next sync pass.
pub trait RemoteStore: Send + Sync + 'static {
    /// Insert a new row.  Fails if the id already exists.
    fn insert(&self, owner: &str, row: RemoteRow) -> impl Future<Output = Result<()>> + Send;

    /// Insert or replace a row owned by `owner`.
    fn upsert(&self, owner: &str, row: RemoteRow) -> impl Future<Output = Result<()>> + Send;

    /// Delete a row.  Deleting a missing row succeeds.
    fn delete(&self, owner: &str, id: &str) -> impl Future<Output = Result<()>> + Send;

    /// Every row owned by `owner`.
    fn list(&self, owner: &str) -> impl Future<Output = Result<Vec<RemoteRow>>> + Send;
}

/// Shared handles delegate, so a caller can keep inspecting a store the
/// engine owns.
impl<T: RemoteStore> RemoteStore for Arc<T> {
    fn insert(&self, owner: &str, row: RemoteRow) -> impl Future<Output = Result<()>> + Send {
        (**self).insert(owner, row)
    }

    fn upsert(&self, owner: &str, row: RemoteRow) -> impl Future<Output = Result<()>> + Send {
        (**self).upsert(owner, row)
    }

    fn delete(&self, owner: &str, id: &str) -> impl Future<Output = Result<()>> + Send {
        (**self).delete(owner, id)
    }

    fn list(&self, owner: &str) -> impl Future<Output = Result<Vec<RemoteRow>>> + Send {
        (**self).list(owner)
    }
}
