//! A remote that is never reachable.
//!
//! Used when no `remote_url` is configured: every mutation still lands
//! locally, deletes queue up, and the next run with a real remote
//! reconciles them.

use super::{RemoteRow, RemoteStore};
use crate::errors::{KeysafeError, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineRemote;

impl OfflineRemote {
    fn unreachable<T>() -> Result<T> {
        Err(KeysafeError::Sync("no remote configured (offline mode)".into()))
    }
}

impl RemoteStore for OfflineRemote {
    async fn insert(&self, _owner: &str, _row: RemoteRow) -> Result<()> {
        Self::unreachable()
    }

    async fn upsert(&self, _owner: &str, _row: RemoteRow) -> Result<()> {
        Self::unreachable()
    }

    async fn delete(&self, _owner: &str, _id: &str) -> Result<()> {
        Self::unreachable()
    }

    async fn list(&self, _owner: &str) -> Result<Vec<RemoteRow>> {
        Self::unreachable()
    }
}
