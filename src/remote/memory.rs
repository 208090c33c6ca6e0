//! In-process remote store.
//!
//! Behaves like the real service's row-level security: every call is
//! filtered by owner.  Failure switches and optional latency let tests
//! drive the engine through outages and interleavings.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{RemoteRow, RemoteStore};
use crate::errors::{KeysafeError, Result};

#[derive(Debug, Default)]
pub struct MemoryRemote {
    rows: Mutex<BTreeMap<String, RemoteRow>>,
    offline: AtomicBool,
    fail_deletes: AtomicBool,
    delete_calls: AtomicUsize,
    upsert_calls: AtomicUsize,
    latency: Option<Duration>,
    list_delay: Option<Duration>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every call, so concurrent callers interleave.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Sleep this long in `list` after the rows are read, so the returned
    /// view can be stale by the time the caller sees it.
    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = Some(delay);
        self
    }

    /// Make every call fail until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make only deletes fail until switched back.
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Number of delete calls that reached the store (including failed ones).
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Number of upsert calls that reached the store (including failed ones).
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// Write a row directly, as another client of the same owner would.
    pub fn seed(&self, row: RemoteRow) {
        self.rows().insert(row.id.clone(), row);
    }

    /// Rows owned by `owner`, bypassing the failure switches.
    pub fn rows_for(&self, owner: &str) -> Vec<RemoteRow> {
        self.rows()
            .values()
            .filter(|r| r.owner_id == owner)
            .cloned()
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rows().contains_key(id)
    }

    fn rows(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, RemoteRow>> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn round_trip(&self) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(KeysafeError::Sync("remote store unreachable".into()));
        }
        Ok(())
    }

    fn check_owner(owner: &str, row: &RemoteRow) -> Result<()> {
        if row.owner_id != owner {
            return Err(KeysafeError::Sync(format!(
                "permission denied: row '{}' does not belong to the caller",
                row.id
            )));
        }
        Ok(())
    }
}

impl RemoteStore for MemoryRemote {
    async fn insert(&self, owner: &str, row: RemoteRow) -> Result<()> {
        self.round_trip().await?;
        Self::check_owner(owner, &row)?;

        let mut rows = self.rows();
        if rows.contains_key(&row.id) {
            return Err(KeysafeError::Sync(format!(
                "duplicate key: row '{}' already exists",
                row.id
            )));
        }
        rows.insert(row.id.clone(), row);
        Ok(())
    }

    async fn upsert(&self, owner: &str, row: RemoteRow) -> Result<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await?;
        Self::check_owner(owner, &row)?;

        let mut rows = self.rows();
        if let Some(existing) = rows.get(&row.id) {
            Self::check_owner(owner, existing)?;
        }
        rows.insert(row.id.clone(), row);
        Ok(())
    }

    async fn delete(&self, owner: &str, id: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(KeysafeError::Sync(format!("delete of '{id}' rejected")));
        }

        let mut rows = self.rows();
        // A foreign row is invisible: the delete matches nothing.
        if rows.get(id).is_some_and(|r| r.owner_id == owner) {
            rows.remove(id);
        }
        Ok(())
    }

    async fn list(&self, owner: &str) -> Result<Vec<RemoteRow>> {
        self.round_trip().await?;
        let rows = self.rows_for(owner);
        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(rows)
    }
}
