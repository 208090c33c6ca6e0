//! Offline-first reconciliation engine.
//!
//! `VaultEngine` owns the local item collection and the pending-delete
//! queue.  Mutations apply locally and persist first, then fire the
//! matching remote call in the background; a remote failure is logged
//! and never rolls the local change back.
//!
//! A sync pass runs in fixed order:
//!
//! 0. **Seal** any legacy plaintext value still in the collection.
//! 1. **Drain** the pending-delete queue (confirmed ids leave the queue).
//! 2. **Push** every local item that is not queued for deletion.
//! 3. **Pull** the owner's remote rows, drop queued ids, and adopt the
//!    result as the local collection.
//!
//! The pull filter is what keeps a deleted item from coming back when
//! the remote still lists it.  It covers ids still queued and ids whose
//! delete was confirmed while the pass ran, since a listing read before
//! that confirmation can still hold the row.  Passes are serialized by
//! `sync_gate`, so two triggers can never drain the same id or push the
//! same item concurrently.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::report::SyncReport;
use crate::crypto::envelope;
use crate::crypto::kdf::KdfParams;
use crate::errors::{KeysafeError, Result};
use crate::remote::{RemoteRow, RemoteStore};
use crate::vault::{ItemPatch, LocalStore, NewItem, Snapshot, VaultItem, VaultSession};

/// Plaintext sealed into the snapshot verifier.
const VERIFIER_MARKER: &str = "keysafe-verifier-v1";

/// In-memory view of the vault.  Only meaningful while `loaded`.
#[derive(Default)]
struct LocalState {
    loaded: bool,
    items: Vec<VaultItem>,
    pending: BTreeSet<String>,
    verifier: Option<String>,
    /// Set while a sync pass holds the gate.
    pass_active: bool,
    /// Deletes confirmed since the running pass started.
    confirmed_during_pass: BTreeSet<String>,
}

impl LocalState {
    /// Whether a pulled row with this id must be dropped.
    fn is_deleted(&self, id: &str) -> bool {
        self.pending.contains(id) || self.confirmed_during_pass.contains(id)
    }

    fn record_confirmed(&mut self, id: &str) {
        self.pending.remove(id);
        if self.pass_active {
            self.confirmed_during_pass.insert(id.to_string());
        }
    }
}

struct Inner<R, L> {
    remote: R,
    local: L,
    owner: String,
    session: VaultSession,
    state: Mutex<LocalState>,
    persist_lock: Mutex<()>,
    sync_gate: tokio::sync::Mutex<()>,
}

/// The vault service: session, local collection, and sync protocol.
pub struct VaultEngine<R: RemoteStore, L: LocalStore> {
    inner: Arc<Inner<R, L>>,
    tasks: Mutex<JoinSet<()>>,
    runtime: Handle,
}

impl<R: RemoteStore, L: LocalStore> VaultEngine<R, L> {
    /// Build a locked engine.
    ///
    /// Must be called from inside a tokio runtime: background remote
    /// calls are spawned onto it.
    pub fn new(remote: R, local: L, owner: &str, params: KdfParams) -> Result<Self> {
        if owner.trim().is_empty() {
            return Err(KeysafeError::Validation("owner identity cannot be empty".into()));
        }
        let runtime = Handle::try_current().map_err(|e| {
            KeysafeError::CommandFailed(format!("vault engine needs a tokio runtime: {e}"))
        })?;

        Ok(Self {
            inner: Arc::new(Inner {
                remote,
                local,
                owner: owner.to_string(),
                session: VaultSession::new(params),
                state: Mutex::new(LocalState::default()),
                persist_lock: Mutex::new(()),
                sync_gate: tokio::sync::Mutex::new(()),
            }),
            tasks: Mutex::new(JoinSet::new()),
            runtime,
        })
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Unlock with `phrase`, load the local snapshot, then run a sync pass.
    ///
    /// A wrong phrase fails with `DecryptionFailed` and leaves the vault
    /// locked.  Remote failures during the initial sync do not fail the
    /// unlock; they are reported in the returned `SyncReport`.
    pub async fn unlock(&self, phrase: &[u8]) -> Result<SyncReport> {
        let inner = &self.inner;
        let snapshot = inner
            .local
            .load()?
            .unwrap_or_else(|| Snapshot::empty(&inner.owner));

        if snapshot.header.owner != inner.owner {
            return Err(KeysafeError::InvalidSnapshot(format!(
                "snapshot belongs to '{}', not '{}'",
                snapshot.header.owner, inner.owner
            )));
        }

        if let Some(verifier) = &snapshot.header.verifier {
            let marker = envelope::decrypt(verifier, phrase, inner.session.params())?;
            if marker.as_str() != VERIFIER_MARKER {
                return Err(KeysafeError::DecryptionFailed);
            }
        }

        {
            let mut state = inner.state();
            state.items = snapshot.items;
            state.pending = snapshot.pending_deletes.into_iter().collect();
            state.verifier = snapshot.header.verifier;
            state.loaded = true;
        }
        inner.session.unlock(phrase);

        if inner.state().verifier.is_none() {
            let verifier = inner.session.encrypt(VERIFIER_MARKER)?;
            inner.state().verifier = Some(verifier);
        }
        inner.persist()?;

        info!(owner = %inner.owner, "vault unlocked");
        self.sync().await
    }

    /// Drop the session and the in-memory collection.  Idempotent.
    ///
    /// The pending-delete queue stays durable in the snapshot.
    pub fn lock(&self) {
        self.inner.session.lock();
        let mut state = self.inner.state();
        if state.loaded {
            info!(owner = %self.inner.owner, "vault locked");
        }
        *state = LocalState::default();
    }

    pub fn is_unlocked(&self) -> bool {
        self.inner.session.is_unlocked()
    }

    /// The session handle, for callers that seal or open values directly.
    pub fn session(&self) -> &VaultSession {
        &self.inner.session
    }

    pub fn owner(&self) -> &str {
        &self.inner.owner
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Encrypt and insert a new item at the head of the collection.
    ///
    /// Returns once the item is stored locally; the remote insert runs in
    /// the background.
    pub fn add_item(&self, new: NewItem) -> Result<VaultItem> {
        let inner = &self.inner;
        inner.session.ensure_unlocked()?;
        new.validate()?;

        let value = inner.session.encrypt(&new.value)?;
        let now = Utc::now();
        let item = VaultItem {
            id: Uuid::new_v4().to_string(),
            label: new.label.trim().to_string(),
            username: new.username,
            value,
            created_at: now,
            updated_at: now,
            strength: new.strength,
        };

        inner.loaded_state()?.items.insert(0, item.clone());
        inner.persist()?;
        debug!(item = %item.id, "item added locally");

        let row = RemoteRow::from_item(&item, &inner.owner)?;
        let task_inner = Arc::clone(inner);
        let id = item.id.clone();
        self.spawn(async move {
            if let Err(e) = task_inner.remote.insert(&task_inner.owner, row).await {
                warn!(item = %id, error = %e, "remote insert failed; next sync will push it");
            }
        });

        Ok(item)
    }

    /// Apply `patch` to an existing item.
    ///
    /// A changed value is sealed into a fresh envelope; an unchanged one
    /// keeps its envelope.
    pub fn update_item(&self, id: &str, patch: ItemPatch) -> Result<VaultItem> {
        let inner = &self.inner;
        inner.session.ensure_unlocked()?;
        patch.validate()?;

        let current_value = inner
            .loaded_state()?
            .items
            .iter()
            .find(|i| i.id == id)
            .map(|i| i.value.clone())
            .ok_or_else(|| KeysafeError::ItemNotFound(id.to_string()))?;

        if patch.is_empty() {
            return inner.find_item(id);
        }

        // Crypto runs outside the state lock: PBKDF2 is slow.
        let new_value = match &patch.value {
            Some(plain) => {
                let unchanged = inner
                    .session
                    .decrypt(&current_value)
                    .map(|old| old.as_str() == plain.as_str())
                    .unwrap_or(false);
                if unchanged {
                    None
                } else {
                    Some(inner.session.encrypt(plain)?)
                }
            }
            None => None,
        };

        let updated = {
            let mut state = inner.loaded_state()?;
            let item = state
                .items
                .iter_mut()
                .find(|i| i.id == id)
                .ok_or_else(|| KeysafeError::ItemNotFound(id.to_string()))?;

            if let Some(label) = patch.label {
                item.label = label.trim().to_string();
            }
            if let Some(username) = patch.username {
                item.username = username;
            }
            if let Some(strength) = patch.strength {
                item.strength = strength;
            }
            if let Some(value) = new_value {
                item.value = value;
            }
            item.updated_at = Utc::now();
            item.clone()
        };
        inner.persist()?;
        debug!(item = %id, "item updated locally");

        let row = RemoteRow::from_item(&updated, &inner.owner)?;
        let task_inner = Arc::clone(inner);
        let task_id = id.to_string();
        self.spawn(async move {
            if let Err(e) = task_inner.remote.upsert(&task_inner.owner, row).await {
                warn!(item = %task_id, error = %e, "remote upsert failed; next sync will push it");
            }
        });

        Ok(updated)
    }

    /// Remove an item locally and queue its remote deletion.
    ///
    /// The id enters the pending-delete queue before any remote call and
    /// only leaves it once the remote confirms.
    pub fn remove_item(&self, id: &str) -> Result<()> {
        let inner = &self.inner;
        inner.session.ensure_unlocked()?;

        {
            let mut state = inner.loaded_state()?;
            let before = state.items.len();
            state.items.retain(|i| i.id != id);
            if state.items.len() == before {
                return Err(KeysafeError::ItemNotFound(id.to_string()));
            }
            state.pending.insert(id.to_string());
        }
        inner.persist()?;
        debug!(item = %id, "item removed locally, delete queued");

        let task_inner = Arc::clone(inner);
        let task_id = id.to_string();
        self.spawn(async move {
            match task_inner.remote.delete(&task_inner.owner, &task_id).await {
                Ok(()) => {
                    if let Err(e) = task_inner.confirm_delete(&task_id) {
                        warn!(item = %task_id, error = %e, "could not persist delete confirmation");
                    }
                }
                Err(e) => {
                    warn!(item = %task_id, error = %e, "remote delete failed; id stays queued");
                }
            }
        });

        Ok(())
    }

    // ------------------------------------------------------------------
    // Sync
    // ------------------------------------------------------------------

    /// Run one reconciliation pass.
    ///
    /// Only local errors (locked vault, snapshot I/O) are returned as
    /// `Err`; remote failures are logged and counted in the report.
    pub async fn sync(&self) -> Result<SyncReport> {
        let inner = &self.inner;
        inner.session.ensure_unlocked()?;
        let _gate = inner.sync_gate.lock().await;
        // The vault may have been locked while we waited for the gate.
        inner.session.ensure_unlocked()?;

        {
            let mut state = inner.loaded_state()?;
            state.pass_active = true;
            state.confirmed_during_pass.clear();
        }
        let result = self.run_pass().await;
        {
            let mut state = inner.state();
            state.pass_active = false;
            state.confirmed_during_pass.clear();
        }
        result
    }

    async fn run_pass(&self) -> Result<SyncReport> {
        let inner = &self.inner;
        let mut report = SyncReport {
            migrated: inner.migrate_legacy_values()?,
            ..SyncReport::default()
        };

        // Phase 1: drain pending deletes.
        let queued: Vec<String> = inner.loaded_state()?.pending.iter().cloned().collect();
        for id in queued {
            match inner.remote.delete(&inner.owner, &id).await {
                Ok(()) => {
                    inner.state().record_confirmed(&id);
                    report.deletes_confirmed += 1;
                }
                Err(e) => {
                    warn!(item = %id, error = %e, "pending delete not confirmed");
                }
            }
        }
        report.deletes_pending = inner.loaded_state()?.pending.len();

        // Phase 2: push local state.
        let outgoing: Vec<VaultItem> = {
            let state = inner.loaded_state()?;
            state
                .items
                .iter()
                .filter(|i| !state.pending.contains(&i.id))
                .cloned()
                .collect()
        };
        let mut pushed: HashMap<String, DateTime<Utc>> = HashMap::with_capacity(outgoing.len());
        for item in outgoing {
            // Removed while earlier pushes were in flight.
            let still_live = {
                let state = inner.loaded_state()?;
                !state.is_deleted(&item.id) && state.items.iter().any(|i| i.id == item.id)
            };
            if !still_live {
                debug!(item = %item.id, "skipping push of removed item");
                continue;
            }
            let result = match RemoteRow::from_item(&item, &inner.owner) {
                Ok(row) => inner.remote.upsert(&inner.owner, row).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {
                    pushed.insert(item.id, item.updated_at);
                    report.pushed += 1;
                }
                Err(e) => {
                    warn!(item = %item.id, error = %e, "push failed");
                    report.push_failed += 1;
                }
            }
        }

        // Phase 3: pull remote state.
        match inner.remote.list(&inner.owner).await {
            Ok(rows) => {
                let mut state = inner.loaded_state()?;
                let (view, retained) = merge_remote_view(&state, rows, &pushed);
                report.pulled = view.len() - retained;
                report.retained = retained;
                report.pull_succeeded = true;
                state.items = view;
            }
            Err(e) => {
                warn!(error = %e, "pull failed; keeping local collection");
            }
        }

        inner.persist()?;
        info!(owner = %inner.owner, %report, "sync pass finished");
        Ok(report)
    }

    /// Wait for every background remote call to finish.
    pub async fn settle(&self) {
        loop {
            let mut set = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
            if set.is_empty() {
                break;
            }
            while let Some(joined) = set.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "background remote task failed");
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Decrypt an item's secret value for presentation.
    pub fn decrypt_for_display(&self, id: &str) -> Result<Zeroizing<String>> {
        let inner = &self.inner;
        inner.session.ensure_unlocked()?;
        let value = inner.find_item(id)?.value;
        inner.session.decrypt(&value)
    }

    /// Snapshot of the local collection, newest first.
    pub fn items(&self) -> Result<Vec<VaultItem>> {
        self.inner.session.ensure_unlocked()?;
        Ok(self.inner.loaded_state()?.items.clone())
    }

    pub fn item(&self, id: &str) -> Result<VaultItem> {
        self.inner.session.ensure_unlocked()?;
        self.inner.find_item(id)
    }

    /// Ids queued for remote deletion, sorted.
    pub fn pending_deletes(&self) -> Result<Vec<String>> {
        self.inner.session.ensure_unlocked()?;
        Ok(self.inner.loaded_state()?.pending.iter().cloned().collect())
    }

    fn spawn(&self, task: impl std::future::Future<Output = ()> + Send + 'static) {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .spawn_on(task, &self.runtime);
    }
}

impl<R: RemoteStore, L: LocalStore> Drop for VaultEngine<R, L> {
    /// In-flight remote calls outlive the engine; only the key goes.
    fn drop(&mut self) {
        self.tasks
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .detach_all();
        self.inner.session.lock();
    }
}

impl<R: RemoteStore, L: LocalStore> Inner<R, L> {
    fn state(&self) -> MutexGuard<'_, LocalState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn loaded_state(&self) -> Result<MutexGuard<'_, LocalState>> {
        let state = self.state();
        if state.loaded {
            Ok(state)
        } else {
            Err(KeysafeError::Locked)
        }
    }

    fn find_item(&self, id: &str) -> Result<VaultItem> {
        self.loaded_state()?
            .items
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or_else(|| KeysafeError::ItemNotFound(id.to_string()))
    }

    /// Write the in-memory state to the local store.
    ///
    /// While locked the in-memory collection is empty and not
    /// authoritative, so nothing is written.
    fn persist(&self) -> Result<()> {
        let _write = self.persist_lock.lock().unwrap_or_else(|e| e.into_inner());
        let snapshot = {
            let state = self.state();
            if !state.loaded {
                return Ok(());
            }
            let mut snapshot = Snapshot::empty(&self.owner);
            snapshot.header.verifier = state.verifier.clone();
            snapshot.items = state.items.clone();
            snapshot.pending_deletes = state.pending.iter().cloned().collect();
            snapshot
        };
        self.local.save(&snapshot)
    }

    /// Drop `id` from the pending queue after the remote confirmed it.
    ///
    /// If the vault was locked in the meantime, the snapshot on disk is
    /// patched directly.
    fn confirm_delete(&self, id: &str) -> Result<()> {
        let loaded = {
            let mut state = self.state();
            state.record_confirmed(id);
            state.loaded
        };
        if loaded {
            return self.persist();
        }

        let _write = self.persist_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(mut snapshot) = self.local.load()? {
            snapshot.pending_deletes.retain(|p| p != id);
            snapshot.header.saved_at = Utc::now();
            self.local.save(&snapshot)?;
        }
        Ok(())
    }

    /// Seal any value that is still legacy plaintext.  Returns the count.
    fn migrate_legacy_values(&self) -> Result<usize> {
        let candidates: Vec<(String, String)> = self
            .loaded_state()?
            .items
            .iter()
            .filter(|i| !envelope::is_envelope(&i.value))
            .map(|i| (i.id.clone(), i.value.clone()))
            .collect();

        let mut migrated = 0;
        for (id, plain) in candidates {
            let Some(sealed) = self.session.migrate(&plain)? else {
                continue;
            };
            let mut state = self.loaded_state()?;
            if let Some(item) = state
                .items
                .iter_mut()
                .find(|i| i.id == id && i.value == plain)
            {
                item.value = sealed;
                migrated += 1;
            }
        }

        if migrated > 0 {
            info!(count = migrated, "sealed legacy plaintext values");
            self.persist()?;
        }
        Ok(migrated)
    }
}

/// Build the post-pull collection.
///
/// The remote view minus deleted ids (queued, or confirmed during this
/// pass) wins, except for local items
/// the remote can't have seen yet: ones whose push failed this pass and
/// ones added or edited while the pass was running.  Those stay local
/// and go out on the next pass.  Returns the view and how many local
/// items were retained.
fn merge_remote_view(
    state: &LocalState,
    rows: Vec<RemoteRow>,
    pushed: &HashMap<String, DateTime<Utc>>,
) -> (Vec<VaultItem>, usize) {
    let retained: Vec<VaultItem> = state
        .items
        .iter()
        .filter(|i| !state.pending.contains(&i.id))
        .filter(|i| pushed.get(&i.id) != Some(&i.updated_at))
        .cloned()
        .collect();
    let retained_ids: BTreeSet<&str> = retained.iter().map(|i| i.id.as_str()).collect();

    let mut view: Vec<VaultItem> = rows
        .into_iter()
        .filter(|r| !state.is_deleted(&r.id))
        .filter(|r| !retained_ids.contains(r.id.as_str()))
        .map(RemoteRow::into_item)
        .collect();
    let retained_count = retained.len();
    view.extend(retained);

    view.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    (view, retained_count)
}
