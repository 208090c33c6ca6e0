//! Integration tests for the reconciliation engine.
//!
//! Every test runs against `MemoryRemote` and `MemoryStore`, shared via
//! `Arc` so the test can inspect both sides while the engine owns them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use keysafe::crypto::{is_envelope, KdfParams};
use keysafe::errors::KeysafeError;
use keysafe::remote::{MemoryRemote, RemoteRow};
use keysafe::sync::VaultEngine;
use keysafe::vault::snapshot::encode_snapshot;
use keysafe::vault::{
    ItemPatch, LocalStore, MemoryStore, NewItem, Snapshot, Strength, VaultItem,
};
use zeroize::Zeroizing;

const PHRASE: &[u8] = b"correct horse battery staple";
const OWNER: &str = "alice";

type TestEngine = VaultEngine<Arc<MemoryRemote>, Arc<MemoryStore>>;

fn engine(remote: &Arc<MemoryRemote>, store: &Arc<MemoryStore>) -> TestEngine {
    VaultEngine::new(
        Arc::clone(remote),
        Arc::clone(store),
        OWNER,
        KdfParams::default(),
    )
    .unwrap()
}

fn fresh() -> (Arc<MemoryRemote>, Arc<MemoryStore>) {
    (Arc::new(MemoryRemote::new()), Arc::new(MemoryStore::new()))
}

fn ids(engine: &TestEngine) -> Vec<String> {
    engine.items().unwrap().into_iter().map(|i| i.id).collect()
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn operations_require_unlock() {
    let (remote, store) = fresh();
    let vault = engine(&remote, &store);

    assert!(!vault.is_unlocked());
    assert!(matches!(vault.items(), Err(KeysafeError::Locked)));
    assert!(matches!(vault.sync().await, Err(KeysafeError::Locked)));
    assert!(matches!(
        vault.add_item(NewItem::new("GitHub", "pw")),
        Err(KeysafeError::Locked)
    ));
    assert!(matches!(vault.remove_item("x"), Err(KeysafeError::Locked)));
    assert!(matches!(vault.pending_deletes(), Err(KeysafeError::Locked)));
}

#[tokio::test]
async fn lock_clears_session() {
    let (remote, store) = fresh();
    let vault = engine(&remote, &store);

    vault.unlock(PHRASE).await.unwrap();
    let item = vault.add_item(NewItem::new("GitHub", "pw")).unwrap();
    vault.settle().await;

    vault.lock();
    assert!(!vault.is_unlocked());
    assert!(!vault.session().is_unlocked());
    assert!(matches!(
        vault.decrypt_for_display(&item.id),
        Err(KeysafeError::Locked)
    ));
    assert!(matches!(vault.items(), Err(KeysafeError::Locked)));

    // Locking twice is harmless.
    vault.lock();

    // The snapshot survives and unlocks again.
    vault.unlock(PHRASE).await.unwrap();
    assert_eq!(vault.decrypt_for_display(&item.id).unwrap().as_str(), "pw");
}

#[tokio::test]
async fn wrong_phrase_is_rejected_on_unlock() {
    let (remote, store) = fresh();
    {
        let vault = engine(&remote, &store);
        vault.unlock(PHRASE).await.unwrap();
        vault.add_item(NewItem::new("GitHub", "pw")).unwrap();
        vault.settle().await;
    }

    let vault = engine(&remote, &store);
    let err = vault.unlock(b"not the phrase").await.unwrap_err();
    assert!(matches!(err, KeysafeError::DecryptionFailed));
    assert!(!vault.is_unlocked());

    vault.unlock(PHRASE).await.unwrap();
    assert_eq!(vault.items().unwrap().len(), 1);
}

#[tokio::test]
async fn snapshot_of_another_owner_is_refused() {
    let (remote, store) = fresh();
    {
        let bob = VaultEngine::new(
            Arc::clone(&remote),
            Arc::clone(&store),
            "bob",
            KdfParams::default(),
        )
        .unwrap();
        bob.unlock(PHRASE).await.unwrap();
    }

    let vault = engine(&remote, &store);
    assert!(matches!(
        vault.unlock(PHRASE).await,
        Err(KeysafeError::InvalidSnapshot(_))
    ));
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_encrypts_before_anything_leaves_memory() {
    let (remote, store) = fresh();
    let vault = engine(&remote, &store);
    vault.unlock(PHRASE).await.unwrap();

    let item = vault
        .add_item(
            NewItem::new("  GitHub  ", "hunter2")
                .with_username("alice")
                .with_strength(Strength::Weak),
        )
        .unwrap();
    vault.settle().await;

    assert_eq!(item.label, "GitHub");
    assert!(is_envelope(&item.value));
    assert_eq!(vault.decrypt_for_display(&item.id).unwrap().as_str(), "hunter2");

    let rows = remote.rows_for(OWNER);
    assert_eq!(rows.len(), 1);
    assert!(is_envelope(&rows[0].value));

    let bytes = encode_snapshot(&store.current().unwrap()).unwrap();
    let haystack = String::from_utf8_lossy(&bytes);
    assert!(!haystack.contains("hunter2"));
    assert!(!haystack.contains("correct horse"));
}

#[tokio::test]
async fn newest_item_comes_first() {
    let (remote, store) = fresh();
    let vault = engine(&remote, &store);
    vault.unlock(PHRASE).await.unwrap();

    let first = vault.add_item(NewItem::new("first", "1")).unwrap();
    let second = vault.add_item(NewItem::new("second", "2")).unwrap();
    assert_eq!(ids(&vault), vec![second.id.clone(), first.id.clone()]);

    vault.settle().await;
    vault.sync().await.unwrap();
    assert_eq!(ids(&vault), vec![second.id, first.id]);
}

#[tokio::test]
async fn invalid_input_leaves_state_unchanged() {
    let (remote, store) = fresh();
    let vault = engine(&remote, &store);
    vault.unlock(PHRASE).await.unwrap();
    let item = vault.add_item(NewItem::new("GitHub", "pw")).unwrap();

    assert!(matches!(
        vault.add_item(NewItem::new("   ", "pw")),
        Err(KeysafeError::Validation(_))
    ));
    assert!(matches!(
        vault.add_item(NewItem::new("Empty", "")),
        Err(KeysafeError::Validation(_))
    ));
    let patch = ItemPatch {
        label: Some(String::new()),
        ..ItemPatch::default()
    };
    assert!(matches!(
        vault.update_item(&item.id, patch),
        Err(KeysafeError::Validation(_))
    ));

    assert_eq!(vault.items().unwrap(), vec![item]);
}

#[tokio::test]
async fn update_reencrypts_only_changed_values() {
    let (remote, store) = fresh();
    let vault = engine(&remote, &store);
    vault.unlock(PHRASE).await.unwrap();
    let item = vault.add_item(NewItem::new("GitHub", "pw")).unwrap();

    let relabelled = vault
        .update_item(
            &item.id,
            ItemPatch {
                label: Some("GitHub (work)".into()),
                username: Some(Some("alice".into())),
                ..ItemPatch::default()
            },
        )
        .unwrap();
    assert_eq!(relabelled.value, item.value);
    assert_eq!(relabelled.username.as_deref(), Some("alice"));

    let same_value = vault
        .update_item(
            &item.id,
            ItemPatch {
                value: Some(Zeroizing::new("pw".into())),
                ..ItemPatch::default()
            },
        )
        .unwrap();
    assert_eq!(same_value.value, item.value);

    let new_value = vault
        .update_item(
            &item.id,
            ItemPatch {
                value: Some(Zeroizing::new("pw2".into())),
                ..ItemPatch::default()
            },
        )
        .unwrap();
    assert_ne!(new_value.value, item.value);
    assert_eq!(vault.decrypt_for_display(&item.id).unwrap().as_str(), "pw2");

    vault.settle().await;
    let row = &remote.rows_for(OWNER)[0];
    assert_eq!(row.label, "GitHub (work)");
    assert_eq!(row.value, new_value.value);
}

#[tokio::test]
async fn unknown_ids_are_reported() {
    let (remote, store) = fresh();
    let vault = engine(&remote, &store);
    vault.unlock(PHRASE).await.unwrap();

    assert!(matches!(
        vault.remove_item("missing"),
        Err(KeysafeError::ItemNotFound(_))
    ));
    assert!(matches!(
        vault.update_item("missing", ItemPatch::default()),
        Err(KeysafeError::ItemNotFound(_))
    ));
    assert!(matches!(
        vault.decrypt_for_display("missing"),
        Err(KeysafeError::ItemNotFound(_))
    ));
    assert!(vault.pending_deletes().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Sync protocol
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deleted_item_is_not_resurrected_while_delete_is_pending() {
    let (remote, store) = fresh();
    let vault = engine(&remote, &store);
    vault.unlock(PHRASE).await.unwrap();

    let item = vault.add_item(NewItem::new("GitHub", "pw")).unwrap();
    vault.settle().await;
    assert!(remote.contains(&item.id));

    remote.set_fail_deletes(true);
    vault.remove_item(&item.id).unwrap();
    vault.settle().await;
    assert_eq!(vault.pending_deletes().unwrap(), vec![item.id.clone()]);

    // The remote still lists the row; the pull must not bring it back.
    let report = vault.sync().await.unwrap();
    assert!(report.pull_succeeded);
    assert_eq!(report.deletes_pending, 1);
    assert!(vault.items().unwrap().is_empty());
    assert!(remote.contains(&item.id));

    // The queue is durable across lock/unlock.
    vault.lock();
    vault.unlock(PHRASE).await.unwrap();
    assert!(vault.items().unwrap().is_empty());
    assert_eq!(vault.pending_deletes().unwrap(), vec![item.id.clone()]);

    remote.set_fail_deletes(false);
    let report = vault.sync().await.unwrap();
    assert_eq!(report.deletes_confirmed, 1);
    assert!(vault.pending_deletes().unwrap().is_empty());
    assert!(!remote.contains(&item.id));
}

#[tokio::test]
async fn confirmed_background_delete_leaves_the_queue() {
    let (remote, store) = fresh();
    let vault = engine(&remote, &store);
    vault.unlock(PHRASE).await.unwrap();

    let item = vault.add_item(NewItem::new("GitHub", "pw")).unwrap();
    vault.settle().await;
    vault.remove_item(&item.id).unwrap();
    vault.settle().await;

    assert!(vault.pending_deletes().unwrap().is_empty());
    assert!(!remote.contains(&item.id));
    assert!(store.current().unwrap().pending_deletes.is_empty());
}

#[tokio::test]
async fn sync_is_idempotent() {
    let (remote, store) = fresh();
    let vault = engine(&remote, &store);
    vault.unlock(PHRASE).await.unwrap();
    vault.add_item(NewItem::new("one", "1")).unwrap();
    vault.add_item(NewItem::new("two", "2")).unwrap();
    vault.settle().await;

    let first = vault.sync().await.unwrap();
    let items_after_first = vault.items().unwrap();
    let rows_after_first = remote.rows_for(OWNER);

    let second = vault.sync().await.unwrap();
    assert_eq!(vault.items().unwrap(), items_after_first);
    assert_eq!(remote.rows_for(OWNER), rows_after_first);
    assert_eq!(first, second);
    assert!(second.is_clean());
}

#[tokio::test]
async fn offline_writes_are_kept_and_pushed_later() {
    let (remote, store) = fresh();
    remote.set_offline(true);
    let vault = engine(&remote, &store);

    let report = vault.unlock(PHRASE).await.unwrap();
    assert!(!report.pull_succeeded);

    let item = vault.add_item(NewItem::new("GitHub", "pw")).unwrap();
    vault.settle().await;
    assert!(remote.rows_for(OWNER).is_empty());

    let report = vault.sync().await.unwrap();
    assert_eq!(report.push_failed, 1);
    assert_eq!(ids(&vault), vec![item.id.clone()]);

    remote.set_offline(false);
    let report = vault.sync().await.unwrap();
    assert_eq!(report.pushed, 1);
    assert!(report.is_clean());
    assert!(remote.contains(&item.id));
    assert_eq!(ids(&vault), vec![item.id]);
}

#[tokio::test]
async fn pull_adopts_rows_written_by_another_client() {
    let (remote, store) = fresh();
    let vault = engine(&remote, &store);
    vault.unlock(PHRASE).await.unwrap();

    let other = vault.session().encrypt("from laptop").unwrap();
    let now = Utc::now();
    remote.seed(RemoteRow {
        id: "seeded".into(),
        owner_id: OWNER.into(),
        label: "Laptop".into(),
        username: None,
        value: other,
        strength: None,
        created_at: now,
        updated_at: now,
    });

    let report = vault.sync().await.unwrap();
    assert_eq!(report.pulled, 1);
    assert_eq!(
        vault.decrypt_for_display("seeded").unwrap().as_str(),
        "from laptop"
    );
}

#[tokio::test]
async fn other_owners_rows_never_appear() {
    let (remote, store) = fresh();
    let now = Utc::now();
    remote.seed(RemoteRow {
        id: "bobs".into(),
        owner_id: "bob".into(),
        label: "Bob's bank".into(),
        username: None,
        value: "ks1:opaque".into(),
        strength: None,
        created_at: now,
        updated_at: now,
    });

    let vault = engine(&remote, &store);
    vault.unlock(PHRASE).await.unwrap();
    assert!(vault.items().unwrap().is_empty());
    assert!(remote.contains("bobs"));
}

#[tokio::test]
async fn legacy_plaintext_is_sealed_on_sync() {
    let (remote, store) = fresh();
    let now = Utc::now();
    let mut legacy = Snapshot::empty(OWNER);
    legacy.items.push(VaultItem {
        id: "legacy".into(),
        label: "Old mail".into(),
        username: None,
        value: "hunter2".into(),
        created_at: now,
        updated_at: now,
        strength: None,
    });
    store.save(&legacy).unwrap();

    let vault = engine(&remote, &store);
    let report = vault.unlock(PHRASE).await.unwrap();
    assert_eq!(report.migrated, 1);
    assert_eq!(report.pushed, 1);

    let item = vault.item("legacy").unwrap();
    assert!(is_envelope(&item.value));
    assert_eq!(vault.decrypt_for_display("legacy").unwrap().as_str(), "hunter2");
    assert!(is_envelope(&remote.rows_for(OWNER)[0].value));

    let saved = store.current().unwrap();
    assert!(saved.items.iter().all(|i| is_envelope(&i.value)));
}

#[tokio::test]
async fn concurrent_syncs_drain_each_delete_once() {
    let remote = Arc::new(MemoryRemote::new().with_latency(Duration::from_millis(20)));
    let store = Arc::new(MemoryStore::new());
    let vault = engine(&remote, &store);
    vault.unlock(PHRASE).await.unwrap();

    let item = vault.add_item(NewItem::new("GitHub", "pw")).unwrap();
    vault.settle().await;
    remote.set_fail_deletes(true);
    vault.remove_item(&item.id).unwrap();
    vault.settle().await;
    remote.set_fail_deletes(false);

    let before = remote.delete_calls();
    let (a, b) = tokio::join!(vault.sync(), vault.sync());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(remote.delete_calls() - before, 1);
    assert_eq!(a.deletes_confirmed + b.deletes_confirmed, 1);
    assert!(vault.pending_deletes().unwrap().is_empty());
    assert!(!remote.contains(&item.id));
}

#[tokio::test]
async fn delete_confirmed_during_stale_pull_stays_deleted() {
    let remote = Arc::new(MemoryRemote::new().with_list_delay(Duration::from_millis(300)));
    let store = Arc::new(MemoryStore::new());
    let vault = engine(&remote, &store);
    vault.unlock(PHRASE).await.unwrap();

    let item = vault.add_item(NewItem::new("GitHub", "pw")).unwrap();
    vault.settle().await;
    assert!(remote.contains(&item.id));

    // The pass reads the remote listing, then the delete lands and is
    // confirmed before that listing comes back.
    let (report, ()) = tokio::join!(vault.sync(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        vault.remove_item(&item.id).unwrap();
        vault.settle().await;
    });
    assert!(report.unwrap().pull_succeeded);

    assert!(vault.items().unwrap().is_empty());
    assert!(vault.pending_deletes().unwrap().is_empty());
    assert!(!remote.contains(&item.id));

    // The next pass has nothing to push back.
    vault.sync().await.unwrap();
    assert!(vault.items().unwrap().is_empty());
    assert!(!remote.contains(&item.id));
    assert!(store.current().unwrap().items.is_empty());
}
