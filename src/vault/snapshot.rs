//! Durable local snapshot of the item collection and pending deletes.
//!
//! A `.snapshot` file has this layout:
//!
//! ```text
//! [KSNP: 4 bytes][version: 1 byte][header_len: 4 bytes LE][header JSON][body JSON][SHA-256: 32 bytes]
//! ```
//!
//! - **Magic** (`KSNP`): identifies the file as a keysafe snapshot.
//! - **Version**: format version (currently `1`).
//! - **Header JSON**: serialized `SnapshotHeader` (owner, verifier).
//! - **Body JSON**: items plus the pending-delete queue.
//! - **SHA-256**: checksum over header + body bytes.
//!
//! Every secret value inside is already a `ks1:` envelope and the
//! session is never part of it, so the file is safe on plain storage.
//! The checksum only catches corruption; authenticity comes from the
//! per-value AEAD tags and the verifier.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::item::VaultItem;
use crate::errors::{KeysafeError, Result};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic bytes at the start of every snapshot file.
const MAGIC: &[u8; 4] = b"KSNP";

/// Current binary format version.
pub const CURRENT_VERSION: u8 = 1;

/// Size of the checksum appended to the file.
const CHECKSUM_LEN: usize = 32;

/// Fixed-size prefix: 4 (magic) + 1 (version) + 4 (header_len).
const PREFIX_LEN: usize = 9;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Metadata stored at the beginning of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub version: u8,

    /// Identity that owns every item in this snapshot.
    pub owner: String,

    /// Envelope of a fixed marker; decrypting it proves the passphrase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifier: Option<String>,

    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct SnapshotBody {
    items: Vec<VaultItem>,
    #[serde(default)]
    pending_deletes: Vec<String>,
}

/// Everything the engine persists between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub header: SnapshotHeader,
    pub items: Vec<VaultItem>,
    pub pending_deletes: Vec<String>,
}

impl Snapshot {
    /// An empty snapshot for `owner` with no verifier yet.
    pub fn empty(owner: &str) -> Self {
        Self {
            header: SnapshotHeader {
                version: CURRENT_VERSION,
                owner: owner.to_string(),
                verifier: None,
                saved_at: Utc::now(),
            },
            items: Vec::new(),
            pending_deletes: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// LocalStore
// ---------------------------------------------------------------------------

/// Persistence adapter for snapshots.
///
/// `load` returns `Ok(None)` when nothing has been saved yet.
pub trait LocalStore: Send + Sync + 'static {
    fn load(&self) -> Result<Option<Snapshot>>;
    fn save(&self, snapshot: &Snapshot) -> Result<()>;
}

/// Snapshot stored in a single file, written atomically.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LocalStore for FileStore {
    fn load(&self) -> Result<Option<Snapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.path)?;
        decode_snapshot(&data).map(Some)
    }

    /// 1. Encode header and body, append the checksum.
    /// 2. Write to a temp file in the same directory.
    /// 3. Rename temp file over the target path.
    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let buf = encode_snapshot(snapshot)?;

        let parent = self.path.parent().unwrap_or(Path::new("."));
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = parent.join(format!(
            ".{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy()
        ));

        fs::write(&tmp_path, &buf)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

/// In-process snapshot holder, for tests and embedders that persist
/// elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<Snapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last saved snapshot, if any.
    pub fn current(&self) -> Option<Snapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl LocalStore for MemoryStore {
    fn load(&self) -> Result<Option<Snapshot>> {
        Ok(self.current())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        *self.snapshot.lock().unwrap_or_else(|e| e.into_inner()) = Some(snapshot.clone());
        Ok(())
    }
}

impl<T: LocalStore> LocalStore for Arc<T> {
    fn load(&self) -> Result<Option<Snapshot>> {
        (**self).load()
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        (**self).save(snapshot)
    }
}

// ---------------------------------------------------------------------------
// Binary encoding
// ---------------------------------------------------------------------------

/// Serialize a snapshot into the on-disk byte layout.
pub fn encode_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>> {
    let header_bytes = serde_json::to_vec(&snapshot.header)
        .map_err(|e| KeysafeError::SerializationError(format!("header: {e}")))?;
    let body = SnapshotBody {
        items: snapshot.items.clone(),
        pending_deletes: snapshot.pending_deletes.clone(),
    };
    let body_bytes = serde_json::to_vec(&body)
        .map_err(|e| KeysafeError::SerializationError(format!("body: {e}")))?;

    let header_len = u32::try_from(header_bytes.len()).map_err(|_| {
        KeysafeError::SerializationError(format!(
            "header length {} exceeds u32::MAX",
            header_bytes.len()
        ))
    })?;

    let checksum = checksum(&header_bytes, &body_bytes);

    let total = PREFIX_LEN + header_bytes.len() + body_bytes.len() + CHECKSUM_LEN;
    let mut buf = Vec::with_capacity(total);
    buf.extend_from_slice(MAGIC);
    buf.push(CURRENT_VERSION);
    buf.extend_from_slice(&header_len.to_le_bytes());
    buf.extend_from_slice(&header_bytes);
    buf.extend_from_slice(&body_bytes);
    buf.extend_from_slice(&checksum);
    Ok(buf)
}

/// Parse and verify a snapshot produced by `encode_snapshot`.
pub fn decode_snapshot(data: &[u8]) -> Result<Snapshot> {
    if data.len() < PREFIX_LEN + CHECKSUM_LEN {
        return Err(KeysafeError::InvalidSnapshot(
            "file too small to be a valid snapshot".into(),
        ));
    }

    if &data[0..4] != MAGIC {
        return Err(KeysafeError::InvalidSnapshot(
            "missing KSNP magic bytes".into(),
        ));
    }

    let version = data[4];
    if version != CURRENT_VERSION {
        return Err(KeysafeError::InvalidSnapshot(format!(
            "unsupported version {version}, expected {CURRENT_VERSION}"
        )));
    }

    let header_len_u32 = u32::from_le_bytes(
        data[5..9]
            .try_into()
            .map_err(|_| KeysafeError::InvalidSnapshot("bad header length".into()))?,
    );
    let header_len = usize::try_from(header_len_u32).map_err(|_| {
        KeysafeError::InvalidSnapshot(format!(
            "header length {header_len_u32} exceeds platform address space"
        ))
    })?;

    let header_end = PREFIX_LEN + header_len;
    if header_end + CHECKSUM_LEN > data.len() {
        return Err(KeysafeError::InvalidSnapshot(
            "header length exceeds file size".into(),
        ));
    }

    let header_bytes = &data[PREFIX_LEN..header_end];
    let body_end = data.len() - CHECKSUM_LEN;
    let body_bytes = &data[header_end..body_end];
    let stored = &data[body_end..];

    if checksum(header_bytes, body_bytes).as_slice() != stored {
        return Err(KeysafeError::InvalidSnapshot(
            "checksum mismatch — snapshot is corrupted".into(),
        ));
    }

    let header: SnapshotHeader = serde_json::from_slice(header_bytes)
        .map_err(|e| KeysafeError::InvalidSnapshot(format!("header JSON: {e}")))?;
    let body: SnapshotBody = serde_json::from_slice(body_bytes)
        .map_err(|e| KeysafeError::InvalidSnapshot(format!("body JSON: {e}")))?;

    Ok(Snapshot {
        header,
        items: body.items,
        pending_deletes: body.pending_deletes,
    })
}

fn checksum(header_bytes: &[u8], body_bytes: &[u8]) -> [u8; CHECKSUM_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(header_bytes);
    hasher.update(body_bytes);
    hasher.finalize().into()
}
