//! The unlocked-vault session.
//!
//! `VaultSession` is the only place key material lives.  It moves
//! between two states:
//!
//! ```text
//! Locked --unlock--> Unlocked --lock--> Locked
//! ```
//!
//! While unlocked it holds the passphrase in a zeroizing buffer.  Keys
//! are derived per envelope (each envelope has its own salt) and wiped
//! right after use.  Nothing in here is `Serialize`: a session can never
//! end up in a snapshot or on the wire.

use std::sync::RwLock;

use zeroize::Zeroizing;

use crate::crypto::envelope;
use crate::crypto::kdf::KdfParams;
use crate::errors::{KeysafeError, Result};

pub struct VaultSession {
    params: KdfParams,
    phrase: RwLock<Option<Zeroizing<Vec<u8>>>>,
}

impl VaultSession {
    /// Create a locked session.
    pub fn new(params: KdfParams) -> Self {
        Self {
            params,
            phrase: RwLock::new(None),
        }
    }

    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    /// Move to `Unlocked`, replacing any previous phrase.
    pub fn unlock(&self, phrase: &[u8]) {
        let mut guard = self.phrase.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(Zeroizing::new(phrase.to_vec()));
    }

    /// Move to `Locked`.  The phrase buffer is zeroized as it drops.
    /// Calling this on a locked session is a no-op.
    pub fn lock(&self) {
        let mut guard = self.phrase.write().unwrap_or_else(|e| e.into_inner());
        guard.take();
    }

    pub fn is_unlocked(&self) -> bool {
        self.phrase
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Fail with `Locked` unless the session is unlocked.
    pub fn ensure_unlocked(&self) -> Result<()> {
        if self.is_unlocked() {
            Ok(())
        } else {
            Err(KeysafeError::Locked)
        }
    }

    /// Encrypt a plaintext value into a fresh envelope.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        self.with_phrase(|phrase| envelope::encrypt(plaintext, phrase, &self.params))
    }

    /// Decrypt an envelope with the session's phrase.
    pub fn decrypt(&self, value: &str) -> Result<Zeroizing<String>> {
        self.with_phrase(|phrase| envelope::decrypt(value, phrase, &self.params))
    }

    /// Encrypt `value` if it is legacy plaintext; `None` if already sealed.
    pub fn migrate(&self, value: &str) -> Result<Option<String>> {
        self.with_phrase(|phrase| envelope::migrate_legacy(value, phrase, &self.params))
    }

    fn with_phrase<T>(&self, f: impl FnOnce(&[u8]) -> Result<T>) -> Result<T> {
        let guard = self.phrase.read().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(phrase) => f(phrase),
            None => Err(KeysafeError::Locked),
        }
    }
}

impl std::fmt::Debug for VaultSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSession")
            .field("unlocked", &self.is_unlocked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_session_refuses_crypto() {
        let session = VaultSession::new(KdfParams::default());
        assert!(!session.is_unlocked());
        assert!(matches!(session.encrypt("x"), Err(KeysafeError::Locked)));
        assert!(matches!(session.decrypt("ks1:AAAA"), Err(KeysafeError::Locked)));
        assert!(matches!(session.ensure_unlocked(), Err(KeysafeError::Locked)));
    }

    #[test]
    fn unlock_then_lock_round_trip() {
        let session = VaultSession::new(KdfParams::default());
        session.unlock(b"correct horse");
        let sealed = session.encrypt("battery staple").unwrap();
        assert_eq!(session.decrypt(&sealed).unwrap().as_str(), "battery staple");

        session.lock();
        session.lock();
        assert!(!session.is_unlocked());
        assert!(matches!(session.decrypt(&sealed), Err(KeysafeError::Locked)));
    }

    #[test]
    fn debug_hides_phrase() {
        let session = VaultSession::new(KdfParams::default());
        session.unlock(b"super secret phrase");
        let dbg = format!("{session:?}");
        assert!(!dbg.contains("super secret"));
        assert!(dbg.contains("unlocked: true"));
    }
}
