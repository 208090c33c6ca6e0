//! Passphrase-based key derivation using PBKDF2-HMAC-SHA256.
//!
//! Every envelope carries its own random salt, so a key is derived per
//! envelope and dropped (zeroized) right after use.  The iteration count
//! is configurable via `KdfParams` but can never go below
//! `MIN_ITERATIONS`: an environment that asks for less gets an error,
//! not a weaker key.

use hmac::Hmac;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::{KeysafeError, Result};

/// Length of the salt in bytes (128 bits).
pub const SALT_LEN: usize = 16;

/// Length of the derived key in bytes (256 bits, for AES-256).
pub const KEY_LEN: usize = 32;

/// Lowest PBKDF2 iteration count we accept.
pub const MIN_ITERATIONS: u32 = 100_000;

/// Tunable PBKDF2 parameters.
///
/// Maps to `kdf_iterations` in `.keysafe.toml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Number of PBKDF2 rounds (default: 100 000).
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: MIN_ITERATIONS,
        }
    }
}

/// A 32-byte symmetric key that wipes itself when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; KEY_LEN],
}

impl DerivedKey {
    /// Access the raw key bytes (e.g. to build an AEAD cipher).
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey(..)")
    }
}

/// Derive a key from `phrase` and `salt` with the default parameters.
pub fn derive_key(phrase: &[u8], salt: &[u8]) -> Result<DerivedKey> {
    derive_key_with_params(phrase, salt, &KdfParams::default())
}

/// Derive a key with explicit parameters.
///
/// The same phrase + salt + params always produce the same key.
pub fn derive_key_with_params(phrase: &[u8], salt: &[u8], params: &KdfParams) -> Result<DerivedKey> {
    if params.iterations < MIN_ITERATIONS {
        return Err(KeysafeError::KeyDerivationFailed(format!(
            "PBKDF2 iterations must be at least {MIN_ITERATIONS} (got {})",
            params.iterations
        )));
    }
    if salt.len() < SALT_LEN {
        return Err(KeysafeError::KeyDerivationFailed(format!(
            "salt must be at least {SALT_LEN} bytes (got {})",
            salt.len()
        )));
    }

    let mut key = DerivedKey {
        bytes: [0u8; KEY_LEN],
    };
    pbkdf2::pbkdf2::<Hmac<Sha256>>(phrase, salt, params.iterations, &mut key.bytes)
        .map_err(|e| KeysafeError::KeyDerivationFailed(format!("PBKDF2 failed: {e}")))?;

    Ok(key)
}

/// Generate a cryptographically random salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    salt
}
