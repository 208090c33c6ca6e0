//! AES-256-GCM envelopes for single secret values.
//!
//! An envelope is self-contained: it carries the salt needed to
//! re-derive the key from the passphrase, so decrypting one requires
//! nothing but the envelope and the passphrase.
//!
//! External representation:
//!
//! ```text
//! ks1:<base64( 16-byte salt | 12-byte nonce | ciphertext + 16-byte tag )>
//! ```
//!
//! The `ks1:` prefix names the format version.  Every call to `encrypt`
//! draws a fresh salt and nonce, so the same plaintext never produces
//! the same envelope twice.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use zeroize::{Zeroize, Zeroizing};

use super::kdf::{derive_key_with_params, generate_salt, KdfParams, SALT_LEN};
use crate::errors::{KeysafeError, Result};

/// Format tag prepended to every envelope.
pub const ENVELOPE_PREFIX: &str = "ks1:";

/// Size of the AES-256-GCM nonce in bytes.
const NONCE_LEN: usize = 12;

/// Size of the GCM authentication tag in bytes.
const TAG_LEN: usize = 16;

/// Smallest decoded envelope: salt + nonce + tag of an empty plaintext.
const MIN_DECODED_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN;

/// Encrypt `plaintext` under a key derived from `phrase`.
pub fn encrypt(plaintext: &str, phrase: &[u8], params: &KdfParams) -> Result<String> {
    let salt = generate_salt();
    let key = derive_key_with_params(phrase, &salt, params)?;

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| KeysafeError::EncryptionFailed(format!("invalid key length: {e}")))?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| KeysafeError::EncryptionFailed(format!("encryption error: {e}")))?;

    let mut packed = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    packed.extend_from_slice(&salt);
    packed.extend_from_slice(&nonce);
    packed.extend_from_slice(&ciphertext);

    Ok(format!("{ENVELOPE_PREFIX}{}", BASE64.encode(&packed)))
}

/// Decrypt an envelope produced by `encrypt`.
///
/// Every failure (unknown format, bad encoding, truncated data, wrong
/// passphrase, tampered bytes) collapses into `DecryptionFailed`.
pub fn decrypt(envelope: &str, phrase: &[u8], params: &KdfParams) -> Result<Zeroizing<String>> {
    let packed = decode(envelope).ok_or(KeysafeError::DecryptionFailed)?;

    let (salt, rest) = packed.split_at(SALT_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

    let key = derive_key_with_params(phrase, salt, params)?;
    let cipher =
        Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| KeysafeError::DecryptionFailed)?;

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| KeysafeError::DecryptionFailed)?;

    String::from_utf8(plaintext).map(Zeroizing::new).map_err(|e| {
        let mut bad_bytes = e.into_bytes();
        bad_bytes.zeroize();
        KeysafeError::DecryptionFailed
    })
}

/// Returns `true` if `value` looks like a keysafe envelope.
///
/// Checks the `ks1:` tag, the base64 body and the minimum length.  This
/// only separates legacy plaintext from encrypted values during
/// migration and is not a security boundary: a plaintext that starts
/// with `ks1:` followed by enough valid base64 is misclassified as
/// encrypted.  Such a value then fails to decrypt; it is never
/// returned as if it were plaintext.
pub fn is_envelope(value: &str) -> bool {
    decode(value).is_some()
}

/// Encrypt `value` if it is still legacy plaintext.
///
/// Returns `None` when the value is already an envelope.
pub fn migrate_legacy(value: &str, phrase: &[u8], params: &KdfParams) -> Result<Option<String>> {
    if is_envelope(value) {
        return Ok(None);
    }
    encrypt(value, phrase, params).map(Some)
}

fn decode(envelope: &str) -> Option<Vec<u8>> {
    let body = envelope.strip_prefix(ENVELOPE_PREFIX)?;
    let packed = BASE64.decode(body).ok()?;
    (packed.len() >= MIN_DECODED_LEN).then_some(packed)
}
