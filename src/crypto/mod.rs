//! Cryptographic primitives for keysafe.
//!
//! This module provides:
//! - PBKDF2-HMAC-SHA256 passphrase key derivation (`kdf`)
//! - AES-256-GCM, version-tagged value envelopes (`envelope`)

pub mod envelope;
pub mod kdf;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{encrypt, decrypt, derive_key, ...};
pub use envelope::{decrypt, encrypt, is_envelope, migrate_legacy, ENVELOPE_PREFIX};
pub use kdf::{derive_key, derive_key_with_params, generate_salt, DerivedKey, KdfParams};
