use thiserror::Error;

/// All errors that can occur in keysafe.
#[derive(Debug, Error)]
pub enum KeysafeError {
    // --- Session errors ---
    #[error("Vault is locked — unlock it with your passphrase first")]
    Locked,

    // --- Crypto errors ---
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed — wrong passphrase or corrupted data")]
    DecryptionFailed,

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    // --- Item errors ---
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Item '{0}' not found")]
    ItemNotFound(String),

    // --- Remote errors ---
    #[error("Remote sync failed: {0}")]
    Sync(String),

    // --- Snapshot errors ---
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    ConfigError(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // --- CLI errors ---
    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("User cancelled operation")]
    UserCancelled,

    #[error("Audit error: {0}")]
    AuditError(String),
}

impl KeysafeError {
    /// Remote failures are always retried on the next sync pass.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Sync(_))
    }
}

/// Convenience type alias for keysafe results.
pub type Result<T> = std::result::Result<T, KeysafeError>;
