use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crypto::kdf::{KdfParams, MIN_ITERATIONS};
use crate::errors::{KeysafeError, Result};

/// Project-level configuration, loaded from `.keysafe.toml`.
///
/// Every field has a sensible default so keysafe works out-of-the-box
/// (offline) without any config file at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory (relative to project root) holding the snapshot and audit log.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Identity that owns the vault's rows on the remote.
    #[serde(default = "default_owner")]
    pub owner: String,

    /// Base URL of the remote row store.  `None` means offline only.
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Table holding vault rows on the remote.
    #[serde(default = "default_remote_table")]
    pub remote_table: String,

    /// PBKDF2 iteration count (default: 100 000, also the minimum).
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_data_dir() -> String {
    ".keysafe".to_string()
}

fn default_owner() -> String {
    "local".to_string()
}

fn default_remote_table() -> String {
    "vault_items".to_string()
}

fn default_kdf_iterations() -> u32 {
    MIN_ITERATIONS
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            owner: default_owner(),
            remote_url: None,
            remote_table: default_remote_table(),
            kdf_iterations: default_kdf_iterations(),
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the project root.
    const FILE_NAME: &'static str = ".keysafe.toml";

    /// Name of the snapshot file inside `data_dir`.
    const SNAPSHOT_FILE: &'static str = "vault.snapshot";

    /// Load settings from `<project_dir>/.keysafe.toml`.
    ///
    /// If the file does not exist, defaults are returned.  If it exists
    /// but cannot be parsed or holds invalid values, an error is returned.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            KeysafeError::ConfigError(format!("Failed to parse {}: {e}", config_path.display()))
        })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that would weaken the vault or break remote filters.
    pub fn validate(&self) -> Result<()> {
        if self.kdf_iterations < MIN_ITERATIONS {
            return Err(KeysafeError::ConfigError(format!(
                "kdf_iterations must be at least {MIN_ITERATIONS} (got {})",
                self.kdf_iterations
            )));
        }
        validate_identifier("owner", &self.owner)?;
        validate_identifier("remote_table", &self.remote_table)?;
        Ok(())
    }

    /// Full path of the snapshot file.
    ///
    /// Example: `project_dir/.keysafe/vault.snapshot`
    pub fn snapshot_path(&self, project_dir: &Path) -> PathBuf {
        self.data_dir(project_dir).join(Self::SNAPSHOT_FILE)
    }

    pub fn data_dir(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.data_dir)
    }

    /// Convert the KDF settings into crypto-layer params.
    pub fn kdf_params(&self) -> KdfParams {
        KdfParams {
            iterations: self.kdf_iterations,
        }
    }
}

/// Allowed: ASCII letters, digits, `_`, `-`, `.`, `@`.  Non-empty, at
/// most 128 characters.  These values end up in remote query strings.
fn validate_identifier(field: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.len() > 128 {
        return Err(KeysafeError::ConfigError(format!(
            "{field} must be between 1 and 128 characters"
        )));
    }
    if !value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b'@'))
    {
        return Err(KeysafeError::ConfigError(format!(
            "{field} '{value}' contains invalid characters — only ASCII letters, digits, '_', '-', '.', and '@' are allowed"
        )));
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────
