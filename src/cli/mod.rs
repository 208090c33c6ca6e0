//! CLI module — Clap argument parser, output helpers, and command implementations.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::Parser;
use zeroize::Zeroizing;

use crate::config::Settings;
use crate::errors::{KeysafeError, Result};
use crate::remote::{OfflineRemote, RemoteRow, RemoteStore};
use crate::sync::{SyncReport, VaultEngine};
use crate::vault::FileStore;

/// Minimum passphrase length when creating a new vault.
const MIN_PASSPHRASE_LEN: usize = 8;

/// The engine type every command works against.
pub type Engine = VaultEngine<ConfiguredRemote, FileStore>;

/// keysafe CLI: zero-knowledge credential vault with offline sync.
#[derive(Parser)]
#[command(
    name = "keysafe",
    about = "Zero-knowledge credential vault with offline-first sync",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Data directory (overrides `data_dir` from .keysafe.toml)
    #[arg(long, global = true)]
    pub data_dir: Option<String>,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Add a new item
    Add {
        /// Display label (e.g. "GitHub")
        label: String,
        /// Account username
        #[arg(short, long)]
        username: Option<String>,
        /// Secret value (omit for interactive prompt or piped stdin)
        #[arg(long)]
        value: Option<String>,
        /// Strength hint: weak, fair or strong
        #[arg(long)]
        strength: Option<String>,
    },

    /// Change an existing item
    Update {
        /// Item id
        id: String,
        /// New label
        #[arg(long)]
        label: Option<String>,
        /// New username
        #[arg(short, long, conflicts_with = "clear_username")]
        username: Option<String>,
        /// Remove the username
        #[arg(long)]
        clear_username: bool,
        /// New secret value
        #[arg(long)]
        value: Option<String>,
        /// New strength hint: weak, fair or strong
        #[arg(long)]
        strength: Option<String>,
    },

    /// Remove an item (queued for remote deletion until confirmed)
    Remove {
        /// Item id
        id: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// List all items
    List,

    /// Show an item with its decrypted value
    Show {
        /// Item id
        id: String,
    },

    /// Reconcile with the remote store
    Sync,

    /// List deletes not yet confirmed by the remote
    Pending,

    /// View the audit log of vault operations
    #[cfg(feature = "audit-log")]
    Audit {
        /// Number of entries to show (default: 50)
        #[arg(long, default_value = "50")]
        last: usize,
        /// Show entries since a duration ago (e.g. 7d, 24h, 30m)
        #[arg(long)]
        since: Option<String>,
        /// Only entries for this item id
        #[arg(long)]
        item: Option<String>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

// ---------------------------------------------------------------------------
// Remote selection
// ---------------------------------------------------------------------------

/// The remote chosen from settings: REST when configured, offline otherwise.
pub enum ConfiguredRemote {
    Offline(OfflineRemote),
    #[cfg(feature = "rest-remote")]
    Rest(crate::remote::RestRemote),
}

impl ConfiguredRemote {
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Offline(_))
    }
}

impl RemoteStore for ConfiguredRemote {
    async fn insert(&self, owner: &str, row: RemoteRow) -> Result<()> {
        match self {
            Self::Offline(r) => r.insert(owner, row).await,
            #[cfg(feature = "rest-remote")]
            Self::Rest(r) => r.insert(owner, row).await,
        }
    }

    async fn upsert(&self, owner: &str, row: RemoteRow) -> Result<()> {
        match self {
            Self::Offline(r) => r.upsert(owner, row).await,
            #[cfg(feature = "rest-remote")]
            Self::Rest(r) => r.upsert(owner, row).await,
        }
    }

    async fn delete(&self, owner: &str, id: &str) -> Result<()> {
        match self {
            Self::Offline(r) => r.delete(owner, id).await,
            #[cfg(feature = "rest-remote")]
            Self::Rest(r) => r.delete(owner, id).await,
        }
    }

    async fn list(&self, owner: &str) -> Result<Vec<RemoteRow>> {
        match self {
            Self::Offline(r) => r.list(owner).await,
            #[cfg(feature = "rest-remote")]
            Self::Rest(r) => r.list(owner).await,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

/// Resolved settings plus the project directory they apply to.
pub struct Context {
    pub project_dir: PathBuf,
    pub settings: Settings,
}

impl Context {
    /// Load `.keysafe.toml` from the current directory and apply CLI overrides.
    pub fn load(cli: &Cli) -> Result<Self> {
        let project_dir = std::env::current_dir()?;
        let mut settings = Settings::load(&project_dir)?;
        if let Some(dir) = &cli.data_dir {
            settings.data_dir = dir.clone();
        }
        Ok(Self {
            project_dir,
            settings,
        })
    }

    pub fn data_dir(&self) -> PathBuf {
        self.settings.data_dir(&self.project_dir)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.settings.snapshot_path(&self.project_dir)
    }

    /// Pick the remote adapter from settings.
    pub fn remote(&self) -> Result<ConfiguredRemote> {
        let Some(url) = &self.settings.remote_url else {
            return Ok(ConfiguredRemote::Offline(OfflineRemote));
        };

        #[cfg(feature = "rest-remote")]
        {
            let token = std::env::var("KEYSAFE_REMOTE_TOKEN").map_err(|_| {
                KeysafeError::ConfigError(
                    "remote_url is set but KEYSAFE_REMOTE_TOKEN is missing".into(),
                )
            })?;
            return Ok(ConfiguredRemote::Rest(crate::remote::RestRemote::new(
                url,
                &self.settings.remote_table,
                &token,
            )));
        }

        #[cfg(not(feature = "rest-remote"))]
        {
            output::warning(&format!(
                "remote_url '{url}' ignored: built without the `rest-remote` feature"
            ));
            return Ok(ConfiguredRemote::Offline(OfflineRemote));
        }
    }

    /// Build the engine, unlock it, and report on the initial sync pass.
    pub async fn open_vault(&self) -> Result<(Engine, SyncReport)> {
        let remote = self.remote()?;
        let offline = remote.is_offline();
        let store = FileStore::new(self.snapshot_path());
        let is_new = !store.path().exists();

        let engine = VaultEngine::new(
            remote,
            store,
            &self.settings.owner,
            self.settings.kdf_params(),
        )?;

        let phrase = if is_new {
            prompt_new_passphrase()?
        } else {
            prompt_passphrase()?
        };
        let report = engine.unlock(phrase.as_bytes()).await?;

        if !offline && !report.is_clean() {
            output::warning(&format!("Sync incomplete: {report}"));
        }
        Ok((engine, report))
    }

    /// Wait for background remote calls, then lock.
    pub async fn close_vault(&self, engine: Engine) {
        engine.settle().await;
        engine.lock();
    }

    /// Record an operation in the audit log (no-op without `audit-log`).
    pub fn audit(&self, op: &str, item_id: Option<&str>, details: Option<&str>) {
        #[cfg(feature = "audit-log")]
        crate::audit::log_audit(&self.data_dir(), &self.settings.owner, op, item_id, details);

        #[cfg(not(feature = "audit-log"))]
        let _ = (op, item_id, details);
    }
}

/// Get the vault passphrase, trying in order:
/// 1. `KEYSAFE_PASSPHRASE` env var (CI/CD)
/// 2. Interactive prompt
///
/// Returns `Zeroizing<String>` so the passphrase is wiped from memory on drop.
pub fn prompt_passphrase() -> Result<Zeroizing<String>> {
    if let Some(phrase) = passphrase_from_env() {
        return Ok(phrase);
    }

    let phrase = dialoguer::Password::new()
        .with_prompt("Enter vault passphrase")
        .interact()
        .map_err(|e| KeysafeError::CommandFailed(format!("passphrase prompt: {e}")))?;
    Ok(Zeroizing::new(phrase))
}

/// Prompt for a new passphrase with confirmation (first use of a vault).
///
/// Also respects `KEYSAFE_PASSPHRASE`.  Enforces a minimum length.
pub fn prompt_new_passphrase() -> Result<Zeroizing<String>> {
    if let Some(phrase) = passphrase_from_env() {
        if phrase.len() < MIN_PASSPHRASE_LEN {
            return Err(KeysafeError::CommandFailed(format!(
                "passphrase must be at least {MIN_PASSPHRASE_LEN} characters"
            )));
        }
        return Ok(phrase);
    }

    output::info("No vault here yet — choose a passphrase to create one.");
    loop {
        let phrase = dialoguer::Password::new()
            .with_prompt("Choose vault passphrase")
            .with_confirmation("Confirm passphrase", "Passphrases do not match")
            .interact()
            .map_err(|e| KeysafeError::CommandFailed(format!("passphrase prompt: {e}")))?;

        if phrase.len() < MIN_PASSPHRASE_LEN {
            output::warning(&format!(
                "Passphrase must be at least {MIN_PASSPHRASE_LEN} characters. Try again."
            ));
            continue;
        }

        return Ok(Zeroizing::new(phrase));
    }
}

fn passphrase_from_env() -> Option<Zeroizing<String>> {
    std::env::var("KEYSAFE_PASSPHRASE")
        .ok()
        .filter(|p| !p.is_empty())
        .map(Zeroizing::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn data_dir_flag_is_global() {
        let cli = Cli::try_parse_from(["keysafe", "list", "--data-dir", "vaults"]).unwrap();
        assert_eq!(cli.data_dir.as_deref(), Some("vaults"));
        assert!(matches!(cli.command, Commands::List));
    }

    #[test]
    fn update_rejects_username_and_clear_together() {
        let result = Cli::try_parse_from([
            "keysafe",
            "update",
            "abc",
            "--username",
            "bob",
            "--clear-username",
        ]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn offline_remote_is_default() {
        let ctx = Context {
            project_dir: PathBuf::from("/tmp"),
            settings: Settings::default(),
        };
        let remote = ctx.remote().unwrap();
        assert!(remote.is_offline());
        assert!(remote.list("local").await.is_err());
    }
}
