//! Local history of vault operations.
//!
//! Each CLI command that touches the vault appends one row to
//! `<data_dir>/audit.db`: which owner ran it, the item id it targeted,
//! and for `sync` the pass counters.  Labels and secret values are
//! never written.  The log is a convenience; when the database is
//! unavailable the command still runs.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::errors::{KeysafeError, Result};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS audit_log (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp   TEXT NOT NULL,
        operation   TEXT NOT NULL,
        owner       TEXT NOT NULL,
        item_id     TEXT,
        details     TEXT
    );
    CREATE INDEX IF NOT EXISTS audit_log_item ON audit_log (item_id);
";

/// One recorded operation.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub owner: String,
    /// Target item, absent for vault-wide operations like `sync`.
    pub item_id: Option<String>,
    /// Free-form context, e.g. the sync report.
    pub details: Option<String>,
}

impl AuditEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let raw: String = row.get(1)?;
        let timestamp = DateTime::parse_from_rfc3339(&raw)
            .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc));
        Ok(Self {
            id: row.get(0)?,
            timestamp,
            operation: row.get(2)?,
            owner: row.get(3)?,
            item_id: row.get(4)?,
            details: row.get(5)?,
        })
    }
}

/// Which entries `AuditLog::query` returns.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter<'a> {
    /// At most this many, newest first.
    pub limit: usize,
    pub since: Option<DateTime<Utc>>,
    /// Only the history of this item.
    pub item_id: Option<&'a str>,
}

pub struct AuditLog {
    conn: Connection,
}

impl AuditLog {
    /// Open or create the log in `data_dir`.  `None` means logging is
    /// unavailable.
    pub fn open(data_dir: &Path) -> Option<Self> {
        let path = Self::db_path(data_dir);
        let conn = Connection::open(&path).ok()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600));
        }

        conn.execute_batch(SCHEMA).ok()?;
        Some(Self { conn })
    }

    /// Append an entry.  Failures are traced, never returned.
    pub fn log(&self, operation: &str, owner: &str, item_id: Option<&str>, details: Option<&str>) {
        let result = self.conn.execute(
            "INSERT INTO audit_log (timestamp, operation, owner, item_id, details)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![Utc::now().to_rfc3339(), operation, owner, item_id, details],
        );
        if let Err(e) = result {
            tracing::debug!(error = %e, operation, "audit insert failed");
        }
    }

    pub fn query(&self, filter: &AuditFilter<'_>) -> Result<Vec<AuditEntry>> {
        let limit = i64::try_from(filter.limit).unwrap_or(i64::MAX);
        let since = filter.since.map(|ts| ts.to_rfc3339());

        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, timestamp, operation, owner, item_id, details
                 FROM audit_log
                 WHERE (?1 IS NULL OR timestamp >= ?1)
                   AND (?2 IS NULL OR item_id = ?2)
                 ORDER BY id DESC
                 LIMIT ?3",
            )
            .map_err(|e| KeysafeError::AuditError(format!("query prepare: {e}")))?;

        let entries = stmt
            .query_map(params![since, filter.item_id, limit], AuditEntry::from_row)
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| KeysafeError::AuditError(format!("query: {e}")))?;
        Ok(entries)
    }

    pub fn db_path(data_dir: &Path) -> PathBuf {
        data_dir.join("audit.db")
    }
}

/// Record one operation, if the log in `data_dir` can be opened.
pub fn log_audit(data_dir: &Path, owner: &str, op: &str, item_id: Option<&str>, details: Option<&str>) {
    if let Some(audit) = AuditLog::open(data_dir) {
        audit.log(op, owner, item_id, details);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn latest(limit: usize) -> AuditFilter<'static> {
        AuditFilter {
            limit,
            ..AuditFilter::default()
        }
    }

    #[test]
    fn open_creates_database() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::open(dir.path());
        assert!(audit.is_some(), "should open successfully");
        assert!(dir.path().join("audit.db").exists());
    }

    #[test]
    fn log_and_query_roundtrip() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::open(dir.path()).unwrap();

        audit.log("add", "alice", Some("id-1"), None);
        audit.log("add", "alice", Some("id-2"), None);
        audit.log("remove", "alice", Some("id-1"), Some("queued"));

        let entries = audit.query(&latest(10)).unwrap();
        assert_eq!(entries.len(), 3);

        // Most recent first.
        assert_eq!(entries[0].operation, "remove");
        assert_eq!(entries[0].details.as_deref(), Some("queued"));
        assert_eq!(entries[1].operation, "add");
        assert_eq!(entries[2].item_id.as_deref(), Some("id-1"));
    }

    #[test]
    fn query_with_limit() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::open(dir.path()).unwrap();

        for i in 0..10 {
            audit.log("add", "alice", Some(&format!("id-{i}")), None);
        }

        assert_eq!(audit.query(&latest(3)).unwrap().len(), 3);
    }

    #[test]
    fn query_with_since_filter() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::open(dir.path()).unwrap();

        audit.log("sync", "alice", None, Some("pushed 1"));

        let past = Utc::now() - chrono::Duration::hours(1);
        let recent = AuditFilter {
            since: Some(past),
            ..latest(10)
        };
        assert_eq!(audit.query(&recent).unwrap().len(), 1);

        let future = Utc::now() + chrono::Duration::hours(1);
        let ahead = AuditFilter {
            since: Some(future),
            ..latest(10)
        };
        assert!(audit.query(&ahead).unwrap().is_empty());
    }

    #[test]
    fn query_one_items_history() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::open(dir.path()).unwrap();

        audit.log("add", "alice", Some("id-1"), None);
        audit.log("add", "alice", Some("id-2"), None);
        audit.log("sync", "alice", None, Some("pushed 2"));
        audit.log("show", "alice", Some("id-1"), None);

        let history = audit
            .query(&AuditFilter {
                item_id: Some("id-1"),
                ..latest(10)
            })
            .unwrap();
        let ops: Vec<&str> = history.iter().map(|e| e.operation.as_str()).collect();
        assert_eq!(ops, vec!["show", "add"]);
    }

    #[test]
    fn open_returns_none_on_bad_path() {
        let result = AuditLog::open(Path::new("/nonexistent/path/that/does/not/exist"));
        assert!(result.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn audit_db_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let _audit = AuditLog::open(dir.path()).unwrap();

        let perms = std::fs::metadata(dir.path().join("audit.db"))
            .unwrap()
            .permissions();
        assert_eq!(perms.mode() & 0o777, 0o600);
    }
}
