//! `keysafe audit` — display the audit log.
//!
//! Usage:
//!   keysafe audit               # show last 50 entries
//!   keysafe audit --last 20     # show last 20
//!   keysafe audit --since 7d    # entries from last 7 days
//!   keysafe audit --item <id>   # history of one item

use chrono::{DateTime, Utc};

use crate::audit::{AuditEntry, AuditFilter, AuditLog};
use crate::cli::{output, Context};
use crate::errors::{KeysafeError, Result};

/// Execute the `audit` command.  Needs no passphrase.
pub fn execute(ctx: &Context, last: usize, since: Option<&str>, item: Option<&str>) -> Result<()> {
    let since_dt = since.map(parse_duration).transpose()?;

    let data_dir = ctx.data_dir();
    if !AuditLog::db_path(&data_dir).exists() {
        output::info("No audit entries found.");
        return Ok(());
    }

    let audit = AuditLog::open(&data_dir)
        .ok_or_else(|| KeysafeError::AuditError("failed to open audit database".into()))?;
    let entries = audit.query(&AuditFilter {
        limit: last,
        since: since_dt,
        item_id: item,
    })?;

    if entries.is_empty() {
        output::info("No audit entries found.");
        return Ok(());
    }

    print_audit_table(&entries);
    Ok(())
}

/// Parse a human-friendly duration string like "7d", "24h", "30m".
fn parse_duration(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    let invalid = || {
        KeysafeError::CommandFailed(format!(
            "invalid duration '{input}' — use format like 7d, 24h, or 30m"
        ))
    };

    let (num_str, unit) = input
        .char_indices()
        .last()
        .map(|(i, c)| (&input[..i], c))
        .ok_or_else(invalid)?;

    let num: i64 = num_str.parse().map_err(|_| invalid())?;
    if num < 0 {
        return Err(invalid());
    }

    let duration = match unit {
        'd' => chrono::Duration::days(num),
        'h' => chrono::Duration::hours(num),
        'm' => chrono::Duration::minutes(num),
        _ => return Err(invalid()),
    };

    Ok(Utc::now() - duration)
}

/// Print audit entries in a formatted table.
pub fn print_audit_table(entries: &[AuditEntry]) {
    use comfy_table::{ContentArrangement, Table};
    use console::style;

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Time", "Operation", "Owner", "Item", "Details"]);

    for entry in entries {
        let op = match entry.operation.as_str() {
            "add" => style(&entry.operation).green().to_string(),
            "remove" => style(&entry.operation).red().to_string(),
            "update" => style(&entry.operation).yellow().to_string(),
            "sync" => style(&entry.operation).cyan().to_string(),
            _ => entry.operation.clone(),
        };

        table.add_row(vec![
            entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            op,
            entry.owner.clone(),
            entry.item_id.clone().unwrap_or_default(),
            entry.details.clone().unwrap_or_default(),
        ]);
    }

    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_units() {
        let now = Utc::now();
        let week = parse_duration("7d").unwrap();
        assert!((now - week).num_days() >= 6);

        let day = parse_duration("24h").unwrap();
        assert!((now - day).num_hours() >= 23);

        let half_hour = parse_duration("30m").unwrap();
        assert!((now - half_hour).num_minutes() >= 29);
    }

    #[test]
    fn parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("7").is_err());
        assert!(parse_duration("7w").is_err());
        assert!(parse_duration("xd").is_err());
        assert!(parse_duration("-3d").is_err());
    }
}
