//! `keysafe sync` — run a reconciliation pass and report on it.
//!
//! Unlocking already runs one pass; a second one picks up anything the
//! first pass's background work left behind.

use crate::cli::{output, Context};
use crate::errors::Result;

/// Execute the `sync` command.
pub async fn execute(ctx: &Context) -> Result<()> {
    let (engine, _) = ctx.open_vault().await?;
    engine.settle().await;
    let result = engine.sync().await;
    ctx.close_vault(engine).await;
    let report = result?;

    ctx.audit("sync", None, Some(&report.to_string()));

    if report.migrated > 0 {
        output::info(&format!(
            "Sealed {} legacy plaintext value(s)",
            report.migrated
        ));
    }
    if report.is_clean() {
        output::success(&format!("Sync complete: {report}"));
    } else {
        output::warning(&format!("Sync incomplete: {report}"));
        if ctx.settings.remote_url.is_none() {
            output::tip("No remote_url in .keysafe.toml — keysafe is running offline.");
        }
    }

    Ok(())
}
