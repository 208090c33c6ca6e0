//! `keysafe pending` — list deletes the remote has not confirmed yet.

use crate::cli::{output, Context};
use crate::errors::Result;

/// Execute the `pending` command.
pub async fn execute(ctx: &Context) -> Result<()> {
    let (engine, _) = ctx.open_vault().await?;
    let pending = engine.pending_deletes();
    ctx.close_vault(engine).await;
    let pending = pending?;

    if pending.is_empty() {
        output::success("No pending deletes.");
        return Ok(());
    }

    output::info(&format!("{} delete(s) waiting for the remote:", pending.len()));
    for id in &pending {
        println!("  {id}");
    }
    output::tip("They are retried on every `keysafe sync`.");
    Ok(())
}
