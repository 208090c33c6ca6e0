//! `keysafe list` — show item metadata in a table.

use crate::cli::{output, Context};
use crate::errors::Result;

/// Execute the `list` command.
pub async fn execute(ctx: &Context) -> Result<()> {
    let (engine, _) = ctx.open_vault().await?;
    let items = engine.items();
    ctx.close_vault(engine).await;

    output::print_items_table(&items?);
    Ok(())
}
