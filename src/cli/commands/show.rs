//! `keysafe show` — print one item with its decrypted value.

use crate::cli::{output, Context};
use crate::errors::Result;

/// Execute the `show` command.
pub async fn execute(ctx: &Context, id: &str) -> Result<()> {
    let (engine, _) = ctx.open_vault().await?;
    let result = engine
        .item(id)
        .and_then(|item| engine.decrypt_for_display(id).map(|value| (item, value)));
    ctx.close_vault(engine).await;
    let (item, value) = result?;

    ctx.audit("show", Some(id), None);
    output::print_item_detail(&item, &value);
    Ok(())
}
