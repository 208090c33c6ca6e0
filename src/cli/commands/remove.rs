//! `keysafe remove` — delete an item locally and queue the remote delete.

use dialoguer::Confirm;

use crate::cli::{output, Context};
use crate::errors::{KeysafeError, Result};

/// Execute the `remove` command.
pub async fn execute(ctx: &Context, id: &str, force: bool) -> Result<()> {
    let (engine, _) = ctx.open_vault().await?;

    let label = match engine.item(id) {
        Ok(item) => item.label,
        Err(e) => {
            ctx.close_vault(engine).await;
            return Err(e);
        }
    };

    // Unless --force is set, ask for confirmation before removing.
    if !force {
        let confirmed = Confirm::new()
            .with_prompt(format!("Remove '{label}'?"))
            .default(false)
            .interact()
            .map_err(|e| KeysafeError::CommandFailed(format!("confirm prompt: {e}")));

        match confirmed {
            Ok(true) => {}
            Ok(false) => {
                ctx.close_vault(engine).await;
                output::info("Cancelled.");
                return Ok(());
            }
            Err(e) => {
                ctx.close_vault(engine).await;
                return Err(e);
            }
        }
    }

    let result = engine.remove_item(id);
    ctx.close_vault(engine).await;
    result?;

    ctx.audit("remove", Some(id), None);
    output::success(&format!("Removed '{label}'"));
    if ctx.settings.remote_url.is_none() {
        output::tip("Offline: the remote delete is queued until the next `keysafe sync`.");
    }

    Ok(())
}
