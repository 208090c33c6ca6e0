//! `keysafe update` — change fields of an existing item.

use zeroize::Zeroizing;

use crate::cli::{output, Context};
use crate::errors::{KeysafeError, Result};
use crate::vault::{ItemPatch, Strength};

/// Flags collected from the command line.
pub struct UpdateArgs<'a> {
    pub label: Option<&'a str>,
    pub username: Option<&'a str>,
    pub clear_username: bool,
    pub value: Option<&'a str>,
    pub strength: Option<&'a str>,
}

/// Execute the `update` command.
pub async fn execute(ctx: &Context, id: &str, args: UpdateArgs<'_>) -> Result<()> {
    let patch = build_patch(&args)?;
    if patch.is_empty() {
        return Err(KeysafeError::CommandFailed(
            "nothing to update — pass at least one of --label, --username, --value, --strength"
                .into(),
        ));
    }
    patch.validate()?;
    if args.value.is_some() {
        output::warning("Value provided on command line — it may appear in shell history.");
    }

    let (engine, _) = ctx.open_vault().await?;
    let result = engine.update_item(id, patch);
    ctx.close_vault(engine).await;
    let item = result?;

    ctx.audit("update", Some(&item.id), None);
    output::success(&format!("Updated '{}'", item.label));

    Ok(())
}

fn build_patch(args: &UpdateArgs<'_>) -> Result<ItemPatch> {
    let username = if args.clear_username {
        Some(None)
    } else {
        args.username.map(|u| Some(u.to_string()))
    };

    Ok(ItemPatch {
        label: args.label.map(str::to_string),
        username,
        value: args.value.map(|v| Zeroizing::new(v.to_string())),
        strength: args
            .strength
            .map(str::parse::<Strength>)
            .transpose()?
            .map(Some),
    })
}
