//! `keysafe add` — store a new credential.

use std::io::{self, IsTerminal, Read};

use zeroize::Zeroizing;

use crate::cli::{output, Context};
use crate::errors::{KeysafeError, Result};
use crate::vault::{NewItem, Strength};

/// Execute the `add` command.
pub async fn execute(
    ctx: &Context,
    label: &str,
    username: Option<&str>,
    value: Option<&str>,
    strength: Option<&str>,
) -> Result<()> {
    let strength = strength.map(str::parse::<Strength>).transpose()?;
    let secret = read_secret(label, value)?;

    let mut new = NewItem::new(label, secret.as_str());
    if let Some(u) = username {
        new = new.with_username(u);
    }
    if let Some(s) = strength {
        new = new.with_strength(s);
    }
    // Fail before prompting for the passphrase.
    new.validate()?;

    let (engine, _) = ctx.open_vault().await?;
    let result = engine.add_item(new);
    let count = engine.items().map(|items| items.len()).unwrap_or(0);
    ctx.close_vault(engine).await;
    let item = result?;

    ctx.audit("add", Some(&item.id), None);
    output::success(&format!(
        "Added '{}' ({} item{} total)",
        item.label,
        count,
        if count == 1 { "" } else { "s" }
    ));
    output::tip(&format!("Id: {}", item.id));

    Ok(())
}

/// Take the value inline, from piped stdin, or from a hidden prompt.
fn read_secret(label: &str, value: Option<&str>) -> Result<Zeroizing<String>> {
    if let Some(v) = value {
        output::warning("Value provided on command line — it may appear in shell history.");
        return Ok(Zeroizing::new(v.to_string()));
    }

    if !io::stdin().is_terminal() {
        let mut buf = Zeroizing::new(String::new());
        io::stdin().read_to_string(&mut buf)?;
        let trimmed = buf.trim_end().len();
        buf.truncate(trimmed);
        return Ok(buf);
    }

    let secret = dialoguer::Password::new()
        .with_prompt(format!("Enter value for {label}"))
        .interact()
        .map_err(|e| KeysafeError::CommandFailed(format!("input prompt: {e}")))?;
    Ok(Zeroizing::new(secret))
}
