//! Colored terminal output helpers.
//!
//! All user-facing output goes through these functions so we get
//! consistent styling across every command.

use comfy_table::{ContentArrangement, Table};
use console::style;

use crate::vault::VaultItem;

/// Print a green success message: "check_mark {msg}"
pub fn success(msg: &str) {
    println!("{} {}", style("\u{2713}").green().bold(), msg);
}

/// Print a red error message: "x_mark {msg}"
pub fn error(msg: &str) {
    eprintln!("{} {}", style("\u{2717}").red().bold(), msg);
}

/// Print a yellow warning: "warning_sign {msg}"
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("\u{26a0}").yellow().bold(), msg);
}

/// Print a blue info message: "info_sign {msg}"
pub fn info(msg: &str) {
    println!("{} {}", style("\u{2139}").blue().bold(), msg);
}

/// Print a dim tip/hint: "arrow {msg}"
pub fn tip(msg: &str) {
    println!("{} {}", style("\u{2192}").dim(), style(msg).dim());
}

/// Print a table of items (Id, Label, Username, Strength, Updated).
///
/// Values are never printed here; use `keysafe show <id>`.
pub fn print_items_table(items: &[VaultItem]) {
    if items.is_empty() {
        info("No items in this vault yet.");
        tip("Run `keysafe add <LABEL>` to add your first credential.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Id", "Label", "Username", "Strength", "Updated"]);

    for item in items {
        table.add_row(vec![
            item.id.clone(),
            item.label.clone(),
            item.username.clone().unwrap_or_default(),
            item.strength.map(|s| s.to_string()).unwrap_or_default(),
            item.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }

    println!("{table}");
}

/// Print one item's fields, including its decrypted value.
pub fn print_item_detail(item: &VaultItem, value: &str) {
    println!("{:>10}  {}", style("Label").bold(), item.label);
    if let Some(username) = &item.username {
        println!("{:>10}  {}", style("Username").bold(), username);
    }
    println!("{:>10}  {}", style("Value").bold(), value);
    if let Some(strength) = item.strength {
        println!("{:>10}  {}", style("Strength").bold(), strength);
    }
    println!(
        "{:>10}  {}",
        style("Created").bold(),
        item.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "{:>10}  {}",
        style("Updated").bold(),
        item.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("{:>10}  {}", style("Id").dim(), style(&item.id).dim());
}
