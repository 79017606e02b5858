//! Colored terminal output helpers.
//!
//! All user-facing output goes through these functions so we get
//! consistent styling across every command.

use std::path::Path;

use comfy_table::{ContentArrangement, Table};
use console::style;

use crate::datastore::EntryMetadata;
use crate::vault::VaultStatus;

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

/// Print a table of entry metadata (Name, Kind, Created, Updated).
pub fn print_entries_table(entries: &[EntryMetadata]) {
    if entries.is_empty() {
        info("No credentials in this vault yet.");
        tip("Run `credvault set <NAME>` to add your first credential.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Name", "Kind", "Created", "Updated"]);

    for e in entries {
        table.add_row(vec![
            e.name.clone(),
            e.kind.to_string(),
            e.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            e.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }

    println!("{table}");
}

/// Print the vault status as a two-column table.
pub fn print_status(status: &VaultStatus, data_dir: &Path, key_store: &str) {
    let yes_no = |b: bool| if b { "yes" } else { "no" }.to_string();

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.add_row(vec!["State".to_string(), status.state.to_string()]);
    table.add_row(vec!["Initialized".to_string(), yes_no(status.initialized)]);
    table.add_row(vec![
        "Legacy migration pending".to_string(),
        yes_no(status.legacy_pending),
    ]);
    table.add_row(vec![
        "Interrupted rekey".to_string(),
        yes_no(status.rekey_pending),
    ]);
    table.add_row(vec!["Key alias".to_string(), status.key_alias.clone()]);
    table.add_row(vec!["Key store".to_string(), key_store.to_string()]);
    table.add_row(vec![
        "Data directory".to_string(),
        data_dir.display().to_string(),
    ]);

    println!("{table}");
}
