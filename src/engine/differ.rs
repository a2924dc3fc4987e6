//! Change list display - assetctl-specific UI

use colored::{ColoredString, Colorize};
use reconcile::{Change, ChangeKind};

/// Counts of changes by kind: (create, modify, remove)
pub fn count_by_kind(changes: &[Change]) -> (usize, usize, usize) {
    changes
        .iter()
        .fold((0, 0, 0), |(c, m, r), change| match change.kind() {
            ChangeKind::Create => (c + 1, m, r),
            ChangeKind::Modify => (c, m + 1, r),
            ChangeKind::Remove => (c, m, r + 1),
        })
}

fn symbol(kind: ChangeKind) -> ColoredString {
    match kind {
        ChangeKind::Create => "+".green(),
        ChangeKind::Modify => "~".yellow(),
        ChangeKind::Remove => "-".red(),
    }
}

/// Display the change list in execution order
pub fn display_changes(changes: &[Change]) {
    if changes.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    let width = changes.len().to_string().len();
    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Changes".bold()
    );
    println!("│");
    for (i, change) in changes.iter().enumerate() {
        println!(
            "│ {} {} {}",
            format!("{:>width$}.", i + 1).dimmed(),
            symbol(change.kind()),
            change.description
        );
    }
    println!("│");

    let (created, modified, removed) = count_by_kind(changes);
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} changes ({} create, {} modify, {} remove)",
        changes.len().to_string().bold(),
        created.to_string().green(),
        modified.to_string().yellow(),
        removed.to_string().red()
    );
    println!("└─────────────────────────────────────────────────────┘");
}
