//! Terminal adapters for the reconciler - progress, prompts, summary

use colored::Colorize;
use dialoguer::Confirm;
use reconcile::{Change, ConfirmCallback, ExecuteSummary, ProgressCallback};

use super::differ::display_changes;
use crate::ui;

/// Prints phases and per-change progress to stdout
pub struct TerminalProgress {
    quiet: bool,
}

impl TerminalProgress {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_phase(&mut self, message: &str) {
        if !self.quiet {
            ui::phase(message);
        }
    }

    fn on_change_list(&mut self, changes: &[Change]) {
        display_changes(changes);
    }

    fn on_change_start(&mut self, index: usize, total: usize, change: &Change) {
        if !self.quiet {
            println!(
                "{} {} ...",
                format!("Processing task {index}/{total}:").blue().bold(),
                change.description
            );
        }
    }
}

/// Asks on the terminal
pub struct DialogConfirm;

impl ConfirmCallback for DialogConfirm {
    fn confirm(&mut self, prompt: &str) -> reconcile::Result<bool> {
        Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()
            .map_err(prompt_error)
    }
}

fn prompt_error(e: dialoguer::Error) -> reconcile::Error {
    let dialoguer::Error::IO(source) = e;
    reconcile::Error::Prompt(source)
}

/// Print final summary
pub fn print_summary(summary: &ExecuteSummary) {
    println!();
    println!(
        "  {} Changes applied successfully!",
        "✓".green().bold()
    );
    if summary.created > 0 {
        println!("    • {} created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} modified", summary.modified);
    }
    if summary.removed > 0 {
        println!("    • {} removed", summary.removed);
    }
}
