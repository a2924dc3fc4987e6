//! `assetctl apply` - make a container match a state document

use anyhow::{Context as AnyhowContext, Result};
use reconcile::{ApplyOptions, AutoConfirm, ConfirmCallback, Outcome, Reconciler, StateCache};
use std::process::ExitCode;

use crate::Context;
use crate::cli::ApplyArgs;
use crate::engine::{DialogConfirm, TerminalProgress, print_summary};
use crate::paths;
use crate::ui;

/// Exit code of a run the user cancelled
pub const EXIT_CANCELLED: u8 = 2;

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<ExitCode> {
    let backend = super::backend(ctx)?;
    let cache = StateCache::new(paths::cache_dir()?);

    let options = ApplyOptions {
        dry_run: args.dry_run,
        purge: args.purge,
        use_cache: !args.no_cache,
        ..Default::default()
    };
    let reconciler = Reconciler::new(&backend, options).with_cache(&cache);

    let mut confirm: Box<dyn ConfirmCallback> = if args.yes {
        Box::new(AutoConfirm)
    } else {
        Box::new(DialogConfirm)
    };
    let mut progress = TerminalProgress::new(ctx.quiet);

    let outcome = reconciler
        .apply_file(&args.file, confirm.as_mut(), &mut progress)
        .with_context(|| format!("Failed to apply {}", args.file.display()))?;

    Ok(report(&outcome))
}

/// Print the final message of a run and pick the exit code
fn report(outcome: &Outcome) -> ExitCode {
    match outcome {
        Outcome::NoChanges => {
            ui::success("No changes found.");
            ExitCode::SUCCESS
        }
        Outcome::DryRun { .. } => {
            ui::info("Done. (no changes made)");
            ExitCode::SUCCESS
        }
        Outcome::Applied { summary, .. } => {
            print_summary(summary);
            ui::success("Done.");
            ExitCode::SUCCESS
        }
        Outcome::Cancelled => {
            ui::warn("Cancelled.");
            ExitCode::from(EXIT_CANCELLED)
        }
    }
}
