//! `assetctl kinds` - list the asset kinds the backend accepts

use anyhow::{Context as AnyhowContext, Result};
use reconcile::Backend;

use crate::Context;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let backend = super::backend(ctx)?;
    let mut kinds = backend
        .fetch_asset_kinds()
        .context("Failed to read asset kinds")?;
    kinds.sort_unstable_by_key(|k| k.to_lowercase());

    if ctx.quiet {
        for kind in &kinds {
            println!("{kind}");
        }
        return Ok(());
    }

    ui::header("Asset kinds");
    for kind in &kinds {
        println!("  {kind}");
    }
    ui::dim(&format!("{} kinds", kinds.len()));
    Ok(())
}
