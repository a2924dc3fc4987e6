//! Command implementations

pub mod apply;
pub mod kinds;

use anyhow::Result;
use reconcile::HttpBackend;

use crate::Context;
use crate::config::Settings;

/// Backend for the configured API
fn backend(ctx: &Context) -> Result<HttpBackend> {
    let settings = Settings::resolve(ctx.api.clone(), ctx.token.clone())?;
    log::debug!("Using API {}", settings.api);
    Ok(HttpBackend::new(settings.api, settings.token))
}
