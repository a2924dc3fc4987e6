//! Fetch the current state of a container from the backend.

use log::debug;
use std::collections::BTreeSet;

use crate::backend::{AssetQuery, Backend};
use crate::error::Result;
use crate::labels::LabelMap;
use crate::model::{Info, State};
use crate::validate::to_document_keys;

/// Fetch container, assets, zones and every label the assets use.
///
/// Labels are added to the alias map in ascending ID order so aliases are
/// stable between runs. Config keys are converted to their document names.
pub fn fetch_current_state<B: Backend + ?Sized>(backend: &B, container_id: u64) -> Result<State> {
    debug!("Fetching current state of container {container_id}");
    let container = backend.fetch_container(container_id)?;
    let remote_assets = backend.fetch_assets(&AssetQuery::container(container.id))?;
    let zones = backend.fetch_zones(container.id)?;

    let label_ids: BTreeSet<u64> = remote_assets
        .iter()
        .flat_map(|a| a.labels.iter().copied())
        .collect();
    let mut fetched = backend.fetch_labels(&label_ids)?;
    fetched.sort_by_key(|l| l.id);
    let mut labels = LabelMap::new();
    for label in fetched {
        labels.append(label);
    }

    let mut assets: Vec<_> = remote_assets
        .into_iter()
        .map(|a| a.into_asset(&labels))
        .collect();
    to_document_keys(&mut assets);
    debug!(
        "Fetched {} assets, {} zones, {} labels",
        assets.len(),
        zones.len(),
        labels.len()
    );

    Ok(State {
        info: Some(Info::now()),
        container,
        zones,
        labels,
        assets,
    })
}
