//! In-memory backend for testing without network access.
//!
//! [`MockBackend`] behaves like a single container on the real API: created
//! entities get fresh IDs, mutations change what later fetches return, and
//! only collectors marked as displayed show up in the schema.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::backend::{AssetQuery, Backend, RemoteAsset};
use crate::error::{Error, Result};
use crate::model::{APPLY_PERMISSIONS, CollectorBinding, Container, DisabledCheck, Label, Permissions, Zone};
use crate::schema::Collector;
use crate::value::Config;

const FIRST_ID: u64 = 1000;

#[derive(Debug, Default)]
struct Inner {
    container: Container,
    zones: Vec<Zone>,
    labels: BTreeMap<u64, Label>,
    assets: Vec<RemoteAsset>,
    collectors: Vec<(Collector, bool)>,
    kinds: Vec<String>,
    permissions: Permissions,
    next_id: u64,
    calls: Vec<String>,
    fail_on: Option<String>,
    verified: Vec<(String, Config)>,
}

impl Inner {
    /// Log a call and fail it if it was marked to fail.
    fn record(&mut self, operation: &str, detail: String) -> Result<()> {
        self.calls.push(format!("{operation} {detail}").trim_end().to_string());
        if self.fail_on.as_deref() == Some(operation) {
            return Err(Error::http(
                "500 Internal Server Error Response: injected failure",
                Some(500),
            ));
        }
        Ok(())
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn asset_mut(&mut self, asset_id: u64) -> Result<&mut RemoteAsset> {
        self.assets
            .iter_mut()
            .find(|a| a.id == asset_id)
            .ok_or_else(|| not_found(&format!("asset {asset_id}")))
    }

    fn label_mut(&mut self, label_id: u64) -> Result<&mut Label> {
        self.labels
            .get_mut(&label_id)
            .ok_or_else(|| not_found(&format!("label {label_id}")))
    }
}

fn not_found(what: &str) -> Error {
    Error::http(format!("404 Not Found Response: {what} not found"), Some(404))
}

/// Stateful in-memory backend for one container.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    inner: Arc<Mutex<Inner>>,
}

impl MockBackend {
    /// Create an empty container whose token has every apply permission.
    #[must_use]
    pub fn new(container_id: u64) -> Self {
        let inner = Inner {
            container: Container {
                id: container_id,
                name: format!("Container {container_id}"),
            },
            kinds: vec!["Asset".to_string(), "Linux".to_string(), "VMware".to_string()],
            permissions: Permissions {
                permissions: Some(APPLY_PERMISSIONS.iter().map(|p| (*p).to_string()).collect()),
                token_type: "user".to_string(),
            },
            next_id: FIRST_ID,
            ..Default::default()
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn add_zone(&self, zone: u32, name: &str) {
        self.lock().zones.push(Zone {
            zone,
            name: name.to_string(),
        });
    }

    pub fn add_label(&self, label: Label) {
        self.lock().labels.insert(label.id, label);
    }

    /// Add an asset; its container is set to this container.
    pub fn add_asset(&self, mut asset: RemoteAsset) {
        let mut inner = self.lock();
        asset.container = Some(inner.container.id);
        inner.assets.push(asset);
    }

    /// Add a collector to the schema, visible only when `displayed`.
    pub fn add_collector(&self, collector: Collector, displayed: bool) {
        self.lock().collectors.push((collector, displayed));
    }

    pub fn set_permissions(&self, permissions: &[&str]) {
        self.lock().permissions.permissions =
            Some(permissions.iter().map(|p| (*p).to_string()).collect());
    }

    /// Make every call to `operation` fail from now on.
    pub fn fail_on(&self, operation: &str) {
        self.lock().fail_on = Some(operation.to_string());
    }

    /// Every call made so far, as `"operation detail"`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Calls that changed something on the backend.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("fetch_") && !c.starts_with("verify_"))
            .collect()
    }

    /// Configs submitted for remote verification.
    pub fn verified_configs(&self) -> Vec<(String, Config)> {
        self.lock().verified.clone()
    }

    pub fn asset(&self, asset_id: u64) -> Option<RemoteAsset> {
        self.lock().assets.iter().find(|a| a.id == asset_id).cloned()
    }

    pub fn asset_named(&self, name: &str) -> Option<RemoteAsset> {
        self.lock().assets.iter().find(|a| a.name == name).cloned()
    }

    pub fn label(&self, label_id: u64) -> Option<Label> {
        self.lock().labels.get(&label_id).cloned()
    }

    pub fn zones(&self) -> Vec<Zone> {
        self.lock().zones.clone()
    }

    pub fn collector_displayed(&self, key: &str) -> bool {
        self.lock()
            .collectors
            .iter()
            .any(|(c, displayed)| c.key == key && *displayed)
    }
}

fn matches_filters(asset: &RemoteAsset, query: &AssetQuery) -> bool {
    query.filters.iter().all(|filter| {
        let value = match filter.key.as_str() {
            "name" => asset.name.as_str(),
            "kind" => asset.kind.as_str(),
            "mode" => asset.mode.as_str(),
            _ => return filter.negate,
        };
        (value == filter.value) != filter.negate
    })
}

impl Backend for MockBackend {
    fn fetch_container(&self, container_id: u64) -> Result<Container> {
        let mut inner = self.lock();
        inner.record("fetch_container", container_id.to_string())?;
        if inner.container.id != container_id {
            return Err(not_found(&format!("container {container_id}")));
        }
        Ok(inner.container.clone())
    }

    fn fetch_assets(&self, query: &AssetQuery) -> Result<Vec<RemoteAsset>> {
        query.check()?;
        let mut inner = self.lock();
        inner.record("fetch_assets", query.container_id.to_string())?;
        if let Some(asset_id) = query.asset_id {
            let asset = inner
                .assets
                .iter()
                .find(|a| a.id == asset_id)
                .cloned()
                .ok_or_else(|| not_found(&format!("asset {asset_id}")))?;
            if asset.container != Some(query.container_id) {
                return Err(Error::invalid(format!(
                    "mismatch between container ID {} and asset ID {asset_id}",
                    query.container_id
                )));
            }
        }
        Ok(inner
            .assets
            .iter()
            .filter(|a| query.asset_id.is_none_or(|id| a.id == id))
            .filter(|a| matches_filters(a, query))
            .map(|a| {
                let mut asset = a.clone();
                asset.container = None;
                if !query.with_collectors {
                    asset.collectors.clear();
                    asset.disabled_checks.clear();
                }
                asset
            })
            .collect())
    }

    fn fetch_zones(&self, container_id: u64) -> Result<Vec<Zone>> {
        let mut inner = self.lock();
        inner.record("fetch_zones", container_id.to_string())?;
        Ok(inner.zones.clone())
    }

    fn fetch_labels(&self, ids: &BTreeSet<u64>) -> Result<Vec<Label>> {
        let mut inner = self.lock();
        let detail = ids.iter().map(u64::to_string).collect::<Vec<_>>().join(",");
        inner.record("fetch_labels", detail)?;
        ids.iter()
            .map(|id| {
                inner
                    .labels
                    .get(id)
                    .cloned()
                    .ok_or_else(|| not_found(&format!("label {id}")))
            })
            .collect()
    }

    fn fetch_collectors(
        &self,
        container_id: u64,
        _fields: &[&str],
        with_options: bool,
    ) -> Result<Vec<Collector>> {
        let mut inner = self.lock();
        inner.record("fetch_collectors", container_id.to_string())?;
        Ok(inner
            .collectors
            .iter()
            .filter(|(_, displayed)| *displayed)
            .map(|(c, _)| {
                let mut collector = c.clone();
                if !with_options {
                    collector.options.clear();
                }
                collector
            })
            .collect())
    }

    fn fetch_asset_kinds(&self) -> Result<Vec<String>> {
        let mut inner = self.lock();
        inner.record("fetch_asset_kinds", String::new())?;
        Ok(inner.kinds.clone())
    }

    fn fetch_permissions(&self, container_id: u64) -> Result<Permissions> {
        let mut inner = self.lock();
        inner.record("fetch_permissions", container_id.to_string())?;
        Ok(inner.permissions.clone())
    }

    fn verify_collector_config(&self, collector: &str, config: &Config) -> Result<()> {
        let mut inner = self.lock();
        inner.record("verify_collector_config", collector.to_string())?;
        inner.verified.push((collector.to_string(), config.clone()));
        Ok(())
    }

    fn set_collector_display(
        &self,
        _container_id: u64,
        collector: &str,
        display: bool,
    ) -> Result<()> {
        let mut inner = self.lock();
        inner.record("set_collector_display", format!("{collector} {display}"))?;
        let (_, displayed) = inner
            .collectors
            .iter_mut()
            .find(|(c, _)| c.key == collector)
            .ok_or_else(|| not_found(&format!("collector {collector}")))?;
        *displayed = display;
        Ok(())
    }

    fn upsert_zone(&self, _container_id: u64, zone: u32, name: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.record("upsert_zone", format!("{zone} {name}"))?;
        match inner.zones.iter_mut().find(|z| z.zone == zone) {
            Some(existing) => existing.name = name.to_string(),
            None => inner.zones.push(Zone {
                zone,
                name: name.to_string(),
            }),
        }
        Ok(())
    }

    fn create_asset(&self, container_id: u64, name: &str) -> Result<u64> {
        let mut inner = self.lock();
        inner.record("create_asset", name.to_string())?;
        let id = inner.next_id();
        inner.assets.push(RemoteAsset {
            id,
            container: Some(container_id),
            name: name.to_string(),
            zone: Some(0),
            mode: "normal".to_string(),
            kind: "Asset".to_string(),
            ..Default::default()
        });
        Ok(id)
    }

    fn set_asset_name(&self, asset_id: u64, name: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.record("set_asset_name", format!("{asset_id} {name}"))?;
        inner.asset_mut(asset_id)?.name = name.to_string();
        Ok(())
    }

    fn set_asset_mode(&self, asset_id: u64, mode: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.record("set_asset_mode", format!("{asset_id} {mode}"))?;
        inner.asset_mut(asset_id)?.mode = mode.to_string();
        Ok(())
    }

    fn set_asset_kind(&self, asset_id: u64, kind: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.record("set_asset_kind", format!("{asset_id} {kind}"))?;
        inner.asset_mut(asset_id)?.kind = kind.to_string();
        Ok(())
    }

    fn set_asset_zone(&self, asset_id: u64, zone: u32) -> Result<()> {
        let mut inner = self.lock();
        inner.record("set_asset_zone", format!("{asset_id} {zone}"))?;
        inner.asset_mut(asset_id)?.zone = Some(zone);
        Ok(())
    }

    fn set_asset_description(&self, asset_id: u64, description: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.record("set_asset_description", asset_id.to_string())?;
        inner.asset_mut(asset_id)?.description = description.to_string();
        Ok(())
    }

    fn add_label_to_asset(&self, asset_id: u64, label_id: u64) -> Result<()> {
        let mut inner = self.lock();
        inner.record("add_label_to_asset", format!("{asset_id} {label_id}"))?;
        if !inner.labels.contains_key(&label_id) {
            return Err(not_found(&format!("label {label_id}")));
        }
        let asset = inner.asset_mut(asset_id)?;
        if !asset.labels.contains(&label_id) {
            asset.labels.push(label_id);
        }
        Ok(())
    }

    fn delete_label_from_asset(&self, asset_id: u64, label_id: u64) -> Result<()> {
        let mut inner = self.lock();
        inner.record("delete_label_from_asset", format!("{asset_id} {label_id}"))?;
        inner.asset_mut(asset_id)?.labels.retain(|id| *id != label_id);
        Ok(())
    }

    fn enable_check(&self, asset_id: u64, collector: &str, check: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.record("enable_check", format!("{asset_id} {collector}/{check}"))?;
        inner
            .asset_mut(asset_id)?
            .disabled_checks
            .retain(|c| !(c.collector == collector && c.check == check));
        Ok(())
    }

    fn disable_check(&self, asset_id: u64, collector: &str, check: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.record("disable_check", format!("{asset_id} {collector}/{check}"))?;
        let wanted = DisabledCheck {
            collector: collector.to_string(),
            check: check.to_string(),
        };
        let asset = inner.asset_mut(asset_id)?;
        if !asset.disabled_checks.contains(&wanted) {
            asset.disabled_checks.push(wanted);
        }
        Ok(())
    }

    fn upsert_collector(
        &self,
        asset_id: u64,
        collector: &str,
        config: Option<&Config>,
    ) -> Result<()> {
        let mut inner = self.lock();
        inner.record("upsert_collector", format!("{asset_id} {collector}"))?;
        let asset = inner.asset_mut(asset_id)?;
        match asset.collectors.iter_mut().find(|c| c.key == collector) {
            Some(binding) => {
                if let Some(config) = config {
                    binding.config = Some(config.clone());
                }
            }
            None => asset.collectors.push(CollectorBinding {
                key: collector.to_string(),
                config: Some(config.cloned().unwrap_or_default()),
            }),
        }
        Ok(())
    }

    fn remove_collector(&self, asset_id: u64, collector: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.record("remove_collector", format!("{asset_id} {collector}"))?;
        let asset = inner.asset_mut(asset_id)?;
        asset.collectors.retain(|c| c.key != collector);
        asset.disabled_checks.retain(|c| c.collector != collector);
        Ok(())
    }

    fn create_label(&self, _container_id: u64, name: &str) -> Result<u64> {
        let mut inner = self.lock();
        inner.record("create_label", name.to_string())?;
        let id = inner.next_id();
        inner.labels.insert(
            id,
            Label {
                id,
                name: name.to_string(),
                ..Default::default()
            },
        );
        Ok(id)
    }

    fn set_label_name(&self, label_id: u64, name: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.record("set_label_name", format!("{label_id} {name}"))?;
        inner.label_mut(label_id)?.name = name.to_string();
        Ok(())
    }

    fn set_label_color(&self, label_id: u64, color: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.record("set_label_color", format!("{label_id} {color}"))?;
        inner.label_mut(label_id)?.color = color.to_string();
        Ok(())
    }

    fn set_label_description(&self, label_id: u64, description: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.record("set_label_description", label_id.to_string())?;
        inner.label_mut(label_id)?.description = description.to_string();
        Ok(())
    }
}
