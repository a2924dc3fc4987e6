//! Execution engine - applies changes sequentially against a backend
//!
//! Changes run strictly in list order. Creates write the assigned ID back
//! into the target state, which is how later changes for the same entity
//! find it. The first failure halts the run; changes already applied stay
//! applied.

use log::debug;

use crate::backend::Backend;
use crate::change::{Change, ChangeKind, Operation};
use crate::context::ProgressCallback;
use crate::error::{Error, Result};
use crate::labels::LabelHandle;
use crate::model::{Asset, AssetHandle, Label, State};

/// Counts of executed changes by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
}

impl ExecuteSummary {
    pub fn record(&mut self, kind: ChangeKind) {
        match kind {
            ChangeKind::Create => self.created += 1,
            ChangeKind::Modify => self.modified += 1,
            ChangeKind::Remove => self.removed += 1,
        }
    }

    /// Total number of changes made
    pub fn total(&self) -> usize {
        self.created + self.modified + self.removed
    }
}

/// Execute `changes` in order, resolving entities through `target`.
///
/// # Errors
/// Returns [`Error::ChangeFailed`] for the first change that fails.
pub fn execute<B, P>(
    changes: &[Change],
    target: &mut State,
    backend: &B,
    progress: &mut P,
) -> Result<ExecuteSummary>
where
    B: Backend + ?Sized,
    P: ProgressCallback + ?Sized,
{
    let total = changes.len();
    let mut summary = ExecuteSummary::default();
    for (i, change) in changes.iter().enumerate() {
        progress.on_change_start(i + 1, total, change);
        apply(&change.operation, target, backend).map_err(|source| Error::ChangeFailed {
            index: i + 1,
            total,
            description: change.description.clone(),
            source: Box::new(source),
        })?;
        summary.record(change.kind());
    }
    debug!("Executed {} changes", summary.total());
    Ok(summary)
}

fn apply<B: Backend + ?Sized>(operation: &Operation, target: &mut State, backend: &B) -> Result<()> {
    let container_id = target.container.id;
    match operation {
        Operation::SetCollectorDisplay { collector, display } => {
            backend.set_collector_display(container_id, collector, *display)
        }
        Operation::CreateZone { zone, name } | Operation::RenameZone { zone, name } => {
            backend.upsert_zone(container_id, *zone, name)
        }
        Operation::CreateLabel { label } => {
            let name = target
                .labels
                .get(*label)
                .map(|l| l.name.clone())
                .ok_or_else(|| Error::invalid("change refers to an unknown label"))?;
            let id = backend.create_label(container_id, &name)?;
            target.labels.assign_id(*label, id);
            Ok(())
        }
        Operation::SetLabelName { label } => {
            let l = created_label(target, *label)?;
            backend.set_label_name(l.id, &l.name)
        }
        Operation::SetLabelColor { label } => {
            let l = created_label(target, *label)?;
            backend.set_label_color(l.id, &l.color)
        }
        Operation::SetLabelDescription { label } => {
            let l = created_label(target, *label)?;
            backend.set_label_description(l.id, &l.description)
        }
        Operation::CreateAsset { asset } => {
            let name = target
                .asset(*asset)
                .map(|a| a.name.clone())
                .ok_or_else(|| Error::invalid("change refers to an unknown asset"))?;
            let id = backend.create_asset(container_id, &name)?;
            if let Some(created) = target.asset_mut(*asset) {
                created.id = id;
            }
            Ok(())
        }
        Operation::SetAssetName { asset } => {
            let a = created_asset(target, *asset)?;
            backend.set_asset_name(a.id, &a.name)
        }
        Operation::SetAssetMode { asset } => {
            let a = created_asset(target, *asset)?;
            backend.set_asset_mode(a.id, &a.mode)
        }
        Operation::SetAssetKind { asset } => {
            let a = created_asset(target, *asset)?;
            backend.set_asset_kind(a.id, &a.kind)
        }
        Operation::SetAssetZone { asset } => {
            let a = created_asset(target, *asset)?;
            let zone = a.zone.ok_or_else(|| {
                Error::invalid(format!("asset '{}' has no zone", a.display_name()))
            })?;
            backend.set_asset_zone(a.id, zone)
        }
        Operation::SetAssetDescription { asset } => {
            let a = created_asset(target, *asset)?;
            backend.set_asset_description(a.id, &a.description)
        }
        Operation::AddLabelToAsset { asset, label } => {
            let a = created_asset(target, *asset)?;
            let l = created_label(target, *label)?;
            backend.add_label_to_asset(a.id, l.id)
        }
        Operation::DeleteLabelFromAsset { asset, label_id } => {
            backend.delete_label_from_asset(created_asset(target, *asset)?.id, *label_id)
        }
        Operation::UpsertCollector { asset, collector } => {
            let a = created_asset(target, *asset)?;
            let config = a.collector(collector).and_then(|b| b.config.as_ref());
            backend.upsert_collector(a.id, collector, config)
        }
        Operation::RemoveCollector { asset, collector } => {
            backend.remove_collector(created_asset(target, *asset)?.id, collector)
        }
        Operation::DisableCheck { asset, check } => {
            let a = created_asset(target, *asset)?;
            backend.disable_check(a.id, &check.collector, &check.check)
        }
        Operation::EnableCheck { asset, check } => {
            let a = created_asset(target, *asset)?;
            backend.enable_check(a.id, &check.collector, &check.check)
        }
    }
}

/// An asset that exists on the backend.
fn created_asset(target: &State, handle: AssetHandle) -> Result<&Asset> {
    let asset = target
        .asset(handle)
        .ok_or_else(|| Error::invalid("change refers to an unknown asset"))?;
    if asset.id == 0 {
        return Err(Error::invalid(format!(
            "asset '{}' has not been created",
            asset.display_name()
        )));
    }
    Ok(asset)
}

/// A label that exists on the backend.
fn created_label(target: &State, handle: LabelHandle) -> Result<&Label> {
    let label = target
        .labels
        .get(handle)
        .ok_or_else(|| Error::invalid("change refers to an unknown label"))?;
    if label.id == 0 {
        return Err(Error::invalid(format!(
            "label '{}' has not been created",
            label.display_name()
        )));
    }
    Ok(label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::context::NoProgress;
    use crate::diff::diff;
    use crate::model::DocumentFormat;
    use crate::schema::{Collector, CollectorMap};
    use crate::snapshot::fetch_current_state;
    use std::path::Path;

    const TARGET: &str = r#"
container: {id: 42}
zones: [{zone: 3, name: DMZ}]
labels:
  prod: {name: prod, color: red}
assets:
  - name: web1
    zone: 3
    mode: maintenance
    labels: [prod]
    disabledChecks: [{collector: snmp, check: uptime}]
    collectors:
      - key: snmp
        config: {community: public}
"#;

    fn target() -> State {
        State::parse(TARGET, DocumentFormat::Yaml, Path::new("t.yaml")).unwrap()
    }

    fn schema() -> CollectorMap {
        CollectorMap::from_collectors([Collector {
            key: "snmp".into(),
            ..Default::default()
        }])
    }

    #[derive(Default)]
    struct Recorder(Vec<(usize, usize, String)>);

    impl ProgressCallback for Recorder {
        fn on_phase(&mut self, _message: &str) {}
        fn on_change_list(&mut self, _changes: &[Change]) {}
        fn on_change_start(&mut self, index: usize, total: usize, change: &Change) {
            self.0.push((index, total, change.description.clone()));
        }
    }

    #[test]
    fn test_created_ids_flow_to_later_changes() {
        let backend = MockBackend::new(42);
        let current = fetch_current_state(&backend, 42).unwrap();
        let mut target = target();
        let changes = diff(&current, &target, false, &schema(), &backend).unwrap();

        let mut progress = Recorder::default();
        let summary = execute(&changes, &mut target, &backend, &mut progress).unwrap();
        assert_eq!(summary.created, 3);
        assert_eq!(summary.total(), changes.len());
        assert_eq!(progress.0.len(), changes.len());
        assert_eq!(progress.0[0].0, 1);
        assert_eq!(progress.0[0].1, changes.len());

        let asset_id = target.assets[0].id;
        let label_id = target.labels.label_by_key("prod").unwrap().id;
        assert_ne!(asset_id, 0);
        assert_ne!(label_id, 0);

        let remote = backend.asset(asset_id).unwrap();
        assert_eq!(remote.zone, Some(3));
        assert_eq!(remote.mode, "maintenance");
        assert_eq!(remote.labels, vec![label_id]);
        assert_eq!(remote.disabled_checks.len(), 1);
        assert_eq!(remote.collectors[0].key, "snmp");
        assert_eq!(backend.label(label_id).unwrap().color, "red");
    }

    #[test]
    fn test_apply_then_diff_is_idempotent() {
        let backend = MockBackend::new(42);
        let current = fetch_current_state(&backend, 42).unwrap();
        let mut target = target();
        let changes = diff(&current, &target, true, &schema(), &backend).unwrap();
        execute(&changes, &mut target, &backend, &mut NoProgress).unwrap();

        let after = fetch_current_state(&backend, 42).unwrap();
        let again = diff(&after, &target, true, &schema(), &backend).unwrap();
        assert!(again.is_empty(), "{again:?}");
    }

    #[test]
    fn test_halts_on_first_failure() {
        let backend = MockBackend::new(42);
        backend.fail_on("create_label");
        let current = fetch_current_state(&backend, 42).unwrap();
        let mut target = target();
        let changes = diff(&current, &target, false, &schema(), &backend).unwrap();

        let err = execute(&changes, &mut target, &backend, &mut NoProgress).unwrap_err();
        match err {
            Error::ChangeFailed {
                index,
                total,
                description,
                ..
            } => {
                assert_eq!(index, 2);
                assert_eq!(total, changes.len());
                assert_eq!(description, "Create new label: prod");
            }
            other => panic!("Expected ChangeFailed, got {other:?}"),
        }
        // The zone was created before the failure, nothing after it ran.
        assert_eq!(backend.mutations(), vec!["upsert_zone 3 DMZ", "create_label prod"]);
        assert!(backend.asset_named("web1").is_none());
    }

    #[test]
    fn test_uncreated_asset_is_rejected() {
        let backend = MockBackend::new(42);
        let mut target = target();
        let handle = target.asset_handles().next().unwrap();
        let changes = vec![Change::new(
            "Set mode",
            Operation::SetAssetMode { asset: handle },
        )];
        let err = execute(&changes, &mut target, &backend, &mut NoProgress).unwrap_err();
        assert!(matches!(err, Error::ChangeFailed { ref source, .. } if matches!(**source, Error::Invalid(_))));
        assert!(backend.mutations().is_empty());
    }
}
