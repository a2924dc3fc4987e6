//! Diff engine: compare a target state against the current state.
//!
//! Changes are generated in a fixed phase order (collector visibility,
//! zones, labels, assets) and executed in exactly that order, so every
//! entity a change refers to is created by an earlier change. Problems in
//! the target document are fatal; the diff never skips an entity.

use log::debug;
use std::collections::{BTreeSet, HashSet};

use crate::backend::Backend;
use crate::change::{Change, Operation, short};
use crate::error::{Error, Result};
use crate::labels::LabelHandle;
use crate::model::{Asset, AssetHandle, AssetMode, Label, State};
use crate::schema::CollectorMap;
use crate::value::Config;

const SHORT_DESCRIPTION: usize = 12;

/// Collectors referenced by the target that the container does not show yet.
pub fn collector_visibility(target: &State, collectors: &CollectorMap) -> Vec<Change> {
    let mut seen = HashSet::new();
    target
        .assets
        .iter()
        .flat_map(|a| a.collectors.iter().flatten())
        .filter(|binding| !collectors.contains(&binding.key) && seen.insert(binding.key.as_str()))
        .map(|binding| {
            Change::new(
                format!("Enable collector: {}", binding.key),
                Operation::SetCollectorDisplay {
                    collector: binding.key.clone(),
                    display: true,
                },
            )
        })
        .collect()
}

/// Compute the ordered changes that turn `current` into `target`.
///
/// Labels the target references by ID but the current state does not know
/// are fetched from `backend` in one batch.
pub fn diff<B: Backend + ?Sized>(
    current: &State,
    target: &State,
    purge: bool,
    collectors: &CollectorMap,
    backend: &B,
) -> Result<Vec<Change>> {
    let mut differ = Differ {
        current,
        target,
        purge,
        backend,
        changes: collector_visibility(target, collectors),
    };
    differ.check_structure()?;
    differ.zones()?;
    differ.labels()?;
    differ.assets()?;
    debug!("Diff produced {} changes", differ.changes.len());
    Ok(differ.changes)
}

struct Differ<'a, B: ?Sized> {
    current: &'a State,
    target: &'a State,
    purge: bool,
    backend: &'a B,
    changes: Vec<Change>,
}

impl<B: Backend + ?Sized> Differ<'_, B> {
    fn push(&mut self, description: String, operation: Operation) {
        self.changes.push(Change::new(description, operation));
    }

    /// Disabled checks must belong to a bound collector; modes must be valid.
    fn check_structure(&self) -> Result<()> {
        for asset in &self.target.assets {
            let bound = match (&asset.collectors, asset.id) {
                (Some(collectors), _) => Some(collectors.as_slice()),
                (None, 0) => Some(&[][..]),
                (None, id) => self
                    .current
                    .asset_by_id(id)
                    .and_then(|ca| ca.collectors.as_deref()),
            };
            if let Some(bound) = bound {
                for check in asset.disabled_checks.iter().flatten() {
                    if !bound.iter().any(|c| c.key == check.collector) {
                        return Err(Error::invalid(format!(
                            "Collector '{}' is not configured for asset '{}', but a disabled check for it exists.",
                            check.collector,
                            asset.display_name()
                        )));
                    }
                }
            }
            if !asset.mode.is_empty() {
                asset.mode.parse::<AssetMode>().map_err(|e| {
                    Error::invalid(format!("Asset '{}' has an {e}", asset.display_name()))
                })?;
            }
        }
        Ok(())
    }

    fn zones(&mut self) -> Result<()> {
        let (current, target) = (self.current, self.target);
        for tz in &target.zones {
            if !(1..=9).contains(&tz.zone) {
                return Err(Error::invalid(format!(
                    "Invalid zone '{}'. Must be a value between 1 and 9.",
                    tz.zone
                )));
            }
            match current.zone(tz.zone) {
                None => {
                    if tz.name.is_empty() {
                        return Err(Error::invalid(format!(
                            "Zone '{}' is new and therefore requires a name",
                            tz.zone
                        )));
                    }
                    self.push(
                        format!("Create new zone: {}", tz.display_name()),
                        Operation::CreateZone {
                            zone: tz.zone,
                            name: tz.name.clone(),
                        },
                    );
                }
                Some(cz) if !tz.name.is_empty() && tz.name != cz.name => {
                    self.push(
                        format!(
                            "Rename zone ID {} from '{}' to '{}'",
                            tz.zone, cz.name, tz.name
                        ),
                        Operation::RenameZone {
                            zone: tz.zone,
                            name: tz.name.clone(),
                        },
                    );
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn labels(&mut self) -> Result<()> {
        let (current, target) = (self.current, self.target);
        let mut missing = BTreeSet::new();
        for (handle, _, tl) in target.labels.iter() {
            if tl.id == 0 {
                if tl.name.is_empty() {
                    return Err(Error::invalid(
                        "One or more labels are missing both an 'id' and a 'name'. \
                         At least one of these attributes is required for each label.",
                    ));
                }
                self.push(
                    format!("Create new label: {}", tl.name),
                    Operation::CreateLabel { label: handle },
                );
                self.label(&Label::default(), tl, handle);
            } else if let Some(cl) = current.labels.label_by_id(tl.id) {
                self.label(cl, tl, handle);
            } else {
                missing.insert(tl.id);
            }
        }
        if missing.is_empty() {
            return Ok(());
        }

        debug!("Fetching {} labels missing from the current state", missing.len());
        let fetched = self.backend.fetch_labels(&missing)?;
        for (handle, _, tl) in target.labels.iter() {
            if !missing.contains(&tl.id) {
                continue;
            }
            let cl = fetched
                .iter()
                .find(|l| l.id == tl.id)
                .ok_or_else(|| Error::invalid(format!("Label ID {} not found", tl.id)))?;
            self.label(cl, tl, handle);
        }
        Ok(())
    }

    fn label(&mut self, cl: &Label, tl: &Label, handle: LabelHandle) {
        let subject = if tl.id == 0 {
            format!("label '{}'", tl.name)
        } else {
            format!("label ID {}", tl.id)
        };
        if !tl.name.is_empty() && !cl.name.is_empty() && tl.name != cl.name {
            self.push(
                format!("Set name for {subject} to: {}", tl.name),
                Operation::SetLabelName { label: handle },
            );
        }
        if !tl.color.is_empty() && tl.color != cl.color {
            self.push(
                format!("Set color for {subject} to '{}'", tl.color),
                Operation::SetLabelColor { label: handle },
            );
        }
        if !tl.description.is_empty() && tl.description != cl.description {
            self.push(
                format!(
                    "Set description for {subject} to '{}'",
                    short(&tl.description, SHORT_DESCRIPTION)
                ),
                Operation::SetLabelDescription { label: handle },
            );
        }
    }

    fn assets(&mut self) -> Result<()> {
        let (current, target) = (self.current, self.target);
        for handle in target.asset_handles() {
            let Some(ta) = target.asset(handle) else {
                continue;
            };
            check_references(ta, target)?;
            if ta.id == 0 {
                if ta.name.is_empty() {
                    return Err(Error::invalid(
                        "One or more assets are missing both an 'id' and a 'name'. \
                         At least one of these attributes is required for each asset.",
                    ));
                }
                self.push(
                    format!("Create new asset: {}", ta.name),
                    Operation::CreateAsset { asset: handle },
                );
                self.asset(&Asset::blueprint(), ta, handle);
            } else {
                let ca = current
                    .asset_by_id(ta.id)
                    .ok_or_else(|| Error::AssetNotFound {
                        asset_id: ta.id,
                        container: current.container.display_name(),
                    })?;
                self.asset(ca, ta, handle);
            }
        }
        Ok(())
    }

    fn asset(&mut self, ca: &Asset, ta: &Asset, handle: AssetHandle) {
        let (current, target) = (self.current, self.target);
        let name = ta.display_name();

        if !ta.name.is_empty() && !ca.name.is_empty() && ta.name != ca.name {
            self.push(
                format!("Set name for asset '{name}' to: '{}'", ta.name),
                Operation::SetAssetName { asset: handle },
            );
        }
        if !ta.mode.is_empty() && ta.mode != ca.mode {
            self.push(
                format!("Set mode for asset '{name}' to: '{}'", ta.mode),
                Operation::SetAssetMode { asset: handle },
            );
        }
        if !ta.kind.is_empty() && ta.kind != ca.kind {
            self.push(
                format!("Set kind for asset '{name}' to: '{}'", ta.kind),
                Operation::SetAssetKind { asset: handle },
            );
        }
        if let Some(zone) = ta.zone
            && ca.zone != Some(zone)
        {
            self.push(
                format!("Set zone for asset '{name}' to: {zone}"),
                Operation::SetAssetZone { asset: handle },
            );
        }
        if !ta.description.is_empty() && ta.description != ca.description {
            self.push(
                format!(
                    "Set description for asset '{name}' to: '{}'",
                    short(&ta.description, SHORT_DESCRIPTION)
                ),
                Operation::SetAssetDescription { asset: handle },
            );
        }

        for alias in ta.labels.iter().flatten() {
            let Some(label_handle) = target.labels.handle_by_key(alias) else {
                continue;
            };
            let Some(label) = target.labels.get(label_handle) else {
                continue;
            };
            if !ca.has_label_id(label.id, &current.labels) {
                self.push(
                    format!("Add label '{}' to asset '{name}'", label.display_name()),
                    Operation::AddLabelToAsset {
                        asset: handle,
                        label: label_handle,
                    },
                );
            }
        }

        for binding in ta.collectors.iter().flatten() {
            let description = match ca.collector(&binding.key) {
                None => format!("Add collector '{}' to asset '{name}'", binding.key),
                Some(existing)
                    if config_differs(binding.config.as_ref(), existing.config.as_ref()) =>
                {
                    format!(
                        "Update collector '{}' configuration for asset '{name}'",
                        binding.key
                    )
                }
                Some(_) => continue,
            };
            self.push(
                description,
                Operation::UpsertCollector {
                    asset: handle,
                    collector: binding.key.clone(),
                },
            );
        }

        for check in ta.disabled_checks.iter().flatten() {
            if !ca.has_disabled_check(check) {
                self.push(
                    format!(
                        "Disable collector check '{}/{}' on asset '{name}'",
                        check.collector, check.check
                    ),
                    Operation::DisableCheck {
                        asset: handle,
                        check: check.clone(),
                    },
                );
            }
        }

        if self.purge {
            self.purge_asset(ca, ta, handle);
        }
    }

    /// Remove what only the current asset has, for every collection both
    /// sides declare.
    fn purge_asset(&mut self, ca: &Asset, ta: &Asset, handle: AssetHandle) {
        let (current, target) = (self.current, self.target);
        let name = ta.display_name();

        if let (Some(current_labels), Some(_)) = (&ca.labels, &ta.labels) {
            for alias in current_labels {
                let Some(label) = current.labels.label_by_key(alias) else {
                    continue;
                };
                if !ta.has_label_id(label.id, &target.labels) {
                    self.push(
                        format!("Delete label '{}' from asset '{name}'", label.display_name()),
                        Operation::DeleteLabelFromAsset {
                            asset: handle,
                            label_id: label.id,
                        },
                    );
                }
            }
        }

        if let (Some(current_checks), Some(_)) = (&ca.disabled_checks, &ta.disabled_checks) {
            for check in current_checks {
                if !ta.has_disabled_check(check) {
                    self.push(
                        format!(
                            "Enable collector check '{}/{}' on asset '{name}'",
                            check.collector, check.check
                        ),
                        Operation::EnableCheck {
                            asset: handle,
                            check: check.clone(),
                        },
                    );
                }
            }
        }

        if let (Some(current_collectors), Some(_)) = (&ca.collectors, &ta.collectors) {
            for binding in current_collectors {
                if ta.collector(&binding.key).is_none() {
                    self.push(
                        format!("Remove collector '{}' from asset '{name}'", binding.key),
                        Operation::RemoveCollector {
                            asset: handle,
                            collector: binding.key.clone(),
                        },
                    );
                }
            }
        }
    }
}

/// Every label alias and zone an asset uses must be declared in its state.
fn check_references(asset: &Asset, state: &State) -> Result<()> {
    for alias in asset.labels.iter().flatten() {
        if state.labels.handle_by_key(alias).is_none() {
            return Err(Error::invalid(format!(
                "Asset '{}' is using label reference '{alias}' which does not exist in 'labels'.",
                asset.display_name()
            )));
        }
    }
    if let Some(zone) = asset.zone
        && state.zone(zone).is_none()
    {
        return Err(Error::invalid(format!(
            "Asset '{}' is using zone ID {zone} which does not exist in 'zones'.",
            asset.display_name()
        )));
    }
    Ok(())
}

/// Whether any target key is missing from, or different in, the current
/// config. An omitted target config never differs.
fn config_differs(target: Option<&Config>, current: Option<&Config>) -> bool {
    let Some(target) = target else {
        return false;
    };
    target
        .iter()
        .any(|(key, value)| current.and_then(|c| c.get(key)) != Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::model::DocumentFormat;
    use crate::schema::Collector;
    use std::path::Path;

    fn state(yaml: &str) -> State {
        State::parse(yaml, DocumentFormat::Yaml, Path::new("test.yaml")).unwrap()
    }

    fn schema(keys: &[&str]) -> CollectorMap {
        CollectorMap::from_collectors(keys.iter().map(|k| Collector {
            key: (*k).to_string(),
            ..Default::default()
        }))
    }

    fn run(current: &State, target: &State, purge: bool) -> Result<Vec<Change>> {
        diff(current, target, purge, &schema(&["snmp", "ping"]), &MockBackend::new(42))
    }

    fn descriptions(changes: &[Change]) -> Vec<&str> {
        changes.iter().map(|c| c.description.as_str()).collect()
    }

    fn invalid_message(result: Result<Vec<Change>>) -> String {
        match result {
            Err(Error::Invalid(message)) => message,
            other => panic!("Expected Invalid error, got {other:?}"),
        }
    }

    const CURRENT: &str = r#"
container: {id: 42, name: Acme}
zones:
  - {zone: 1, name: LAN}
labels:
  x: {id: 5, name: x}
  y: {id: 6, name: y}
assets:
  - id: 10
    name: web1
    zone: 1
    mode: normal
    kind: Asset
    labels: [x, y]
    disabledChecks:
      - {collector: snmp, check: uptime}
    collectors:
      - key: snmp
        config: {port: 161, community: public}
"#;

    #[test]
    fn test_identical_states_have_no_changes() {
        let current = state(CURRENT);
        let changes = run(&current, &current.clone(), true).unwrap();
        assert!(changes.is_empty(), "{:?}", descriptions(&changes));
    }

    #[test]
    fn test_end_to_end_order() {
        let current = state("container: {id: 42}");
        let target = state(
            r#"
container: {id: 42}
zones: [{zone: 3, name: DMZ}]
labels:
  prod: {name: prod}
assets:
  - {name: web1, zone: 3, labels: [prod]}
"#,
        );
        let changes = run(&current, &target, false).unwrap();
        assert_eq!(
            descriptions(&changes),
            vec![
                "Create new zone: DMZ",
                "Create new label: prod",
                "Create new asset: web1",
                "Set zone for asset 'web1' to: 3",
                "Add label 'prod' to asset 'web1'",
            ]
        );
        assert!(matches!(changes[0].operation, Operation::CreateZone { zone: 3, .. }));
        assert!(matches!(changes[4].operation, Operation::AddLabelToAsset { .. }));
    }

    #[test]
    fn test_zone_rules() {
        let current = state("container: {id: 42}");
        for zone in [0, 10] {
            let target = state(&format!(
                "container: {{id: 42}}\nzones: [{{zone: {zone}, name: Z}}]"
            ));
            assert!(invalid_message(run(&current, &target, false)).starts_with("Invalid zone"));
        }

        let target = state("container: {id: 42}\nzones: [{zone: 5}]");
        assert_eq!(
            invalid_message(run(&current, &target, false)),
            "Zone '5' is new and therefore requires a name"
        );

        let target = state("container: {id: 42}\nzones: [{zone: 5, name: Lab}]");
        let changes = run(&current, &target, false).unwrap();
        assert_eq!(changes.len(), 1);
        assert!(matches!(changes[0].operation, Operation::CreateZone { zone: 5, .. }));
    }

    #[test]
    fn test_zone_rename() {
        let current = state(CURRENT);
        let mut target = current.clone();
        target.zones[0].name = "Office".into();
        let changes = run(&current, &target, false).unwrap();
        assert_eq!(descriptions(&changes), vec!["Rename zone ID 1 from 'LAN' to 'Office'"]);
    }

    #[test]
    fn test_purge_boundary() {
        let current = state(CURRENT);
        let target = state(
            r#"
container: {id: 42}
labels:
  x: {id: 5}
assets:
  - id: 10
    labels: [x]
    collectors: []
"#,
        );

        let additive = run(&current, &target, false).unwrap();
        assert!(additive.is_empty(), "{:?}", descriptions(&additive));

        let purged = run(&current, &target, true).unwrap();
        assert_eq!(
            descriptions(&purged),
            vec![
                "Delete label 'y' from asset '10'",
                "Remove collector 'snmp' from asset '10'",
            ]
        );
        assert!(matches!(
            purged[0].operation,
            Operation::DeleteLabelFromAsset { label_id: 6, .. }
        ));
    }

    #[test]
    fn test_purge_skips_undeclared_collections() {
        let current = state(CURRENT);
        let target = state("container: {id: 42}\nassets:\n  - id: 10\n");
        assert!(run(&current, &target, true).unwrap().is_empty());
    }

    #[test]
    fn test_purge_reenables_checks() {
        let current = state(CURRENT);
        let mut target = current.clone();
        target.assets[0].disabled_checks = Some(Vec::new());
        let changes = run(&current, &target, true).unwrap();
        assert_eq!(
            descriptions(&changes),
            vec!["Enable collector check 'snmp/uptime' on asset 'web1'"]
        );
    }

    #[test]
    fn test_asset_field_changes() {
        let current = state(CURRENT);
        let target = state(
            r#"
container: {id: 42}
zones: [{zone: 2, name: DMZ}]
assets:
  - id: 10
    name: web-01
    mode: maintenance
    kind: Linux
    zone: 2
    description: "Primary web server\nsecond line"
    disabledChecks:
      - {collector: snmp, check: uptime}
      - {collector: snmp, check: memory}
"#,
        );
        let changes = run(&current, &target, false).unwrap();
        assert_eq!(
            descriptions(&changes),
            vec![
                "Create new zone: DMZ",
                "Set name for asset 'web-01' to: 'web-01'",
                "Set mode for asset 'web-01' to: 'maintenance'",
                "Set kind for asset 'web-01' to: 'Linux'",
                "Set zone for asset 'web-01' to: 2",
                "Set description for asset 'web-01' to: 'Primary we...'",
                "Disable collector check 'snmp/memory' on asset 'web-01'",
            ]
        );
    }

    #[test]
    fn test_collector_updates() {
        let current = state(CURRENT);
        let mut target = current.clone();
        let bindings = target.assets[0].collectors.as_mut().unwrap();
        bindings[0].config = Some(Config::from([(
            "port".to_string(),
            crate::value::ConfigValue::Int(162),
        )]));
        bindings.push(crate::model::CollectorBinding {
            key: "ping".into(),
            config: None,
        });
        let changes = run(&current, &target, false).unwrap();
        assert_eq!(
            descriptions(&changes),
            vec![
                "Update collector 'snmp' configuration for asset 'web1'",
                "Add collector 'ping' to asset 'web1'",
            ]
        );

        // A subset of matching keys is not an update; no config never is.
        let bindings = target.assets[0].collectors.as_mut().unwrap();
        bindings[0].config = Some(Config::from([(
            "port".to_string(),
            crate::value::ConfigValue::Int(161),
        )]));
        bindings.truncate(1);
        assert!(run(&current, &target, false).unwrap().is_empty());
        target.assets[0].collectors.as_mut().unwrap()[0].config = None;
        assert!(run(&current, &target, false).unwrap().is_empty());
    }

    #[test]
    fn test_collector_visibility() {
        let target = state(
            r#"
container: {id: 42}
assets:
  - {name: a, collectors: [{key: wmi}, {key: snmp}]}
  - {name: b, collectors: [{key: wmi}]}
"#,
        );
        let changes = collector_visibility(&target, &schema(&["snmp"]));
        assert_eq!(descriptions(&changes), vec!["Enable collector: wmi"]);
    }

    #[test]
    fn test_new_label_changes() {
        let current = state("container: {id: 42}");
        let target = state(
            r#"
container: {id: 42}
labels:
  prod: {name: prod, color: red, description: Production}
"#,
        );
        let changes = run(&current, &target, false).unwrap();
        assert_eq!(
            descriptions(&changes),
            vec![
                "Create new label: prod",
                "Set color for label 'prod' to 'red'",
                "Set description for label 'prod' to 'Production'",
            ]
        );
    }

    #[test]
    fn test_missing_labels_are_fetched_in_one_batch() {
        let backend = MockBackend::new(42);
        backend.add_label(Label {
            id: 77,
            name: "db".into(),
            color: "blue".into(),
            ..Default::default()
        });
        backend.add_label(Label {
            id: 78,
            name: "cache".into(),
            ..Default::default()
        });
        let current = state(CURRENT);
        let target = state(
            r#"
container: {id: 42}
labels:
  db: {id: 77, color: green}
  cache: {id: 78, name: redis}
  x: {id: 5, color: black}
"#,
        );
        let changes = diff(&current, &target, false, &schema(&[]), &backend).unwrap();
        assert_eq!(
            descriptions(&changes),
            vec![
                "Set color for label ID 5 to 'black'",
                "Set color for label ID 77 to 'green'",
                "Set name for label ID 78 to: redis",
            ]
        );
        assert_eq!(backend.calls(), vec!["fetch_labels 77,78"]);
    }

    #[test]
    fn test_label_without_id_or_name() {
        let current = state("container: {id: 42}");
        let target = state("container: {id: 42}\nlabels:\n  empty: {color: red}\n");
        assert!(invalid_message(run(&current, &target, false)).contains("missing both an 'id' and a 'name'"));
    }

    #[test]
    fn test_unknown_asset_id() {
        let current = state(CURRENT);
        let target = state("container: {id: 42}\nassets:\n  - id: 99\n");
        match run(&current, &target, false) {
            Err(Error::AssetNotFound { asset_id, container }) => {
                assert_eq!(asset_id, 99);
                assert_eq!(container, "Acme");
            }
            other => panic!("Expected AssetNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_structural_errors() {
        let current = state(CURRENT);

        let target = state("container: {id: 42}\nassets:\n  - {name: a, mode: paused}\n");
        assert!(invalid_message(run(&current, &target, false)).contains("invalid mode 'paused'"));

        let target = state(
            "container: {id: 42}\nassets:\n  - name: a\n    collectors: [{key: ping}]\n    disabledChecks: [{collector: snmp, check: x}]\n",
        );
        assert!(
            invalid_message(run(&current, &target, false))
                .starts_with("Collector 'snmp' is not configured for asset 'a'")
        );

        let target = state("container: {id: 42}\nassets:\n  - {name: a, labels: [nope]}\n");
        assert!(invalid_message(run(&current, &target, false)).contains("label reference 'nope'"));

        let target = state("container: {id: 42}\nassets:\n  - {name: a, zone: 4}\n");
        assert!(invalid_message(run(&current, &target, false)).contains("zone ID 4"));

        let target = state("container: {id: 42}\nassets:\n  - {description: nameless}\n");
        assert!(invalid_message(run(&current, &target, false)).contains("missing both an 'id' and a 'name'"));
    }

    #[test]
    fn test_disabled_check_uses_current_collectors_when_undeclared() {
        let current = state(CURRENT);
        let target = state(
            "container: {id: 42}\nassets:\n  - id: 10\n    disabledChecks: [{collector: snmp, check: memory}]\n",
        );
        let changes = run(&current, &target, false).unwrap();
        assert_eq!(changes.len(), 1);

        let target = state(
            "container: {id: 42}\nassets:\n  - id: 10\n    disabledChecks: [{collector: wmi, check: memory}]\n",
        );
        assert!(run(&current, &target, false).is_err());
    }
}
