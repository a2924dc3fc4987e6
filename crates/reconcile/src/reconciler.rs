//! The apply workflow: read, validate, diff, confirm, execute.
//!
//! [`Reconciler`] drives one run against a single container. Every
//! question goes through a [`ConfirmCallback`] and every status message
//! through a [`ProgressCallback`], so the same workflow runs interactively
//! and in tests.

use chrono::Utc;
use log::{debug, info, warn};
use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::backend::{Backend, COLLECTOR_FIELDS};
use crate::cache::{StateCache, humanize_age};
use crate::change::Change;
use crate::context::{ConfirmCallback, ProgressCallback};
use crate::diff::{collector_visibility, diff};
use crate::error::{Error, Result};
use crate::executor::{ExecuteSummary, execute};
use crate::model::State;
use crate::schema::CollectorMap;
use crate::snapshot::fetch_current_state;
use crate::validate::{
    backfill_defaults, coerce_configs, normalize_kinds, remote_check, to_remote_keys, validate_assets,
};

/// Options for one apply run
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Compute and show changes, never mutate
    pub dry_run: bool,
    /// Also remove what the target does not declare
    pub purge: bool,
    /// Offer a fresh cached snapshot instead of fetching
    pub use_cache: bool,
    /// Wait after enabling collectors before refetching the schema
    pub propagation_delay: Duration,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            purge: false,
            use_cache: true,
            propagation_delay: Duration::from_secs(1),
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Current state already matches the target
    NoChanges,
    /// Dry run; nothing was mutated
    DryRun { changes: Vec<Change> },
    /// Every change was applied
    Applied {
        changes: Vec<Change>,
        summary: ExecuteSummary,
    },
    /// The user declined a confirmation
    Cancelled,
}

/// Reconciles target documents against one backend.
pub struct Reconciler<'a, B: Backend + ?Sized> {
    backend: &'a B,
    cache: Option<&'a StateCache>,
    options: ApplyOptions,
}

impl<'a, B: Backend + ?Sized> Reconciler<'a, B> {
    pub fn new(backend: &'a B, options: ApplyOptions) -> Self {
        Self {
            backend,
            cache: None,
            options,
        }
    }

    #[must_use]
    pub fn with_cache(mut self, cache: &'a StateCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Read a target document and apply it.
    pub fn apply_file<C, P>(&self, path: &Path, confirm: &mut C, progress: &mut P) -> Result<Outcome>
    where
        C: ConfirmCallback + ?Sized,
        P: ProgressCallback + ?Sized,
    {
        progress.on_phase("Read input file...");
        let mut target = State::from_file(path)?;
        self.apply(&mut target, confirm, progress)
    }

    /// Apply `target`. Created entities get their IDs written into it.
    pub fn apply<C, P>(&self, target: &mut State, confirm: &mut C, progress: &mut P) -> Result<Outcome>
    where
        C: ConfirmCallback + ?Sized,
        P: ProgressCallback + ?Sized,
    {
        let container_id = target.container.id;
        if container_id == 0 {
            return Err(Error::invalid("missing container ID in input file"));
        }

        if !self.options.dry_run {
            progress.on_phase("Check token permissions...");
            self.backend.fetch_permissions(container_id)?.check_apply()?;
        }

        let mut current = self.current_state(container_id, confirm, progress)?;

        if target.has_asset_kind() {
            progress.on_phase("Read asset kinds...");
            let kinds = self.backend.fetch_asset_kinds()?;
            normalize_kinds(&mut target.assets, &kinds)?;
        }

        let mut collectors = CollectorMap::default();
        if target.has_collectors() {
            to_remote_keys(&mut target.assets);
            to_remote_keys(&mut current.assets);

            progress.on_phase("Read collectors...");
            collectors = self.fetch_collectors(container_id)?;

            let hidden = collector_visibility(target, &collectors);
            if !hidden.is_empty() {
                let n = hidden.len();
                let prompt = if self.options.dry_run {
                    format!(
                        "To run a more accurate dry run, {n} collector{} need to be enabled. Proceed?",
                        plural(n)
                    )
                } else {
                    format!(
                        "To continue, {n} collector{} must be enabled. Proceed?",
                        plural(n)
                    )
                };
                if !confirm.confirm(&prompt)? {
                    return Ok(Outcome::Cancelled);
                }
                self.clear_cache(container_id);
                progress.on_phase("Enable collectors...");
                execute(&hidden, target, self.backend, progress)?;
                thread::sleep(self.options.propagation_delay);
                collectors = self.fetch_collectors(container_id)?;
            }

            coerce_configs(&mut target.assets, &collectors);
            coerce_configs(&mut current.assets, &collectors);

            let remote = confirm.confirm(
                "Perform remote configuration check? (Local check is faster, remote is more thorough)",
            )?;
            validate_assets(target, &collectors)?;
            if remote {
                remote_check(target, self.backend)?;
            }
            backfill_defaults(&mut target.assets, &collectors);
            backfill_defaults(&mut current.assets, &collectors);
        }

        let changes = diff(
            &current,
            target,
            self.options.purge,
            &collectors,
            self.backend,
        )?;
        if changes.is_empty() {
            return Ok(Outcome::NoChanges);
        }

        let n = changes.len();
        if confirm.confirm(&format!("Found {n} change{}. Show details?", plural(n)))? {
            progress.on_change_list(&changes);
        }

        if self.options.dry_run {
            return Ok(Outcome::DryRun { changes });
        }

        if !confirm.confirm(&format!("Do you want to apply the change{}?", plural(n)))? {
            return Ok(Outcome::Cancelled);
        }

        self.clear_cache(container_id);
        let summary = execute(&changes, target, self.backend, progress)?;
        info!("Applied {} changes to container {container_id}", summary.total());
        Ok(Outcome::Applied { changes, summary })
    }

    /// Offer a fresh cache, otherwise fetch and store a new snapshot.
    fn current_state<C, P>(&self, container_id: u64, confirm: &mut C, progress: &mut P) -> Result<State>
    where
        C: ConfirmCallback + ?Sized,
        P: ProgressCallback + ?Sized,
    {
        if self.options.use_cache
            && let Some(cache) = self.cache
            && let Some((state, age)) = cache.load_fresh(container_id, Utc::now())
        {
            let prompt = format!(
                "A cache for container ID {container_id} was found that is only {} old. \
                 Would you like to use it?",
                humanize_age(age)
            );
            if confirm.confirm(&prompt)? {
                debug!("Using cached state of container {container_id}");
                return Ok(state);
            }
        }

        progress.on_phase("Read current state...");
        let state = fetch_current_state(self.backend, container_id)?;
        if let Some(cache) = self.cache
            && let Err(e) = cache.store(&state)
        {
            warn!("Failed to write cache: {e}");
        }
        Ok(state)
    }

    fn fetch_collectors(&self, container_id: u64) -> Result<CollectorMap> {
        let collectors = self
            .backend
            .fetch_collectors(container_id, COLLECTOR_FIELDS, true)?;
        Ok(CollectorMap::from_collectors(collectors))
    }

    fn clear_cache(&self, container_id: u64) {
        if let Some(cache) = self.cache
            && let Err(e) = cache.clear(container_id)
        {
            warn!("Failed to remove cache: {e}");
        }
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RemoteAsset;
    use crate::backend::mock::MockBackend;
    use crate::context::{AutoDecline, NoProgress};
    use crate::model::DocumentFormat;
    use crate::schema::{Collector, CollectorOption, OptionType};
    use crate::value::ConfigValue;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    /// Answers prompts from a script; unscripted prompts are declined.
    #[derive(Default)]
    struct Script {
        answers: VecDeque<bool>,
        prompts: Vec<String>,
    }

    impl Script {
        fn new(answers: &[bool]) -> Self {
            Self {
                answers: answers.iter().copied().collect(),
                prompts: Vec::new(),
            }
        }
    }

    impl ConfirmCallback for Script {
        fn confirm(&mut self, prompt: &str) -> Result<bool> {
            self.prompts.push(prompt.to_string());
            Ok(self.answers.pop_front().unwrap_or(false))
        }
    }

    const TARGET: &str = r#"
container: {id: 42}
zones: [{zone: 3, name: DMZ}]
labels:
  prod: {name: prod}
assets:
  - {name: web1, zone: 3, labels: [prod]}
"#;

    fn target(yaml: &str) -> State {
        State::parse(yaml, DocumentFormat::Yaml, Path::new("t.yaml")).unwrap()
    }

    fn options() -> ApplyOptions {
        ApplyOptions {
            use_cache: false,
            propagation_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    #[test]
    fn test_apply_end_to_end() {
        let backend = MockBackend::new(42);
        let reconciler = Reconciler::new(&backend, options());
        let mut script = Script::new(&[false, true]);
        let mut state = target(TARGET);

        let outcome = reconciler.apply(&mut state, &mut script, &mut NoProgress).unwrap();
        let Outcome::Applied { changes, summary } = outcome else {
            panic!("Expected Applied, got {outcome:?}");
        };
        assert_eq!(changes.len(), 5);
        assert_eq!(summary.created, 3);
        assert_eq!(
            script.prompts,
            vec!["Found 5 changes. Show details?", "Do you want to apply the changes?"]
        );
        let web1 = backend.asset_named("web1").unwrap();
        assert_eq!(web1.zone, Some(3));
        assert_eq!(web1.labels.len(), 1);

        // Same document with the assigned IDs: nothing left to do.
        let again = reconciler
            .apply(&mut state, &mut Script::default(), &mut NoProgress)
            .unwrap();
        assert_eq!(again, Outcome::NoChanges);
    }

    #[test]
    fn test_dry_run_never_mutates() {
        let backend = MockBackend::new(42);
        backend.set_permissions(&[]);
        let reconciler = Reconciler::new(
            &backend,
            ApplyOptions {
                dry_run: true,
                ..options()
            },
        );
        let outcome = reconciler
            .apply(&mut target(TARGET), &mut Script::new(&[true]), &mut NoProgress)
            .unwrap();
        assert!(matches!(outcome, Outcome::DryRun { ref changes } if changes.len() == 5));
        assert!(backend.mutations().is_empty());
        assert!(!backend.calls().iter().any(|c| c.starts_with("fetch_permissions")));
    }

    #[test]
    fn test_declined_apply_is_cancelled() {
        let backend = MockBackend::new(42);
        let reconciler = Reconciler::new(&backend, options());
        let outcome = reconciler
            .apply(&mut target(TARGET), &mut Script::new(&[false, false]), &mut NoProgress)
            .unwrap();
        assert_eq!(outcome, Outcome::Cancelled);
        assert!(backend.mutations().is_empty());
    }

    #[test]
    fn test_missing_permissions() {
        let backend = MockBackend::new(42);
        backend.set_permissions(&["API", "READ"]);
        let reconciler = Reconciler::new(&backend, options());
        let err = reconciler
            .apply(&mut target(TARGET), &mut Script::default(), &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, Error::MissingPermissions(ref missing) if missing.len() == 4));
    }

    #[test]
    fn test_missing_container_id() {
        let backend = MockBackend::new(42);
        let reconciler = Reconciler::new(&backend, options());
        let err = reconciler
            .apply(&mut target("assets: []"), &mut Script::default(), &mut NoProgress)
            .unwrap_err();
        assert_eq!(err.to_string(), "missing container ID in input file");
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_hidden_collectors_are_enabled_first() {
        let backend = MockBackend::new(42);
        backend.add_collector(
            Collector {
                key: "snmp".into(),
                options: vec![CollectorOption {
                    key: "port".into(),
                    option_type: OptionType::Int,
                    default: ConfigValue::Int(161),
                }],
                ..Default::default()
            },
            false,
        );
        let reconciler = Reconciler::new(&backend, options());
        let mut state = target(
            "container: {id: 42}\nassets:\n  - name: sw1\n    collectors: [{key: snmp, config: {}}]\n",
        );
        // enable, remote check, show details, apply
        let mut script = Script::new(&[true, true, false, true]);
        let outcome = reconciler.apply(&mut state, &mut script, &mut NoProgress).unwrap();

        assert_eq!(
            script.prompts[0],
            "To continue, 1 collector must be enabled. Proceed?"
        );
        assert!(backend.collector_displayed("snmp"));
        assert_eq!(backend.verified_configs().len(), 1);
        let Outcome::Applied { changes, .. } = outcome else {
            panic!("Expected Applied, got {outcome:?}");
        };
        // The visibility change already ran before the diff.
        assert!(changes.iter().all(|c| !c.description.starts_with("Enable collector")));
        let sw1 = backend.asset_named("sw1").unwrap();
        let config = sw1.collectors[0].config.clone().unwrap();
        assert_eq!(config.get("port"), Some(&ConfigValue::Int(161)));
    }

    #[test]
    fn test_null_default_is_backfilled_after_validation() {
        let backend = MockBackend::new(42);
        backend.add_collector(
            Collector {
                key: "wmi".into(),
                options: vec![
                    CollectorOption {
                        key: "address".into(),
                        option_type: OptionType::String,
                        default: ConfigValue::Null,
                    },
                    CollectorOption {
                        key: "port".into(),
                        option_type: OptionType::Int,
                        default: ConfigValue::Int(135),
                    },
                ],
                ..Default::default()
            },
            true,
        );
        let reconciler = Reconciler::new(&backend, options());
        let mut state = target(
            "container: {id: 42}\nassets:\n  - name: win1\n    collectors: [{key: wmi, config: {port: 5}}]\n",
        );
        // remote check, show details, apply
        let mut script = Script::new(&[false, false, true]);
        let outcome = reconciler.apply(&mut state, &mut script, &mut NoProgress).unwrap();

        assert!(matches!(outcome, Outcome::Applied { .. }));
        let win1 = backend.asset_named("win1").unwrap();
        let config = win1.collectors[0].config.clone().unwrap();
        assert_eq!(config.get("port"), Some(&ConfigValue::Int(5)));
        assert_eq!(config.get("address"), Some(&ConfigValue::Null));
    }

    #[test]
    fn test_declined_collector_enable_is_cancelled() {
        let backend = MockBackend::new(42);
        backend.add_collector(
            Collector {
                key: "snmp".into(),
                ..Default::default()
            },
            false,
        );
        let reconciler = Reconciler::new(&backend, options());
        let mut state =
            target("container: {id: 42}\nassets:\n  - name: sw1\n    collectors: [{key: snmp}]\n");
        let outcome = reconciler
            .apply(&mut state, &mut AutoDecline, &mut NoProgress)
            .unwrap();
        assert_eq!(outcome, Outcome::Cancelled);
        assert!(backend.mutations().is_empty());
    }

    #[test]
    fn test_fresh_cache_is_offered_and_cleared() {
        let dir = TempDir::new().unwrap();
        let cache = StateCache::new(dir.path());
        let backend = MockBackend::new(42);
        backend.add_asset(RemoteAsset {
            id: 7,
            name: "db".into(),
            ..Default::default()
        });
        cache
            .store(&fetch_current_state(&backend, 42).unwrap())
            .unwrap();
        let fetches = backend.calls().len();

        let reconciler = Reconciler::new(
            &backend,
            ApplyOptions {
                use_cache: true,
                ..options()
            },
        )
        .with_cache(&cache);
        let mut state = target("container: {id: 42}\nassets:\n  - {id: 7, name: db2}\n");
        let mut script = Script::new(&[true, false, true]);
        let outcome = reconciler.apply(&mut state, &mut script, &mut NoProgress).unwrap();

        assert!(script.prompts[0].starts_with("A cache for container ID 42 was found that is only"));
        assert!(matches!(outcome, Outcome::Applied { .. }));
        // Only the permission check and the mutation hit the backend.
        assert_eq!(
            backend.calls()[fetches..],
            ["fetch_permissions 42".to_string(), "set_asset_name 7 db2".to_string()]
        );
        assert!(cache.load(42).is_none());
    }

    #[test]
    fn test_invalid_asset_kind() {
        let backend = MockBackend::new(42);
        let reconciler = Reconciler::new(&backend, options());
        let mut state = target("container: {id: 42}\nassets:\n  - {name: a, kind: toaster}\n");
        let err = reconciler
            .apply(&mut state, &mut Script::default(), &mut NoProgress)
            .unwrap_err();
        assert_eq!(err.to_string(), "Asset 'a' has an invalid asset kind: toaster");
    }

    #[test]
    fn test_asset_kind_is_normalized() {
        let backend = MockBackend::new(42);
        let reconciler = Reconciler::new(&backend, options());
        let mut state = target("container: {id: 42}\nassets:\n  - {name: a, kind: linux}\n");
        reconciler
            .apply(&mut state, &mut Script::new(&[false, true]), &mut NoProgress)
            .unwrap();
        assert_eq!(backend.asset_named("a").unwrap().kind, "Linux");
    }
}
