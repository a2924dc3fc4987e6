//! Collector configuration checks and normalisation.
//!
//! Configuration values arrive as an untyped tree. Before anything is sent to
//! the backend they are coerced to the declared option types, checked, and
//! completed with the option defaults so that the diff compares full configs.

use log::debug;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::model::{Asset, State};
use crate::schema::{Collector, CollectorMap, CollectorOption, OptionType};
use crate::value::{Config, ConfigValue};

/// Placeholder sent instead of a secret during the remote check.
pub const REDACTED: &str = "xxx";

const SECRET_KEYS: &[&str] = &["password", "secret"];

/// Key under which the backend stores the `use` option.
const REMOTE_USE_KEY: &str = "_use";
const DOCUMENT_USE_KEY: &str = "use";

/// Coerce numbers to the declared type. Anything else is returned unchanged.
pub fn coerce_value(option_type: OptionType, value: &ConfigValue) -> ConfigValue {
    match (option_type, value) {
        (OptionType::Int, v) => v.to_int_if_integral(),
        (OptionType::Float, v) => v.to_float(),
        (OptionType::ListInt, ConfigValue::List(items)) => {
            ConfigValue::List(items.iter().map(ConfigValue::to_int_if_integral).collect())
        }
        (OptionType::ListFloat, ConfigValue::List(items)) => {
            ConfigValue::List(items.iter().map(ConfigValue::to_float).collect())
        }
        (_, v) => v.clone(),
    }
}

/// Coerce every known key of `config` to its option type.
pub fn coerce_config(config: &Config, collector: &Collector) -> Config {
    config
        .iter()
        .map(|(key, value)| {
            let value = match collector.option(key) {
                Some(option) => coerce_value(option.option_type, value),
                None => value.clone(),
            };
            (key.clone(), value)
        })
        .collect()
}

/// A new config with every missing option filled in from its default.
pub fn with_defaults(config: &Config, collector: &Collector) -> Config {
    let mut merged = config.clone();
    for option in &collector.options {
        merged
            .entry(option.key.clone())
            .or_insert_with(|| option.default.clone());
    }
    merged
}

/// Coerce the configs of every known collector binding to the option types.
///
/// Bindings without a config are left alone.
pub fn coerce_configs(assets: &mut [Asset], collectors: &CollectorMap) {
    for_each_config(assets, collectors, coerce_config);
}

/// Fill missing keys from the option defaults. Runs after [`validate_assets`];
/// defaults are not type-checked.
pub fn backfill_defaults(assets: &mut [Asset], collectors: &CollectorMap) {
    for_each_config(assets, collectors, with_defaults);
}

fn for_each_config(
    assets: &mut [Asset],
    collectors: &CollectorMap,
    f: impl Fn(&Config, &Collector) -> Config,
) {
    for asset in assets {
        for binding in asset.collectors.iter_mut().flatten() {
            let (Some(collector), Some(config)) = (collectors.get(&binding.key), &binding.config)
            else {
                continue;
            };
            binding.config = Some(f(config, collector));
        }
    }
}

/// Check every collector binding of the target assets against the schema.
pub fn validate_assets(target: &State, collectors: &CollectorMap) -> Result<()> {
    for asset in &target.assets {
        for binding in asset.collectors.iter().flatten() {
            let invalid = |message: String| Error::Validation {
                collector: binding.key.clone(),
                asset: asset.display_name(),
                message,
            };
            let collector = collectors
                .get(&binding.key)
                .ok_or_else(|| invalid("is not available in this container".to_string()))?;
            for (key, value) in binding.config.iter().flatten() {
                let option = collector.option(key).ok_or_else(|| {
                    invalid(format!("contains an unknown configuration property '{key}'"))
                })?;
                check_value(option, value).map_err(invalid)?;
            }
        }
    }
    Ok(())
}

fn check_value(option: &CollectorOption, value: &ConfigValue) -> std::result::Result<(), String> {
    let key = &option.key;
    if option.option_type == OptionType::String && SECRET_KEYS.contains(&key.as_str()) {
        return if is_secret(value) {
            Ok(())
        } else {
            Err(format!(
                "expects property '{key}' to be a string or encryption value"
            ))
        };
    }
    if let Some(element) = option.option_type.element() {
        let ConfigValue::List(items) = value else {
            return Err(format!(
                "expects a list of values for property '{key}' but found type {}",
                value.type_name()
            ));
        };
        return match items.iter().find(|item| !matches_scalar(element, item)) {
            Some(item) => Err(format!(
                "expects {} for property '{key}' but the list contains type {}",
                option.option_type.expectation(),
                item.type_name()
            )),
            None => Ok(()),
        };
    }
    if matches_scalar(option.option_type, value) {
        Ok(())
    } else {
        Err(format!(
            "expects {} for property '{key}' but found type {}",
            option.option_type.expectation(),
            value.type_name()
        ))
    }
}

fn matches_scalar(option_type: OptionType, value: &ConfigValue) -> bool {
    matches!(
        (option_type, value),
        (OptionType::Bool, ConfigValue::Bool(_))
            | (OptionType::Int, ConfigValue::Int(_))
            | (OptionType::Float, ConfigValue::Float(_))
            | (OptionType::String, ConfigValue::String(_))
            | (OptionType::Other, _)
    )
}

/// A plain string or `{"encrypted": <string>}`.
fn is_secret(value: &ConfigValue) -> bool {
    match value {
        ConfigValue::String(_) => true,
        ConfigValue::Map(map) => {
            map.len() == 1 && matches!(map.get("encrypted"), Some(ConfigValue::String(_)))
        }
        _ => false,
    }
}

/// A copy of `config` with secrets replaced by [`REDACTED`].
pub fn sanitize(config: &Config) -> Config {
    config
        .iter()
        .map(|(key, value)| {
            let value = if SECRET_KEYS.contains(&key.as_str()) {
                ConfigValue::String(REDACTED.to_string())
            } else {
                value.clone()
            };
            (key.clone(), value)
        })
        .collect()
}

/// Submit every target binding to the backend's config verification.
pub fn remote_check<B: Backend + ?Sized>(target: &State, backend: &B) -> Result<()> {
    for asset in &target.assets {
        for binding in asset.collectors.iter().flatten() {
            let config = binding.config.as_ref().map(sanitize).unwrap_or_default();
            debug!("Verifying config of '{}' on '{}'", binding.key, asset.display_name());
            backend
                .verify_collector_config(&binding.key, &config)
                .map_err(|e| Error::Validation {
                    collector: binding.key.clone(),
                    asset: asset.display_name(),
                    message: format!("was rejected by the remote check: {e}"),
                })?;
        }
    }
    Ok(())
}

/// Rename `use` to the backend's `_use` in every config.
pub fn to_remote_keys(assets: &mut [Asset]) {
    rename_key(assets, DOCUMENT_USE_KEY, REMOTE_USE_KEY);
}

/// Rename the backend's `_use` to `use` in every config.
pub fn to_document_keys(assets: &mut [Asset]) {
    rename_key(assets, REMOTE_USE_KEY, DOCUMENT_USE_KEY);
}

fn rename_key(assets: &mut [Asset], from: &str, to: &str) {
    for asset in assets {
        for binding in asset.collectors.iter_mut().flatten() {
            if let Some(config) = binding.config.as_mut()
                && let Some(value) = config.remove(from)
            {
                config.insert(to.to_string(), value);
            }
        }
    }
}

/// Replace every asset kind with its canonical spelling from `catalog`.
pub fn normalize_kinds(assets: &mut [Asset], catalog: &[String]) -> Result<()> {
    for asset in assets.iter_mut().filter(|a| !a.kind.is_empty()) {
        let canonical = catalog
            .iter()
            .find(|kind| kind.eq_ignore_ascii_case(&asset.kind))
            .ok_or_else(|| {
                Error::invalid(format!(
                    "Asset '{}' has an invalid asset kind: {}",
                    asset.display_name(),
                    asset.kind
                ))
            })?;
        asset.kind = canonical.clone();
    }
    Ok(())
}
