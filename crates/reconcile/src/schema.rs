//! Collector schema as declared by the backend.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::validate::coerce_value;
use crate::value::ConfigValue;

/// A data-collection plugin and the options it accepts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collector {
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub info: String,
    #[serde(default)]
    pub checks: Vec<String>,
    #[serde(default)]
    pub options: Vec<CollectorOption>,
}

/// One declared configuration option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorOption {
    pub key: String,
    #[serde(rename = "type")]
    pub option_type: OptionType,
    #[serde(default = "null_default")]
    pub default: ConfigValue,
}

fn null_default() -> ConfigValue {
    ConfigValue::Null
}

/// Declared type of a collector option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionType {
    Bool,
    Int,
    Float,
    String,
    ListBool,
    ListInt,
    ListFloat,
    ListString,
    /// A type this tool does not know; values are accepted as is.
    #[serde(other)]
    Other,
}

impl OptionType {
    /// Element type of a list type.
    pub fn element(self) -> Option<OptionType> {
        match self {
            Self::ListBool => Some(Self::Bool),
            Self::ListInt => Some(Self::Int),
            Self::ListFloat => Some(Self::Float),
            Self::ListString => Some(Self::String),
            _ => None,
        }
    }

    /// Phrase used in validation messages, e.g. "an integer value".
    pub fn expectation(self) -> &'static str {
        match self {
            Self::Bool => "a boolean value",
            Self::Int => "an integer value",
            Self::Float => "a floating point",
            Self::String => "a string value",
            Self::ListBool => "a list of boolean values",
            Self::ListInt => "a list of integer values",
            Self::ListFloat => "a list of floating point values",
            Self::ListString => "a list of string values",
            Self::Other => "a value",
        }
    }
}

/// Collectors visible in a container, keyed by collector key.
///
/// Option defaults are coerced once when the map is built and never mutated
/// afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectorMap {
    collectors: BTreeMap<String, Collector>,
}

impl CollectorMap {
    pub fn from_collectors(collectors: impl IntoIterator<Item = Collector>) -> Self {
        let collectors = collectors
            .into_iter()
            .map(|mut collector| {
                for option in &mut collector.options {
                    option.default = coerce_value(option.option_type, &option.default);
                }
                (collector.key.clone(), collector)
            })
            .collect();
        Self { collectors }
    }

    pub fn get(&self, key: &str) -> Option<&Collector> {
        self.collectors.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.collectors.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}

impl Collector {
    pub fn option(&self, key: &str) -> Option<&CollectorOption> {
        self.options.iter().find(|o| o.key == key)
    }
}
