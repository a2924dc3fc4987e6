//! Collector configuration values.
//!
//! Documents carry collector configuration as an open key/value map. It is
//! decoded into a [`ConfigValue`] tree and then checked and coerced against
//! the collector's declared options.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A collector configuration: option key to value.
pub type Config = BTreeMap<String, ConfigValue>;

/// A dynamically typed configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<ConfigValue>),
    Map(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    /// Name of the runtime type, used in validation messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "floating point",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// Integral floats become integers, everything else is returned as is.
    pub fn to_int_if_integral(&self) -> Self {
        match self {
            Self::Float(f) if is_integral(*f) => Self::Int(*f as i64),
            other => other.clone(),
        }
    }

    /// Integers are widened to floats, everything else is returned as is.
    pub fn to_float(&self) -> Self {
        match self {
            Self::Int(i) => Self::Float(*i as f64),
            other => other.clone(),
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::String(s) => write!(f, "{s}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

fn is_integral(value: f64) -> bool {
    value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64
}
