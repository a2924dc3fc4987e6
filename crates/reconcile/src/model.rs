//! Entity model shared by the current and the target state.
//!
//! The same types describe a snapshot fetched from the backend and a document
//! written by a user. Fields a document may omit are `Option` (not managed)
//! or empty strings (unspecified), never sentinel values.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::labels::LabelMap;
use crate::value::Config;

/// Root of a state. Exactly one per state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

impl Container {
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            self.id.to_string()
        } else {
            self.name.clone()
        }
    }
}

/// Numbered partition of a container, 1 to 9.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub zone: u32,
    #[serde(default)]
    pub name: String,
}

impl Zone {
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            self.zone.to_string()
        } else {
            self.name.clone()
        }
    }
}

/// A tag attachable to assets. ID 0 means the label does not exist yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    #[serde(default)]
    pub id: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub color: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Label {
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            self.id.to_string()
        } else {
            self.name.clone()
        }
    }
}

/// A check turned off for one collector on one asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisabledCheck {
    pub collector: String,
    pub check: String,
}

/// A collector bound to an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorBinding {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Config>,
}

/// A monitored entity. ID 0 means the asset does not exist yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<u32>,
    /// Label aliases, resolved through the owning state's label map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mode: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_checks: Option<Vec<DisabledCheck>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collectors: Option<Vec<CollectorBinding>>,
}

fn is_zero(id: &u64) -> bool {
    *id == 0
}

impl Asset {
    /// The state a freshly created asset has on the backend.
    pub fn blueprint() -> Self {
        Self {
            zone: Some(0),
            labels: Some(Vec::new()),
            mode: AssetMode::Normal.to_string(),
            kind: "Asset".to_string(),
            disabled_checks: Some(Vec::new()),
            collectors: Some(Vec::new()),
            ..Default::default()
        }
    }

    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            self.id.to_string()
        } else {
            self.name.clone()
        }
    }

    /// Whether any of the asset's aliases resolves to `label_id` in `labels`.
    pub fn has_label_id(&self, label_id: u64, labels: &LabelMap) -> bool {
        self.labels.iter().flatten().any(|alias| {
            labels
                .label_by_key(alias)
                .is_some_and(|label| label.id == label_id)
        })
    }

    pub fn collector(&self, key: &str) -> Option<&CollectorBinding> {
        self.collectors.iter().flatten().find(|c| c.key == key)
    }

    pub fn has_disabled_check(&self, check: &DisabledCheck) -> bool {
        self.disabled_checks.iter().flatten().any(|c| c == check)
    }
}

/// Operating mode of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetMode {
    Normal,
    Maintenance,
    Disabled,
}

impl FromStr for AssetMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "maintenance" => Ok(Self::Maintenance),
            "disabled" => Ok(Self::Disabled),
            other => Err(format!(
                "invalid mode '{other}'. Must be one of {{normal,maintenance,disabled}}"
            )),
        }
    }
}

impl fmt::Display for AssetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Maintenance => write!(f, "maintenance"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// Stable index of an asset inside a [`State`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssetHandle(usize);

/// When and by which version a snapshot was captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    pub version: String,
    pub time: DateTime<Utc>,
}

impl Info {
    pub fn now() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            time: Utc::now(),
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.time
    }
}

/// Format of a state document, selected by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(Self::Json),
            Some("yml" | "yaml") => Ok(Self::Yaml),
            _ => Err(Error::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// A container with its zones, labels and assets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Info>,
    #[serde(default)]
    pub container: Container,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub zones: Vec<Zone>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "LabelMap::is_empty"
    )]
    pub labels: LabelMap,
    #[serde(default, deserialize_with = "null_as_default")]
    pub assets: Vec<Asset>,
}

/// An explicit `null` reads as empty, like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl State {
    /// Read a state document; the extension selects JSON or YAML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let format = DocumentFormat::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::parse(&content, format, path)
    }

    /// Decode a state document. `origin` is only used in error messages.
    pub fn parse(content: &str, format: DocumentFormat, origin: &Path) -> Result<Self> {
        let decoded = match format {
            DocumentFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
            DocumentFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
        };
        decoded.map_err(|message| Error::Parse {
            path: origin.to_path_buf(),
            message,
        })
    }

    pub fn zone(&self, number: u32) -> Option<&Zone> {
        self.zones.iter().find(|z| z.zone == number)
    }

    pub fn asset_by_id(&self, id: u64) -> Option<&Asset> {
        self.assets.iter().find(|a| a.id == id)
    }

    pub fn asset_handles(&self) -> impl Iterator<Item = AssetHandle> + use<> {
        (0..self.assets.len()).map(AssetHandle)
    }

    pub fn asset(&self, handle: AssetHandle) -> Option<&Asset> {
        self.assets.get(handle.0)
    }

    pub fn asset_mut(&mut self, handle: AssetHandle) -> Option<&mut Asset> {
        self.assets.get_mut(handle.0)
    }

    pub fn has_collectors(&self) -> bool {
        self.assets
            .iter()
            .any(|a| a.collectors.as_ref().is_some_and(|c| !c.is_empty()))
    }

    pub fn has_asset_kind(&self) -> bool {
        self.assets.iter().any(|a| !a.kind.is_empty())
    }
}

/// Permissions of the API token for one container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
    #[serde(default)]
    pub token_type: String,
}

/// Permissions a token needs before `apply` may mutate anything.
pub const APPLY_PERMISSIONS: &[&str] = &[
    "API",
    "ASSET_MANAGEMENT",
    "CHECK_MANAGEMENT",
    "CONTAINER_ADMIN",
    "CONTAINER_MANAGEMENT",
    "READ",
];

impl Permissions {
    pub fn check_apply(&self) -> Result<()> {
        let granted = self
            .permissions
            .as_ref()
            .ok_or_else(|| Error::InvalidResponse("permissions missing".to_string()))?;
        let missing: Vec<String> = APPLY_PERMISSIONS
            .iter()
            .filter(|required| !granted.iter().any(|p| p == *required))
            .map(|p| (*p).to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::MissingPermissions(missing))
        }
    }
}
