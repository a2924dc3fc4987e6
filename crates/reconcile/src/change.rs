//! Change records produced by the diff engine.
//!
//! Operations reference target entities by handle, not by value. The
//! executor resolves a handle when the change runs, so an ID assigned by an
//! earlier create is visible to every later change.

use std::fmt;

use crate::labels::LabelHandle;
use crate::model::{AssetHandle, DisabledCheck};

/// One remote mutation and its description.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub description: String,
    pub operation: Operation,
}

impl Change {
    pub fn new(description: impl Into<String>, operation: Operation) -> Self {
        Self {
            description: description.into(),
            operation,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        self.operation.kind()
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description)
    }
}

/// Remote mutations, one per backend mutation call.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    SetCollectorDisplay { collector: String, display: bool },
    CreateZone { zone: u32, name: String },
    RenameZone { zone: u32, name: String },
    CreateLabel { label: LabelHandle },
    SetLabelName { label: LabelHandle },
    SetLabelColor { label: LabelHandle },
    SetLabelDescription { label: LabelHandle },
    CreateAsset { asset: AssetHandle },
    SetAssetName { asset: AssetHandle },
    SetAssetMode { asset: AssetHandle },
    SetAssetKind { asset: AssetHandle },
    SetAssetZone { asset: AssetHandle },
    SetAssetDescription { asset: AssetHandle },
    AddLabelToAsset { asset: AssetHandle, label: LabelHandle },
    DeleteLabelFromAsset { asset: AssetHandle, label_id: u64 },
    /// Add or replace a collector; the config is read from the target binding.
    UpsertCollector { asset: AssetHandle, collector: String },
    RemoveCollector { asset: AssetHandle, collector: String },
    DisableCheck { asset: AssetHandle, check: DisabledCheck },
    EnableCheck { asset: AssetHandle, check: DisabledCheck },
}

/// Coarse classification used for summaries and rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Modify,
    /// Only produced by the purge pass.
    Remove,
}

impl Operation {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::CreateZone { .. } | Self::CreateLabel { .. } | Self::CreateAsset { .. } => {
                ChangeKind::Create
            }
            Self::DeleteLabelFromAsset { .. }
            | Self::RemoveCollector { .. }
            | Self::EnableCheck { .. } => ChangeKind::Remove,
            _ => ChangeKind::Modify,
        }
    }
}

/// First line of `s`, cut to `n` characters with an ellipsis.
pub fn short(s: &str, n: usize) -> String {
    let normalized = s.replace("\r\n", "\n");
    let line = normalized.trim_matches('\n').lines().next().unwrap_or("");
    if line.chars().count() <= n {
        line.to_string()
    } else {
        let cut: String = line.chars().take(n.saturating_sub(2)).collect();
        format!("{cut}...")
    }
}
