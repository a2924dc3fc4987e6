//! Remote operations the reconciler needs from the asset-management API.
//!
//! [`Backend`] is the seam between the reconciliation core and the network.
//! [`http::HttpBackend`] talks to the real API; [`mock::MockBackend`] keeps
//! an in-memory container for tests.
//!
//! ```
//! use reconcile::backend::{AssetQuery, Backend};
//! use reconcile::backend::mock::MockBackend;
//!
//! let backend = MockBackend::new(42);
//! let id = backend.create_asset(42, "web1").unwrap();
//! let assets = backend.fetch_assets(&AssetQuery::container(42)).unwrap();
//! assert_eq!(assets[0].id, id);
//! ```

pub mod http;
pub mod mock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::labels::LabelMap;
use crate::model::{Asset, CollectorBinding, Container, DisabledCheck, Label, Permissions, Zone};
use crate::schema::Collector;
use crate::value::Config;

/// Asset fields requested for a full snapshot.
pub const ASSET_FIELDS: &[&str] = &["id", "name", "kind", "zone", "description", "mode", "labels"];

/// Collector fields requested for the schema.
pub const COLLECTOR_FIELDS: &[&str] = &["key"];

/// Remote fetch and mutation operations.
///
/// Every call either succeeds or returns an error; the reconciler treats any
/// error as fatal for the run. Calls are blocking and issued one at a time.
pub trait Backend: Send + Sync {
    fn fetch_container(&self, container_id: u64) -> Result<Container>;

    /// Fetch the assets of a container, or a single asset when the query
    /// names one.
    fn fetch_assets(&self, query: &AssetQuery) -> Result<Vec<RemoteAsset>>;

    fn fetch_zones(&self, container_id: u64) -> Result<Vec<Zone>>;

    /// Fetch labels by ID. Unknown IDs are an error.
    fn fetch_labels(&self, ids: &BTreeSet<u64>) -> Result<Vec<Label>>;

    /// Fetch the collectors visible in a container.
    fn fetch_collectors(
        &self,
        container_id: u64,
        fields: &[&str],
        with_options: bool,
    ) -> Result<Vec<Collector>>;

    /// Fetch the catalog of known asset kinds.
    fn fetch_asset_kinds(&self) -> Result<Vec<String>>;

    fn fetch_permissions(&self, container_id: u64) -> Result<Permissions>;

    /// Ask the backend to check a collector config.
    fn verify_collector_config(&self, collector: &str, config: &Config) -> Result<()>;

    fn set_collector_display(&self, container_id: u64, collector: &str, display: bool)
    -> Result<()>;

    /// Create a zone or rename an existing one.
    fn upsert_zone(&self, container_id: u64, zone: u32, name: &str) -> Result<()>;

    /// Create an asset and return its ID.
    fn create_asset(&self, container_id: u64, name: &str) -> Result<u64>;

    fn set_asset_name(&self, asset_id: u64, name: &str) -> Result<()>;

    fn set_asset_mode(&self, asset_id: u64, mode: &str) -> Result<()>;

    fn set_asset_kind(&self, asset_id: u64, kind: &str) -> Result<()>;

    fn set_asset_zone(&self, asset_id: u64, zone: u32) -> Result<()>;

    fn set_asset_description(&self, asset_id: u64, description: &str) -> Result<()>;

    fn add_label_to_asset(&self, asset_id: u64, label_id: u64) -> Result<()>;

    fn delete_label_from_asset(&self, asset_id: u64, label_id: u64) -> Result<()>;

    /// Re-enable a disabled check.
    fn enable_check(&self, asset_id: u64, collector: &str, check: &str) -> Result<()>;

    fn disable_check(&self, asset_id: u64, collector: &str, check: &str) -> Result<()>;

    /// Bind a collector to an asset, replacing its whole config.
    fn upsert_collector(&self, asset_id: u64, collector: &str, config: Option<&Config>)
    -> Result<()>;

    fn remove_collector(&self, asset_id: u64, collector: &str) -> Result<()>;

    /// Create a label and return its ID.
    fn create_label(&self, container_id: u64, name: &str) -> Result<u64>;

    fn set_label_name(&self, label_id: u64, name: &str) -> Result<()>;

    fn set_label_color(&self, label_id: u64, color: &str) -> Result<()>;

    fn set_label_description(&self, label_id: u64, description: &str) -> Result<()>;
}

/// An asset as the API returns it: labels by ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteAsset {
    pub id: u64,
    /// Owning container; only returned for single-asset fetches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<u64>,
    pub name: String,
    pub zone: Option<u32>,
    pub labels: Vec<u64>,
    pub description: String,
    pub mode: String,
    pub kind: String,
    pub disabled_checks: Vec<DisabledCheck>,
    pub collectors: Vec<CollectorBinding>,
}

impl RemoteAsset {
    /// Convert to the document shape, rendering label IDs through `labels`.
    pub fn into_asset(self, labels: &LabelMap) -> Asset {
        Asset {
            id: self.id,
            name: self.name,
            zone: self.zone,
            labels: Some(self.labels.iter().map(|id| labels.get_name(*id)).collect()),
            description: self.description,
            mode: self.mode,
            kind: self.kind,
            disabled_checks: Some(self.disabled_checks),
            collectors: Some(self.collectors),
        }
    }
}

static FILTER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\w+)(==|!=|=)(\w+)$").unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

/// An asset property filter: `key==value`, `key=value` or `key!=value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFilter {
    pub key: String,
    pub value: String,
    pub negate: bool,
}

impl AssetFilter {
    /// Query argument understood by the API.
    pub fn query_arg(&self) -> String {
        if self.negate {
            format!("not-{}={}", self.key, self.value)
        } else {
            format!("{}={}", self.key, self.value)
        }
    }
}

impl FromStr for AssetFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let caps = FILTER_PATTERN
            .captures(s)
            .ok_or_else(|| Error::invalid(format!("invalid asset filter '{s}'")))?;
        Ok(Self {
            key: caps[1].to_string(),
            negate: &caps[2] == "!=",
            value: caps[3].to_string(),
        })
    }
}

/// Which assets to fetch, and which of their fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetQuery {
    pub container_id: u64,
    pub asset_id: Option<u64>,
    pub fields: Vec<String>,
    pub filters: Vec<AssetFilter>,
    pub with_collectors: bool,
}

impl AssetQuery {
    /// All assets of a container with every field a snapshot needs.
    pub fn container(container_id: u64) -> Self {
        Self {
            container_id,
            fields: ASSET_FIELDS.iter().map(|f| (*f).to_string()).collect(),
            with_collectors: true,
            ..Default::default()
        }
    }

    pub fn asset(mut self, asset_id: u64) -> Self {
        self.asset_id = Some(asset_id);
        self
    }

    pub fn filter(mut self, filter: AssetFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Filters narrow a container listing and cannot target one asset.
    pub fn check(&self) -> Result<()> {
        if self.asset_id.is_some() && !self.filters.is_empty() {
            return Err(Error::invalid(
                "cannot use both asset filters and an asset ID",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filters() {
        let f: AssetFilter = "mode==maintenance".parse().unwrap();
        assert_eq!(f.query_arg(), "mode=maintenance");
        let f: AssetFilter = "kind=Linux".parse().unwrap();
        assert_eq!(f.query_arg(), "kind=Linux");
        let f: AssetFilter = "kind!=Linux".parse().unwrap();
        assert_eq!(f.query_arg(), "not-kind=Linux");
        assert!("kind~Linux".parse::<AssetFilter>().is_err());
        assert!("kind==".parse::<AssetFilter>().is_err());
    }

    #[test]
    fn test_query_rejects_filters_with_asset() {
        let query = AssetQuery::container(1)
            .asset(5)
            .filter("mode=normal".parse().unwrap());
        assert!(query.check().is_err());
        assert!(AssetQuery::container(1).asset(5).check().is_ok());
    }

    #[test]
    fn test_remote_asset_renders_label_aliases() {
        let mut labels = LabelMap::new();
        labels.append(Label {
            id: 3,
            name: "Web servers".into(),
            ..Default::default()
        });
        let asset = RemoteAsset {
            id: 1,
            labels: vec![3, 4],
            ..Default::default()
        }
        .into_asset(&labels);
        assert_eq!(
            asset.labels,
            Some(vec!["Web_servers".to_string(), "4".to_string()])
        );
        assert_eq!(asset.collectors, Some(Vec::new()));
    }
}
