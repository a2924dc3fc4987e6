//! Label alias map.
//!
//! Documents reference labels by a short alias instead of the numeric ID the
//! backend uses. The map owns the labels (an arena addressed by
//! [`LabelHandle`]) and keeps an alias index and an ID index next to it.

use regex::Regex;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use crate::model::Label;

static ALIAS_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-zA-Z0-9]+").unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

/// Stable index of a label inside a [`LabelMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelHandle(usize);

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    alias: String,
    label: Label,
}

/// Bidirectional alias/ID index over an owned set of labels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelMap {
    entries: Vec<Entry>,
    by_alias: HashMap<String, usize>,
    by_id: HashMap<u64, usize>,
}

impl LabelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a label under a derived alias.
    ///
    /// A label whose ID is already mapped is not added again; the existing
    /// handle is returned.
    pub fn append(&mut self, label: Label) -> LabelHandle {
        if label.id != 0
            && let Some(&index) = self.by_id.get(&label.id)
        {
            return LabelHandle(index);
        }
        let base = derive_alias(&label.name);
        let mut alias = base.clone();
        let mut n = 1;
        while self.by_alias.contains_key(&alias) {
            alias = format!("{base}_{n}");
            n += 1;
        }
        self.push(alias, label)
    }

    /// Add a label under an alias chosen by a document.
    pub fn insert(&mut self, alias: impl Into<String>, label: Label) -> Result<LabelHandle, String> {
        let alias = alias.into();
        if self.by_alias.contains_key(&alias) {
            return Err(format!("duplicate label alias '{alias}'"));
        }
        Ok(self.push(alias, label))
    }

    fn push(&mut self, alias: String, label: Label) -> LabelHandle {
        let index = self.entries.len();
        if label.id != 0 {
            self.by_id.insert(label.id, index);
        }
        self.by_alias.insert(alias.clone(), index);
        self.entries.push(Entry { alias, label });
        LabelHandle(index)
    }

    pub fn label_by_id(&self, id: u64) -> Option<&Label> {
        self.by_id
            .get(&id)
            .and_then(|&i| self.entries.get(i))
            .map(|e| &e.label)
    }

    pub fn label_by_key(&self, alias: &str) -> Option<&Label> {
        self.handle_by_key(alias).and_then(|h| self.get(h))
    }

    pub fn handle_by_key(&self, alias: &str) -> Option<LabelHandle> {
        self.by_alias.get(alias).copied().map(LabelHandle)
    }

    pub fn get(&self, handle: LabelHandle) -> Option<&Label> {
        self.entries.get(handle.0).map(|e| &e.label)
    }

    pub fn alias(&self, handle: LabelHandle) -> Option<&str> {
        self.entries.get(handle.0).map(|e| e.alias.as_str())
    }

    /// Alias for a label ID, or the decimal ID when it is not mapped.
    pub fn get_name(&self, id: u64) -> String {
        self.by_id
            .get(&id)
            .and_then(|&i| self.entries.get(i))
            .map(|e| e.alias.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Record the ID the backend assigned to a freshly created label.
    pub fn assign_id(&mut self, handle: LabelHandle, id: u64) -> bool {
        let Some(entry) = self.entries.get_mut(handle.0) else {
            return false;
        };
        if entry.label.id != 0 {
            self.by_id.remove(&entry.label.id);
        }
        entry.label.id = id;
        self.by_id.insert(id, handle.0);
        true
    }

    /// Labels in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (LabelHandle, &str, &Label)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (LabelHandle(i), e.alias.as_str(), &e.label))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Join the alphanumeric runs of a name with `_`, prefixed with `_` unless it
/// starts with a letter.
pub fn derive_alias(name: &str) -> String {
    let joined = ALIAS_RUN
        .find_iter(name)
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join("_");
    match joined.chars().next() {
        Some(c) if c.is_alphabetic() => joined,
        _ => format!("_{joined}"),
    }
}

impl Serialize for LabelMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.alias, &entry.label)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for LabelMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LabelMapVisitor;

        impl<'de> Visitor<'de> for LabelMapVisitor {
            type Value = LabelMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of label alias to label")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<LabelMap, A::Error> {
                let mut labels = LabelMap::new();
                while let Some((alias, label)) = access.next_entry::<String, Label>()? {
                    labels.insert(alias, label).map_err(serde::de::Error::custom)?;
                }
                Ok(labels)
            }
        }

        deserializer.deserialize_map(LabelMapVisitor)
    }
}
