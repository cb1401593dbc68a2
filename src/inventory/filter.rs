//! Inventory filters and ordering

use crate::model::{BlobLocation, BlobStatus, InventoryItem};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Criteria an inventory row must satisfy; unset fields match everything
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InventoryFilter {
    pub kind: Option<String>,
    pub status: Option<BlobStatus>,
    pub location: Option<BlobLocation>,
    /// Case-insensitive substring over name, hash and pack names
    pub search: Option<String>,
}

impl InventoryFilter {
    pub fn matches(&self, item: &InventoryItem) -> bool {
        if let Some(kind) = &self.kind {
            if !item.kind.eq_ignore_ascii_case(kind) {
                return false;
            }
        }
        if self.status.is_some_and(|s| s != item.status) {
            return false;
        }
        if self.location.is_some_and(|l| l != item.location) {
            return false;
        }
        if let Some(search) = &self.search {
            let needle = search.trim().to_lowercase();
            if !needle.is_empty()
                && !item.display_name.to_lowercase().contains(&needle)
                && !item.hash.to_hex().contains(&needle)
                && !item
                    .used_by_packs
                    .iter()
                    .any(|p| p.to_lowercase().contains(&needle))
            {
                return false;
            }
        }
        true
    }
}

/// Column to order inventory rows by
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Name,
    Size,
    Status,
    Kind,
    Hash,
}

/// Caller-chosen ordering; ties always fall back to the hash
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct SortOrder {
    pub key: SortKey,
    pub descending: bool,
}

impl SortOrder {
    pub fn by(key: SortKey) -> Self {
        SortOrder {
            key,
            descending: false,
        }
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    pub fn compare(&self, a: &InventoryItem, b: &InventoryItem) -> Ordering {
        let primary = match self.key {
            SortKey::Name => a
                .display_name
                .to_lowercase()
                .cmp(&b.display_name.to_lowercase()),
            SortKey::Size => a.size_bytes.cmp(&b.size_bytes),
            SortKey::Status => a.status.cmp(&b.status),
            SortKey::Kind => a.kind.cmp(&b.kind),
            SortKey::Hash => Ordering::Equal,
        };
        let ordering = primary.then_with(|| a.hash.cmp(&b.hash));
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }

    pub fn sort(&self, items: &mut [InventoryItem]) {
        items.sort_by(|a, b| self.compare(a, b));
    }
}
