//! Derived inventory view types
//!
//! None of these are persisted; they are recomputed on every scan.

use crate::model::{Hash, Origin};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Derived status of a blob
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobStatus {
    /// Present locally and referenced by at least one pack
    Referenced,
    /// Present locally, referenced by no pack
    Orphan,
    /// Referenced, absent from both locations
    Missing,
    /// Absent locally, present in backup
    BackupOnly,
}

/// Where physical copies of a blob exist
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobLocation {
    LocalOnly,
    BackupOnly,
    Both,
    None,
}

impl BlobStatus {
    /// Derive status from presence and reference facts
    pub fn derive(present_local: bool, present_backup: bool, referenced: bool) -> Option<Self> {
        match (present_local, present_backup, referenced) {
            (true, _, true) => Some(BlobStatus::Referenced),
            (true, _, false) => Some(BlobStatus::Orphan),
            (false, true, _) => Some(BlobStatus::BackupOnly),
            (false, false, true) => Some(BlobStatus::Missing),
            (false, false, false) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BlobStatus::Referenced => "referenced",
            BlobStatus::Orphan => "orphan",
            BlobStatus::Missing => "missing",
            BlobStatus::BackupOnly => "backup_only",
        }
    }
}

impl BlobLocation {
    pub fn derive(present_local: bool, present_backup: bool) -> Self {
        match (present_local, present_backup) {
            (true, true) => BlobLocation::Both,
            (true, false) => BlobLocation::LocalOnly,
            (false, true) => BlobLocation::BackupOnly,
            (false, false) => BlobLocation::None,
        }
    }

    pub fn has_local(&self) -> bool {
        matches!(self, BlobLocation::LocalOnly | BlobLocation::Both)
    }

    pub fn has_backup(&self) -> bool {
        matches!(self, BlobLocation::BackupOnly | BlobLocation::Both)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BlobLocation::LocalOnly => "local_only",
            BlobLocation::BackupOnly => "backup_only",
            BlobLocation::Both => "both",
            BlobLocation::None => "none",
        }
    }
}

impl fmt::Display for BlobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for BlobLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the inventory
#[derive(Clone, Debug, Serialize)]
pub struct InventoryItem {
    pub hash: Hash,
    pub display_name: String,
    pub kind: String,
    pub size_bytes: u64,
    pub status: BlobStatus,
    pub location: BlobLocation,
    /// Back-reference only; packs own their dependency records
    pub used_by_packs: Vec<String>,
    pub origin: Option<Origin>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_derivation_table() {
        assert_eq!(BlobStatus::derive(true, false, true), Some(BlobStatus::Referenced));
        assert_eq!(BlobStatus::derive(true, true, true), Some(BlobStatus::Referenced));
        assert_eq!(BlobStatus::derive(true, true, false), Some(BlobStatus::Orphan));
        assert_eq!(BlobStatus::derive(false, true, true), Some(BlobStatus::BackupOnly));
        assert_eq!(BlobStatus::derive(false, true, false), Some(BlobStatus::BackupOnly));
        assert_eq!(BlobStatus::derive(false, false, true), Some(BlobStatus::Missing));
        assert_eq!(BlobStatus::derive(false, false, false), None);
    }

    #[test]
    fn test_location_derivation() {
        assert_eq!(BlobLocation::derive(true, true), BlobLocation::Both);
        assert_eq!(BlobLocation::derive(false, false), BlobLocation::None);
        assert!(BlobLocation::Both.has_backup());
        assert!(!BlobLocation::BackupOnly.has_local());
    }
}
