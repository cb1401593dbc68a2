//! Pack manifest records
//!
//! Packs are owned outside this crate; these types only describe what a
//! manifest on disk looks like and what the dependency graph is built from.

use crate::model::Hash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a blob was originally fetched from
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub version_id: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

/// One dependency entry as written in a manifest
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DependencyRecord {
    /// Hex hash of the blob; kept as a string so one bad entry does not
    /// invalidate the whole manifest
    pub blob_hash: String,
    /// Model kind (checkpoint, lora, vae, ...)
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub origin: Option<Origin>,
}

/// A pack manifest: dependency id -> blob reference
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PackManifest {
    /// Pack name; falls back to the pack directory name when absent
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub dependencies: BTreeMap<String, DependencyRecord>,
}

impl PackManifest {
    pub fn new(name: impl Into<String>) -> Self {
        PackManifest {
            name: name.into(),
            dependencies: BTreeMap::new(),
        }
    }

    /// Builder-style helper to add a dependency
    pub fn with_dependency(
        mut self,
        dependency_id: impl Into<String>,
        hash: Hash,
        kind: Option<&str>,
        origin: Option<Origin>,
    ) -> Self {
        self.dependencies.insert(
            dependency_id.into(),
            DependencyRecord {
                blob_hash: hash.to_hex(),
                kind: kind.map(str::to_string),
                origin,
            },
        );
        self
    }
}

/// A resolved dependency: which pack references which blob
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PackDependency {
    pub pack_name: String,
    pub dependency_id: String,
    pub blob_hash: Hash,
    pub kind: Option<String>,
    pub origin: Option<Origin>,
}

/// A pack/dependency pair affected by a destructive action
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Impact {
    pub pack_name: String,
    pub dependency_id: String,
}
