//! Pack manifest sources
//!
//! The dependency graph never owns pack data; it reads manifests through a
//! `ManifestSource` each time it is rebuilt.

use crate::model::PackManifest;
use crate::Result;
use parking_lot::RwLock;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// File name of a manifest inside a pack directory
pub const MANIFEST_FILE: &str = "pack.json";

/// A non-fatal problem found while scanning
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScanWarning {
    /// Manifest path or pack name the warning is about
    pub source: String,
    pub message: String,
}

impl ScanWarning {
    pub fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        ScanWarning {
            source: source.into(),
            message: message.into(),
        }
    }
}

/// Manifests loaded by one scan, plus whatever had to be skipped
#[derive(Clone, Debug, Default)]
pub struct ManifestScan {
    pub manifests: Vec<PackManifest>,
    pub warnings: Vec<ScanWarning>,
}

/// Anything that can enumerate pack manifests
pub trait ManifestSource: Send + Sync {
    /// Load every manifest. Individual bad manifests become warnings; an
    /// error means the source as a whole could not be read.
    fn scan(&self) -> Result<ManifestScan>;
}

/// Reads `<packs_root>/<pack>/pack.json` files
pub struct DirectoryManifests {
    root: PathBuf,
}

impl DirectoryManifests {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectoryManifests { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn load_one(dir: &Path) -> std::result::Result<PackManifest, String> {
        let path = dir.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path).map_err(|e| format!("unreadable: {}", e))?;
        let mut manifest: PackManifest =
            serde_json::from_str(&content).map_err(|e| format!("malformed: {}", e))?;
        if manifest.name.trim().is_empty() {
            manifest.name = dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
        }
        Ok(manifest)
    }
}

impl ManifestSource for DirectoryManifests {
    fn scan(&self) -> Result<ManifestScan> {
        let mut scan = ManifestScan::default();
        if !self.root.is_dir() {
            return Ok(scan);
        }

        let mut dirs: Vec<PathBuf> = fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.join(MANIFEST_FILE).is_file())
            .collect();
        dirs.sort();

        for dir in dirs {
            match Self::load_one(&dir) {
                Ok(manifest) => scan.manifests.push(manifest),
                Err(message) => {
                    let source = dir.join(MANIFEST_FILE).display().to_string();
                    warn!(manifest = %source, "skipping pack manifest: {}", message);
                    scan.warnings.push(ScanWarning::new(source, message));
                }
            }
        }
        Ok(scan)
    }
}

/// In-memory manifests, for embedding callers and tests
#[derive(Default)]
pub struct StaticManifests {
    manifests: RwLock<Vec<PackManifest>>,
}

impl StaticManifests {
    pub fn new(manifests: Vec<PackManifest>) -> Self {
        StaticManifests {
            manifests: RwLock::new(manifests),
        }
    }

    /// Replace a pack (by name) or add it
    pub fn upsert(&self, manifest: PackManifest) {
        let mut manifests = self.manifests.write();
        manifests.retain(|m| m.name != manifest.name);
        manifests.push(manifest);
    }

    /// Remove a pack by name
    pub fn remove(&self, name: &str) -> bool {
        let mut manifests = self.manifests.write();
        let before = manifests.len();
        manifests.retain(|m| m.name != name);
        manifests.len() != before
    }
}

impl ManifestSource for StaticManifests {
    fn scan(&self) -> Result<ManifestScan> {
        Ok(ManifestScan {
            manifests: self.manifests.read().clone(),
            warnings: Vec::new(),
        })
    }
}
