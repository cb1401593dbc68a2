//! Dependency graph between packs and blobs
//!
//! Built by scanning pack manifests; answers "which packs use this blob".

mod dependency;
mod manifest;

pub use dependency::DependencyGraph;
pub use manifest::{
    DirectoryManifests, ManifestScan, ManifestSource, ScanWarning, StaticManifests, MANIFEST_FILE,
};
