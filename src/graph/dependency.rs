//! Reverse index from blob hash to the packs that reference it

use crate::graph::{ManifestSource, ScanWarning};
use crate::model::{Hash, Impact, PackDependency};
use crate::Result;
use std::collections::HashMap;
use tracing::{debug, warn};

/// `hash -> dependencies` built from a full manifest scan.
///
/// Holds copies of the dependency records, never the packs themselves.
#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    by_hash: HashMap<Hash, Vec<PackDependency>>,
    pack_count: usize,
    warnings: Vec<ScanWarning>,
}

impl DependencyGraph {
    /// Rebuild from scratch. Bad manifests and bad hashes are skipped and
    /// recorded as warnings.
    pub fn build(source: &dyn ManifestSource) -> Result<Self> {
        let scan = source.scan()?;
        let mut graph = DependencyGraph {
            by_hash: HashMap::new(),
            pack_count: scan.manifests.len(),
            warnings: scan.warnings,
        };

        for manifest in scan.manifests {
            for (dependency_id, record) in manifest.dependencies {
                let blob_hash = match Hash::from_hex(&record.blob_hash) {
                    Ok(hash) => hash,
                    Err(_) => {
                        warn!(
                            pack = %manifest.name,
                            dependency = %dependency_id,
                            "skipping dependency with invalid hash {:?}",
                            record.blob_hash
                        );
                        graph.warnings.push(ScanWarning::new(
                            manifest.name.clone(),
                            format!(
                                "dependency {} has invalid blob hash {:?}",
                                dependency_id, record.blob_hash
                            ),
                        ));
                        continue;
                    }
                };
                graph
                    .by_hash
                    .entry(blob_hash)
                    .or_default()
                    .push(PackDependency {
                        pack_name: manifest.name.clone(),
                        dependency_id,
                        blob_hash,
                        kind: record.kind,
                        origin: record.origin,
                    });
            }
        }

        debug!(
            packs = graph.pack_count,
            blobs = graph.by_hash.len(),
            warnings = graph.warnings.len(),
            "built dependency graph"
        );
        Ok(graph)
    }

    /// Names of packs referencing `hash`, sorted and deduplicated
    pub fn lookup(&self, hash: &Hash) -> Vec<String> {
        let mut packs: Vec<String> = self
            .dependencies(hash)
            .iter()
            .map(|d| d.pack_name.clone())
            .collect();
        packs.sort();
        packs.dedup();
        packs
    }

    /// Every dependency record pointing at `hash`
    pub fn dependencies(&self, hash: &Hash) -> &[PackDependency] {
        self.by_hash.get(hash).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Pack/dependency pairs that a destructive action on `hash` would affect
    pub fn impacts(&self, hash: &Hash) -> Vec<Impact> {
        let mut impacts: Vec<Impact> = self
            .dependencies(hash)
            .iter()
            .map(|d| Impact {
                pack_name: d.pack_name.clone(),
                dependency_id: d.dependency_id.clone(),
            })
            .collect();
        impacts.sort();
        impacts
    }

    pub fn is_referenced(&self, hash: &Hash) -> bool {
        self.by_hash.contains_key(hash)
    }

    /// All referenced hashes
    pub fn hashes(&self) -> impl Iterator<Item = &Hash> {
        self.by_hash.keys()
    }

    pub fn pack_count(&self) -> usize {
        self.pack_count
    }

    pub fn warnings(&self) -> &[ScanWarning] {
        &self.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::StaticManifests;
    use crate::model::{DependencyRecord, PackManifest};

    #[test]
    fn test_shared_blob_has_one_entry() {
        let shared = Hash::digest(b"shared weights");
        let source = StaticManifests::new(vec![
            PackManifest::new("p1").with_dependency("base", shared, Some("checkpoint"), None),
            PackManifest::new("p2")
                .with_dependency("model", shared, None, None)
                .with_dependency("again", shared, None, None),
        ]);

        let graph = DependencyGraph::build(&source).unwrap();
        assert_eq!(graph.hashes().count(), 1);
        assert_eq!(graph.lookup(&shared), vec!["p1", "p2"]);
        assert_eq!(graph.impacts(&shared).len(), 3);
        assert_eq!(graph.pack_count(), 2);
    }

    #[test]
    fn test_unreferenced_lookup_is_empty() {
        let graph = DependencyGraph::build(&StaticManifests::default()).unwrap();
        let hash = Hash::digest(b"nothing");
        assert!(graph.lookup(&hash).is_empty());
        assert!(!graph.is_referenced(&hash));
    }

    #[test]
    fn test_invalid_hash_skips_only_that_dependency() {
        let good = Hash::digest(b"good");
        let mut manifest = PackManifest::new("p1").with_dependency("ok", good, None, None);
        manifest.dependencies.insert(
            "broken".to_string(),
            DependencyRecord {
                blob_hash: "xyz".to_string(),
                kind: None,
                origin: None,
            },
        );

        let graph = DependencyGraph::build(&StaticManifests::new(vec![manifest])).unwrap();
        assert!(graph.is_referenced(&good));
        assert_eq!(graph.warnings().len(), 1);
        assert_eq!(graph.warnings()[0].source, "p1");
    }
}
