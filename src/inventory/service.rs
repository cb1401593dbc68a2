//! Inventory computation, orphan cleanup and integrity checks

use crate::graph::{DependencyGraph, ManifestSource, ScanWarning};
use crate::inventory::{InventoryFilter, SortOrder};
use crate::model::{
    BlobLocation, BlobStatus, Hash, Impact, InventoryItem, ItemOutcome, PackDependency,
};
use crate::store::{BlobStore, StorageRoot};
use crate::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

/// Result of one inventory scan
#[derive(Clone, Debug, Serialize)]
pub struct InventoryScan {
    pub items: Vec<InventoryItem>,
    pub warnings: Vec<ScanWarning>,
    /// Whether the backup root was included in this scan
    pub backup_connected: bool,
}

/// Aggregate numbers over the whole inventory
#[derive(Clone, Debug, Default, Serialize)]
pub struct InventorySummary {
    pub total_items: usize,
    pub by_status: BTreeMap<String, StatusTotals>,
    pub by_location: BTreeMap<String, usize>,
    pub local_bytes: u64,
    pub backup_bytes: u64,
    pub backup_connected: bool,
    pub warnings: Vec<ScanWarning>,
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct StatusTotals {
    pub count: usize,
    pub bytes: u64,
}

/// Derived view over both storage roots and the pack manifests
pub struct InventoryService {
    store: Arc<BlobStore>,
    manifests: Arc<dyn ManifestSource>,
}

impl InventoryService {
    pub fn new(store: Arc<BlobStore>, manifests: Arc<dyn ManifestSource>) -> Self {
        InventoryService { store, manifests }
    }

    /// Fresh dependency graph from the current manifests
    pub fn graph(&self) -> Result<DependencyGraph> {
        DependencyGraph::build(self.manifests.as_ref())
    }

    /// Compute every inventory row from a point-in-time scan.
    ///
    /// A blob written while the scan runs may be missing from the result; it
    /// shows up on the next scan.
    pub fn scan(&self) -> Result<InventoryScan> {
        let graph = self.graph()?;
        let mut warnings = graph.warnings().to_vec();

        let local: HashMap<Hash, u64> = self
            .store
            .list(StorageRoot::Local)?
            .map(|e| (e.hash, e.size_bytes))
            .collect();

        let (backup, backup_connected) = match self.store.list(StorageRoot::Backup) {
            Ok(entries) => (
                entries
                    .map(|e| (e.hash, e.size_bytes))
                    .collect::<HashMap<_, _>>(),
                true,
            ),
            Err(err) => {
                if self.store.backup_root().is_some() {
                    warn!("backup not included in inventory: {}", err);
                    warnings.push(ScanWarning::new("backup", err.to_string()));
                }
                (HashMap::new(), false)
            }
        };

        let hashes: BTreeSet<Hash> = local
            .keys()
            .chain(backup.keys())
            .chain(graph.hashes())
            .copied()
            .collect();

        let items = hashes
            .into_iter()
            .filter_map(|hash| {
                let local_size = local.get(&hash).copied();
                let backup_size = backup.get(&hash).copied();
                build_item(hash, local_size, backup_size, &graph)
            })
            .collect();

        Ok(InventoryScan {
            items,
            warnings,
            backup_connected,
        })
    }

    /// Filtered, ordered inventory
    pub fn list(&self, filter: &InventoryFilter, order: SortOrder) -> Result<InventoryScan> {
        let mut scan = self.scan()?;
        scan.items.retain(|item| filter.matches(item));
        order.sort(&mut scan.items);
        Ok(scan)
    }

    /// Inventory row for one hash, if any copy or reference exists
    pub fn item(&self, hash: &Hash) -> Result<Option<InventoryItem>> {
        let graph = self.graph()?;
        let local = self.store.size(StorageRoot::Local, hash).ok();
        let backup = self.store.size(StorageRoot::Backup, hash).ok();
        Ok(build_item(*hash, local, backup, &graph))
    }

    /// Packs and dependencies that would be affected by removing `hash`
    pub fn impacts(&self, hash: &Hash) -> Result<Vec<Impact>> {
        Ok(self.graph()?.impacts(hash))
    }

    /// Delete local copies of blobs that are still orphans.
    ///
    /// Each hash is re-checked under its lock right before deletion, so a
    /// blob re-referenced since the caller's listing is skipped, not deleted.
    pub fn cleanup_orphans(&self, hashes: &[Hash]) -> Vec<ItemOutcome> {
        let outcomes: Vec<ItemOutcome> = hashes
            .iter()
            .map(|hash| match self.cleanup_one(hash) {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(%hash, "orphan cleanup failed: {}", err);
                    ItemOutcome::failed(*hash, &err)
                }
            })
            .collect();

        let freed: u64 = outcomes
            .iter()
            .map(|o| match o.result {
                crate::model::ItemResult::Done { bytes } => bytes,
                _ => 0,
            })
            .sum();
        info!(requested = hashes.len(), freed, "orphan cleanup finished");
        outcomes
    }

    fn cleanup_one(&self, hash: &Hash) -> Result<ItemOutcome> {
        let _lock = self.store.lock(hash);

        let packs = self.graph()?.lookup(hash);
        if !packs.is_empty() {
            return Ok(ItemOutcome::skipped(
                *hash,
                format!("no longer orphan, referenced by {}", packs.join(", ")),
            ));
        }

        match self.store.delete(StorageRoot::Local, hash) {
            Ok(bytes) => Ok(ItemOutcome::done(*hash, bytes)),
            Err(Error::NotFound(_)) => Ok(ItemOutcome::skipped(*hash, "not present locally")),
            Err(err) => Err(err),
        }
    }

    /// Re-hash the local copy and compare with its name
    pub fn verify(&self, hash: &Hash) -> Result<()> {
        self.verify_in(StorageRoot::Local, hash)
    }

    /// Re-hash the copy in `root`. A mismatch is reported as `Corrupt` and the
    /// file is left in place for a human to decide.
    pub fn verify_in(&self, root: StorageRoot, hash: &Hash) -> Result<()> {
        let _lock = self.store.lock(hash);
        let actual = self.store.hash_on_disk(root, hash)?;
        if actual != *hash {
            warn!(%root, %hash, %actual, "corrupt blob");
            return Err(Error::Corrupt {
                hash: hash.to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(())
    }

    /// Verify every blob in a root; one outcome per blob, nothing deleted
    pub fn verify_all(&self, root: StorageRoot) -> Result<Vec<ItemOutcome>> {
        let hashes: Vec<(Hash, u64)> = self
            .store
            .list(root)?
            .map(|e| (e.hash, e.size_bytes))
            .collect();

        let outcomes: Vec<ItemOutcome> = hashes
            .into_iter()
            .map(|(hash, size)| match self.verify_in(root, &hash) {
                Ok(()) => ItemOutcome::done(hash, size),
                Err(err) => ItemOutcome::failed(hash, &err),
            })
            .collect();

        let corrupt = outcomes.iter().filter(|o| o.is_failure()).count();
        info!(%root, checked = outcomes.len(), corrupt, "integrity pass finished");
        Ok(outcomes)
    }

    /// Totals per status and location
    pub fn summary(&self) -> Result<InventorySummary> {
        let scan = self.scan()?;
        let mut summary = InventorySummary {
            total_items: scan.items.len(),
            backup_connected: scan.backup_connected,
            warnings: scan.warnings,
            ..Default::default()
        };

        for status in [
            BlobStatus::Referenced,
            BlobStatus::Orphan,
            BlobStatus::Missing,
            BlobStatus::BackupOnly,
        ] {
            summary
                .by_status
                .insert(status.as_str().to_string(), StatusTotals::default());
        }

        for item in &scan.items {
            let totals = summary
                .by_status
                .entry(item.status.as_str().to_string())
                .or_default();
            totals.count += 1;
            totals.bytes += item.size_bytes;
            *summary
                .by_location
                .entry(item.location.as_str().to_string())
                .or_default() += 1;
        }

        summary.local_bytes = self
            .store
            .list(StorageRoot::Local)?
            .map(|e| e.size_bytes)
            .sum();
        if summary.backup_connected {
            summary.backup_bytes = self
                .store
                .list(StorageRoot::Backup)
                .map(|entries| entries.map(|e| e.size_bytes).sum())
                .unwrap_or(0);
        }
        Ok(summary)
    }
}

fn build_item(
    hash: Hash,
    local_size: Option<u64>,
    backup_size: Option<u64>,
    graph: &DependencyGraph,
) -> Option<InventoryItem> {
    let dependencies = graph.dependencies(&hash);
    let status = BlobStatus::derive(
        local_size.is_some(),
        backup_size.is_some(),
        !dependencies.is_empty(),
    )?;

    Some(InventoryItem {
        hash,
        display_name: display_name(&hash, dependencies),
        kind: dependencies
            .iter()
            .find_map(|d| d.kind.clone())
            .unwrap_or_else(|| "unknown".to_string()),
        size_bytes: local_size.or(backup_size).unwrap_or(0),
        status,
        location: BlobLocation::derive(local_size.is_some(), backup_size.is_some()),
        used_by_packs: graph.lookup(&hash),
        origin: dependencies.iter().find_map(|d| d.origin.clone()),
    })
}

fn display_name(hash: &Hash, dependencies: &[PackDependency]) -> String {
    dependencies
        .iter()
        .find_map(|d| d.origin.as_ref().and_then(|o| o.filename.clone()))
        .or_else(|| dependencies.first().map(|d| d.dependency_id.clone()))
        .unwrap_or_else(|| hash.short())
}
