//! Copying blobs between the local and backup roots

use crate::backup::destination::{self, BackupDestinationState};
use crate::backup::operation::{OperationHandle, OperationId, OperationSnapshot, OperationTracker};
use crate::config::BackupConfig;
use crate::graph::{DependencyGraph, ManifestSource};
use crate::model::{Hash, ItemOutcome, ItemResult};
use crate::store::{BlobStore, StorageRoot};
use crate::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Direction of a one-way sync
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// local -> backup
    Backup,
    /// backup -> local
    Restore,
}

impl SyncDirection {
    pub fn source(&self) -> StorageRoot {
        match self {
            SyncDirection::Backup => StorageRoot::Local,
            SyncDirection::Restore => StorageRoot::Backup,
        }
    }

    pub fn destination(&self) -> StorageRoot {
        self.source().opposite()
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncDirection::Backup => f.write_str("backup"),
            SyncDirection::Restore => f.write_str("restore"),
        }
    }
}

/// Which copies a delete removes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteTarget {
    Local,
    Backup,
    Both,
}

impl DeleteTarget {
    pub fn includes_local(&self) -> bool {
        matches!(self, DeleteTarget::Local | DeleteTarget::Both)
    }

    pub fn includes_backup(&self) -> bool {
        matches!(self, DeleteTarget::Backup | DeleteTarget::Both)
    }
}

/// Action applied to every hash of a bulk request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    Backup,
    Restore,
    DeleteLocal,
    DeleteBackup,
    DeleteBoth,
}

impl BulkAction {
    fn copy_direction(&self) -> Option<SyncDirection> {
        match self {
            BulkAction::Backup => Some(SyncDirection::Backup),
            BulkAction::Restore => Some(SyncDirection::Restore),
            _ => None,
        }
    }

    fn delete_target(&self) -> Option<DeleteTarget> {
        match self {
            BulkAction::DeleteLocal => Some(DeleteTarget::Local),
            BulkAction::DeleteBackup => Some(DeleteTarget::Backup),
            BulkAction::DeleteBoth => Some(DeleteTarget::Both),
            _ => None,
        }
    }
}

impl fmt::Display for BulkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BulkAction::Backup => "backup",
            BulkAction::Restore => "restore",
            BulkAction::DeleteLocal => "delete_local",
            BulkAction::DeleteBackup => "delete_backup",
            BulkAction::DeleteBoth => "delete_both",
        };
        f.write_str(name)
    }
}

/// Result of a single backup or restore
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Transfer {
    Copied { bytes: u64 },
    /// Destination already had the blob; nothing was copied
    AlreadyPresent,
}

/// What happened to one side of a delete
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SideOutcome {
    Deleted { bytes: u64 },
    AlreadyAbsent,
    Failed { code: String, message: String },
}

impl SideOutcome {
    fn from_result(result: Result<u64>) -> Self {
        match result {
            Ok(bytes) => SideOutcome::Deleted { bytes },
            Err(Error::NotFound(_)) => SideOutcome::AlreadyAbsent,
            Err(err) => SideOutcome::Failed {
                code: err.code().to_string(),
                message: err.to_string(),
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SideOutcome::Failed { .. })
    }

    fn bytes(&self) -> u64 {
        match self {
            SideOutcome::Deleted { bytes } => *bytes,
            _ => 0,
        }
    }
}

/// Per-location outcome of a delete; locations are independent
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub hash: Hash,
    pub local: Option<SideOutcome>,
    pub backup: Option<SideOutcome>,
}

impl DeleteReport {
    pub fn has_failure(&self) -> bool {
        self.local.as_ref().is_some_and(SideOutcome::is_failure)
            || self.backup.as_ref().is_some_and(SideOutcome::is_failure)
    }

    pub fn bytes_freed(&self) -> u64 {
        self.local.as_ref().map_or(0, SideOutcome::bytes)
            + self.backup.as_ref().map_or(0, SideOutcome::bytes)
    }
}

/// Moves blob bytes between roots, with guard rails on deletion
pub struct BackupService {
    store: Arc<BlobStore>,
    manifests: Arc<dyn ManifestSource>,
    config: RwLock<BackupConfig>,
    operations: OperationTracker,
}

impl BackupService {
    pub fn new(
        store: Arc<BlobStore>,
        manifests: Arc<dyn ManifestSource>,
        config: BackupConfig,
    ) -> Self {
        store.set_backup_root(config.active_destination().map(Into::into));
        BackupService {
            store,
            manifests,
            config: RwLock::new(config),
            operations: OperationTracker::new(),
        }
    }

    pub fn config(&self) -> BackupConfig {
        self.config.read().clone()
    }

    /// Apply changed settings; the backup root follows the new destination
    pub fn update_config(&self, config: BackupConfig) {
        self.store
            .set_backup_root(config.active_destination().map(Into::into));
        info!(
            enabled = config.enabled,
            destination = ?config.destination_path,
            "backup config updated"
        );
        *self.config.write() = config;
    }

    /// Connectivity probe; never fails
    pub fn status(&self) -> BackupDestinationState {
        destination::probe(&self.store, &self.config.read())
    }

    fn ensure_destination(&self) -> Result<()> {
        if !self.config.read().enabled {
            return Err(Error::DestinationUnreachable(
                "backups are disabled".to_string(),
            ));
        }
        self.store.root_path(StorageRoot::Backup).map(|_| ())
    }

    // === Single-blob operations ===

    /// Copy a local blob to the backup root (no-op if already there)
    pub fn backup(&self, hash: &Hash) -> Result<Transfer> {
        self.transfer(hash, SyncDirection::Backup, None)
    }

    /// Copy a backed-up blob to the local root (no-op if already there)
    pub fn restore(&self, hash: &Hash) -> Result<Transfer> {
        self.transfer(hash, SyncDirection::Restore, None)
    }

    fn transfer(
        &self,
        hash: &Hash,
        direction: SyncDirection,
        operation: Option<&OperationHandle>,
    ) -> Result<Transfer> {
        self.ensure_destination()?;
        let (source, target) = (direction.source(), direction.destination());
        let _lock = self.store.lock(hash);

        if !self.store.exists(source, hash) {
            return Err(Error::NotFound(format!("{} (not in {} root)", hash, source)));
        }
        if self.store.exists(target, hash) {
            debug!(%hash, %direction, "already present, nothing to copy");
            return Ok(Transfer::AlreadyPresent);
        }

        let reader = self.store.read(source, hash)?;
        let mut streamed = 0u64;
        let mut on_chunk = |n: u64| {
            streamed += n;
            match operation {
                Some(op) => {
                    op.add_bytes(n);
                    if op.is_cancelled() {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                }
                None => ControlFlow::Continue(()),
            }
        };

        // The write re-hashes the streamed bytes, so a corrupt source copy
        // is rejected here and never reaches the target root
        let result = self
            .store
            .write_with_progress(target, hash, reader, &mut on_chunk);
        match result {
            Ok(outcome) if outcome.newly_written => {
                debug!(%hash, %direction, bytes = outcome.size_bytes, "copied");
                Ok(Transfer::Copied {
                    bytes: outcome.size_bytes,
                })
            }
            Ok(_) => Ok(Transfer::AlreadyPresent),
            Err(err) => {
                if let Some(op) = operation {
                    op.remove_bytes(streamed);
                }
                Err(err)
            }
        }
    }

    /// Delete copies of a blob from the chosen locations.
    ///
    /// Guard rails (skipped with `force`):
    /// - removing the only remaining copy fails with `LastCopyWarning`
    ///   when `warn_before_delete_last_copy` is on
    /// - removing both copies of a referenced blob fails with
    ///   `ReferencedBlobWarning`
    ///
    /// With a single target the delete error (including `NotFound`) is
    /// returned directly. With `Both`, each side is attempted independently
    /// and reported in the `DeleteReport`.
    pub fn delete(&self, hash: &Hash, target: DeleteTarget, force: bool) -> Result<DeleteReport> {
        let _lock = self.store.lock(hash);
        self.check_delete_guards(hash, target, force)?;

        let report = match target {
            DeleteTarget::Local => DeleteReport {
                hash: *hash,
                local: Some(SideOutcome::Deleted {
                    bytes: self.store.delete(StorageRoot::Local, hash)?,
                }),
                backup: None,
            },
            DeleteTarget::Backup => DeleteReport {
                hash: *hash,
                local: None,
                backup: Some(SideOutcome::Deleted {
                    bytes: self.store.delete(StorageRoot::Backup, hash)?,
                }),
            },
            DeleteTarget::Both => DeleteReport {
                hash: *hash,
                local: Some(SideOutcome::from_result(
                    self.store.delete(StorageRoot::Local, hash),
                )),
                backup: Some(SideOutcome::from_result(
                    self.store.delete(StorageRoot::Backup, hash),
                )),
            },
        };

        info!(%hash, ?target, force, freed = report.bytes_freed(), "delete finished");
        Ok(report)
    }

    fn check_delete_guards(&self, hash: &Hash, target: DeleteTarget, force: bool) -> Result<()> {
        if force {
            return Ok(());
        }

        let present_local = self.store.exists(StorageRoot::Local, hash);
        let present_backup = self.store.exists(StorageRoot::Backup, hash);

        if self.config.read().warn_before_delete_last_copy {
            let last_local = target.includes_local() && present_local && !present_backup;
            let last_backup = target.includes_backup() && present_backup && !present_local;
            if last_local || last_backup {
                return Err(Error::LastCopyWarning(hash.to_hex()));
            }
        }

        if target == DeleteTarget::Both {
            let packs = DependencyGraph::build(self.manifests.as_ref())?.lookup(hash);
            if !packs.is_empty() {
                return Err(Error::ReferencedBlobWarning {
                    hash: hash.to_hex(),
                    packs,
                });
            }
        }
        Ok(())
    }

    // === Batch operations ===

    /// Copy every blob missing on the destination side. Re-running only
    /// processes whatever is still missing.
    pub fn sync_all(&self, direction: SyncDirection) -> Result<OperationSnapshot> {
        let handle = self.operations.register(format!("sync {}", direction));
        match self.run_sync(&handle, direction) {
            Ok(()) => Ok(handle.snapshot()),
            Err(err) => {
                handle.fail(&err);
                Err(err)
            }
        }
    }

    /// `sync_all` on a background thread
    pub fn start_sync(self: &Arc<Self>, direction: SyncDirection) -> Result<OperationId> {
        self.ensure_destination()?;
        let handle = self.operations.register(format!("sync {}", direction));
        let service = Arc::clone(self);

        spawn_tracked(handle, "sync", move |handle| {
            if let Err(err) = service.run_sync(handle, direction) {
                warn!(operation = %handle.id(), "sync failed: {}", err);
                handle.fail(&err);
            }
        })
    }

    fn run_sync(&self, handle: &OperationHandle, direction: SyncDirection) -> Result<()> {
        handle.begin();
        self.ensure_destination()?;

        let target = direction.destination();
        let delta: Vec<_> = self
            .store
            .list(direction.source())?
            .filter(|entry| !self.store.exists(target, &entry.hash))
            .collect();
        handle.set_totals(delta.len(), delta.iter().map(|e| e.size_bytes).sum());
        debug!(%direction, pending = delta.len(), "sync delta computed");

        for entry in delta {
            if handle.is_cancelled() {
                break;
            }
            let outcome = match self.transfer(&entry.hash, direction, Some(handle)) {
                Ok(Transfer::Copied { bytes }) => ItemOutcome::done(entry.hash, bytes),
                Ok(Transfer::AlreadyPresent) => {
                    ItemOutcome::skipped(entry.hash, "already present")
                }
                Err(Error::Cancelled) => break,
                Err(err) => {
                    warn!(hash = %entry.hash, %direction, "sync item failed: {}", err);
                    ItemOutcome::failed(entry.hash, &err)
                }
            };
            handle.record(outcome);
        }

        handle.finish();
        let snapshot = handle.snapshot();
        info!(
            %direction,
            state = ?snapshot.state,
            copied = snapshot.counts.done,
            failed = snapshot.counts.failed,
            "sync finished"
        );
        Ok(())
    }

    /// Apply one action to many hashes. A failure on one hash is recorded
    /// and processing continues with the next.
    pub fn apply_bulk(&self, hashes: &[Hash], action: BulkAction, force: bool) -> OperationSnapshot {
        let handle = self.operations.register(format!("bulk {}", action));
        self.run_bulk(&handle, hashes, action, force);
        handle.snapshot()
    }

    /// `apply_bulk` on a background thread
    pub fn start_bulk(
        self: &Arc<Self>,
        hashes: Vec<Hash>,
        action: BulkAction,
        force: bool,
    ) -> Result<OperationId> {
        if action.copy_direction().is_some() {
            self.ensure_destination()?;
        }
        let handle = self.operations.register(format!("bulk {}", action));
        let service = Arc::clone(self);

        spawn_tracked(handle, "bulk", move |handle| {
            service.run_bulk(handle, &hashes, action, force)
        })
    }

    fn run_bulk(&self, handle: &OperationHandle, hashes: &[Hash], action: BulkAction, force: bool) {
        handle.begin();

        if let Some(direction) = action.copy_direction() {
            if let Err(err) = self.ensure_destination() {
                handle.fail(&err);
                return;
            }
            let bytes_total: u64 = hashes
                .iter()
                .filter_map(|h| self.store.size(direction.source(), h).ok())
                .sum();
            handle.set_totals(hashes.len(), bytes_total);
        } else {
            handle.set_totals(hashes.len(), 0);
        }

        for hash in hashes {
            if handle.is_cancelled() {
                break;
            }
            let outcome = if let Some(direction) = action.copy_direction() {
                match self.transfer(hash, direction, Some(handle)) {
                    Ok(Transfer::Copied { bytes }) => ItemOutcome::done(*hash, bytes),
                    Ok(Transfer::AlreadyPresent) => ItemOutcome::skipped(*hash, "already present"),
                    Err(Error::Cancelled) => break,
                    Err(err) => ItemOutcome::failed(*hash, &err),
                }
            } else if let Some(target) = action.delete_target() {
                self.bulk_delete_one(hash, target, force)
            } else {
                continue;
            };

            if outcome.is_failure() {
                debug!(%hash, %action, "bulk item failed");
            }
            handle.record(outcome);
        }

        handle.finish();
        let counts = handle.snapshot().counts;
        info!(
            %action,
            done = counts.done,
            skipped = counts.skipped,
            failed = counts.failed,
            "bulk action finished"
        );
    }

    fn bulk_delete_one(&self, hash: &Hash, target: DeleteTarget, force: bool) -> ItemOutcome {
        match self.delete(hash, target, force) {
            Ok(report) => {
                let failure = [&report.local, &report.backup]
                    .into_iter()
                    .flatten()
                    .find_map(|side| match side {
                        SideOutcome::Failed { code, message } => {
                            Some(format!("{}: {}", code, message))
                        }
                        _ => None,
                    });
                let deleted = [&report.local, &report.backup]
                    .into_iter()
                    .flatten()
                    .any(|side| matches!(side, SideOutcome::Deleted { .. }));
                match failure {
                    Some(message) => ItemOutcome {
                        hash: *hash,
                        result: ItemResult::Failed {
                            code: "partial_delete".to_string(),
                            message,
                            guard_rail: false,
                        },
                    },
                    None if deleted => ItemOutcome::done(*hash, report.bytes_freed()),
                    None => ItemOutcome::skipped(*hash, "already absent"),
                }
            }
            Err(Error::NotFound(_)) => ItemOutcome::skipped(*hash, "already absent"),
            Err(err) => ItemOutcome::failed(*hash, &err),
        }
    }

    // === Operation tracking ===

    pub fn operation(&self, id: &OperationId) -> Result<OperationSnapshot> {
        self.operations.snapshot(id)
    }

    pub fn cancel(&self, id: &OperationId) -> Result<()> {
        self.operations.cancel(id)
    }

    pub fn operations(&self) -> Vec<OperationSnapshot> {
        self.operations.list()
    }
}

/// Run `work` on a named thread. If the thread cannot be created the
/// operation is marked failed so pollers do not see it idle forever.
fn spawn_tracked<F>(handle: OperationHandle, kind: &str, work: F) -> Result<OperationId>
where
    F: FnOnce(&OperationHandle) + Send + 'static,
{
    let id = handle.id();
    let tracked = handle.clone();
    let spawned = std::thread::Builder::new()
        .name(format!("{}-{}", kind, id))
        .spawn(move || work(&handle));

    match spawned {
        Ok(_) => Ok(id),
        Err(err) => {
            let err = Error::from(err);
            warn!(operation = %id, "could not start {}: {}", kind, err);
            tracked.fail(&err);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::OperationState;
    use crate::graph::StaticManifests;
    use crate::model::PackManifest;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        dir: TempDir,
        store: Arc<BlobStore>,
        manifests: Arc<StaticManifests>,
        service: Arc<BackupService>,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("backup");
        fs::create_dir_all(&dest).unwrap();
        let store = Arc::new(BlobStore::new(dir.path().join("local"), None).unwrap());
        let manifests = Arc::new(StaticManifests::default());
        let config = BackupConfig {
            enabled: true,
            destination_path: Some(dest),
            ..Default::default()
        };
        let service = Arc::new(BackupService::new(
            Arc::clone(&store),
            manifests.clone(),
            config,
        ));
        Fixture {
            dir,
            store,
            manifests,
            service,
        }
    }

    fn put(store: &BlobStore, root: StorageRoot, data: &[u8]) -> Hash {
        let hash = Hash::digest(data);
        store.write(root, &hash, data).unwrap();
        hash
    }

    #[test]
    fn test_backup_is_idempotent() {
        let f = fixture();
        let hash = put(&f.store, StorageRoot::Local, b"weights");

        assert_eq!(
            f.service.backup(&hash).unwrap(),
            Transfer::Copied { bytes: 7 }
        );
        assert_eq!(f.service.backup(&hash).unwrap(), Transfer::AlreadyPresent);
        assert_eq!(f.store.list(StorageRoot::Backup).unwrap().count(), 1);
    }

    #[test]
    fn test_backup_requires_local_copy() {
        let f = fixture();
        let hash = Hash::digest(b"nowhere");
        assert!(f.service.backup(&hash).unwrap_err().is_not_found());
    }

    #[test]
    fn test_corrupt_source_never_reaches_backup() {
        let f = fixture();
        let hash = put(&f.store, StorageRoot::Local, b"original");
        let path = f.store.blob_path(StorageRoot::Local, &hash).unwrap();
        fs::write(path, b"tampered").unwrap();

        let err = f.service.backup(&hash).unwrap_err();
        assert!(matches!(err, Error::HashMismatch { .. }));
        assert!(!f.store.exists(StorageRoot::Backup, &hash));
    }

    #[test]
    fn test_disabled_backup_fails_fast() {
        let f = fixture();
        let hash = put(&f.store, StorageRoot::Local, b"data");
        f.service.update_config(BackupConfig::default());

        assert!(matches!(
            f.service.backup(&hash),
            Err(Error::DestinationUnreachable(_))
        ));
        assert!(!f.service.status().connected);
    }

    #[test]
    fn test_unplugged_destination_fails_fast() {
        let f = fixture();
        let hash = put(&f.store, StorageRoot::Local, b"data");
        f.service.update_config(BackupConfig {
            enabled: true,
            destination_path: Some(f.dir.path().join("unplugged")),
            ..Default::default()
        });

        assert!(matches!(
            f.service.backup(&hash),
            Err(Error::DestinationUnreachable(_))
        ));
        assert!(matches!(
            f.service.sync_all(SyncDirection::Backup),
            Err(Error::DestinationUnreachable(_))
        ));
        let status = f.service.status();
        assert!(!status.connected);
        assert!(status.error.is_some());
    }

    #[test]
    fn test_last_copy_guard() {
        let f = fixture();
        let hash = put(&f.store, StorageRoot::Local, b"only copy");

        let err = f
            .service
            .delete(&hash, DeleteTarget::Local, false)
            .unwrap_err();
        assert!(matches!(err, Error::LastCopyWarning(_)));
        assert!(f.store.exists(StorageRoot::Local, &hash));

        let report = f.service.delete(&hash, DeleteTarget::Local, true).unwrap();
        assert_eq!(report.local, Some(SideOutcome::Deleted { bytes: 9 }));
        assert!(!f.store.exists(StorageRoot::Local, &hash));
    }

    #[test]
    fn test_last_copy_guard_disabled() {
        let f = fixture();
        let mut config = f.service.config();
        config.warn_before_delete_last_copy = false;
        f.service.update_config(config);
        let hash = put(&f.store, StorageRoot::Local, b"unprotected");

        assert!(f.service.delete(&hash, DeleteTarget::Local, false).is_ok());
    }

    #[test]
    fn test_last_backup_copy_is_guarded() {
        let f = fixture();
        let hash = put(&f.store, StorageRoot::Backup, b"archived only");
        assert!(matches!(
            f.service.delete(&hash, DeleteTarget::Backup, false),
            Err(Error::LastCopyWarning(_))
        ));
    }

    #[test]
    fn test_referenced_guard_on_both() {
        let f = fixture();
        let hash = put(&f.store, StorageRoot::Local, b"in use");
        f.service.backup(&hash).unwrap();
        f.manifests
            .upsert(PackManifest::new("p1").with_dependency("m", hash, None, None));

        match f.service.delete(&hash, DeleteTarget::Both, false) {
            Err(Error::ReferencedBlobWarning { packs, .. }) => assert_eq!(packs, vec!["p1"]),
            other => panic!("expected referenced warning, got {:?}", other),
        }

        // A backed-up local copy may go without force
        let report = f.service.delete(&hash, DeleteTarget::Local, false).unwrap();
        assert_eq!(report.local, Some(SideOutcome::Deleted { bytes: 6 }));
    }

    #[test]
    fn test_delete_both_reports_sides_independently() {
        let f = fixture();
        let hash = put(&f.store, StorageRoot::Local, b"both sides");
        f.service.backup(&hash).unwrap();
        // Local copy disappears behind the service's back
        fs::remove_file(f.store.blob_path(StorageRoot::Local, &hash).unwrap()).unwrap();

        let report = f.service.delete(&hash, DeleteTarget::Both, true).unwrap();
        assert_eq!(report.local, Some(SideOutcome::AlreadyAbsent));
        assert_eq!(report.backup, Some(SideOutcome::Deleted { bytes: 10 }));
        assert!(!report.has_failure());
    }

    #[test]
    fn test_single_target_delete_propagates_not_found() {
        let f = fixture();
        let hash = Hash::digest(b"ghost");
        assert!(f
            .service
            .delete(&hash, DeleteTarget::Local, true)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_sync_converges() {
        let f = fixture();
        for i in 0..3u8 {
            put(&f.store, StorageRoot::Local, &[i; 16]);
        }

        let first = f.service.sync_all(SyncDirection::Backup).unwrap();
        assert_eq!(first.state, OperationState::Completed);
        assert_eq!(first.counts.done, 3);
        assert_eq!(first.progress.bytes_done, 48);
        assert_eq!(first.progress.bytes_total, 48);

        let second = f.service.sync_all(SyncDirection::Backup).unwrap();
        assert_eq!(second.progress.items_total, 0);
        assert!(second.outcomes.is_empty());
    }

    #[test]
    fn test_interrupted_sync_resumes_with_remaining_items() {
        let f = fixture();
        let small = put(&f.store, StorageRoot::Local, b"small");
        let big = put(
            &f.store,
            StorageRoot::Local,
            &vec![7u8; 2 * crate::model::CHUNK_SIZE + 1],
        );
        let other = put(&f.store, StorageRoot::Local, b"other");

        let handle = f.service.operations.register("sync backup");
        handle.begin();
        assert_eq!(
            f.service
                .transfer(&small, SyncDirection::Backup, Some(&handle))
                .unwrap(),
            Transfer::Copied { bytes: 5 }
        );
        handle.cancel();
        assert!(matches!(
            f.service.transfer(&big, SyncDirection::Backup, Some(&handle)),
            Err(Error::Cancelled)
        ));
        handle.finish();

        let interrupted = handle.snapshot();
        assert_eq!(interrupted.state, OperationState::Cancelled);
        assert_eq!(interrupted.progress.bytes_done, 5);
        assert!(!f.store.exists(StorageRoot::Backup, &big));
        let staging = f.dir.path().join("backup").join(".staging");
        assert_eq!(fs::read_dir(&staging).unwrap().count(), 0);

        let resumed = f.service.sync_all(SyncDirection::Backup).unwrap();
        assert_eq!(resumed.state, OperationState::Completed);
        assert_eq!(resumed.progress.items_total, 2);
        assert_eq!(resumed.counts.done, 2);
        let copied: Vec<Hash> = resumed.outcomes.iter().map(|o| o.hash).collect();
        assert!(copied.contains(&big) && copied.contains(&other));
        assert!(!copied.contains(&small));
        assert_eq!(
            f.store.hash_on_disk(StorageRoot::Backup, &big).unwrap(),
            big
        );

        let settled = f.service.sync_all(SyncDirection::Backup).unwrap();
        assert_eq!(settled.progress.items_total, 0);
    }

    #[test]
    fn test_restore_sync() {
        let f = fixture();
        let hash = put(&f.store, StorageRoot::Backup, b"from backup");
        let snap = f.service.sync_all(SyncDirection::Restore).unwrap();
        assert_eq!(snap.counts.done, 1);
        assert!(f.store.exists(StorageRoot::Local, &hash));
    }

    #[test]
    fn test_bulk_delete_partial_failure() {
        let f = fixture();
        let a = put(&f.store, StorageRoot::Local, b"a");
        let b = put(&f.store, StorageRoot::Local, b"b");
        let c = put(&f.store, StorageRoot::Local, b"c");
        f.service.backup(&a).unwrap();
        f.service.backup(&b).unwrap();

        let snap = f
            .service
            .apply_bulk(&[a, c, b], BulkAction::DeleteLocal, false);
        assert_eq!(snap.state, OperationState::Completed);
        assert_eq!(snap.counts.done, 2);
        assert_eq!(snap.counts.failed, 1);
        let failed = snap.outcomes.iter().find(|o| o.is_failure()).unwrap();
        assert_eq!(failed.hash, c);
        assert_eq!(failed.failure_code(), Some("last_copy_warning"));
        assert!(f.store.exists(StorageRoot::Local, &c));
    }

    #[test]
    fn test_bulk_backup_with_unreachable_destination_fails() {
        let f = fixture();
        let a = put(&f.store, StorageRoot::Local, b"a");
        f.service.update_config(BackupConfig::default());
        let snap = f.service.apply_bulk(&[a], BulkAction::Backup, false);
        assert_eq!(snap.state, OperationState::Failed);
        assert!(snap.outcomes.is_empty());
    }

    #[test]
    fn test_bulk_delete_missing_is_skipped() {
        let f = fixture();
        let ghost = Hash::digest(b"ghost");
        let snap = f.service.apply_bulk(&[ghost], BulkAction::DeleteLocal, true);
        assert!(matches!(snap.outcomes[0].result, ItemResult::Skipped { .. }));
    }

    #[test]
    fn test_background_sync_completes() {
        let f = fixture();
        put(&f.store, StorageRoot::Local, b"background");
        let id = f.service.start_sync(SyncDirection::Backup).unwrap();

        let mut snap = f.service.operation(&id).unwrap();
        for _ in 0..500 {
            if snap.state.is_terminal() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
            snap = f.service.operation(&id).unwrap();
        }
        assert_eq!(snap.state, OperationState::Completed);
        assert_eq!(snap.counts.done, 1);
    }

    #[test]
    fn test_cancelled_before_start() {
        let f = fixture();
        let hashes: Vec<Hash> = (0..3u8)
            .map(|i| put(&f.store, StorageRoot::Local, &[i; 8]))
            .collect();
        let handle = f.service.operations.register("bulk backup");
        handle.cancel();
        f.service
            .run_bulk(&handle, &hashes, BulkAction::Backup, false);

        let snap = handle.snapshot();
        assert_eq!(snap.state, OperationState::Cancelled);
        assert!(snap.outcomes.is_empty());
        assert_eq!(f.store.list(StorageRoot::Backup).unwrap().count(), 0);
    }
}
