//! High-level Vault API
//!
//! Wires the blob store, manifest source, inventory and backup services
//! from one `VaultConfig`, and provides the import entry point used by the
//! download pipeline.

use crate::backup::{BackupService, Transfer};
use crate::config::{BackupConfig, VaultConfig};
use crate::graph::{DirectoryManifests, ManifestSource};
use crate::inventory::InventoryService;
use crate::model::Hash;
use crate::store::{BlobStore, StorageRoot};
use crate::Result;
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Staged files untouched for this long belong to writes that died
const STALE_STAGING_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Result of importing one blob
#[derive(Clone, Debug, Serialize)]
pub struct ImportOutcome {
    pub hash: Hash,
    pub size_bytes: u64,
    /// False when identical content was already stored
    pub newly_written: bool,
    /// Set when the blob was backed up automatically
    pub auto_backup: Option<Transfer>,
    /// Set when an automatic backup was attempted and failed
    pub auto_backup_error: Option<String>,
}

/// The main entry point
pub struct Vault {
    config: VaultConfig,
    store: Arc<BlobStore>,
    inventory: InventoryService,
    backup: Arc<BackupService>,
}

impl Vault {
    /// Open a vault reading pack manifests from `config.packs_root`
    pub fn open(config: VaultConfig) -> Result<Self> {
        let manifests = Arc::new(DirectoryManifests::new(config.packs_root.clone()));
        Self::with_manifests(config, manifests)
    }

    /// Open a vault over a custom manifest source
    pub fn with_manifests(config: VaultConfig, manifests: Arc<dyn ManifestSource>) -> Result<Self> {
        let store = Arc::new(BlobStore::new(config.library_root.clone(), None)?);
        let backup = Arc::new(BackupService::new(
            Arc::clone(&store),
            Arc::clone(&manifests),
            config.backup.clone(),
        ));
        let inventory = InventoryService::new(Arc::clone(&store), manifests);

        let swept = store.sweep_staging(StorageRoot::Local, STALE_STAGING_AGE)?;
        if swept > 0 {
            info!(swept, "removed interrupted writes from the library");
        }

        Ok(Vault {
            config,
            store,
            inventory,
            backup,
        })
    }

    /// Current configuration, including live backup settings
    pub fn config(&self) -> VaultConfig {
        VaultConfig {
            backup: self.backup.config(),
            ..self.config.clone()
        }
    }

    pub fn store(&self) -> &Arc<BlobStore> {
        &self.store
    }

    pub fn inventory(&self) -> &InventoryService {
        &self.inventory
    }

    pub fn backup(&self) -> &Arc<BackupService> {
        &self.backup
    }

    pub fn update_backup_config(&self, config: BackupConfig) {
        self.backup.update_config(config);
    }

    // === Import ===

    /// Store new content in the local library.
    ///
    /// The content is hashed while it streams; if `expected` is given and
    /// differs, nothing is stored and `HashMismatch` is returned. With
    /// `auto_backup_new` on, a newly written blob is backed up straight away;
    /// a failed auto-backup is logged and reported, not returned as an error.
    pub fn import(&self, reader: impl Read, expected: Option<&Hash>) -> Result<ImportOutcome> {
        let staged = self
            .store
            .stage(StorageRoot::Local, reader, &mut |_| ControlFlow::Continue(()))?;
        let hash = staged.hash();

        let written = {
            let _lock = self.store.lock(&hash);
            self.store.commit(staged, expected)?
        };

        let mut outcome = ImportOutcome {
            hash,
            size_bytes: written.size_bytes,
            newly_written: written.newly_written,
            auto_backup: None,
            auto_backup_error: None,
        };

        let backup_config = self.backup.config();
        if written.newly_written && backup_config.enabled && backup_config.auto_backup_new {
            match self.backup.backup(&hash) {
                Ok(transfer) => outcome.auto_backup = Some(transfer),
                Err(err) => {
                    warn!(%hash, "automatic backup failed: {}", err);
                    outcome.auto_backup_error = Some(err.to_string());
                }
            }
        }

        info!(
            %hash,
            size = outcome.size_bytes,
            new = outcome.newly_written,
            "imported blob"
        );
        Ok(outcome)
    }

    /// Import a file from disk
    pub fn import_file(&self, path: &Path, expected: Option<&Hash>) -> Result<ImportOutcome> {
        let file = File::open(path)?;
        self.import(file, expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::StaticManifests;
    use crate::Error;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_import_computes_hash() {
        let dir = tempdir().unwrap();
        let vault = Vault::open(VaultConfig::new(
            dir.path().join("lib"),
            dir.path().join("packs"),
        ))
        .unwrap();

        let outcome = vault.import(&b"fresh model"[..], None).unwrap();
        assert_eq!(outcome.hash, Hash::digest(b"fresh model"));
        assert!(outcome.newly_written);
        assert!(outcome.auto_backup.is_none());

        let again = vault.import(&b"fresh model"[..], None).unwrap();
        assert!(!again.newly_written);
    }

    #[test]
    fn test_import_rejects_wrong_expected_hash() {
        let dir = tempdir().unwrap();
        let vault = Vault::open(VaultConfig::new(
            dir.path().join("lib"),
            dir.path().join("packs"),
        ))
        .unwrap();
        let expected = Hash::digest(b"what the provider promised");

        let err = vault.import(&b"what arrived"[..], Some(&expected)).unwrap_err();
        assert!(matches!(err, Error::HashMismatch { .. }));
        assert_eq!(vault.store().list(StorageRoot::Local).unwrap().count(), 0);
    }

    #[test]
    fn test_auto_backup_new() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("usb");
        fs::create_dir_all(&dest).unwrap();
        let mut config = VaultConfig::new(dir.path().join("lib"), dir.path().join("packs"));
        config.backup = BackupConfig {
            enabled: true,
            destination_path: Some(dest),
            auto_backup_new: true,
            warn_before_delete_last_copy: true,
        };
        let vault =
            Vault::with_manifests(config, Arc::new(StaticManifests::default())).unwrap();

        let outcome = vault.import(&b"auto"[..], None).unwrap();
        assert_eq!(outcome.auto_backup, Some(Transfer::Copied { bytes: 4 }));
        assert!(vault.store().exists(StorageRoot::Backup, &outcome.hash));
    }

    #[test]
    fn test_failed_auto_backup_does_not_fail_import() {
        let dir = tempdir().unwrap();
        let mut config = VaultConfig::new(dir.path().join("lib"), dir.path().join("packs"));
        config.backup.enabled = true;
        config.backup.auto_backup_new = true;
        config.backup.destination_path = Some(dir.path().join("unplugged"));
        let vault = Vault::open(config).unwrap();

        let outcome = vault.import(&b"still stored"[..], None).unwrap();
        assert!(outcome.auto_backup_error.is_some());
        assert!(vault.store().exists(StorageRoot::Local, &outcome.hash));
    }

    #[test]
    fn test_config_reflects_backup_updates() {
        let dir = tempdir().unwrap();
        let vault = Vault::open(VaultConfig::new(
            dir.path().join("lib"),
            dir.path().join("packs"),
        ))
        .unwrap();
        let mut backup = vault.config().backup;
        backup.warn_before_delete_last_copy = false;
        vault.update_backup_config(backup);
        assert!(!vault.config().backup.warn_before_delete_last_copy);
    }

    #[test]
    fn test_open_keeps_in_flight_writes() {
        let dir = tempdir().unwrap();
        let config = VaultConfig::new(dir.path().join("lib"), dir.path().join("packs"));
        let first = Vault::open(config.clone()).unwrap();
        let data = b"downloading in another process".to_vec();
        let staged = first
            .store()
            .stage(StorageRoot::Local, data.as_slice(), &mut |_| {
                ControlFlow::Continue(())
            })
            .unwrap();

        let second = Vault::open(config).unwrap();

        let written = first.store().commit(staged, None).unwrap();
        assert!(written.newly_written);
        assert!(second
            .store()
            .exists(StorageRoot::Local, &Hash::digest(&data)));
    }
}
