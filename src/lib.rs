//! # model_vault
//!
//! A content-addressed store for model weight files.
//!
//! Every blob is named by the BLAKE3 hash of its bytes and lives under a
//! local library root, optionally mirrored to a backup root on an external
//! drive. Packs declare the blobs they need in `pack.json` manifests; the
//! vault joins those declarations with what is on disk to tell which blobs
//! are referenced, orphaned, missing or only backed up.
//!
//! ## Core Concepts
//!
//! - **Blobs**: Immutable files named by content hash, sharded by prefix
//! - **Packs**: Manifests mapping dependency ids to blob hashes
//! - **Inventory**: Derived status and location of every known hash
//! - **Backup**: Copy, restore, sync and guarded deletion across roots
//!
//! ## Example
//!
//! ```ignore
//! use model_vault::{Vault, VaultConfig};
//!
//! let vault = Vault::open(VaultConfig::new("/data/library", "/data/packs"))?;
//! let imported = vault.import_file("model.safetensors".as_ref(), None)?;
//! let scan = vault.inventory().scan()?;
//! ```

pub mod backup;
pub mod config;
pub mod graph;
pub mod inventory;
pub mod model;
pub mod store;

mod error;
mod vault;

pub use backup::{
    BackupDestinationState, BackupService, BulkAction, DeleteReport, DeleteTarget,
    OperationId, OperationSnapshot, OperationState, SyncDirection, Transfer,
};
pub use config::{BackupConfig, VaultConfig};
pub use error::{Error, Result};
pub use graph::{DependencyGraph, DirectoryManifests, ManifestSource, StaticManifests};
pub use inventory::{InventoryFilter, InventoryService, InventorySummary, SortKey, SortOrder};
pub use model::{
    BlobLocation, BlobStatus, Hash, InventoryItem, ItemOutcome, PackManifest,
};
pub use store::{BlobStore, StorageRoot};
pub use vault::{ImportOutcome, Vault};
