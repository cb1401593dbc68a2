//! Core data model types for model_vault

mod hash;
mod inventory;
mod outcome;
mod pack;

pub use hash::{Hash, CHUNK_SIZE};
pub use inventory::{BlobLocation, BlobStatus, InventoryItem};
pub use outcome::{ItemOutcome, ItemResult, OutcomeCounts};
pub use pack::{DependencyRecord, Impact, Origin, PackDependency, PackManifest};
