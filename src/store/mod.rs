//! Content-addressed blob store
//!
//! Blobs are stored by their BLAKE3 hash under one or more roots (the local
//! library and an optional backup destination), sharded by hash prefix.

mod blob_store;
mod lock;

pub use blob_store::{BlobEntry, BlobStore, StagedBlob, StorageRoot, WriteOutcome};
pub use lock::{HashLockGuard, HashLockTable};
