//! Sharded, content-addressed blob storage over named roots
//!
//! Layout (identical for every root):
//! ```text
//! <root>/
//!   <hash[0:2]>/<hash>      blob content, nothing else
//!   .staging/               in-flight writes, never listed
//! ```
//!
//! Writes stream into a staged temp file inside the same root, hashing as
//! they go. The staged file is only renamed to its final hash path after the
//! hash has been verified and the data synced, so a crash or cancellation can
//! never leave a partial file under a hash name.

use crate::model::{Hash, CHUNK_SIZE};
use crate::store::lock::{HashLockGuard, HashLockTable};
use crate::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use walkdir::WalkDir;

const STAGING_DIR: &str = ".staging";

/// A named storage root
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageRoot {
    Local,
    Backup,
}

impl StorageRoot {
    /// The other root
    pub fn opposite(&self) -> Self {
        match self {
            StorageRoot::Local => StorageRoot::Backup,
            StorageRoot::Backup => StorageRoot::Local,
        }
    }
}

impl fmt::Display for StorageRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageRoot::Local => f.write_str("local"),
            StorageRoot::Backup => f.write_str("backup"),
        }
    }
}

/// A blob found by a root listing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlobEntry {
    pub hash: Hash,
    pub size_bytes: u64,
}

/// Result of a write
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteOutcome {
    pub hash: Hash,
    pub size_bytes: u64,
    /// False when the hash was already stored and the new copy was discarded
    pub newly_written: bool,
}

/// Content streamed into a root's staging area, hashed but not yet visible
pub struct StagedBlob {
    root: StorageRoot,
    root_path: PathBuf,
    file: NamedTempFile,
    hash: Hash,
    size_bytes: u64,
}

impl StagedBlob {
    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn root(&self) -> StorageRoot {
        self.root
    }
}

/// Physical blob storage keyed by hash
pub struct BlobStore {
    local: PathBuf,
    backup: RwLock<Option<PathBuf>>,
    locks: HashLockTable,
}

impl BlobStore {
    /// Open a store; the local root is created if missing, the backup root
    /// never is (an absent backup path means the destination is unmounted)
    pub fn new(local: impl Into<PathBuf>, backup: Option<PathBuf>) -> Result<Self> {
        let local = local.into();
        fs::create_dir_all(&local)?;
        Ok(BlobStore {
            local,
            backup: RwLock::new(backup),
            locks: HashLockTable::new(),
        })
    }

    /// Re-point (or detach) the backup root
    pub fn set_backup_root(&self, path: Option<PathBuf>) {
        *self.backup.write() = path;
    }

    /// Configured backup root, whether or not it is reachable
    pub fn backup_root(&self) -> Option<PathBuf> {
        self.backup.read().clone()
    }

    /// Resolve a root to its directory, failing if it is not usable
    pub fn root_path(&self, root: StorageRoot) -> Result<PathBuf> {
        match root {
            StorageRoot::Local => Ok(self.local.clone()),
            StorageRoot::Backup => {
                let path = self.backup.read().clone().ok_or_else(|| {
                    Error::DestinationUnreachable("no backup destination configured".into())
                })?;
                if path.is_dir() {
                    Ok(path)
                } else {
                    Err(Error::DestinationUnreachable(format!(
                        "{} is not an accessible directory",
                        path.display()
                    )))
                }
            }
        }
    }

    /// Whether the root can currently be used
    pub fn is_available(&self, root: StorageRoot) -> bool {
        self.root_path(root).is_ok()
    }

    /// Final path of a blob under a root
    pub fn blob_path(&self, root: StorageRoot, hash: &Hash) -> Result<PathBuf> {
        let base = self.root_path(root)?;
        Ok(shard_path(&base, hash))
    }

    /// Acquire the per-hash lock; callers hold it across multi-step operations
    pub fn lock(&self, hash: &Hash) -> HashLockGuard<'_> {
        self.locks.lock(hash)
    }

    pub fn exists(&self, root: StorageRoot, hash: &Hash) -> bool {
        self.blob_path(root, hash)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }

    /// Size in bytes of a stored blob
    pub fn size(&self, root: StorageRoot, hash: &Hash) -> Result<u64> {
        let path = self.blob_path(root, hash)?;
        let meta = fs::metadata(&path).map_err(|e| not_found_or(e, hash))?;
        Ok(meta.len())
    }

    /// Stream `reader` into the staging area of `root`, hashing as it goes.
    ///
    /// `on_chunk` sees the size of every chunk written and may stop the
    /// transfer, in which case the staged file is removed and `Cancelled`
    /// is returned.
    pub fn stage(
        &self,
        root: StorageRoot,
        mut reader: impl Read,
        on_chunk: &mut dyn FnMut(u64) -> ControlFlow<()>,
    ) -> Result<StagedBlob> {
        let root_path = self.root_path(root)?;
        let staging = root_path.join(STAGING_DIR);
        fs::create_dir_all(&staging)?;

        let mut file = tempfile::Builder::new()
            .prefix("blob-")
            .suffix(".partial")
            .tempfile_in(&staging)?;
        let mut hasher = blake3::Hasher::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut size_bytes = 0u64;

        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n])?;
            size_bytes += n as u64;
            if on_chunk(n as u64).is_break() {
                debug!(%root, "staged write cancelled after {} bytes", size_bytes);
                return Err(Error::Cancelled);
            }
        }

        file.as_file().sync_all()?;
        Ok(StagedBlob {
            root,
            root_path,
            file,
            hash: Hash::from_bytes(*hasher.finalize().as_bytes()),
            size_bytes,
        })
    }

    /// Make a staged blob visible under its hash path.
    ///
    /// With `expected` set, a hash disagreement discards the staged file and
    /// fails with `HashMismatch`. Callers should hold the lock for the hash.
    pub fn commit(&self, staged: StagedBlob, expected: Option<&Hash>) -> Result<WriteOutcome> {
        if let Some(expected) = expected {
            if *expected != staged.hash {
                warn!(
                    root = %staged.root,
                    expected = %expected,
                    actual = %staged.hash,
                    "hash mismatch, discarding staged blob"
                );
                return Err(Error::HashMismatch {
                    expected: expected.to_hex(),
                    actual: staged.hash.to_hex(),
                });
            }
        }

        let final_path = shard_path(&staged.root_path, &staged.hash);
        if final_path.is_file() {
            debug!(root = %staged.root, hash = %staged.hash, "blob already stored");
            return Ok(WriteOutcome {
                hash: staged.hash,
                size_bytes: staged.size_bytes,
                newly_written: false,
            });
        }

        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }
        staged.file.persist(&final_path).map_err(|e| Error::from(e.error))?;
        debug!(root = %staged.root, hash = %staged.hash, size = staged.size_bytes, "blob written");

        Ok(WriteOutcome {
            hash: staged.hash,
            size_bytes: staged.size_bytes,
            newly_written: true,
        })
    }

    /// Write content that must hash to `hash`
    pub fn write(&self, root: StorageRoot, hash: &Hash, reader: impl Read) -> Result<WriteOutcome> {
        self.write_with_progress(root, hash, reader, &mut |_| ControlFlow::Continue(()))
    }

    /// `write`, reporting each streamed chunk to `on_chunk`
    pub fn write_with_progress(
        &self,
        root: StorageRoot,
        hash: &Hash,
        reader: impl Read,
        on_chunk: &mut dyn FnMut(u64) -> ControlFlow<()>,
    ) -> Result<WriteOutcome> {
        let staged = self.stage(root, reader, on_chunk)?;
        self.commit(staged, Some(hash))
    }

    /// Open a blob for streaming reads
    pub fn read(&self, root: StorageRoot, hash: &Hash) -> Result<File> {
        let path = self.blob_path(root, hash)?;
        File::open(&path).map_err(|e| not_found_or(e, hash))
    }

    /// Remove a blob, returning the bytes freed
    pub fn delete(&self, root: StorageRoot, hash: &Hash) -> Result<u64> {
        let path = self.blob_path(root, hash)?;
        let size = fs::metadata(&path).map_err(|e| not_found_or(e, hash))?.len();
        fs::remove_file(&path).map_err(|e| not_found_or(e, hash))?;
        debug!(%root, %hash, "blob deleted");

        // Drop the shard directory once it is empty; failure just leaves it
        if let Some(parent) = path.parent() {
            let _ = fs::remove_dir(parent);
        }
        Ok(size)
    }

    /// Recompute the hash of the stored content (streams the whole file)
    pub fn hash_on_disk(&self, root: StorageRoot, hash: &Hash) -> Result<Hash> {
        let file = self.read(root, hash)?;
        let (actual, _) = Hash::digest_reader(file)?;
        Ok(actual)
    }

    /// Lazily list every blob of a root.
    ///
    /// Each call is a fresh directory scan. Entries that do not follow the
    /// sharded layout are ignored; unreadable entries are skipped with a
    /// warning.
    pub fn list(&self, root: StorageRoot) -> Result<impl Iterator<Item = BlobEntry>> {
        let base = self.root_path(root)?;
        let walker = WalkDir::new(&base)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_entry(|e| e.depth() != 1 || e.file_name() != STAGING_DIR);

        Ok(walker.filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(%root, "skipping unreadable entry: {}", e);
                    return None;
                }
            };
            if !entry.file_type().is_file() {
                return None;
            }
            let name = entry.file_name().to_str()?;
            let hash = Hash::from_hex(name).ok()?;
            // Only the canonical lowercase name is reachable through `exists`
            if name != hash.to_hex() {
                return None;
            }
            let shard = entry.path().parent()?.file_name()?.to_str()?;
            if shard != hash.shard() {
                return None;
            }
            match entry.metadata() {
                Ok(meta) => Some(BlobEntry {
                    hash,
                    size_bytes: meta.len(),
                }),
                Err(e) => {
                    warn!(%root, %hash, "skipping blob without metadata: {}", e);
                    None
                }
            }
        }))
    }

    /// Remove staged files left behind by interrupted writes.
    ///
    /// Only files not modified for at least `older_than` are removed, so a
    /// write still streaming in another process keeps its staged file.
    pub fn sweep_staging(&self, root: StorageRoot, older_than: Duration) -> Result<usize> {
        let staging = self.root_path(root)?.join(STAGING_DIR);
        if !staging.is_dir() {
            return Ok(0);
        }
        let now = SystemTime::now();
        let mut removed = 0;
        for entry in fs::read_dir(&staging)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            // A modification time in the future counts as fresh
            let age = now
                .duration_since(meta.modified()?)
                .unwrap_or(Duration::ZERO);
            if age < older_than {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if removed > 0 {
            debug!(%root, removed, "swept staging area");
        }
        Ok(removed)
    }
}

fn shard_path(base: &Path, hash: &Hash) -> PathBuf {
    base.join(hash.shard()).join(hash.to_hex())
}

fn not_found_or(err: std::io::Error, hash: &Hash) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::NotFound(hash.to_hex())
    } else {
        err.into()
    }
}
