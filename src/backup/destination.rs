//! Backup destination probe

use crate::config::BackupConfig;
use crate::store::{BlobStore, StorageRoot};
use serde::Serialize;
use std::path::{Path, PathBuf};
use sysinfo::Disks;

/// Connectivity and usage of the backup destination
#[derive(Clone, Debug, Default, Serialize)]
pub struct BackupDestinationState {
    pub connected: bool,
    pub destination_path: Option<PathBuf>,
    pub blob_count: usize,
    pub total_bytes_used: u64,
    /// Unknown when the destination's disk can't be identified
    pub free_space_bytes: Option<u64>,
    pub error: Option<String>,
}

/// Probe the destination. Never fails: problems are reported through
/// `connected = false` and `error`.
pub fn probe(store: &BlobStore, config: &BackupConfig) -> BackupDestinationState {
    let mut state = BackupDestinationState {
        destination_path: config.destination_path.clone(),
        ..Default::default()
    };

    if !config.enabled {
        state.error = Some("backups are disabled".to_string());
        return state;
    }

    let entries = match store.list(StorageRoot::Backup) {
        Ok(entries) => entries,
        Err(err) => {
            state.error = Some(err.to_string());
            return state;
        }
    };

    state.connected = true;
    for entry in entries {
        state.blob_count += 1;
        state.total_bytes_used += entry.size_bytes;
    }
    state.free_space_bytes = config.destination_path.as_deref().and_then(free_space);
    state
}

/// Available bytes on the disk holding `path` (longest matching mount point)
pub fn free_space(path: &Path) -> Option<u64> {
    let path = path.canonicalize().ok()?;
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|d| path.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .map(|d| d.available_space())
}
