//! Vault configuration
//!
//! Stored as JSON. Services take these structs in their constructors, so
//! tests can point every root at a temporary directory.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Backup destination settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Root of the backup tree (usually an external drive or network mount)
    #[serde(default)]
    pub destination_path: Option<PathBuf>,
    /// Back up newly imported blobs right away
    #[serde(default)]
    pub auto_backup_new: bool,
    /// Refuse to delete a blob's last copy unless forced
    #[serde(default = "default_true")]
    pub warn_before_delete_last_copy: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        BackupConfig {
            enabled: false,
            destination_path: None,
            auto_backup_new: false,
            warn_before_delete_last_copy: true,
        }
    }
}

impl BackupConfig {
    /// Backup root to use, if backups are enabled and a path is set
    pub fn active_destination(&self) -> Option<&Path> {
        if self.enabled {
            self.destination_path.as_deref()
        } else {
            None
        }
    }
}

fn default_true() -> bool {
    true
}

/// Top-level configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Local blob root
    pub library_root: PathBuf,
    /// Directory containing one sub-directory per pack
    pub packs_root: PathBuf,
    #[serde(default)]
    pub backup: BackupConfig,
}

impl VaultConfig {
    pub fn new(library_root: impl Into<PathBuf>, packs_root: impl Into<PathBuf>) -> Self {
        VaultConfig {
            library_root: library_root.into(),
            packs_root: packs_root.into(),
            backup: BackupConfig::default(),
        }
    }

    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Save config as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Default config location (~/.config/model-vault/config.json)
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not find config directory".into()))?;
        Ok(config_dir.join("model-vault").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_backup_defaults() {
        let config = BackupConfig::default();
        assert!(!config.enabled);
        assert!(config.warn_before_delete_last_copy);
        assert!(config.active_destination().is_none());
    }

    #[test]
    fn test_missing_backup_fields_use_defaults() {
        let config: VaultConfig =
            serde_json::from_str(r#"{"library_root":"/lib","packs_root":"/packs","backup":{}}"#)
                .unwrap();
        assert!(config.backup.warn_before_delete_last_copy);
        assert!(!config.backup.auto_backup_new);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = VaultConfig::new(dir.path().join("lib"), dir.path().join("packs"));
        config.backup.enabled = true;
        config.backup.destination_path = Some(dir.path().join("usb"));
        config.save(&path).unwrap();

        let loaded = VaultConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(
            loaded.backup.active_destination(),
            Some(dir.path().join("usb").as_path())
        );
    }

    #[test]
    fn test_load_missing_is_config_error() {
        let dir = tempdir().unwrap();
        let err = VaultConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert_eq!(err.code(), "config_error");
    }
}
