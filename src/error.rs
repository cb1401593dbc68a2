//! Error types for model_vault

use thiserror::Error;

/// Result type alias for model_vault operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in model_vault operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(std::io::Error),

    #[error("Disk full: {0}")]
    DiskFull(std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    #[error("Hash mismatch: expected {expected}, computed {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Corrupt blob {hash}: content hashes to {actual}")]
    Corrupt { hash: String, actual: String },

    #[error("Refusing to delete the last copy of {0} (use force to override)")]
    LastCopyWarning(String),

    #[error("Blob {hash} is referenced by {packs:?} (use force to override)")]
    ReferencedBlobWarning { hash: String, packs: Vec<String> },

    #[error("Backup destination unreachable: {0}")]
    DestinationUnreachable(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation not found: {0}")]
    OperationNotFound(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::StorageFull => Error::DiskFull(err),
            _ => Error::Io(err),
        }
    }
}

impl Error {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Error::Io(_) => "io_error",
            Error::DiskFull(_) => "disk_full",
            Error::InvalidHash(_) => "invalid_hash",
            Error::HashMismatch { .. } => "hash_mismatch",
            Error::NotFound(_) => "not_found",
            Error::Corrupt { .. } => "corrupt",
            Error::LastCopyWarning(_) => "last_copy_warning",
            Error::ReferencedBlobWarning { .. } => "referenced_blob_warning",
            Error::DestinationUnreachable(_) => "destination_unreachable",
            Error::Cancelled => "cancelled",
            Error::OperationNotFound(_) => "operation_not_found",
            // Only config serialization produces JSON errors
            Error::Config(_) | Error::Json(_) => "config_error",
        }
    }

    /// Process exit code for the CLI, one per taxonomy entry
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Io(_) => 1,
            Error::NotFound(_) => 2,
            Error::LastCopyWarning(_) => 3,
            Error::ReferencedBlobWarning { .. } => 4,
            Error::HashMismatch { .. } => 5,
            Error::Corrupt { .. } => 6,
            Error::DestinationUnreachable(_) => 7,
            Error::DiskFull(_) => 8,
            Error::Cancelled => 9,
            Error::InvalidHash(_) => 10,
            Error::Config(_) | Error::Json(_) => 11,
            Error::OperationNotFound(_) => 12,
        }
    }

    /// Soft-fail safety gates that a caller may retry with `force`
    pub fn is_guard_rail(&self) -> bool {
        matches!(
            self,
            Error::LastCopyWarning(_) | Error::ReferencedBlobWarning { .. }
        )
    }

    /// Whether this is a `NotFound` (already-satisfied in idempotent flows)
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
