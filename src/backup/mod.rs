//! Backup and restore between the local library and a backup destination
//!
//! Single-blob copies, one-way sync, guarded deletes and bulk actions.
//! Long-running work is tracked as operations with a stable id, progress and
//! cancellation.

mod destination;
mod operation;
mod service;

pub use destination::{free_space, probe, BackupDestinationState};
pub use operation::{
    OperationHandle, OperationId, OperationSnapshot, OperationState, OperationTracker, Progress,
};
pub use service::{
    BackupService, BulkAction, DeleteReport, DeleteTarget, SideOutcome, SyncDirection, Transfer,
};
