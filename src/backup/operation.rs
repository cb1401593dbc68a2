//! Long-running operation tracking
//!
//! Every sync or bulk action gets an `OperationHandle` with a stable id.
//! State moves `Idle -> InProgress -> {Completed | Failed | Cancelled}` and
//! never backwards. An operation that cannot start goes `Idle -> Failed`. Progress is updated while the work runs, so callers can
//! poll a background operation through the `OperationTracker`.

use crate::model::{ItemOutcome, OutcomeCounts};
use crate::{Error, Result};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Stable identifier of an operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    fn new() -> Self {
        OperationId(Uuid::new_v4())
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OperationId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(OperationId)
            .map_err(|_| Error::OperationNotFound(s.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Idle,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationState::Completed | OperationState::Failed | OperationState::Cancelled
        )
    }
}

/// Items and bytes done out of total
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub items_done: usize,
    pub items_total: usize,
    pub bytes_done: u64,
    pub bytes_total: u64,
}

/// Point-in-time copy of an operation, safe to hand to callers
#[derive(Clone, Debug, Serialize)]
pub struct OperationSnapshot {
    pub id: OperationId,
    pub label: String,
    pub state: OperationState,
    pub progress: Progress,
    pub counts: OutcomeCounts,
    pub outcomes: Vec<ItemOutcome>,
    pub error: Option<String>,
}

struct Status {
    state: OperationState,
    progress: Progress,
    outcomes: Vec<ItemOutcome>,
    error: Option<String>,
}

struct Inner {
    id: OperationId,
    label: String,
    status: Mutex<Status>,
    cancel: AtomicBool,
}

/// Shared handle to one operation
#[derive(Clone)]
pub struct OperationHandle {
    inner: Arc<Inner>,
}

impl OperationHandle {
    pub fn new(label: impl Into<String>) -> Self {
        OperationHandle {
            inner: Arc::new(Inner {
                id: OperationId::new(),
                label: label.into(),
                status: Mutex::new(Status {
                    state: OperationState::Idle,
                    progress: Progress::default(),
                    outcomes: Vec::new(),
                    error: None,
                }),
                cancel: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> OperationId {
        self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn state(&self) -> OperationState {
        self.inner.status.lock().state
    }

    pub fn progress(&self) -> Progress {
        self.inner.status.lock().progress
    }

    /// `Idle -> InProgress`; returns false if the operation already started
    pub fn begin(&self) -> bool {
        let mut status = self.inner.status.lock();
        if status.state != OperationState::Idle {
            return false;
        }
        status.state = OperationState::InProgress;
        true
    }

    /// Set the amount of work once it is known
    pub fn set_totals(&self, items_total: usize, bytes_total: u64) {
        let mut status = self.inner.status.lock();
        status.progress.items_total = items_total;
        status.progress.bytes_total = bytes_total;
    }

    pub fn add_bytes(&self, bytes: u64) {
        self.inner.status.lock().progress.bytes_done += bytes;
    }

    /// Roll back bytes of an item copy that did not complete
    pub fn remove_bytes(&self, bytes: u64) {
        let mut status = self.inner.status.lock();
        status.progress.bytes_done = status.progress.bytes_done.saturating_sub(bytes);
    }

    /// Record one finished item
    pub fn record(&self, outcome: ItemOutcome) {
        let mut status = self.inner.status.lock();
        status.progress.items_done += 1;
        status.outcomes.push(outcome);
    }

    /// Ask the operation to stop at the next item or chunk boundary
    pub fn cancel(&self) {
        self.inner.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.load(Ordering::SeqCst)
    }

    /// `InProgress -> Completed`, or `Cancelled` if cancellation was requested
    pub fn finish(&self) {
        let cancelled = self.is_cancelled();
        let mut status = self.inner.status.lock();
        if status.state == OperationState::InProgress {
            status.state = if cancelled {
                OperationState::Cancelled
            } else {
                OperationState::Completed
            };
        }
    }

    /// `Idle | InProgress -> Failed` for errors that stop the whole
    /// operation, including ones raised before it could start
    pub fn fail(&self, err: &Error) {
        let mut status = self.inner.status.lock();
        if !status.state.is_terminal() {
            status.state = OperationState::Failed;
            status.error = Some(err.to_string());
        }
    }

    pub fn snapshot(&self) -> OperationSnapshot {
        let status = self.inner.status.lock();
        OperationSnapshot {
            id: self.inner.id,
            label: self.inner.label.clone(),
            state: status.state,
            progress: status.progress,
            counts: OutcomeCounts::tally(&status.outcomes),
            outcomes: status.outcomes.clone(),
            error: status.error.clone(),
        }
    }
}

/// Registry of operations by id
#[derive(Default)]
pub struct OperationTracker {
    operations: RwLock<HashMap<OperationId, OperationHandle>>,
}

impl OperationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a new idle operation
    pub fn register(&self, label: impl Into<String>) -> OperationHandle {
        let handle = OperationHandle::new(label);
        self.operations.write().insert(handle.id(), handle.clone());
        handle
    }

    pub fn get(&self, id: &OperationId) -> Option<OperationHandle> {
        self.operations.read().get(id).cloned()
    }

    pub fn snapshot(&self, id: &OperationId) -> Result<OperationSnapshot> {
        self.get(id)
            .map(|h| h.snapshot())
            .ok_or_else(|| Error::OperationNotFound(id.to_string()))
    }

    pub fn cancel(&self, id: &OperationId) -> Result<()> {
        let handle = self
            .get(id)
            .ok_or_else(|| Error::OperationNotFound(id.to_string()))?;
        handle.cancel();
        Ok(())
    }

    pub fn list(&self) -> Vec<OperationSnapshot> {
        self.operations
            .read()
            .values()
            .map(|h| h.snapshot())
            .collect()
    }

    /// Forget operations that reached a terminal state
    pub fn prune_finished(&self) -> usize {
        let mut operations = self.operations.write();
        let before = operations.len();
        operations.retain(|_, h| !h.state().is_terminal());
        before - operations.len()
    }
}
