//! Per-hash lock table
//!
//! Operations on the same hash are serialized; operations on different
//! hashes never contend on anything but the short table lookup. Lock slots
//! live in an arena and are indexed by hash; a slot returns to the free list
//! once its last holder or waiter releases it.

use crate::model::Hash;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::collections::HashMap;
use std::sync::Arc;

struct SlotRef {
    slot: usize,
    /// Holders plus waiters currently using this slot
    users: usize,
}

#[derive(Default)]
struct Slots {
    arena: Vec<Arc<Mutex<()>>>,
    index: HashMap<Hash, SlotRef>,
    free: Vec<usize>,
}

/// Lock table keyed by blob hash
#[derive(Default)]
pub struct HashLockTable {
    slots: Mutex<Slots>,
}

/// Held lock for one hash; released on drop
pub struct HashLockGuard<'a> {
    table: &'a HashLockTable,
    hash: Hash,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl HashLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lock for `hash` is held
    pub fn lock(&self, hash: &Hash) -> HashLockGuard<'_> {
        let mutex = {
            let mut slots = self.slots.lock();
            let Slots { arena, index, free } = &mut *slots;
            let entry = index.entry(*hash).or_insert_with(|| {
                let slot = free.pop().unwrap_or_else(|| {
                    arena.push(Arc::new(Mutex::new(())));
                    arena.len() - 1
                });
                SlotRef { slot, users: 0 }
            });
            entry.users += 1;
            Arc::clone(&arena[entry.slot])
        };

        HashLockGuard {
            table: self,
            hash: *hash,
            guard: Some(mutex.lock_arc()),
        }
    }

    /// Number of hashes with a live slot (held or waited on)
    pub fn active(&self) -> usize {
        self.slots.lock().index.len()
    }

    fn release(&self, hash: &Hash) {
        let mut slots = self.slots.lock();
        let done = match slots.index.get_mut(hash) {
            Some(entry) => {
                entry.users -= 1;
                entry.users == 0
            }
            None => false,
        };
        if done {
            if let Some(entry) = slots.index.remove(hash) {
                slots.free.push(entry.slot);
            }
        }
    }
}

impl Drop for HashLockGuard<'_> {
    fn drop(&mut self) {
        // Unlock before giving the slot back
        self.guard.take();
        self.table.release(&self.hash);
    }
}
