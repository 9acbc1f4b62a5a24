//! Per-sender processing slots.
//!
//! At most one pipeline run is in flight per sender; later messages from
//! the same sender queue on the slot's mutex, so their side effects land
//! in arrival order. A global cap bounds the number of live slots; a
//! message arriving above the cap is dropped by the caller. The slot is
//! removed from the map when its last holder or waiter finishes.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

struct SlotEntry {
    lock: Arc<Mutex<()>>,
    waiters: AtomicUsize,
}

impl SlotEntry {
    fn new() -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
            waiters: AtomicUsize::new(0),
        }
    }
}

pub struct ProcessingSlots {
    slots: Arc<DashMap<String, Arc<SlotEntry>>>,
    max_slots: usize,
}

impl ProcessingSlots {
    pub fn new(max_slots: usize) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            max_slots,
        }
    }

    /// Acquire the sender's slot, waiting behind any in-flight run for
    /// the same sender. Returns `None` when the sender has no live slot
    /// and the global cap is reached.
    pub async fn acquire(&self, sender: &str) -> Option<SlotGuard> {
        // The waiter count must be bumped while the map reference is still
        // held: a concurrently dropping guard re-checks the count under the
        // same shard lock before removing the entry, so registering here
        // keeps it from deleting a slot we are about to wait on.
        let entry = if let Some(existing) = self.slots.get(sender) {
            existing.waiters.fetch_add(1, Ordering::SeqCst);
            existing.clone()
        } else {
            if self.slots.len() >= self.max_slots {
                return None;
            }
            let entry = self
                .slots
                .entry(sender.to_string())
                .or_insert_with(|| Arc::new(SlotEntry::new()));
            entry.waiters.fetch_add(1, Ordering::SeqCst);
            entry.clone()
        };

        let permit = entry.lock.clone().lock_owned().await;

        Some(SlotGuard {
            sender: sender.to_string(),
            slots: self.slots.clone(),
            entry,
            _permit: permit,
        })
    }

    /// Number of senders currently holding a slot.
    pub fn live_slots(&self) -> usize {
        self.slots.len()
    }
}

/// Holds the sender's slot for the duration of one pipeline run.
pub struct SlotGuard {
    sender: String,
    slots: Arc<DashMap<String, Arc<SlotEntry>>>,
    entry: Arc<SlotEntry>,
    _permit: OwnedMutexGuard<()>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        // Last waiter out removes the slot. The waiter count is checked
        // again under the shard lock so a sender arriving concurrently
        // keeps the entry alive.
        if self.entry.waiters.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.slots.remove_if(&self.sender, |_, value| {
                Arc::ptr_eq(value, &self.entry) && value.waiters.load(Ordering::SeqCst) == 0
            });
        }
    }
}
