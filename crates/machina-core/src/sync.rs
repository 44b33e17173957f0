//! Main-thread sync queue.
//!
//! Worker threads (and controller ticks dispatched onto them) must never
//! mutate authoritative world state directly. They queue a [`SyncAction`]
//! here instead; the authoritative thread drains the queue exactly once per
//! tick, in submission order. A panicking action is caught and logged so a
//! single bad action cannot stall the queue.

use crate::world::WorldState;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;

/// A unit of work deferred to the authoritative thread. The `&mut
/// WorldState` argument is only ever handed out during the drain, which
/// makes off-thread world mutation unrepresentable.
pub type SyncAction = Box<dyn FnOnce(&mut WorldState) + Send + 'static>;

/// FIFO queue of actions awaiting the authoritative thread.
#[derive(Default)]
pub struct MainThreadSync {
    queue: Mutex<VecDeque<SyncAction>>,
}

impl MainThreadSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an action from any thread.
    pub fn submit(&self, action: SyncAction) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(action);
        }
    }

    /// Run all queued actions in submission order. Called exactly once per
    /// tick on the authoritative thread. Actions submitted *during* the
    /// drain (by other threads, or by actions themselves) run next tick.
    ///
    /// Returns the number of actions executed.
    pub fn drain(&self, world: &mut WorldState) -> usize {
        let drained: Vec<SyncAction> = match self.queue.lock() {
            Ok(mut queue) => queue.drain(..).collect(),
            Err(_) => return 0,
        };

        let count = drained.len();
        for action in drained {
            if catch_unwind(AssertUnwindSafe(|| action(&mut *world))).is_err() {
                log::warn!("sync action panicked; continuing drain");
            }
        }
        count
    }

    /// Number of actions waiting for the next drain.
    pub fn pending_count(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Discard all queued actions. Idempotent.
    pub fn reset(&self) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.clear();
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
