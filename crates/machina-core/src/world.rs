//! Authoritative world state mutated only through the sync queue.
//!
//! Worker threads never touch this directly -- the only way in is a
//! [`crate::sync::SyncAction`], which receives `&mut WorldState` when the
//! authoritative thread drains the queue once per tick.

use crate::id::ControllerId;
use slotmap::SecondaryMap;

/// Persisted per-controller block state, the analogue of the controller's
/// visible block in the world (formed/active flags, craft counter).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockSyncState {
    pub formed: bool,
    pub active: bool,
    pub completed_crafts: u64,
}

/// The world-side state owned by the authoritative thread.
#[derive(Debug, Default)]
pub struct WorldState {
    blocks: SecondaryMap<ControllerId, BlockSyncState>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_formed(&mut self, id: ControllerId, formed: bool) {
        if let Some(entry) = self.blocks.entry(id) {
            entry.or_insert(BlockSyncState::default()).formed = formed;
        }
    }

    pub fn set_active(&mut self, id: ControllerId, active: bool) {
        if let Some(entry) = self.blocks.entry(id) {
            entry.or_insert(BlockSyncState::default()).active = active;
        }
    }

    pub fn record_completed(&mut self, id: ControllerId, crafts: u64) {
        if let Some(entry) = self.blocks.entry(id) {
            entry.or_insert(BlockSyncState::default()).completed_crafts += crafts;
        }
    }

    pub fn block(&self, id: ControllerId) -> BlockSyncState {
        self.blocks.get(id).copied().unwrap_or_default()
    }

    /// Drop all block state. Idempotent.
    pub fn reset(&mut self) {
        self.blocks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn controller_id() -> ControllerId {
        let mut sm = SlotMap::<ControllerId, ()>::with_key();
        sm.insert(())
    }

    #[test]
    fn default_block_state_is_unformed() {
        let world = WorldState::new();
        let id = controller_id();
        assert_eq!(world.block(id), BlockSyncState::default());
    }

    #[test]
    fn flags_and_counters_accumulate() {
        let mut world = WorldState::new();
        let id = controller_id();
        world.set_formed(id, true);
        world.set_active(id, true);
        world.record_completed(id, 3);
        world.record_completed(id, 2);

        let block = world.block(id);
        assert!(block.formed);
        assert!(block.active);
        assert_eq!(block.completed_crafts, 5);
    }

    #[test]
    fn reset_twice_is_same_as_once() {
        let mut world = WorldState::new();
        let id = controller_id();
        world.set_formed(id, true);

        world.reset();
        assert_eq!(world.block(id), BlockSyncState::default());
        world.reset();
        assert_eq!(world.block(id), BlockSyncState::default());
    }
}
