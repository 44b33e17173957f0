//! Machine structures: patterns, snapshots, and the matcher boundary.
//!
//! The pattern matcher itself is an external collaborator -- this module
//! defines the [`StructureMatcher`] trait it implements, the immutable
//! [`MachineSnapshot`] captured from a successful match, and the async
//! structure-check task used for large structures.
//!
//! # Snapshot identity
//!
//! A snapshot's identity is its machine type plus a `structure_version`
//! counter bumped every time a new snapshot is installed on a controller.
//! Async results captured against an older identity are stale and must be
//! discarded. Component *amounts* may be updated in place without changing
//! identity; staleness tracks which machine is formed, not its live levels.

use crate::executor::{SubmitterKey, TaskExecutor, TaskHandle};
use crate::id::{ComponentTag, MachineTypeId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Rotation
// ---------------------------------------------------------------------------

/// Horizontal facing of a controller. The matcher receives it so a single
/// registered pattern covers all four orientations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Rotation {
    #[default]
    North,
    East,
    South,
    West,
}

// ---------------------------------------------------------------------------
// Pattern and snapshot
// ---------------------------------------------------------------------------

/// The shape a controller expects its physical structure to satisfy.
/// Opaque to this crate beyond the machine type and cell count; the matcher
/// interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructurePattern {
    pub machine: MachineTypeId,
    /// Number of cells the pattern covers. Structures at or above the
    /// configured threshold are checked asynchronously.
    pub cells: u64,
    pub rotation: Rotation,
}

/// One structural capability discovered by the pattern match, with the
/// amount it currently provides (e.g. buffered energy).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentEntry {
    pub tag: ComponentTag,
    pub amount: u64,
}

/// Immutable view of the machine a controller currently has formed.
///
/// Captured by async tasks at submission; compared against the controller's
/// current snapshot at completion to detect staleness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineSnapshot {
    pub machine: MachineTypeId,
    pub structure_version: u64,
    pub matched_cells: u64,
    pub components: Vec<ComponentEntry>,
}

impl MachineSnapshot {
    pub fn new(machine: MachineTypeId, matched_cells: u64, components: Vec<ComponentEntry>) -> Self {
        Self {
            machine,
            structure_version: 0,
            matched_cells,
            components,
        }
    }

    /// Amount available for a tag, zero when the component is absent.
    pub fn available(&self, tag: &ComponentTag) -> u64 {
        self.components
            .iter()
            .filter(|c| &c.tag == tag)
            .map(|c| c.amount)
            .sum()
    }

    /// Whether `other` was captured from the same formed machine.
    pub fn same_identity(&self, other: &MachineSnapshot) -> bool {
        self.machine == other.machine && self.structure_version == other.structure_version
    }

    /// Update a component amount in place. Does not change identity.
    pub fn set_component_amount(&mut self, tag: &ComponentTag, amount: u64) {
        if let Some(entry) = self.components.iter_mut().find(|c| &c.tag == tag) {
            entry.amount = amount;
        } else {
            self.components.push(ComponentEntry {
                tag: tag.clone(),
                amount,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Matcher boundary
// ---------------------------------------------------------------------------

/// The structural pattern-matcher. Pure and read-only; callable from any
/// thread, including the shared worker pool.
pub trait StructureMatcher: Send + Sync {
    fn matches(&self, pattern: &StructurePattern, rotation: Rotation) -> bool;
}

// ---------------------------------------------------------------------------
// Async structure check
// ---------------------------------------------------------------------------

struct CheckShared {
    done: AtomicBool,
    result: Mutex<Option<bool>>,
}

/// An in-flight asynchronous structure check.
///
/// One producer (the worker), one consumer (the owning controller's tick).
/// The result slot is read at most once.
pub struct StructureCheckTask {
    handle: TaskHandle,
    shared: Arc<CheckShared>,
}

impl StructureCheckTask {
    /// Submit a matcher call to the pool and return the polling handle.
    pub fn submit(
        executor: &TaskExecutor,
        submitter: SubmitterKey,
        matcher: Arc<dyn StructureMatcher>,
        pattern: StructurePattern,
    ) -> Self {
        let shared = Arc::new(CheckShared {
            done: AtomicBool::new(false),
            result: Mutex::new(None),
        });
        let task_shared = Arc::clone(&shared);
        let handle = executor.submit_async(submitter, move || {
            let rotation = pattern.rotation;
            let matched = matcher.matches(&pattern, rotation);
            if let Ok(mut slot) = task_shared.result.lock() {
                *slot = Some(matched);
            }
            task_shared.done.store(true, Ordering::Release);
        });
        Self { handle, shared }
    }

    /// Whether the check has finished (including by panic).
    pub fn is_done(&self) -> bool {
        self.shared.done.load(Ordering::Acquire) || self.handle.is_done()
    }

    /// Take the result. `None` when the worker panicked before writing it;
    /// callers treat that as an invalid structure and re-check later.
    pub fn take_result(&self) -> Option<bool> {
        self.shared.result.lock().ok().and_then(|mut slot| slot.take())
    }
}
