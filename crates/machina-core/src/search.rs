//! Asynchronous recipe search.
//!
//! A search runs on the shared worker pool, never the tick thread. It works
//! against an immutable snapshot captured at submission; the owning
//! controller polls for completion on later ticks and, before applying the
//! result, compares the captured snapshot identity against its current
//! machine. A mismatch means the result is stale: it is discarded without
//! touching controller state (logical cancellation -- the work is computed
//! but thrown away).
//!
//! The result lives in a single-slot channel: one producer (the worker), one
//! consumer (the owning controller), read at most once.

use crate::executor::{SubmitterKey, TaskExecutor, TaskHandle};
use crate::id::MachineTypeId;
use crate::recipe::{ActiveRecipe, Modifier, RecipeCraftingContext, RecipeDefinition};
use crate::status::CraftingStatus;
use crate::structure::MachineSnapshot;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// What a finished search produced.
#[derive(Debug)]
pub enum SearchOutcome {
    /// The first candidate whose requirements the snapshot satisfies, ready
    /// to start (the controller re-validates against its live snapshot).
    Found(RecipeCraftingContext),
    /// No candidate matched; the status describes the most informative
    /// failure among them.
    NotFound(CraftingStatus),
}

/// Try each candidate in order against the snapshot.
///
/// On failure, reports the candidate that satisfied the most requirements
/// before falling short -- the most informative reason for the status layer.
pub fn run_search(
    snapshot: &MachineSnapshot,
    candidates: Vec<RecipeDefinition>,
    modifiers: &[Modifier],
    max_parallelism: u32,
) -> SearchOutcome {
    let mut best_reason: Option<(usize, String)> = None;

    for definition in candidates {
        let active = ActiveRecipe::new(definition.id, max_parallelism);
        let context = RecipeCraftingContext::new(definition, active, modifiers.to_vec());
        match context.check_start(snapshot) {
            Ok(_) => return SearchOutcome::Found(context),
            Err(failure) => {
                let better = best_reason
                    .as_ref()
                    .is_none_or(|(satisfied, _)| failure.satisfied > *satisfied);
                if better {
                    best_reason = Some((failure.satisfied, failure.reason));
                }
            }
        }
    }

    let reason = best_reason
        .map(|(_, reason)| reason)
        .unwrap_or_else(|| "no matching recipe".to_string());
    SearchOutcome::NotFound(CraftingStatus::failure(reason))
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

struct SearchShared {
    done: AtomicBool,
    outcome: Mutex<Option<SearchOutcome>>,
}

/// One in-flight search job, shared between the submitting controller and a
/// pool worker. At most one exists per controller at any instant.
pub struct RecipeSearchTask {
    handle: TaskHandle,
    shared: Arc<SearchShared>,
    /// Captured snapshot identity, for the staleness check at completion.
    machine: MachineTypeId,
    structure_version: u64,
}

impl RecipeSearchTask {
    /// Capture the controller's current snapshot and submit the search.
    pub fn submit(
        executor: &TaskExecutor,
        submitter: SubmitterKey,
        snapshot: &MachineSnapshot,
        candidates: Vec<RecipeDefinition>,
        modifiers: Vec<Modifier>,
        max_parallelism: u32,
    ) -> Self {
        let shared = Arc::new(SearchShared {
            done: AtomicBool::new(false),
            outcome: Mutex::new(None),
        });
        let machine = snapshot.machine;
        let structure_version = snapshot.structure_version;

        let task_shared = Arc::clone(&shared);
        let captured = snapshot.clone();
        let handle = executor.submit_async(submitter, move || {
            let outcome = run_search(&captured, candidates, &modifiers, max_parallelism);
            if let Ok(mut slot) = task_shared.outcome.lock() {
                *slot = Some(outcome);
            }
            task_shared.done.store(true, Ordering::Release);
        });

        Self {
            handle,
            shared,
            machine,
            structure_version,
        }
    }

    /// Whether the search has finished (including by panic).
    pub fn is_done(&self) -> bool {
        self.shared.done.load(Ordering::Acquire) || self.handle.is_done()
    }

    /// Whether the captured snapshot still describes `current`.
    pub fn matches_snapshot(&self, current: &MachineSnapshot) -> bool {
        self.machine == current.machine && self.structure_version == current.structure_version
    }

    /// Take the outcome. `None` when the worker panicked before writing it.
    /// Single-slot: a second call always yields `None`.
    pub fn take_outcome(&self) -> Option<SearchOutcome> {
        self.shared.outcome.lock().ok().and_then(|mut slot| slot.take())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
