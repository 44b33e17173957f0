//! The simulation engine: owns the controllers and orchestrates the
//! three-phase tick pipeline.
//!
//! # Architecture
//!
//! The `Engine` owns:
//! - A slotmap of [`ControllerState`] entities
//! - The [`WorldState`] only sync actions may mutate
//! - The shared services injected into every controller tick:
//!   [`TaskExecutor`], [`MainThreadSync`], [`RecipeRegistry`],
//!   [`StructureMatcher`], [`HookDispatcher`]
//!
//! # Three-Phase Pipeline
//!
//! Each `step()` runs on the authoritative thread:
//! 1. **Sync drain** -- queued world mutations from worker threads apply,
//!    FIFO, exactly once per tick.
//! 2. **Controller tick** -- every controller advances; with the `parallel`
//!    feature the tick bodies are dispatched across worker threads (they
//!    share nothing mutable).
//! 3. **Bookkeeping** -- increment the tick counter.

use crate::controller::{ControllerConfig, ControllerState, TickContext};
use crate::executor::TaskExecutor;
use crate::fixed::Ticks;
use crate::hooks::HookDispatcher;
use crate::id::ControllerId;
use crate::registry::RecipeRegistry;
use crate::structure::{MachineSnapshot, StructureMatcher, StructurePattern};
use crate::sync::MainThreadSync;
use crate::world::WorldState;
use slotmap::SlotMap;
use std::sync::Arc;

/// The core simulation engine.
pub struct Engine {
    controllers: SlotMap<ControllerId, ControllerState>,
    world: WorldState,
    executor: Arc<TaskExecutor>,
    sync: Arc<MainThreadSync>,
    registry: Arc<RecipeRegistry>,
    matcher: Arc<dyn StructureMatcher>,
    hooks: Arc<HookDispatcher>,
    tick: Ticks,
}

impl Engine {
    /// Build an engine around its shared services. The registry and hook
    /// dispatcher are frozen here; register everything first.
    pub fn new(
        registry: RecipeRegistry,
        matcher: Arc<dyn StructureMatcher>,
        hooks: HookDispatcher,
        executor: TaskExecutor,
    ) -> Self {
        Self {
            controllers: SlotMap::with_key(),
            world: WorldState::new(),
            executor: Arc::new(executor),
            sync: Arc::new(MainThreadSync::new()),
            registry: Arc::new(registry),
            matcher,
            hooks: Arc::new(hooks),
            tick: 0,
        }
    }

    // -- Controllers -------------------------------------------------------

    pub fn add_controller(
        &mut self,
        pattern: StructurePattern,
        snapshot: MachineSnapshot,
        config: ControllerConfig,
    ) -> ControllerId {
        self.controllers
            .insert_with_key(|id| ControllerState::new(id, pattern, snapshot, config))
    }

    pub fn remove_controller(&mut self, id: ControllerId) -> bool {
        self.controllers.remove(id).is_some()
    }

    pub fn controller(&self, id: ControllerId) -> Option<&ControllerState> {
        self.controllers.get(id)
    }

    pub fn controller_mut(&mut self, id: ControllerId) -> Option<&mut ControllerState> {
        self.controllers.get_mut(id)
    }

    pub fn controller_count(&self) -> usize {
        self.controllers.len()
    }

    /// Restore a controller's saved recipe progress against this engine's
    /// registry. Returns whether a recipe was restored; an unresolvable
    /// identifier loads as "no active recipe".
    pub fn restore_recipe(&mut self, id: ControllerId, saved: &crate::serialize::SavedRecipe) -> bool {
        let registry = Arc::clone(&self.registry);
        self.controllers
            .get_mut(id)
            .map(|controller| controller.restore_recipe(saved, &registry))
            .unwrap_or(false)
    }

    // -- Shared services ---------------------------------------------------

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn registry(&self) -> &RecipeRegistry {
        &self.registry
    }

    pub fn executor(&self) -> &TaskExecutor {
        &self.executor
    }

    pub fn current_tick(&self) -> Ticks {
        self.tick
    }

    // -- Pipeline ----------------------------------------------------------

    /// Advance the simulation by one tick.
    pub fn step(&mut self) {
        // Phase 1: apply queued world mutations.
        self.sync.drain(&mut self.world);

        // Phase 2: controller ticks.
        let ctx = TickContext {
            tick: self.tick,
            executor: &self.executor,
            sync: &self.sync,
            registry: &self.registry,
            matcher: &self.matcher,
            hooks: &self.hooks,
        };

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            let mut controllers: Vec<&mut ControllerState> =
                self.controllers.values_mut().collect();
            controllers
                .par_iter_mut()
                .for_each(|controller| controller.tick(&ctx));
        }

        #[cfg(not(feature = "parallel"))]
        for controller in self.controllers.values_mut() {
            controller.tick(&ctx);
        }

        // Phase 3: bookkeeping.
        self.tick += 1;
    }

    /// Run `n` steps.
    pub fn step_n(&mut self, n: usize) {
        for _ in 0..n {
            self.step();
        }
    }

    /// Drop all controllers, world state, queued sync actions and executor
    /// statistics. Idempotent.
    pub fn reset(&mut self) {
        self.controllers.clear();
        self.world.reset();
        self.sync.reset();
        self.executor.reset();
        self.tick = 0;
    }
}

// ===========================================================================
// Tests
// ===========================================================================
