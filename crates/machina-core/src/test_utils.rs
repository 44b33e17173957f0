//! Shared test fixtures and deterministic harness pieces.
//!
//! Available to this crate's unit tests and, via the `test-utils` feature,
//! to the integration-test crate. Everything here uses the synchronous
//! executor so the submit-then-poll protocol runs without real concurrency.

use crate::controller::{ControllerConfig, ControllerState, TickContext};
use crate::backoff::Backoff;
use crate::executor::TaskExecutor;
use crate::hooks::HookDispatcher;
use crate::id::{ComponentTag, ControllerId, MachineTypeId};
use crate::recipe::Requirement;
use crate::registry::{RecipeRegistry, RegistryBuilder};
use crate::structure::{
    ComponentEntry, MachineSnapshot, Rotation, StructureMatcher, StructurePattern,
};
use crate::sync::MainThreadSync;
use crate::world::WorldState;
use slotmap::SlotMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Matcher double
// ---------------------------------------------------------------------------

/// A matcher whose verdict tests flip at will, counting invocations.
pub struct ToggleMatcher {
    matched: AtomicBool,
    calls: AtomicU64,
}

impl ToggleMatcher {
    pub fn new(initial: bool) -> Self {
        Self {
            matched: AtomicBool::new(initial),
            calls: AtomicU64::new(0),
        }
    }

    pub fn set(&self, matched: bool) {
        self.matched.store(matched, Ordering::Release);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Acquire)
    }
}

impl StructureMatcher for ToggleMatcher {
    fn matches(&self, _pattern: &StructurePattern, _rotation: Rotation) -> bool {
        self.calls.fetch_add(1, Ordering::AcqRel);
        self.matched.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Registry and snapshot fixtures
// ---------------------------------------------------------------------------

pub fn energy() -> ComponentTag {
    ComponentTag::from("energy_input")
}

pub fn item_bus() -> ComponentTag {
    ComponentTag::from("item_input")
}

/// One assembler machine with two recipes. `gear_press` (registered first)
/// needs an item bus and per-tick energy; `plate_bender` only energy.
pub fn assembler_registry() -> RecipeRegistry {
    let mut b = RegistryBuilder::new();
    let assembler = b.register_machine("assembler");
    b.register_recipe(
        "gear_press",
        assembler,
        3,
        vec![
            Requirement::start(item_bus(), 2),
            Requirement::per_tick(energy(), 10),
        ],
    );
    b.register_recipe("plate_bender", assembler, 5, vec![Requirement::per_tick(energy(), 4)]);
    b.mutate_recipe("gear_press", |r| r.max_parallelism = 4).unwrap();
    b.build().unwrap()
}

/// A snapshot that satisfies `gear_press` at parallelism 1.
pub fn assembler_snapshot(machine: MachineTypeId, cells: u64) -> MachineSnapshot {
    MachineSnapshot::new(
        machine,
        cells,
        vec![
            ComponentEntry {
                tag: item_bus(),
                amount: 8,
            },
            ComponentEntry {
                tag: energy(),
                amount: 50,
            },
        ],
    )
}

pub fn assembler_pattern(machine: MachineTypeId, cells: u64) -> StructurePattern {
    StructurePattern {
        machine,
        cells,
        rotation: Rotation::North,
    }
}

/// Deterministic config: search every tick, async only when forced by cell
/// count (the duration threshold is effectively unreachable).
pub fn fast_config() -> ControllerConfig {
    ControllerConfig {
        backoff: Backoff::Constant { delay: 1 },
        max_parallelism: 4,
        structure_check_interval: 40,
        async_cell_threshold: 1000,
        async_duration_threshold: Duration::from_secs(3600),
    }
}

pub fn fresh_controller_id() -> ControllerId {
    let mut sm = SlotMap::<ControllerId, ()>::with_key();
    sm.insert(())
}

// ---------------------------------------------------------------------------
// Test rig
// ---------------------------------------------------------------------------

/// A single controller wired to synchronous services, for deterministic
/// step-by-step tick tests.
pub struct TestRig {
    pub executor: TaskExecutor,
    pub sync: MainThreadSync,
    pub registry: RecipeRegistry,
    pub matcher: Arc<ToggleMatcher>,
    matcher_dyn: Arc<dyn StructureMatcher>,
    pub hooks: HookDispatcher,
    pub world: WorldState,
    pub controller: ControllerState,
}

impl TestRig {
    pub fn new(cells: u64) -> Self {
        Self::with_config(cells, fast_config())
    }

    pub fn with_config(cells: u64, config: ControllerConfig) -> Self {
        let registry = assembler_registry();
        let machine = registry.machine_id("assembler").unwrap();
        let matcher = Arc::new(ToggleMatcher::new(true));
        let matcher_dyn: Arc<dyn StructureMatcher> = matcher.clone();
        let controller = ControllerState::new(
            fresh_controller_id(),
            assembler_pattern(machine, cells),
            assembler_snapshot(machine, cells),
            config,
        );
        Self {
            executor: TaskExecutor::synchronous(),
            sync: MainThreadSync::new(),
            registry,
            matcher,
            matcher_dyn,
            hooks: HookDispatcher::new(),
            world: WorldState::new(),
            controller,
        }
    }

    pub fn machine(&self) -> MachineTypeId {
        self.registry.machine_id("assembler").unwrap()
    }

    /// Tick the controller once.
    pub fn tick(&mut self) {
        let ctx = TickContext {
            tick: self.controller.ticks_existed() + 1,
            executor: &self.executor,
            sync: &self.sync,
            registry: &self.registry,
            matcher: &self.matcher_dyn,
            hooks: &self.hooks,
        };
        self.controller.tick(&ctx);
    }

    pub fn tick_n(&mut self, n: usize) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// Drain queued sync actions into the world, as the authoritative
    /// thread would at the next step boundary.
    pub fn drain(&mut self) -> usize {
        self.sync.drain(&mut self.world)
    }
}
