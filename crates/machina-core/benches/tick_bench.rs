//! Criterion benchmarks for the crafting engine tick pipeline.
//!
//! Two benchmark groups:
//! - `steady_state`: controllers mid-recipe, no searches in flight -- the
//!   common case for a running factory
//! - `search_heavy`: starved controllers that search every tick -- the
//!   worst case after a mass structure change

use criterion::{Criterion, criterion_group, criterion_main};
use machina_core::engine::Engine;
use machina_core::executor::TaskExecutor;
use machina_core::hooks::HookDispatcher;
use machina_core::structure::StructureMatcher;
use machina_core::test_utils::*;
use std::sync::Arc;

fn build_engine(controllers: usize, starved: bool) -> Engine {
    let registry = assembler_registry();
    let machine = registry.machine_id("assembler").unwrap();
    let matcher = Arc::new(ToggleMatcher::new(true));
    let mut engine = Engine::new(
        registry,
        matcher as Arc<dyn StructureMatcher>,
        HookDispatcher::new(),
        TaskExecutor::synchronous(),
    );

    for _ in 0..controllers {
        let mut snapshot = assembler_snapshot(machine, 9);
        if starved {
            snapshot.set_component_amount(&item_bus(), 0);
            snapshot.set_component_amount(&energy(), 0);
        }
        engine.add_controller(assembler_pattern(machine, 9), snapshot, fast_config());
    }

    // Warm up: form structures and (in the fed case) start recipes.
    engine.step_n(3);
    engine
}

fn bench_steady_state(c: &mut Criterion) {
    let mut engine = build_engine(100, false);
    c.bench_function("steady_state_100_controllers", |b| {
        b.iter(|| engine.step());
    });
}

fn bench_search_heavy(c: &mut Criterion) {
    let mut engine = build_engine(100, true);
    c.bench_function("search_heavy_100_controllers", |b| {
        b.iter(|| engine.step());
    });
}

criterion_group!(benches, bench_steady_state, bench_search_heavy);
criterion_main!(benches);
