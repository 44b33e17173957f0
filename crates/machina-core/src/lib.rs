//! Machina Core -- an asynchronous recipe-search-and-crafting engine for
//! tick-driven machine simulations.
//!
//! Many independent controllers each own a machine structure and a crafting
//! lifecycle: validate the structure, find an applicable recipe, advance
//! progress, report failures. The expensive parts (structure matching,
//! recipe search) run on a shared worker pool and are polled -- the
//! authoritative world-mutation thread never blocks on them.
//!
//! # Three-Phase Tick Pipeline
//!
//! Each call to [`engine::Engine::step`] advances the simulation by one tick
//! through the following phases:
//!
//! 1. **Sync drain** -- Queued world mutations from worker threads apply on
//!    the authoritative thread, FIFO, exactly once per tick.
//! 2. **Controller tick** -- Every controller validates its structure
//!    (possibly asynchronously), consumes or submits recipe searches, runs
//!    hook passes, and advances its active recipe.
//! 3. **Bookkeeping** -- Increment the tick counter.
//!
//! # Key Types
//!
//! - [`engine::Engine`] -- Owns the controllers and the pipeline.
//! - [`controller::ControllerState`] -- One entity's crafting state machine
//!   and tick algorithm.
//! - [`status::CraftingStatus`] -- The externally visible disposition:
//!   `Idle`, `Crafting`, `Working(reason)`, `Failure(reason)`.
//! - [`recipe::RecipeCraftingContext`] -- One attempt: the active recipe
//!   plus applied modifiers and parallelism.
//! - [`search::RecipeSearchTask`] -- Cancelable-by-staleness async search.
//! - [`executor::TaskExecutor`] -- Bounded worker pool with poll handles and
//!   adaptive duration tracking.
//! - [`sync::MainThreadSync`] -- The sole channel through which worker
//!   threads mutate [`world::WorldState`].
//! - [`registry::RecipeRegistry`] -- Immutable machine and recipe registry,
//!   frozen at startup.
//! - [`hooks::HookDispatcher`] -- Ordered recipe event handlers with
//!   short-circuiting veto semantics.
//! - [`serialize`] -- Versioned recipe-progress persistence with
//!   forward-compatible reads.

pub mod backoff;
pub mod controller;
pub mod engine;
pub mod executor;
pub mod fixed;
pub mod hooks;
pub mod id;
pub mod recipe;
pub mod registry;
pub mod search;
pub mod serialize;
pub mod status;
pub mod structure;
pub mod sync;
pub mod world;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
