//! Controller state and the tick algorithm.
//!
//! A controller owns one machine structure and drives the crafting
//! lifecycle: validate the structure, search for an applicable recipe on the
//! worker pool, advance progress, dispatch hook passes, and route world
//! mutations through the sync queue. All controller-owned mutable state is
//! touched only by the controller's own tick invocation; worker threads
//! communicate exclusively through each task's single-slot result.
//!
//! A tick "suspends" (returns early, no blocking wait) while an async
//! structure check or recipe search is pending; later ticks observe the
//! completion state and resume.

use crate::backoff::Backoff;
use crate::executor::{SubmitterKey, TaskExecutor};
use crate::fixed::Ticks;
use crate::hooks::{HookContext, HookDispatcher, HookKind, PassOutcome};
use crate::id::{ComponentTag, ControllerId};
use crate::recipe::{ActiveRecipe, Modifier, RecipeCraftingContext};
use crate::registry::RecipeRegistry;
use crate::search::{RecipeSearchTask, SearchOutcome};
use crate::serialize::{self, SavedRecipe};
use crate::status::CraftingStatus;
use crate::structure::{
    MachineSnapshot, StructureCheckTask, StructureMatcher, StructurePattern,
};
use crate::sync::MainThreadSync;
use slotmap::Key;
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Per-controller tuning. Behavior differences between machine kinds are
/// expressed here, not by subclassing.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Retry-delay policy for recipe searches.
    pub backoff: Backoff,
    /// Upper bound on parallelism for any recipe this controller runs.
    pub max_parallelism: u32,
    /// A formed structure is re-validated every this many ticks.
    pub structure_check_interval: Ticks,
    /// Structures with at least this many matched cells are checked
    /// asynchronously regardless of the duration average.
    pub async_cell_threshold: u64,
    /// Structure checks go async once the controller's rolling average
    /// execution time reaches this.
    pub async_duration_threshold: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            backoff: Backoff::default(),
            max_parallelism: 1,
            structure_check_interval: 40,
            async_cell_threshold: 1000,
            async_duration_threshold: Duration::from_millis(10),
        }
    }
}

// ---------------------------------------------------------------------------
// Tick context
// ---------------------------------------------------------------------------

/// Shared services handed to every controller tick. Constructed once per
/// engine step; everything here is safe to share across worker threads.
pub struct TickContext<'a> {
    /// The engine's tick counter at this step.
    pub tick: Ticks,
    pub executor: &'a TaskExecutor,
    pub sync: &'a MainThreadSync,
    pub registry: &'a RecipeRegistry,
    pub matcher: &'a Arc<dyn StructureMatcher>,
    pub hooks: &'a HookDispatcher,
}

// ---------------------------------------------------------------------------
// ControllerState
// ---------------------------------------------------------------------------

/// One simulated entity: a machine structure plus its crafting lifecycle.
pub struct ControllerState {
    id: ControllerId,
    config: ControllerConfig,
    pattern: StructurePattern,
    snapshot: MachineSnapshot,
    modifiers: Vec<Modifier>,
    formed: bool,
    status: CraftingStatus,
    context: Option<RecipeCraftingContext>,
    search: Option<RecipeSearchTask>,
    structure_check: Option<StructureCheckTask>,
    retries: u32,
    ticks_existed: Ticks,
    structure_check_counter: Ticks,
    externally_blocked: bool,
}

impl ControllerState {
    pub fn new(
        id: ControllerId,
        pattern: StructurePattern,
        snapshot: MachineSnapshot,
        config: ControllerConfig,
    ) -> Self {
        Self {
            id,
            config,
            pattern,
            snapshot,
            modifiers: Vec::new(),
            formed: false,
            status: CraftingStatus::Idle,
            context: None,
            search: None,
            structure_check: None,
            retries: 0,
            ticks_existed: 0,
            structure_check_counter: 0,
            externally_blocked: false,
        }
    }

    // -- Accessors ---------------------------------------------------------

    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn status(&self) -> &CraftingStatus {
        &self.status
    }

    pub fn is_formed(&self) -> bool {
        self.formed
    }

    pub fn active_recipe(&self) -> Option<&ActiveRecipe> {
        self.context.as_ref().map(RecipeCraftingContext::active)
    }

    pub fn crafting_context(&self) -> Option<&RecipeCraftingContext> {
        self.context.as_ref()
    }

    pub fn search_in_flight(&self) -> bool {
        self.search.is_some()
    }

    pub fn structure_check_in_flight(&self) -> bool {
        self.structure_check.is_some()
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn ticks_existed(&self) -> Ticks {
        self.ticks_existed
    }

    pub fn snapshot(&self) -> &MachineSnapshot {
        &self.snapshot
    }

    pub fn is_blocked(&self) -> bool {
        self.externally_blocked
    }

    // -- External inputs ---------------------------------------------------

    /// World signal override: while set, ticks are skipped entirely.
    pub fn set_blocked(&mut self, blocked: bool) {
        self.externally_blocked = blocked;
    }

    /// Install a new machine snapshot (the structure changed). Bumps the
    /// structure version, which makes any in-flight async result stale.
    pub fn set_structure(&mut self, mut snapshot: MachineSnapshot) {
        snapshot.structure_version = self.snapshot.structure_version + 1;
        self.pattern.machine = snapshot.machine;
        self.pattern.cells = snapshot.matched_cells;
        self.snapshot = snapshot;
    }

    /// Update a live component level (e.g. buffered energy) in place.
    /// Identity is unchanged: pending async results stay valid.
    pub fn set_component_amount(&mut self, tag: &ComponentTag, amount: u64) {
        self.snapshot.set_component_amount(tag, amount);
    }

    /// Replace the machine-granted modifier set, flushing it into any
    /// running attempt.
    pub fn set_modifiers(&mut self, modifiers: Vec<Modifier>) {
        self.modifiers = modifiers;
        if let Some(context) = &mut self.context {
            context.flush_modifiers(self.modifiers.clone());
        }
    }

    /// Abandon the current attempt with a reason.
    pub fn cancel_crafting(&mut self, reason: impl Into<String>) {
        self.context = None;
        self.status = CraftingStatus::failure(reason);
    }

    // -- Persistence -------------------------------------------------------

    /// Snapshot the active recipe's progress for saving. `None` when no
    /// recipe is active.
    pub fn save_recipe(&self, registry: &RecipeRegistry) -> Option<SavedRecipe> {
        self.active_recipe()
            .and_then(|active| serialize::save_active_recipe(active, registry))
    }

    /// Restore a previously saved recipe. An unresolvable recipe identifier
    /// is logged inside [`serialize::resolve_saved`] and leaves the
    /// controller with no active recipe; returns whether a recipe was
    /// restored.
    pub fn restore_recipe(&mut self, saved: &SavedRecipe, registry: &RecipeRegistry) -> bool {
        match serialize::resolve_saved(saved, registry) {
            Some((definition, active)) => {
                self.context = Some(RecipeCraftingContext::new(
                    definition,
                    active,
                    self.modifiers.clone(),
                ));
                true
            }
            None => {
                self.context = None;
                false
            }
        }
    }

    // -- Tick algorithm ----------------------------------------------------

    /// Advance this controller by one tick.
    pub fn tick(&mut self, ctx: &TickContext<'_>) {
        if self.externally_blocked {
            return;
        }
        self.ticks_existed += 1;
        let was_crafting = self.status.is_crafting();

        if self.check_structure(ctx) {
            if self.context.is_some() {
                self.recipe_tick(ctx);
            } else {
                self.search_and_start(ctx);
            }
        }

        // Mirror the crafting flag into the world, off the worker thread.
        let now_crafting = self.status.is_crafting();
        if now_crafting != was_crafting {
            let id = self.id;
            ctx.sync
                .submit(Box::new(move |world| world.set_active(id, now_crafting)));
        }
    }

    fn submitter_key(&self) -> SubmitterKey {
        self.id.data().as_ffi()
    }

    // -- Structure phase ---------------------------------------------------

    /// Validate the structure, possibly asynchronously. Returns whether the
    /// tick may continue into the recipe phase.
    fn check_structure(&mut self, ctx: &TickContext<'_>) -> bool {
        // A pending async check suspends the tick until it resolves.
        if let Some(task) = self.structure_check.take() {
            if !task.is_done() {
                self.structure_check = Some(task);
                return false;
            }
            return match task.take_result() {
                Some(true) => {
                    self.on_structure_valid(ctx);
                    true
                }
                Some(false) => {
                    self.on_structure_invalid(ctx);
                    false
                }
                None => {
                    log::warn!(
                        "structure check for controller {:?} lost its result",
                        self.id
                    );
                    self.on_structure_invalid(ctx);
                    false
                }
            };
        }

        // A formed structure is only re-validated on the interval.
        if self.formed && self.structure_check_counter < self.config.structure_check_interval {
            self.structure_check_counter += 1;
            return true;
        }
        self.structure_check_counter = 0;

        if self.should_check_async(ctx) {
            self.structure_check = Some(StructureCheckTask::submit(
                ctx.executor,
                self.submitter_key(),
                Arc::clone(ctx.matcher),
                self.pattern.clone(),
            ));
            return false;
        }

        if ctx.matcher.matches(&self.pattern, self.pattern.rotation) {
            self.on_structure_valid(ctx);
            true
        } else {
            self.on_structure_invalid(ctx);
            false
        }
    }

    fn should_check_async(&self, ctx: &TickContext<'_>) -> bool {
        self.snapshot.matched_cells >= self.config.async_cell_threshold
            || ctx.executor.average_duration(self.submitter_key())
                >= self.config.async_duration_threshold
    }

    fn on_structure_valid(&mut self, ctx: &TickContext<'_>) {
        if !self.formed {
            self.formed = true;
            let id = self.id;
            ctx.sync
                .submit(Box::new(move |world| world.set_formed(id, true)));
        }
    }

    fn on_structure_invalid(&mut self, ctx: &TickContext<'_>) {
        let was_formed = self.formed;
        self.formed = false;
        self.context = None;
        // Any in-flight search is logically cancelled; its result, if it
        // ever lands, belongs to a machine that no longer exists.
        self.search = None;
        self.retries = 0;
        self.status = CraftingStatus::failure("missing structure");
        if was_formed {
            let id = self.id;
            ctx.sync
                .submit(Box::new(move |world| world.set_formed(id, false)));
        }
    }

    // -- Search phase ------------------------------------------------------

    /// Consume a completed search result or submit a new search per the
    /// cadence rule. A recipe started here begins progressing next tick.
    fn search_and_start(&mut self, ctx: &TickContext<'_>) {
        if let Some(task) = self.search.take() {
            if !task.is_done() {
                self.search = Some(task);
                return;
            }
            if task.matches_snapshot(&self.snapshot) {
                match task.take_outcome() {
                    Some(SearchOutcome::Found(context)) => {
                        self.retries = 0;
                        self.try_start(context, ctx);
                    }
                    Some(SearchOutcome::NotFound(status)) => {
                        self.retries += 1;
                        self.status = status;
                    }
                    None => {
                        self.retries += 1;
                        log::warn!(
                            "recipe search for controller {:?} lost its result",
                            self.id
                        );
                    }
                }
            } else {
                log::debug!(
                    "discarding stale recipe search for controller {:?}",
                    self.id
                );
            }
            return;
        }

        if self.ticks_existed % self.config.backoff.delay(self.retries) == 0 {
            self.submit_search(ctx);
        }
    }

    fn submit_search(&mut self, ctx: &TickContext<'_>) {
        let candidates = ctx.registry.recipes_for(self.snapshot.machine);
        self.search = Some(RecipeSearchTask::submit(
            ctx.executor,
            self.submitter_key(),
            &self.snapshot,
            candidates,
            self.modifiers.clone(),
            self.config.max_parallelism,
        ));
    }

    /// Re-validate the found context against the live snapshot and start it.
    /// On failure the attempt is dropped and a fresh search goes out
    /// immediately.
    fn try_start(&mut self, mut context: RecipeCraftingContext, ctx: &TickContext<'_>) -> bool {
        match context.check_start(&self.snapshot) {
            Ok(parallelism) => {
                context.start(parallelism);
                ctx.hooks
                    .dispatch_notify(&self.hook_ctx(HookKind::Start, &context));
                self.context = Some(context);
                self.status = CraftingStatus::Crafting;
                true
            }
            Err(failure) => {
                self.status = CraftingStatus::failure(failure.reason);
                self.context = None;
                self.submit_search(ctx);
                false
            }
        }
    }

    // -- Recipe phase ------------------------------------------------------

    fn hook_ctx<'a>(
        &'a self,
        kind: HookKind,
        context: &'a RecipeCraftingContext,
    ) -> HookContext<'a> {
        HookContext {
            kind,
            tick: self.ticks_existed,
            status: &self.status,
            machine: self.snapshot.machine,
            recipe: context.active().recipe(),
            elapsed: context.active().elapsed(),
            parallelism: context.active().parallelism(),
        }
    }

    fn recipe_tick(&mut self, ctx: &TickContext<'_>) {
        let Some(mut context) = self.context.take() else {
            return;
        };
        let prev_status = self.status.clone();

        // Pre-tick pass: a hook may pause progress, force failure, or
        // override the status while allowing the tick to continue.
        let pre = ctx
            .hooks
            .dispatch_gating(&self.hook_ctx(HookKind::PreTick, &context));
        if let Some(status) = pre.status_override {
            self.status = status;
        }
        match pre.outcome {
            PassOutcome::Prevent { reason } => {
                self.status = CraftingStatus::working(reason);
                self.context = Some(context);
                return;
            }
            PassOutcome::Fail { reason, destruct } => {
                self.status = CraftingStatus::failure(reason);
                if !destruct {
                    self.context = Some(context);
                }
                return;
            }
            PassOutcome::Continue => {}
        }

        // Advance the recipe's progress function. When a hook already
        // changed the status this tick, its status wins and the internal
        // result is discarded.
        let computed = context.tick(&self.snapshot);
        if self.status == prev_status {
            self.status = computed;
        }

        if self.status.is_crafting() {
            let pass = ctx
                .hooks
                .dispatch_gating(&self.hook_ctx(HookKind::Tick, &context));
            if let Some(status) = pass.status_override {
                self.status = status;
            }
            match pass.outcome {
                PassOutcome::Prevent { reason } => {
                    self.status = CraftingStatus::working(reason);
                    self.context = Some(context);
                    return;
                }
                PassOutcome::Fail { reason, destruct } => {
                    self.status = CraftingStatus::failure(reason);
                    if !destruct {
                        self.context = Some(context);
                    }
                    return;
                }
                PassOutcome::Continue => {}
            }

            if context.active().is_completed() {
                self.finish(context, ctx);
            } else {
                self.context = Some(context);
            }
        } else {
            // Failure path: the failure pass decides whether to destruct
            // the active recipe or retain it for another attempt.
            let destruct = ctx.hooks.dispatch_failure(
                &self.hook_ctx(HookKind::Failure, &context),
                context.definition().cancel_on_tick_failure,
            );
            if !destruct {
                self.context = Some(context);
            }
        }
    }

    /// Complete a cycle and immediately re-attempt against the same machine
    /// -- the machine identity is unchanged, so no search is needed.
    fn finish(&mut self, mut context: RecipeCraftingContext, ctx: &TickContext<'_>) {
        ctx.hooks
            .dispatch_notify(&self.hook_ctx(HookKind::Finish, &context));

        let completed = context.finish_crafting();
        let id = self.id;
        let crafts = completed.parallelism as u64;
        ctx.sync
            .submit(Box::new(move |world| world.record_completed(id, crafts)));

        let (definition, mut active, _) = context.into_parts();
        active.reset();
        active.set_max_parallelism(self.config.max_parallelism);
        let fresh = RecipeCraftingContext::new(definition, active, self.modifiers.clone());
        self.try_start(fresh, ctx);
    }
}

// ===========================================================================
// Tests
// ===========================================================================
