//! Recipe definitions and in-flight crafting state.
//!
//! A [`RecipeDefinition`] is immutable registry data. One attempt at running
//! it is a [`RecipeCraftingContext`], which owns the mutable
//! [`ActiveRecipe`] progress record together with the modifier set applied
//! for that attempt -- the two are created and destroyed together by
//! construction.

use crate::fixed::{Fixed64, Ticks, ceil_ticks};
use crate::id::{ComponentTag, MachineTypeId, ModifierId, RecipeId};
use crate::status::CraftingStatus;
use crate::structure::MachineSnapshot;

// ---------------------------------------------------------------------------
// Requirements
// ---------------------------------------------------------------------------

/// When a requirement is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RequirementTiming {
    /// Checked once when the attempt starts (and re-checked on restart).
    Start,
    /// Checked every tick while the recipe progresses.
    PerTick,
}

/// A structural capability the machine must provide, per unit of parallelism.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Requirement {
    pub tag: ComponentTag,
    pub amount: u64,
    pub timing: RequirementTiming,
}

impl Requirement {
    pub fn start(tag: impl Into<ComponentTag>, amount: u64) -> Self {
        Self {
            tag: tag.into(),
            amount,
            timing: RequirementTiming::Start,
        }
    }

    pub fn per_tick(tag: impl Into<ComponentTag>, amount: u64) -> Self {
        Self {
            tag: tag.into(),
            amount,
            timing: RequirementTiming::PerTick,
        }
    }
}

// ---------------------------------------------------------------------------
// Recipe definition
// ---------------------------------------------------------------------------

/// An immutable recipe template. Owned by the registry; attempts clone it
/// into their context so worker threads never reach back into shared state.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RecipeDefinition {
    pub id: RecipeId,
    pub name: String,
    pub machine: MachineTypeId,
    /// Base ticks to complete one crafting cycle (before speed modifiers).
    pub duration: Ticks,
    pub requirements: Vec<Requirement>,
    /// Per-recipe parallelism cap. 1 = not parallelizable.
    pub max_parallelism: u32,
    /// Whether a per-tick failure destructs the recipe by default. The
    /// failure hook pass may override the decision.
    pub cancel_on_tick_failure: bool,
}

// ---------------------------------------------------------------------------
// Modifiers
// ---------------------------------------------------------------------------

/// What a modifier does to a crafting attempt.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ModifierKind {
    /// Multiplies effective speed (reduces duration). 2.0 = twice as fast.
    Speed(Fixed64),
    /// Raises the parallelism cap by a flat amount.
    Parallelism(u32),
}

/// A modifier instance granted by the machine structure.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Modifier {
    pub id: ModifierId,
    pub kind: ModifierKind,
}

/// Pre-computed modifier totals after canonical sorting and folding.
struct ResolvedModifiers {
    speed: Fixed64,
    extra_parallelism: u32,
}

impl ResolvedModifiers {
    /// Sort modifiers by `ModifierId` (canonical order) then fold: speed
    /// multiplicatively, parallelism additively.
    fn resolve(modifiers: &[Modifier]) -> Self {
        let mut sorted: Vec<&Modifier> = modifiers.iter().collect();
        sorted.sort_by_key(|m| m.id);

        let mut speed = Fixed64::from_num(1);
        let mut extra_parallelism: u32 = 0;
        for m in &sorted {
            match &m.kind {
                ModifierKind::Speed(v) => speed *= *v,
                ModifierKind::Parallelism(v) => {
                    extra_parallelism = extra_parallelism.saturating_add(*v);
                }
            }
        }

        Self {
            speed,
            extra_parallelism,
        }
    }
}

// ---------------------------------------------------------------------------
// ActiveRecipe
// ---------------------------------------------------------------------------

/// Mutable progress record for one recipe instance in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRecipe {
    recipe: RecipeId,
    elapsed: Ticks,
    parallelism: u32,
    max_parallelism: u32,
    completed: bool,
}

impl ActiveRecipe {
    pub fn new(recipe: RecipeId, max_parallelism: u32) -> Self {
        Self {
            recipe,
            elapsed: 0,
            parallelism: 1,
            max_parallelism: max_parallelism.max(1),
            completed: false,
        }
    }

    /// Rebuild a progress record from persisted fields.
    pub fn restored(recipe: RecipeId, elapsed: Ticks, parallelism: u32) -> Self {
        Self {
            recipe,
            elapsed,
            parallelism: parallelism.max(1),
            max_parallelism: parallelism.max(1),
            completed: false,
        }
    }

    pub fn recipe(&self) -> RecipeId {
        self.recipe
    }

    pub fn elapsed(&self) -> Ticks {
        self.elapsed
    }

    pub fn parallelism(&self) -> u32 {
        self.parallelism
    }

    pub fn max_parallelism(&self) -> u32 {
        self.max_parallelism
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn set_parallelism(&mut self, parallelism: u32) {
        self.parallelism = parallelism.clamp(1, self.max_parallelism);
    }

    pub fn set_max_parallelism(&mut self, max_parallelism: u32) {
        self.max_parallelism = max_parallelism.max(1);
        self.parallelism = self.parallelism.min(self.max_parallelism);
    }

    /// Advance by one tick; marks completion at `effective_duration`.
    fn advance(&mut self, effective_duration: Ticks) {
        self.elapsed += 1;
        if self.elapsed >= effective_duration {
            self.completed = true;
        }
    }

    /// Zero progress for the next run of the same recipe.
    pub fn reset(&mut self) {
        self.elapsed = 0;
        self.completed = false;
    }
}

// ---------------------------------------------------------------------------
// Start failure
// ---------------------------------------------------------------------------

/// Why an attempt could not start, plus how close it came. The search uses
/// `satisfied` to report the most informative failure among candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartFailure {
    pub reason: String,
    pub satisfied: usize,
}

/// Record of one completed crafting cycle, handed to the status layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedCraft {
    pub recipe: RecipeId,
    pub parallelism: u32,
}

// ---------------------------------------------------------------------------
// RecipeCraftingContext
// ---------------------------------------------------------------------------

/// One crafting attempt: the recipe definition, its progress record, and the
/// modifiers applied for this attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeCraftingContext {
    definition: RecipeDefinition,
    active: ActiveRecipe,
    modifiers: Vec<Modifier>,
}

impl RecipeCraftingContext {
    pub fn new(definition: RecipeDefinition, active: ActiveRecipe, modifiers: Vec<Modifier>) -> Self {
        Self {
            definition,
            active,
            modifiers,
        }
    }

    pub fn definition(&self) -> &RecipeDefinition {
        &self.definition
    }

    pub fn active(&self) -> &ActiveRecipe {
        &self.active
    }

    pub fn modifiers(&self) -> &[Modifier] {
        &self.modifiers
    }

    /// Replace the applied modifier set mid-attempt (structure upgrades take
    /// effect without restarting the recipe).
    pub fn flush_modifiers(&mut self, modifiers: Vec<Modifier>) {
        self.modifiers = modifiers;
    }

    /// Effective duration after speed modifiers: `ceil(base / speed)`, min 1.
    pub fn effective_duration(&self) -> Ticks {
        let resolved = ResolvedModifiers::resolve(&self.modifiers);
        if resolved.speed <= Fixed64::from_num(0) {
            return self.definition.duration.max(1);
        }
        ceil_ticks(Fixed64::from_num(self.definition.duration) / resolved.speed)
    }

    /// Parallelism cap for this attempt: the recipe cap raised by modifiers,
    /// bounded by the controller's own limit.
    pub fn parallelism_cap(&self) -> u32 {
        let resolved = ResolvedModifiers::resolve(&self.modifiers);
        self.definition
            .max_parallelism
            .saturating_add(resolved.extra_parallelism)
            .min(self.active.max_parallelism())
            .max(1)
    }

    /// Check every requirement against the snapshot and compute the
    /// achievable parallelism. All requirements (start and per-tick) must be
    /// satisfiable at parallelism 1 for the attempt to start.
    pub fn check_start(&self, snapshot: &MachineSnapshot) -> Result<u32, StartFailure> {
        let cap = self.parallelism_cap();
        let mut achievable = cap as u64;
        let mut satisfied = 0usize;

        for req in &self.definition.requirements {
            if req.amount == 0 {
                satisfied += 1;
                continue;
            }
            let batches = snapshot.available(&req.tag) / req.amount;
            if batches == 0 {
                return Err(StartFailure {
                    reason: format!("missing component: {}", req.tag),
                    satisfied,
                });
            }
            satisfied += 1;
            achievable = achievable.min(batches);
        }

        Ok((achievable as u32).clamp(1, cap))
    }

    /// Begin the attempt at the given parallelism, zeroing progress.
    pub fn start(&mut self, parallelism: u32) {
        self.active.reset();
        self.active.set_parallelism(parallelism);
    }

    /// Advance one tick. Per-tick requirements are validated against the
    /// controller's current snapshot first; a shortfall fails the attempt
    /// without advancing progress.
    pub fn tick(&mut self, snapshot: &MachineSnapshot) -> CraftingStatus {
        let parallelism = self.active.parallelism() as u64;
        for req in &self.definition.requirements {
            if req.timing != RequirementTiming::PerTick {
                continue;
            }
            let required = req.amount.saturating_mul(parallelism);
            if snapshot.available(&req.tag) < required {
                return CraftingStatus::failure(format!("missing component: {}", req.tag));
            }
        }

        let effective = self.effective_duration();
        self.active.advance(effective);
        CraftingStatus::Crafting
    }

    /// Close out a completed cycle and report what was crafted.
    pub fn finish_crafting(&mut self) -> CompletedCraft {
        CompletedCraft {
            recipe: self.active.recipe(),
            parallelism: self.active.parallelism(),
        }
    }

    /// Tear the context apart for the fast-path restart after a finish.
    pub fn into_parts(self) -> (RecipeDefinition, ActiveRecipe, Vec<Modifier>) {
        (self.definition, self.active, self.modifiers)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
