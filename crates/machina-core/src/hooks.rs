//! Ordered recipe event hooks.
//!
//! External logic (scripting, integrations) attaches handlers per recipe and
//! hook kind. Handlers run in registration order, receive a read-only view
//! of the controller, and return a small [`HookReaction`] rather than
//! mutating shared fields. For the `PreTick` and `Tick` passes, the first
//! reaction that sets prevent or failure short-circuits the rest of the
//! pass; the `Failure` pass runs every handler and the last destruct
//! decision wins.

use crate::fixed::Ticks;
use crate::id::{MachineTypeId, RecipeId};
use crate::status::CraftingStatus;
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Hook kinds and context
// ---------------------------------------------------------------------------

/// The five points in the crafting lifecycle where hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    PreTick,
    Tick,
    Start,
    Finish,
    Failure,
}

/// Read-only view of the controller handed to each handler.
#[derive(Debug, Clone)]
pub struct HookContext<'a> {
    pub kind: HookKind,
    pub tick: Ticks,
    pub status: &'a CraftingStatus,
    pub machine: MachineTypeId,
    pub recipe: RecipeId,
    pub elapsed: Ticks,
    pub parallelism: u32,
}

// ---------------------------------------------------------------------------
// Reactions
// ---------------------------------------------------------------------------

/// What a handler asks the controller to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookReaction {
    /// Status text attached to a prevent (`Working`) or failure (`Failure`).
    pub reason: Option<String>,
    /// Block progress for this tick only; the recipe is retained.
    pub prevent_progress: bool,
    /// Abandon the attempt.
    pub failure: bool,
    /// With `failure`: also destroy the active recipe. In the `Failure`
    /// pass, overrides the recipe's default destruct decision.
    pub destruct_recipe: bool,
    /// Directly override the controller's status while still allowing the
    /// pass to continue. Suppresses the internally computed status for the
    /// current tick.
    pub status_override: Option<CraftingStatus>,
}

impl HookReaction {
    /// Let the tick proceed untouched.
    pub fn allow() -> Self {
        Self::default()
    }

    /// Pause progress this tick with a reason.
    pub fn prevent(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            prevent_progress: true,
            ..Self::default()
        }
    }

    /// Fail the attempt, retaining the recipe.
    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            failure: true,
            ..Self::default()
        }
    }

    /// Fail the attempt and destroy the recipe.
    pub fn fail_destruct(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            failure: true,
            destruct_recipe: true,
            ..Self::default()
        }
    }

    /// Override the status without interrupting the pass.
    pub fn with_status(status: CraftingStatus) -> Self {
        Self {
            status_override: Some(status),
            ..Self::default()
        }
    }
}

/// A recipe event handler. Implemented by external integrations; closures
/// work directly.
pub trait RecipeHook: Send + Sync {
    fn react(&self, ctx: &HookContext<'_>) -> HookReaction;
}

impl<F> RecipeHook for F
where
    F: Fn(&HookContext<'_>) -> HookReaction + Send + Sync,
{
    fn react(&self, ctx: &HookContext<'_>) -> HookReaction {
        self(ctx)
    }
}

// ---------------------------------------------------------------------------
// Pass results
// ---------------------------------------------------------------------------

/// Aggregated outcome of a PreTick/Tick pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Continue,
    Prevent { reason: String },
    Fail { reason: String, destruct: bool },
}

/// Outcome plus any status override collected from handlers that allowed
/// the pass to continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassResult {
    pub outcome: PassOutcome,
    pub status_override: Option<CraftingStatus>,
}

const NO_REASON: &str = "unspecified";

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Ordered hook registration and dispatch, keyed by (recipe, kind).
#[derive(Default)]
pub struct HookDispatcher {
    handlers: HashMap<(RecipeId, HookKind), Vec<Box<dyn RecipeHook>>>,
}

impl HookDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a handler. Dispatch order is registration order.
    pub fn register(&mut self, recipe: RecipeId, kind: HookKind, hook: impl RecipeHook + 'static) {
        self.handlers
            .entry((recipe, kind))
            .or_default()
            .push(Box::new(hook));
    }

    pub fn handler_count(&self, recipe: RecipeId, kind: HookKind) -> usize {
        self.handlers
            .get(&(recipe, kind))
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Run a PreTick or Tick pass. Short-circuits on the first prevent or
    /// failure reaction.
    pub fn dispatch_gating(&self, ctx: &HookContext<'_>) -> PassResult {
        let mut status_override = None;
        let Some(handlers) = self.handlers.get(&(ctx.recipe, ctx.kind)) else {
            return PassResult {
                outcome: PassOutcome::Continue,
                status_override,
            };
        };

        for hook in handlers {
            let reaction = hook.react(ctx);
            if reaction.prevent_progress {
                return PassResult {
                    outcome: PassOutcome::Prevent {
                        reason: reaction.reason.unwrap_or_else(|| NO_REASON.to_string()),
                    },
                    status_override,
                };
            }
            if reaction.failure {
                return PassResult {
                    outcome: PassOutcome::Fail {
                        reason: reaction.reason.unwrap_or_else(|| NO_REASON.to_string()),
                        destruct: reaction.destruct_recipe,
                    },
                    status_override,
                };
            }
            if reaction.status_override.is_some() {
                status_override = reaction.status_override;
            }
        }

        PassResult {
            outcome: PassOutcome::Continue,
            status_override,
        }
    }

    /// Run a Start or Finish pass. Every handler runs; reactions are
    /// informational.
    pub fn dispatch_notify(&self, ctx: &HookContext<'_>) {
        if let Some(handlers) = self.handlers.get(&(ctx.recipe, ctx.kind)) {
            for hook in handlers {
                let _ = hook.react(ctx);
            }
        }
    }

    /// Run the Failure pass. Every handler runs; the destruct decision
    /// starts at the recipe's default and the last handler to set or clear
    /// `destruct_recipe` wins.
    pub fn dispatch_failure(&self, ctx: &HookContext<'_>, default_destruct: bool) -> bool {
        let mut destruct = default_destruct;
        if let Some(handlers) = self.handlers.get(&(ctx.recipe, ctx.kind)) {
            for hook in handlers {
                let reaction = hook.react(ctx);
                if reaction.failure || reaction.destruct_recipe {
                    destruct = reaction.destruct_recipe;
                }
            }
        }
        destruct
    }
}

// ===========================================================================
// Tests
// ===========================================================================
