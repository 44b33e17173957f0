//! The crafting state machine.
//!
//! A controller's externally visible disposition. No state is terminal:
//! `Idle` and `Failure` both lead back to a new recipe search, `Working`
//! retains the recipe with progress paused. Transitions are driven by the
//! controller tick and by hook reactions, which may override the internally
//! computed status for the current tick only.

use serde::{Deserialize, Serialize};

/// Current crafting disposition of a controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CraftingStatus {
    /// No recipe running, no failure to report.
    #[default]
    Idle,
    /// A recipe is running and made progress this tick.
    Crafting,
    /// A recipe is retained but progress is paused (e.g. a hook vetoed the
    /// tick). The reason is surfaced to the status layer.
    Working { reason: String },
    /// The attempt was abandoned. Whether the recipe is destructed is the
    /// caller's decision, not encoded here.
    Failure { reason: String },
}

impl CraftingStatus {
    /// Progress-paused status with a reason for the status layer.
    pub fn working(reason: impl Into<String>) -> Self {
        Self::Working {
            reason: reason.into(),
        }
    }

    /// Failed status with a reason for the status layer.
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    /// Whether a recipe is actively progressing.
    pub fn is_crafting(&self) -> bool {
        matches!(self, Self::Crafting)
    }

    /// The human-readable reason attached to `Working`/`Failure`, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Working { reason } | Self::Failure { reason } => Some(reason),
            Self::Idle | Self::Crafting => None,
        }
    }
}
