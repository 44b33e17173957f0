//! Persisted recipe-progress schema.
//!
//! A deliberately minimal, versioned schema: recipe identifier (string),
//! elapsed-tick count, parallelism. Reads are forward compatible -- unknown
//! fields are ignored, a missing version defaults to the current one.
//! Absence of a saved section means "no active recipe"; an unresolvable
//! recipe identifier is logged and treated identically to absence, never as
//! an error.

use crate::recipe::{ActiveRecipe, RecipeDefinition};
use crate::registry::RecipeRegistry;
use serde::{Deserialize, Serialize};

/// Current schema version. Increment when breaking the format.
pub const SCHEMA_VERSION: u32 = 1;

fn current_version() -> u32 {
    SCHEMA_VERSION
}

/// Errors for persisted-recipe payloads that are malformed at the container
/// level. Semantic problems (unknown recipe name) are not errors -- they
/// resolve to "no active recipe".
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("malformed recipe payload: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("recipe payload from future schema version {0} (this build supports up to {SCHEMA_VERSION})")]
    FutureVersion(u32),
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// On-disk shape of an active recipe's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedRecipe {
    #[serde(default = "current_version")]
    pub version: u32,
    /// Recipe identifier: the registry name, stable across id reassignment.
    pub recipe: String,
    pub elapsed: u64,
    pub parallelism: u32,
}

impl SavedRecipe {
    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a payload. Unknown fields are ignored; a payload written by a
    /// newer schema version is rejected rather than misread.
    pub fn from_json(payload: &str) -> Result<Self, PersistError> {
        let saved: SavedRecipe = serde_json::from_str(payload)?;
        if saved.version > SCHEMA_VERSION {
            return Err(PersistError::FutureVersion(saved.version));
        }
        Ok(saved)
    }
}

// ---------------------------------------------------------------------------
// Save / restore
// ---------------------------------------------------------------------------

/// Capture an active recipe's progress fields. `None` when the recipe id is
/// not in the registry (a registry/world mismatch; nothing useful to save).
pub fn save_active_recipe(active: &ActiveRecipe, registry: &RecipeRegistry) -> Option<SavedRecipe> {
    let name = registry.recipe_name(active.recipe())?;
    Some(SavedRecipe {
        version: SCHEMA_VERSION,
        recipe: name.to_string(),
        elapsed: active.elapsed(),
        parallelism: active.parallelism(),
    })
}

/// Resolve a saved recipe against the registry. An unresolvable identifier
/// is logged and yields `None` -- the controller loads with no active
/// recipe.
pub fn resolve_saved(
    saved: &SavedRecipe,
    registry: &RecipeRegistry,
) -> Option<(RecipeDefinition, ActiveRecipe)> {
    let Some(id) = registry.recipe_id(&saved.recipe) else {
        log::warn!(
            "couldn't find recipe named {}; loading with no active recipe",
            saved.recipe
        );
        return None;
    };
    let definition = registry.get_recipe(id)?.clone();
    let active = ActiveRecipe::restored(id, saved.elapsed, saved.parallelism);
    Some((definition, active))
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::Requirement;
    use crate::registry::RegistryBuilder;
    use proptest::prelude::*;

    fn registry() -> RecipeRegistry {
        let mut b = RegistryBuilder::new();
        let assembler = b.register_machine("assembler");
        b.register_recipe(
            "gear_press",
            assembler,
            30,
            vec![Requirement::per_tick("energy_input", 10)],
        );
        b.mutate_recipe("gear_press", |r| r.max_parallelism = 8).unwrap();
        b.build().unwrap()
    }

    #[test]
    fn round_trip_reproduces_progress_fields() {
        let reg = registry();
        let id = reg.recipe_id("gear_press").unwrap();
        let active = ActiveRecipe::restored(id, 17, 3);

        let saved = save_active_recipe(&active, &reg).unwrap();
        let json = saved.to_json().unwrap();
        let back = SavedRecipe::from_json(&json).unwrap();
        let (definition, restored) = resolve_saved(&back, &reg).unwrap();

        assert_eq!(definition.name, "gear_press");
        assert_eq!(restored.recipe(), id);
        assert_eq!(restored.elapsed(), 17);
        assert_eq!(restored.parallelism(), 3);
    }

    #[test]
    fn unresolvable_recipe_is_none_not_error() {
        let reg = registry();
        let saved = SavedRecipe {
            version: SCHEMA_VERSION,
            recipe: "removed_by_datapack".to_string(),
            elapsed: 5,
            parallelism: 1,
        };
        assert!(resolve_saved(&saved, &reg).is_none());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let payload = r#"{
            "version": 1,
            "recipe": "gear_press",
            "elapsed": 4,
            "parallelism": 2,
            "flux_capacitance": 88,
            "notes": "added by a future build"
        }"#;
        let saved = SavedRecipe::from_json(payload).unwrap();
        assert_eq!(saved.recipe, "gear_press");
        assert_eq!(saved.elapsed, 4);
        assert_eq!(saved.parallelism, 2);
    }

    #[test]
    fn missing_version_defaults_to_current() {
        let payload = r#"{"recipe": "gear_press", "elapsed": 0, "parallelism": 1}"#;
        let saved = SavedRecipe::from_json(payload).unwrap();
        assert_eq!(saved.version, SCHEMA_VERSION);
    }

    #[test]
    fn future_version_is_rejected() {
        let payload = r#"{"version": 99, "recipe": "gear_press", "elapsed": 0, "parallelism": 1}"#;
        assert!(matches!(
            SavedRecipe::from_json(payload),
            Err(PersistError::FutureVersion(99))
        ));
    }

    #[test]
    fn malformed_payload_is_a_parse_error() {
        assert!(matches!(
            SavedRecipe::from_json("not json"),
            Err(PersistError::Parse(_))
        ));
    }

    proptest! {
        #[test]
        fn round_trip_any_progress(elapsed in 0u64..1_000_000, parallelism in 1u32..64) {
            let reg = registry();
            let id = reg.recipe_id("gear_press").unwrap();
            let active = ActiveRecipe::restored(id, elapsed, parallelism);

            let saved = save_active_recipe(&active, &reg).unwrap();
            let back = SavedRecipe::from_json(&saved.to_json().unwrap()).unwrap();
            let (_, restored) = resolve_saved(&back, &reg).unwrap();

            prop_assert_eq!(restored.elapsed(), elapsed);
            prop_assert_eq!(restored.parallelism(), parallelism);
        }
    }
}
