//! Immutable machine and recipe registry.
//!
//! Built once through [`RegistryBuilder`] (registration -> mutation ->
//! finalization) and frozen before the simulation starts; thread-safe to
//! share with worker pools because nothing can write to it afterwards.

use crate::fixed::Ticks;
use crate::id::{MachineTypeId, RecipeId};
use crate::recipe::{RecipeDefinition, Requirement};
use std::collections::HashMap;

/// A machine template definition.
#[derive(Debug, Clone)]
pub struct MachineDef {
    pub name: String,
}

/// Builder for constructing an immutable [`RecipeRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    machines: Vec<MachineDef>,
    machine_name_to_id: HashMap<String, MachineTypeId>,
    recipes: Vec<RecipeDefinition>,
    recipe_name_to_id: HashMap<String, RecipeId>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase 1: Register a machine template. Returns its ID.
    pub fn register_machine(&mut self, name: &str) -> MachineTypeId {
        let id = MachineTypeId(self.machines.len() as u32);
        self.machines.push(MachineDef {
            name: name.to_string(),
        });
        self.machine_name_to_id.insert(name.to_string(), id);
        id
    }

    /// Phase 1: Register a recipe for a machine. Returns its ID.
    ///
    /// Candidate order during search is registration order. Defaults:
    /// `max_parallelism = 1`, `cancel_on_tick_failure = false`; adjust via
    /// [`RegistryBuilder::mutate_recipe`].
    pub fn register_recipe(
        &mut self,
        name: &str,
        machine: MachineTypeId,
        duration: Ticks,
        requirements: Vec<Requirement>,
    ) -> RecipeId {
        let id = RecipeId(self.recipes.len() as u32);
        self.recipes.push(RecipeDefinition {
            id,
            name: name.to_string(),
            machine,
            duration,
            requirements,
            max_parallelism: 1,
            cancel_on_tick_failure: false,
        });
        self.recipe_name_to_id.insert(name.to_string(), id);
        id
    }

    /// Phase 2: Mutate an existing recipe by name.
    pub fn mutate_recipe<F>(&mut self, name: &str, f: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut RecipeDefinition),
    {
        let id = self
            .recipe_name_to_id
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        f(&mut self.recipes[id.0 as usize]);
        Ok(())
    }

    /// Lookup machine ID by name.
    pub fn machine_id(&self, name: &str) -> Option<MachineTypeId> {
        self.machine_name_to_id.get(name).copied()
    }

    /// Phase 3: Finalize and build the immutable registry.
    ///
    /// Validates that every recipe references a registered machine and that
    /// durations are non-zero.
    pub fn build(self) -> Result<RecipeRegistry, RegistryError> {
        let mut by_machine: HashMap<MachineTypeId, Vec<RecipeId>> = HashMap::new();
        for recipe in &self.recipes {
            if recipe.machine.0 as usize >= self.machines.len() {
                return Err(RegistryError::UnknownMachine {
                    recipe: recipe.name.clone(),
                    machine: recipe.machine,
                });
            }
            if recipe.duration == 0 {
                return Err(RegistryError::ZeroDuration(recipe.name.clone()));
            }
            by_machine.entry(recipe.machine).or_default().push(recipe.id);
        }

        Ok(RecipeRegistry {
            machines: self.machines,
            machine_name_to_id: self.machine_name_to_id,
            recipes: self.recipes,
            recipe_name_to_id: self.recipe_name_to_id,
            by_machine,
        })
    }
}

/// Immutable registry. Frozen after build(). Thread-safe to share.
#[derive(Debug)]
pub struct RecipeRegistry {
    machines: Vec<MachineDef>,
    machine_name_to_id: HashMap<String, MachineTypeId>,
    recipes: Vec<RecipeDefinition>,
    recipe_name_to_id: HashMap<String, RecipeId>,
    by_machine: HashMap<MachineTypeId, Vec<RecipeId>>,
}

impl RecipeRegistry {
    /// The ordered candidate list for a machine, cloned so callers (and the
    /// worker tasks they spawn) hold a read-only snapshot.
    pub fn recipes_for(&self, machine: MachineTypeId) -> Vec<RecipeDefinition> {
        self.by_machine
            .get(&machine)
            .map(|ids| {
                ids.iter()
                    .map(|id| self.recipes[id.0 as usize].clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_recipe(&self, id: RecipeId) -> Option<&RecipeDefinition> {
        self.recipes.get(id.0 as usize)
    }

    pub fn get_machine(&self, id: MachineTypeId) -> Option<&MachineDef> {
        self.machines.get(id.0 as usize)
    }

    pub fn recipe_id(&self, name: &str) -> Option<RecipeId> {
        self.recipe_name_to_id.get(name).copied()
    }

    pub fn recipe_name(&self, id: RecipeId) -> Option<&str> {
        self.recipes.get(id.0 as usize).map(|r| r.name.as_str())
    }

    pub fn machine_id(&self, name: &str) -> Option<MachineTypeId> {
        self.machine_name_to_id.get(name).copied()
    }

    pub fn machine_count(&self) -> usize {
        self.machines.len()
    }

    pub fn recipe_count(&self) -> usize {
        self.recipes.len()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("recipe {recipe} references unregistered machine {machine:?}")]
    UnknownMachine {
        recipe: String,
        machine: MachineTypeId,
    },
    #[error("recipe {0} has zero duration")]
    ZeroDuration(String),
}
