use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;

new_key_type! {
    /// Identifies a controller entity in the engine.
    pub struct ControllerId;
}

/// Identifies a machine template (a structure shape) in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MachineTypeId(pub u32);

/// Identifies a recipe in the registry. Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecipeId(pub u32);

/// Identifies a modifier applied to a crafting attempt. Ordering is the
/// canonical application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModifierId(pub u32);

/// Names a structural capability discovered by the pattern match (an energy
/// hatch, an input bus). Recipe requirements are expressed against tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentTag(pub String);

impl ComponentTag {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for ComponentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentTag {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_equality() {
        assert_eq!(RecipeId(0), RecipeId(0));
        assert_ne!(RecipeId(0), RecipeId(1));
        assert_eq!(MachineTypeId(3), MachineTypeId(3));
    }

    #[test]
    fn modifier_ids_are_ordered() {
        assert!(ModifierId(1) < ModifierId(5));
    }

    #[test]
    fn component_tag_display() {
        let tag = ComponentTag::from("energy_input");
        assert_eq!(tag.to_string(), "energy_input");
    }

    #[test]
    fn ids_are_hashable() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(RecipeId(0), "gear_press");
        assert_eq!(map[&RecipeId(0)], "gear_press");
    }
}
