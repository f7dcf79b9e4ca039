//! World construction settings.

use serde::{Deserialize, Serialize};

use crate::component::MAX_COMPONENT_TYPES;
use crate::EcsError;

/// Settings for [`World::with_config`](crate::world::World::with_config).
///
/// Deserializes from partial documents: missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Rows reserved by every newly created archetype. Archetypes double
    /// their capacity when full. Default: 4.
    pub initial_capacity: usize,

    /// Upper bound on distinct component types. Cannot exceed
    /// [`MAX_COMPONENT_TYPES`]. Default: 128.
    pub max_component_types: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 4,
            max_component_types: MAX_COMPONENT_TYPES,
        }
    }
}

impl WorldConfig {
    /// Check every setting is usable.
    pub fn validate(&self) -> Result<(), EcsError> {
        if self.initial_capacity == 0 {
            return Err(EcsError::InvalidConfig {
                reason: "initial_capacity must be at least 1".to_owned(),
            });
        }
        if self.max_component_types == 0 || self.max_component_types > MAX_COMPONENT_TYPES {
            return Err(EcsError::InvalidConfig {
                reason: format!(
                    "max_component_types must be in 1..={MAX_COMPONENT_TYPES}, got {}",
                    self.max_component_types
                ),
            });
        }
        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, EcsError> {
        let config: Self = serde_json::from_str(json).map_err(|e| EcsError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }
}
