//! # EVCS Configuration
//!
//! Two layers of capacity configuration:
//!
//! - [`limits`]: compile-time constants that size fixed inline arrays.
//!   Changing them requires a rebuild.
//! - [`EcsConfig`]: pool sizes read once at startup, typically from a TOML
//!   file shipped with the game content.
//!
//! ```toml
//! max_entities = 4096
//! default_component_pool_size = 1024
//!
//! [component_pool_sizes]
//! Transform = 4096
//! PhysicsBody = 512
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EcsError, EcsResult};

// =============================================================================
// BUILD-TIME LIMITS
// =============================================================================

/// Fixed capacities baked into the binary.
pub mod limits {
    /// Maximum number of components a single entity can own.
    pub const MAX_COMPONENTS_PER_ENTITY: usize = 16;

    /// Maximum number of views a single entity can own.
    pub const MAX_VIEWS_PER_ENTITY: usize = 8;

    /// Maximum number of component slots in one view signature.
    pub const MAX_VIEW_SLOTS: usize = 8;

    /// Hard upper bound on live views across all view types.
    pub const MAX_VIEWS: usize = 1024;

    /// Strongest component alignment the pool backing supports.
    pub const MAX_COMPONENT_ALIGN: usize = std::mem::align_of::<u64>();
}

// =============================================================================
// RUNTIME CONFIGURATION
// =============================================================================

/// Pool capacities for one run of the engine.
///
/// Missing keys fall back to [`EcsConfig::default`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EcsConfig {
    /// Capacity of the entity pool.
    pub max_entities: usize,
    /// Maximum number of component types that can be registered.
    pub max_component_types: usize,
    /// Pool capacity for component types without an explicit size.
    pub default_component_pool_size: usize,
    /// Per-type pool capacity, keyed by registration name.
    pub component_pool_sizes: BTreeMap<String, usize>,
    /// Maximum number of view types that can be registered.
    pub max_view_types: usize,
    /// Capacity of the shared view pool.
    pub max_views: usize,
}

impl Default for EcsConfig {
    fn default() -> Self {
        Self {
            max_entities: 1024,
            max_component_types: 64,
            default_component_pool_size: 256,
            component_pool_sizes: BTreeMap::new(),
            max_view_types: 32,
            max_views: limits::MAX_VIEWS,
        }
    }
}

impl EcsConfig {
    /// Parses and validates a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] if the text is not valid TOML for
    /// this schema or the values fail [`EcsConfig::validate`].
    pub fn from_toml_str(text: &str) -> EcsResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| EcsError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> EcsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EcsError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Checks that every capacity is usable.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> EcsResult<()> {
        let non_zero = [
            ("max_entities", self.max_entities),
            ("max_component_types", self.max_component_types),
            ("default_component_pool_size", self.default_component_pool_size),
            ("max_view_types", self.max_view_types),
            ("max_views", self.max_views),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(EcsError::InvalidConfig(format!("{field} must be greater than zero")));
            }
        }
        if let Some((name, _)) = self.component_pool_sizes.iter().find(|(_, size)| **size == 0) {
            return Err(EcsError::InvalidConfig(format!(
                "component pool `{name}` must be greater than zero"
            )));
        }
        if self.max_views > limits::MAX_VIEWS {
            return Err(EcsError::InvalidConfig(format!(
                "max_views {} exceeds the build limit of {}",
                self.max_views,
                limits::MAX_VIEWS
            )));
        }
        if self.max_entities > u32::MAX as usize {
            return Err(EcsError::InvalidConfig("max_entities cannot exceed u32::MAX".into()));
        }
        if self.max_component_types > usize::from(u16::MAX) || self.max_view_types > usize::from(u16::MAX) {
            return Err(EcsError::InvalidConfig("type counts cannot exceed u16::MAX".into()));
        }
        Ok(())
    }

    /// Resolves the pool capacity for a component type.
    ///
    /// A per-name override wins, then the type's own preference, then the
    /// config default.
    #[must_use]
    pub fn pool_size_for(&self, name: &str, preferred: Option<usize>) -> usize {
        self.component_pool_sizes
            .get(name)
            .copied()
            .or(preferred)
            .unwrap_or(self.default_component_pool_size)
    }
}
