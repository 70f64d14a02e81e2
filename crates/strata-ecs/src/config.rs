//! World configuration.
//!
//! [`WorldConfig`] holds the handful of knobs that size a [`World`](crate::world::World):
//! the ceiling on distinct component kinds, the initial size of the archetype
//! lookup table, and the row count of one parallel work unit. Configs can be
//! built in code or loaded from JSON; either way they are validated before a
//! world accepts them.

use serde::{Deserialize, Serialize};

use crate::EcsError;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Default ceiling on the number of distinct component kinds per world.
pub const DEFAULT_MAX_COMPONENT_KINDS: usize = 2500;

/// Default number of slots in the archetype lookup table before it first grows.
pub const DEFAULT_ARCHETYPE_SLOTS: usize = 64;

/// Default number of rows handed to one unit of parallel work.
pub const DEFAULT_CHUNK_ROWS: usize = 512;

/// Hard upper bound for `max_component_kinds`: column indices are stored as
/// `u16` in each archetype's kind map, with `u16::MAX` reserved as "absent".
pub const KIND_CEILING: usize = u16::MAX as usize;

// ---------------------------------------------------------------------------
// WorldConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`World`](crate::world::World).
///
/// Missing fields fall back to their defaults when deserializing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Maximum number of distinct component kinds the world's registry will
    /// hand out. Registration beyond this fails with
    /// [`EcsError::KindLimitExceeded`]. Default: 2500.
    pub max_component_kinds: usize,

    /// Initial slot count of the open-addressed archetype table. Rounded up
    /// to a power of two (minimum 8). Default: 64.
    pub initial_archetype_slots: usize,

    /// Rows per unit of work in chunked parallel view iteration. Default: 512.
    pub parallel_chunk_rows: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            max_component_kinds: DEFAULT_MAX_COMPONENT_KINDS,
            initial_archetype_slots: DEFAULT_ARCHETYPE_SLOTS,
            parallel_chunk_rows: DEFAULT_CHUNK_ROWS,
        }
    }
}

impl WorldConfig {
    /// Parse a config from JSON and validate it.
    ///
    /// ```
    /// use strata_ecs::config::WorldConfig;
    ///
    /// let cfg = WorldConfig::from_json_str(r#"{ "parallel_chunk_rows": 128 }"#).unwrap();
    /// assert_eq!(cfg.parallel_chunk_rows, 128);
    /// assert_eq!(cfg.max_component_kinds, 2500);
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self, EcsError> {
        let config: WorldConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every field is within its supported range.
    pub fn validate(&self) -> Result<(), EcsError> {
        if self.max_component_kinds == 0 || self.max_component_kinds > KIND_CEILING {
            return Err(EcsError::InvalidConfig {
                reason: format!(
                    "max_component_kinds must be in 1..={KIND_CEILING}, got {}",
                    self.max_component_kinds
                ),
            });
        }
        if self.initial_archetype_slots == 0 {
            return Err(EcsError::InvalidConfig {
                reason: "initial_archetype_slots must be positive".to_owned(),
            });
        }
        if self.parallel_chunk_rows == 0 {
            return Err(EcsError::InvalidConfig {
                reason: "parallel_chunk_rows must be positive".to_owned(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
