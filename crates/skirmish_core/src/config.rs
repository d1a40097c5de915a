//! AI configuration.
//!
//! All tunables of the decision core live in [`AiConfig`]. The config is
//! data-driven: a RON file can override any field, and `Default` provides
//! values suitable for a typical map. A config file that fails to load is
//! the one fatal initialization error of the core.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AiError, Result};

/// Tunable parameters of the decision core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Edge length of one sector in world units.
    pub sector_size: f32,
    /// Maximum number of sectors the base may grow to.
    pub max_base_size: usize,

    /// Per-pass decay of per-sector lost-unit counters.
    pub lost_units_decay: f32,
    /// Per-pass decay of the strategic attacked-by counters.
    pub attacked_by_decay: f32,
    /// Per-pass decay of the spotted-enemy maxima.
    pub spotted_decay: f32,

    /// Number of samples in the rolling resource-surplus windows.
    pub resource_window: usize,
    /// Conversion ratio between metal and energy value.
    pub metal_energy_ratio: f32,

    /// Minimum urgency a category must reach before it can be dispatched.
    pub urgency_floor: f32,
    /// Multiplicative per-pass growth of unspent urgency values.
    pub urgency_growth: f32,
    /// Soft cap above which urgency values are pulled back down.
    pub urgency_cap: f32,

    /// Metal-cost ceiling for unit selection.
    pub max_unit_cost: f32,
    /// Lower clamp for learned efficiency values.
    pub min_efficiency: f32,
    /// Default jitter bound for unit selection (`0.1 × (rng % randomness)`).
    pub selection_randomness: u32,

    /// Maximum depth of recursive constructor/factory requests.
    pub max_request_depth: u32,
    /// Maximum assistants attached to one construction task.
    pub max_assistants: usize,
    /// Maximum length of a factory build queue.
    pub max_buildqueue_size: usize,

    /// Maximum storage buildings.
    pub max_storage: u32,
    /// Factories required before storage is considered.
    pub min_factories_for_storage: u32,
    /// Maximum air bases.
    pub max_air_bases: u32,
    /// Maximum stationary artillery pieces.
    pub max_stationary_arty: u32,
    /// Maximum defence buildings per sector.
    pub max_defences_per_sector: usize,

    /// Maximum units in an assault group.
    pub max_group_size: usize,
    /// Maximum units in an anti-air group.
    pub max_anti_air_group_size: usize,
    /// Maximum attacks in flight at the same time.
    pub max_attacks: usize,
    /// Maximum anti-air groups attached to one attack as escort.
    pub max_anti_air_escorts: usize,
    /// Scaling applied to defender power when judging whether an attack
    /// still out-powers the target sector.
    pub aggressiveness: f32,
    /// Weapon range above which attacking units fall back between shots.
    pub min_fallback_range: f32,

    /// Weight of the pre-existing learned value when current-game statistics
    /// are folded into the learning file at shutdown.
    pub learning_retention: f32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            sector_size: 512.0,
            max_base_size: 8,
            lost_units_decay: 0.92,
            attacked_by_decay: 0.96,
            spotted_decay: 0.996,
            resource_window: 8,
            metal_energy_ratio: 25.0,
            urgency_floor: 0.5,
            urgency_growth: 1.03,
            urgency_cap: 20.0,
            max_unit_cost: 10_000.0,
            min_efficiency: 0.01,
            selection_randomness: 3,
            max_request_depth: 4,
            max_assistants: 4,
            max_buildqueue_size: 12,
            max_storage: 2,
            min_factories_for_storage: 2,
            max_air_bases: 1,
            max_stationary_arty: 3,
            max_defences_per_sector: 12,
            max_group_size: 12,
            max_anti_air_group_size: 4,
            max_attacks: 4,
            max_anti_air_escorts: 2,
            aggressiveness: 1.0,
            min_fallback_range: 600.0,
            learning_retention: 0.7,
        }
    }
}

impl AiConfig {
    /// Load a configuration from a RON file.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::ConfigLoad`] if the file cannot be read or parsed.
    /// Per the error design this is fatal for AI initialization.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| AiError::ConfigLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        ron::from_str(&contents).map_err(|e| AiError::ConfigLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let cfg = AiConfig::default();
        assert!(cfg.urgency_growth > 1.0);
        assert!(cfg.urgency_floor > 0.0);
        assert!(cfg.min_efficiency > 0.0);
        assert!(cfg.max_request_depth >= 2);
        assert_eq!(cfg.resource_window, 8);
    }

    #[test]
    fn partial_ron_overrides_defaults() {
        let cfg: AiConfig = ron::from_str("(max_base_size: 12, aggressiveness: 1.5)").unwrap();
        assert_eq!(cfg.max_base_size, 12);
        assert!((cfg.aggressiveness - 1.5).abs() < f32::EPSILON);
        // untouched fields keep their defaults
        assert_eq!(cfg.max_attacks, AiConfig::default().max_attacks);
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = AiConfig::load("/nonexistent/skirmish.ron").unwrap_err();
        assert!(matches!(err, AiError::ConfigLoad { .. }));
    }
}
