//! Cross-game learning and map-cache persistence.
//!
//! Two versioned files exist per AI installation: a RON learning file per
//! map+mod combination (decaying threat history, learned efficiency, attack
//! frequency by game period) and a binary map cache per map (terrain ratios,
//! metal spots, continent ids). Both are read once at startup and written
//! once at shutdown; the hot path never touches disk. A version-string
//! mismatch discards the file and regenerates it instead of migrating.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::brain::StrategicState;
use crate::catalog::TypeStatsTable;
use crate::config::AiConfig;
use crate::map::{MetalSpot, SectorCoord, SectorGrid};
use crate::types::{ContinentId, UnitTypeId, WorldPos, ASSAULT_CATEGORIES, COMBAT_CATEGORIES};

/// Version string written into learning files.
pub const LEARNING_VERSION: &str = "SKIRMISH_LEARN_0_9";

/// Version string written into map caches.
pub const CACHE_VERSION: &str = "SKIRMISH_MAP_0_9";

/// Learned per-sector threat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorLearning {
    /// Sector coordinates.
    pub coord: SectorCoord,
    /// Learned attacked-by counters per assault category.
    pub attacked_by: [f32; ASSAULT_CATEGORIES],
    /// Learned lost-unit counters per assault category.
    pub lost_units: [f32; ASSAULT_CATEGORIES],
}

/// The per-map+mod learning file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningFile {
    /// Format version; gates loading.
    pub version: String,
    /// Per-sector learned threat.
    pub sectors: Vec<SectorLearning>,
    /// Learned efficiency vectors per entity type.
    pub efficiency: Vec<(UnitTypeId, [f32; COMBAT_CATEGORIES])>,
    /// Historical attack frequency per game period and assault category.
    pub attack_frequency: [[f32; ASSAULT_CATEGORIES]; 4],
}

impl LearningFile {
    /// Load and version-check a learning file.
    ///
    /// # Errors
    ///
    /// [`crate::error::AiError::VersionMismatch`] when the version string
    /// differs (the caller discards and regenerates), or
    /// [`crate::error::AiError::DataLoad`] when the file cannot be read or
    /// parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::error::AiError::DataLoad {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        let file: Self = ron::from_str(&contents).map_err(|e| crate::error::AiError::DataLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if file.version != LEARNING_VERSION {
            return Err(crate::error::AiError::VersionMismatch {
                path: path.display().to_string(),
                expected: LEARNING_VERSION.to_string(),
                found: file.version,
            });
        }
        Ok(file)
    }

    /// Write the learning file.
    ///
    /// # Errors
    ///
    /// [`crate::error::AiError::DataSave`] on IO or serialization failure.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::error::Result<()> {
        let path = path.as_ref();
        let contents = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| crate::error::AiError::DataSave {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        std::fs::write(path, contents).map_err(|e| crate::error::AiError::DataSave {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Seed the grid and stats table with the learned history.
    pub fn apply(&self, grid: &mut SectorGrid, stats: &mut TypeStatsTable) {
        for sector in &self.sectors {
            if let Some(target) = grid.sector_mut(sector.coord) {
                for (slot, value) in target.attacked_by.iter_mut().zip(sector.attacked_by) {
                    slot.learned = value;
                }
                for (slot, value) in target.lost_units.iter_mut().zip(sector.lost_units) {
                    slot.learned = value;
                }
            }
        }
        for (id, efficiency) in &self.efficiency {
            stats.set_efficiency(*id, *efficiency);
        }
        stats.recompute_averages();
    }

    /// Capture the state at shutdown: this game's counters are blended into
    /// the learned values with the configured retention.
    #[must_use]
    pub fn capture(
        grid: &SectorGrid,
        stats: &TypeStatsTable,
        brain: &StrategicState,
        config: &AiConfig,
    ) -> Self {
        let keep = config.learning_retention;
        let new = 1.0 - keep;

        let sectors = grid
            .iter()
            .map(|sector| {
                let mut attacked_by = [0.0; ASSAULT_CATEGORIES];
                let mut lost_units = [0.0; ASSAULT_CATEGORIES];
                for (slot, scale) in attacked_by.iter_mut().zip(sector.attacked_by.iter()) {
                    *slot = keep * scale.learned + new * scale.current;
                }
                for (slot, scale) in lost_units.iter_mut().zip(sector.lost_units.iter()) {
                    *slot = keep * scale.learned + new * scale.current;
                }
                SectorLearning {
                    coord: sector.coord,
                    attacked_by,
                    lost_units,
                }
            })
            .collect();

        let efficiency = stats.iter().map(|(id, s)| (*id, s.efficiency)).collect();

        let mut attack_frequency = [[0.0; ASSAULT_CATEGORIES]; 4];
        for (period, slots) in attack_frequency.iter_mut().enumerate() {
            for (slot, current) in slots.iter_mut().zip(brain.attacked_by_period()[period]) {
                *slot = current;
            }
        }

        Self {
            version: LEARNING_VERSION.to_string(),
            sectors,
            efficiency,
            attack_frequency,
        }
    }
}

/// Static per-sector facts persisted in the map cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorStatic {
    /// Sector coordinates.
    pub coord: SectorCoord,
    /// Water coverage.
    pub water_ratio: f32,
    /// Buildable-ground coverage.
    pub flat_ratio: f32,
    /// Continent id of the dominant terrain.
    pub continent: Option<ContinentId>,
    /// Metal spot positions.
    pub metal_spots: Vec<WorldPos>,
}

/// The per-map cache of terrain analysis results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapCache {
    /// Format version; gates loading.
    pub version: String,
    /// Static facts for every sector.
    pub sectors: Vec<SectorStatic>,
}

impl MapCache {
    /// Load and version-check a binary map cache.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`LearningFile::load`].
    pub fn load<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| crate::error::AiError::DataLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let cache: Self =
            bincode::deserialize(&bytes).map_err(|e| crate::error::AiError::DataLoad {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        if cache.version != CACHE_VERSION {
            return Err(crate::error::AiError::VersionMismatch {
                path: path.display().to_string(),
                expected: CACHE_VERSION.to_string(),
                found: cache.version,
            });
        }
        Ok(cache)
    }

    /// Write the binary map cache.
    ///
    /// # Errors
    ///
    /// [`crate::error::AiError::DataSave`] on IO or serialization failure.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::error::Result<()> {
        let path = path.as_ref();
        let bytes = bincode::serialize(self).map_err(|e| crate::error::AiError::DataSave {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(path, bytes).map_err(|e| crate::error::AiError::DataSave {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Capture the grid's static facts.
    #[must_use]
    pub fn capture(grid: &SectorGrid) -> Self {
        let sectors = grid
            .iter()
            .map(|sector| SectorStatic {
                coord: sector.coord,
                water_ratio: sector.water_ratio,
                flat_ratio: sector.flat_ratio,
                continent: sector.continent,
                metal_spots: sector.metal_spots.iter().map(|s| s.pos).collect(),
            })
            .collect();
        Self {
            version: CACHE_VERSION.to_string(),
            sectors,
        }
    }

    /// Seed a freshly constructed grid with the cached facts.
    pub fn apply(&self, grid: &mut SectorGrid) {
        for cached in &self.sectors {
            if let Some(sector) = grid.sector_mut(cached.coord) {
                sector.water_ratio = cached.water_ratio;
                sector.flat_ratio = cached.flat_ratio;
                sector.continent = cached.continent;
                sector.metal_spots = cached
                    .metal_spots
                    .iter()
                    .map(|pos| MetalSpot {
                        pos: *pos,
                        extractor: None,
                    })
                    .collect();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BuildCatalog, UnitTypeData};
    use crate::types::{MovementDomain, UnitCategory};
    use std::rc::Rc;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("skirmish-{}-{}", std::process::id(), name))
    }

    fn grid() -> SectorGrid {
        SectorGrid::new(3, 3, &AiConfig::default())
    }

    fn stats() -> TypeStatsTable {
        let tank = UnitTypeData::new(
            UnitTypeId(1),
            "tank",
            UnitCategory::GroundAssault,
            MovementDomain::Ground,
            100.0,
            100.0,
        );
        TypeStatsTable::new(BuildCatalog::from_types(vec![tank]), &AiConfig::default())
    }

    #[test]
    fn learning_roundtrip() {
        let path = temp_path("learning.ron");
        let mut g = grid();
        let mut s = stats();
        s.get_mut(UnitTypeId(1)).unwrap().efficiency[0] = 4.2;
        g.sector_mut(SectorCoord::new(1, 1)).unwrap().attacked_by[0].current = 3.0;
        let brain = StrategicState::new();
        let config = AiConfig::default();

        let file = LearningFile::capture(&g, &s, &brain, &config);
        file.save(&path).unwrap();
        let loaded = LearningFile::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let mut fresh_grid = grid();
        let mut fresh_stats = stats();
        loaded.apply(&mut fresh_grid, &mut fresh_stats);
        assert!(
            (fresh_stats.efficiency_vs(UnitTypeId(1), crate::types::CombatCategory::Ground)
                - 4.2)
                .abs()
                < 1e-5
        );
        // current-game counter landed in the learned scale, discounted by
        // the retention blend
        let learned = fresh_grid
            .sector(SectorCoord::new(1, 1))
            .unwrap()
            .attacked_by[0]
            .learned;
        assert!(learned > 0.0 && learned < 3.0);
    }

    #[test]
    fn version_mismatch_is_detected() {
        let path = temp_path("stale.ron");
        let g = grid();
        let s = stats();
        let mut file =
            LearningFile::capture(&g, &s, &StrategicState::new(), &AiConfig::default());
        file.version = "SKIRMISH_LEARN_0_1".to_string();
        let contents =
            ron::ser::to_string_pretty(&file, ron::ser::PrettyConfig::default()).unwrap();
        std::fs::write(&path, contents).unwrap();

        let err = LearningFile::load(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(
            err,
            crate::error::AiError::VersionMismatch { .. }
        ));
    }

    #[test]
    fn map_cache_roundtrip() {
        let path = temp_path("cache.bin");
        let mut g = grid();
        {
            let sector = g.sector_mut(SectorCoord::new(0, 1)).unwrap();
            sector.water_ratio = 0.7;
            sector.continent = Some(ContinentId(2));
            sector.metal_spots.push(MetalSpot {
                pos: WorldPos::new(123.0, 456.0),
                extractor: None,
            });
        }

        MapCache::capture(&g).save(&path).unwrap();
        let loaded = MapCache::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let mut fresh = grid();
        loaded.apply(&mut fresh);
        let sector = fresh.sector(SectorCoord::new(0, 1)).unwrap();
        assert_eq!(sector.continent, Some(ContinentId(2)));
        assert!((sector.water_ratio - 0.7).abs() < 1e-6);
        assert_eq!(sector.metal_spots.len(), 1);
        assert!(!sector.metal_spots[0].occupied());
    }

    #[test]
    fn missing_file_is_a_load_error() {
        assert!(matches!(
            LearningFile::load("/nonexistent/learn.ron"),
            Err(crate::error::AiError::DataLoad { .. })
        ));
    }
}
