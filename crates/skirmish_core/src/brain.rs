//! Strategic state: base topology, game phase, pressure estimates.
//!
//! The brain owns the base-set rings, decides where the base expands, and
//! keeps the rolling strategic estimates (attacked-by frequencies, spotted
//! enemy maxima, defence capability, enemy pressure) the scheduler and the
//! attack coordinator read.

use crate::catalog::TypeStatsTable;
use crate::config::AiConfig;
use crate::map::{Sector, SectorCoord, SectorGrid, SectorTerrain};
use crate::types::{
    CombatCategory, GamePeriod, ThreatBlend, WorldPos, ASSAULT_CATEGORIES, COMBAT_CATEGORIES,
};

/// Number of distance rings the brain keeps indexed (base + two shells, plus
/// a third used only for water expansion on land-heavy maps).
const RINGS: usize = 4;

/// Strategic state tracker.
#[derive(Debug)]
pub struct StrategicState {
    /// `rings[k]` = sectors at k hops from the base; ring 0 is the base.
    rings: Vec<Vec<SectorCoord>>,
    base_center: WorldPos,
    /// Whether the base may still grow.
    expandable: bool,
    /// Sector added by the latest expansion that has not been built on yet.
    /// Blocks further expansion until consumed.
    pending_expansion: Option<SectorCoord>,

    /// Decaying count of attacks received this game, by attacker category.
    attacked_by: [f32; ASSAULT_CATEGORIES],
    /// Attack counts bucketed by game period, fed into the learning file.
    attacked_by_period: [[f32; ASSAULT_CATEGORIES]; 4],
    /// Decaying maxima of enemy combat units spotted at once.
    max_spotted: [f32; ASSAULT_CATEGORIES],
    /// Friendly defensive power against each category; recomputed wholesale.
    defence_power: [f32; COMBAT_CATEGORIES],
    /// Enemy pressure on the base and its surroundings, in [0, 1].
    enemy_pressure: f32,
}

impl StrategicState {
    /// Fresh strategic state with an empty base.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rings: vec![Vec::new(); RINGS],
            base_center: WorldPos::ZERO,
            expandable: true,
            pending_expansion: None,
            attacked_by: [0.0; ASSAULT_CATEGORIES],
            attacked_by_period: [[0.0; ASSAULT_CATEGORIES]; 4],
            max_spotted: [0.0; ASSAULT_CATEGORIES],
            defence_power: [0.0; COMBAT_CATEGORIES],
            enemy_pressure: 0.0,
        }
    }

    /// Sectors at `ring` hops from the base.
    #[must_use]
    pub fn ring(&self, ring: usize) -> &[SectorCoord] {
        self.rings.get(ring).map_or(&[], |r| r.as_slice())
    }

    /// Geometric center of the base.
    #[must_use]
    pub fn base_center(&self) -> WorldPos {
        self.base_center
    }

    /// Whether the base may still grow.
    #[must_use]
    pub fn expandable(&self) -> bool {
        self.expandable
    }

    /// Current enemy pressure estimate in [0, 1].
    #[must_use]
    pub fn enemy_pressure(&self) -> f32 {
        self.enemy_pressure
    }

    /// Friendly defence power against one category.
    #[must_use]
    pub fn defence_power_vs(&self, category: CombatCategory) -> f32 {
        self.defence_power[category.index()]
    }

    /// Blended frequency of attacks by one category, mixing this game with
    /// the learned per-period history.
    #[must_use]
    pub fn attacks_by(&self, category: CombatCategory, learned_for_period: f32) -> f32 {
        let Some(slot) = CombatCategory::ASSAULT.iter().position(|c| *c == category) else {
            return 0.0;
        };
        (self.attacked_by[slot] + learned_for_period) / 2.0
    }

    /// Decayed maximum of simultaneously spotted enemies of one category.
    #[must_use]
    pub fn max_spotted(&self, category: CombatCategory) -> f32 {
        CombatCategory::ASSAULT
            .iter()
            .position(|c| *c == category)
            .map_or(0.0, |slot| self.max_spotted[slot])
    }

    /// Per-period attack history accumulated this game, for persistence.
    #[must_use]
    pub fn attacked_by_period(&self) -> &[[f32; ASSAULT_CATEGORIES]; 4] {
        &self.attacked_by_period
    }

    /// Add a sector to the base and refresh the ring index.
    pub fn add_sector(&mut self, grid: &mut SectorGrid, coord: SectorCoord) -> bool {
        if !grid.add_to_base(coord) {
            return false;
        }
        self.refresh_rings(grid);
        true
    }

    /// Remove a sector from the base and refresh the ring index.
    pub fn remove_sector(&mut self, grid: &mut SectorGrid, coord: SectorCoord) -> bool {
        if !grid.remove_from_base(coord) {
            return false;
        }
        if self.pending_expansion == Some(coord) {
            self.pending_expansion = None;
        }
        self.refresh_rings(grid);
        true
    }

    /// Rebuild the ring index and base center from the grid's distance
    /// field. Called after every base change.
    pub fn refresh_rings(&mut self, grid: &SectorGrid) {
        for ring in &mut self.rings {
            ring.clear();
        }
        for sector in grid.iter() {
            let d = sector.distance_to_base;
            if d >= 0 && (d as usize) < RINGS {
                self.rings[d as usize].push(sector.coord);
            }
        }

        if self.rings[0].is_empty() {
            self.base_center = WorldPos::ZERO;
            return;
        }
        let mut x = 0.0;
        let mut z = 0.0;
        for coord in &self.rings[0] {
            if let Some(sector) = grid.sector(*coord) {
                let center = sector.center();
                x += center.x;
                z += center.z;
            }
        }
        let n = self.rings[0].len() as f32;
        self.base_center = WorldPos::new(x / n, z / n);
    }

    /// Whether a sector is currently safe to move constructors into.
    #[must_use]
    pub fn is_safe_sector(sector: &Sector) -> bool {
        sector.lost_constructors < 0.5
            && sector.enemy_units_visible == 0
            && sector.enemy_structures == 0
    }

    /// Try to grow the base by one sector of the preferred terrain.
    ///
    /// Candidates come from ring 1 (rings 2–3 as well for water expansion
    /// when the base holds almost no water yet). Each is rated by metal
    /// spots, terrain match, and proximity to the existing base; the best
    /// one is added. Returns false without touching the base when no
    /// candidate passes the filters, or while a previously added sector is
    /// still unused.
    pub fn expand_base(
        &mut self,
        grid: &mut SectorGrid,
        terrain: SectorTerrain,
        config: &AiConfig,
    ) -> bool {
        if self.rings[0].len() >= config.max_base_size {
            self.expandable = false;
            return false;
        }
        if let Some(pending) = self.pending_expansion {
            let consumed = grid
                .sector(pending)
                .is_some_and(|s| s.own_structure_count() > 0);
            if !consumed {
                return false;
            }
            self.pending_expansion = None;
        }

        let (_, water_base) = grid.base_terrain_counts();
        let base_water_ratio = if self.rings[0].is_empty() {
            0.0
        } else {
            water_base as f32 / self.rings[0].len() as f32
        };
        let max_search_ring = if terrain == SectorTerrain::Water && base_water_ratio < 0.1 {
            3
        } else {
            1
        };

        let mut best: Option<(SectorCoord, f32)> = None;
        for ring in 1..=max_search_ring {
            for coord in &self.rings[ring] {
                let Some(sector) = grid.sector(*coord) else {
                    continue;
                };
                if !Self::is_safe_sector(sector) || sector.allied_structures >= 3 {
                    continue;
                }

                let mut rating = 1.0 + sector.metal_spot_count() as f32;
                match terrain {
                    SectorTerrain::Land => {
                        rating += (sector.flat_ratio - sector.water_ratio) * 16.0;
                    }
                    SectorTerrain::Water => {
                        if sector.water_ratio > 0.1 {
                            rating += 8.0 * sector.water_ratio;
                        } else {
                            continue;
                        }
                    }
                    SectorTerrain::Mixed => {
                        rating += (sector.flat_ratio + sector.water_ratio) * 8.0;
                    }
                }

                // stay close to the existing base
                let mut dist = 0.1;
                for base_coord in &self.rings[0] {
                    dist += coord.grid_distance(*base_coord);
                }
                let border = grid
                    .sector(*coord)
                    .map_or(1.0, |s| s.map_border_factor(grid.x_sectors(), grid.y_sectors()));
                rating /= dist * border.sqrt();

                if best.map_or(true, |(_, r)| rating > r) {
                    best = Some((*coord, rating));
                }
            }
        }

        let Some((coord, _)) = best else {
            return false;
        };
        if !self.add_sector(grid, coord) {
            return false;
        }
        tracing::info!(x = coord.x, y = coord.y, ?terrain, "expanding base");
        self.pending_expansion = Some(coord);
        if self.rings[0].len() >= config.max_base_size {
            self.expandable = false;
        }
        true
    }

    /// Record an attack on the base by one category.
    pub fn attacked_by(&mut self, category: CombatCategory, period: GamePeriod) {
        if let Some(slot) = CombatCategory::ASSAULT.iter().position(|c| *c == category) {
            self.attacked_by[slot] += 1.0;
            self.attacked_by_period[period.index()][slot] += 1.0;
        }
    }

    /// Decay the strategic counters. Called on the sector-update interval.
    pub fn decay_pass(&mut self, config: &AiConfig) {
        for value in &mut self.attacked_by {
            *value *= config.attacked_by_decay;
        }
        for value in &mut self.max_spotted {
            *value *= config.spotted_decay;
        }
    }

    /// Fold newly spotted enemy counts into the decaying maxima.
    pub fn update_spotted(&mut self, spotted: [u32; ASSAULT_CATEGORIES]) {
        for (slot, count) in self.max_spotted.iter_mut().zip(spotted) {
            if count as f32 > *slot {
                *slot = count as f32;
            }
        }
    }

    /// Recompute the enemy pressure estimate from enemies in and around the
    /// base.
    pub fn update_pressure(&mut self, grid: &SectorGrid) {
        let mut pressure = 0.0;
        for ring in 0..=1 {
            for coord in &self.rings[ring] {
                if let Some(sector) = grid.sector(*coord) {
                    pressure += 0.1 * sector.enemy_units_visible as f32;
                }
            }
        }
        self.enemy_pressure = pressure.min(1.0);
    }

    /// Recompute the total friendly defence power against each category by
    /// summing over all combat-group power vectors and every stationary
    /// defence in the base. A full recompute, not an incremental update, so
    /// the estimate cannot drift.
    pub fn update_defense_capability<I>(
        &mut self,
        group_powers: I,
        grid: &SectorGrid,
        stats: &TypeStatsTable,
    ) where
        I: IntoIterator<Item = [f32; COMBAT_CATEGORIES]>,
    {
        self.defence_power = [0.0; COMBAT_CATEGORIES];
        for power in group_powers {
            for (slot, p) in self.defence_power.iter_mut().zip(power) {
                *slot += p;
            }
        }
        for coord in &self.rings[0] {
            if let Some(sector) = grid.sector(*coord) {
                for defence in &sector.defences {
                    for category in CombatCategory::ALL {
                        self.defence_power[category.index()] +=
                            stats.efficiency_vs(defence.unit_type, category);
                    }
                }
            }
        }
    }

    /// Pick the next sector for an attack already in progress: adjacent
    /// enemy-held sectors are preferred when weakly defended and close to
    /// the current target.
    #[must_use]
    pub fn next_attack_dest(
        &self,
        grid: &SectorGrid,
        current: SectorCoord,
        land: bool,
        water: bool,
        blend: ThreatBlend,
    ) -> Option<SectorCoord> {
        let mut best: Option<(SectorCoord, f32)> = None;
        for sector in grid.iter() {
            if sector.in_base() || sector.enemy_structures == 0 {
                continue;
            }
            let terrain_ok = (land && sector.water_ratio < 0.35)
                || (water && sector.water_ratio > 0.65);
            if !terrain_ok {
                continue;
            }

            let dist = sector.coord.grid_distance(current);
            let defence = sector.enemy_defence_power();
            let losses = sector.lost_units_total(blend);
            let rating =
                1.0 / (1.0 + defence * defence + (losses + 1.0).powf(1.5)) / (1.0 + dist);
            if best.map_or(true, |(_, r)| rating > r) {
                best = Some((sector.coord, rating));
            }
        }
        best.map(|(coord, _)| coord)
    }
}

impl Default for StrategicState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BuildCatalog, UnitTypeData};
    use crate::map::MetalSpot;
    use crate::types::{MovementDomain, UnitCategory, UnitTypeId};

    fn grid(w: u32, h: u32) -> SectorGrid {
        SectorGrid::new(w, h, &AiConfig::default())
    }

    fn stats() -> TypeStatsTable {
        let turret = UnitTypeData::new(
            UnitTypeId(1),
            "turret",
            UnitCategory::StationaryDefence,
            MovementDomain::Static,
            200.0,
            300.0,
        );
        TypeStatsTable::new(BuildCatalog::from_types(vec![turret]), &AiConfig::default())
    }

    fn brain_with_base(grid: &mut SectorGrid) -> StrategicState {
        let mut brain = StrategicState::new();
        brain.add_sector(grid, SectorCoord::new(2, 2));
        brain
    }

    #[test]
    fn rings_follow_distance_field() {
        let mut g = grid(5, 5);
        let brain = brain_with_base(&mut g);
        assert_eq!(brain.ring(0), &[SectorCoord::new(2, 2)]);
        assert_eq!(brain.ring(1).len(), 4);
        assert_eq!(brain.ring(2).len(), 8);
    }

    #[test]
    fn expand_prefers_metal_spots() {
        let mut g = grid(5, 5);
        let mut brain = brain_with_base(&mut g);
        g.sector_mut(SectorCoord::new(3, 2))
            .unwrap()
            .metal_spots
            .push(MetalSpot {
                pos: WorldPos::new(1700.0, 1200.0),
                extractor: None,
            });

        assert!(brain.expand_base(&mut g, SectorTerrain::Land, &AiConfig::default()));
        assert!(g.sector(SectorCoord::new(3, 2)).unwrap().in_base());
    }

    #[test]
    fn expand_skips_unsafe_sectors() {
        let mut g = grid(3, 3);
        let mut brain = StrategicState::new();
        brain.add_sector(&mut g, SectorCoord::new(0, 0));
        // every ring-1 sector is enemy-occupied
        for coord in [SectorCoord::new(1, 0), SectorCoord::new(0, 1)] {
            g.sector_mut(coord).unwrap().enemy_structures = 2;
        }
        let before = brain.ring(0).len();
        assert!(!brain.expand_base(&mut g, SectorTerrain::Land, &AiConfig::default()));
        assert_eq!(brain.ring(0).len(), before);
    }

    #[test]
    fn expansion_waits_for_previous_sector_to_be_used() {
        let mut g = grid(5, 5);
        let mut brain = brain_with_base(&mut g);

        assert!(brain.expand_base(&mut g, SectorTerrain::Land, &AiConfig::default()));
        let size_after_first = brain.ring(0).len();
        // the freshly added sector has no structures yet
        assert!(!brain.expand_base(&mut g, SectorTerrain::Land, &AiConfig::default()));
        assert_eq!(brain.ring(0).len(), size_after_first);

        // building in the new sector unblocks expansion
        let pending = brain.pending_expansion.unwrap();
        g.add_own_structure(pending, UnitCategory::Extractor);
        assert!(brain.expand_base(&mut g, SectorTerrain::Land, &AiConfig::default()));
    }

    #[test]
    fn water_expansion_requires_wet_sectors() {
        let mut g = grid(3, 3);
        let mut brain = StrategicState::new();
        brain.add_sector(&mut g, SectorCoord::new(0, 0));
        // all dry: no water candidate anywhere
        assert!(!brain.expand_base(&mut g, SectorTerrain::Water, &AiConfig::default()));

        g.sector_mut(SectorCoord::new(1, 0)).unwrap().water_ratio = 0.8;
        assert!(brain.expand_base(&mut g, SectorTerrain::Water, &AiConfig::default()));
    }

    #[test]
    fn pressure_reflects_nearby_enemies() {
        let mut g = grid(3, 3);
        let mut brain = brain_with_base_at_origin(&mut g);
        brain.update_pressure(&g);
        assert_eq!(brain.enemy_pressure(), 0.0);

        g.sector_mut(SectorCoord::new(0, 1)).unwrap().enemy_units_visible = 4;
        brain.update_pressure(&g);
        assert!(brain.enemy_pressure() > 0.0);
        assert!(brain.enemy_pressure() <= 1.0);

        g.sector_mut(SectorCoord::new(0, 1)).unwrap().enemy_units_visible = 100;
        brain.update_pressure(&g);
        assert_eq!(brain.enemy_pressure(), 1.0);
    }

    fn brain_with_base_at_origin(g: &mut SectorGrid) -> StrategicState {
        let mut brain = StrategicState::new();
        brain.add_sector(g, SectorCoord::new(0, 0));
        brain
    }

    #[test]
    fn defence_capability_is_rebuilt_not_accumulated() {
        let mut g = grid(3, 3);
        let mut brain = brain_with_base_at_origin(&mut g);
        let stats = stats();

        let power = {
            let mut p = [0.0; COMBAT_CATEGORIES];
            p[CombatCategory::Ground.index()] = 5.0;
            p
        };
        brain.update_defense_capability([power], &g, &stats);
        brain.update_defense_capability([power], &g, &stats);
        // a second recompute with identical inputs must not double the value
        assert!((brain.defence_power_vs(CombatCategory::Ground) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn attacked_by_decays() {
        let mut brain = StrategicState::new();
        brain.attacked_by(CombatCategory::Air, GamePeriod::Opening);
        let before = brain.attacks_by(CombatCategory::Air, 0.0);
        brain.decay_pass(&AiConfig::default());
        assert!(brain.attacks_by(CombatCategory::Air, 0.0) < before);
    }

    #[test]
    fn next_attack_dest_skips_cleared_and_base_sectors() {
        let mut g = grid(3, 3);
        let mut brain = brain_with_base_at_origin(&mut g);
        let blend = ThreatBlend::from_tick(0);
        // nothing enemy-held yet
        assert!(brain
            .next_attack_dest(&g, SectorCoord::new(0, 0), true, false, blend)
            .is_none());

        g.sector_mut(SectorCoord::new(2, 2)).unwrap().enemy_structures = 3;
        let dest = brain.next_attack_dest(&g, SectorCoord::new(2, 1), true, false, blend);
        assert_eq!(dest, Some(SectorCoord::new(2, 2)));
    }
}
