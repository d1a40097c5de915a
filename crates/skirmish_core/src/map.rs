//! Sector grid: the spatial decomposition of the game world.
//!
//! The world is cut into a fixed grid of sectors at map load. Each sector
//! accumulates threat, ownership and structure statistics over the course of
//! the match; sectors are never destroyed. Off-map positions resolve to
//! `None` rather than an error, and callers treat that as "no sector".

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::TypeStatsTable;
use crate::config::AiConfig;
use crate::types::{
    CombatCategory, ContinentId, ThreatBlend, UnitCategory, UnitId, UnitTypeId, WorldPos,
    ASSAULT_CATEGORIES, COMBAT_CATEGORIES,
};

/// Grid coordinates of a sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectorCoord {
    /// Column index.
    pub x: u32,
    /// Row index.
    pub y: u32,
}

impl SectorCoord {
    /// Create a coordinate pair.
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Grid distance (Euclidean, in sector units) to another coordinate.
    #[must_use]
    pub fn grid_distance(&self, other: Self) -> f32 {
        let dx = self.x as f32 - other.x as f32;
        let dy = self.y as f32 - other.y as f32;
        (dx * dx + dy * dy).sqrt()
    }
}

/// A metal extraction spot inside a sector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetalSpot {
    /// World position of the spot.
    pub pos: WorldPos,
    /// Extractor currently sitting on the spot, if any.
    pub extractor: Option<UnitId>,
}

impl MetalSpot {
    /// Whether an extractor occupies this spot.
    #[must_use]
    pub fn occupied(&self) -> bool {
        self.extractor.is_some()
    }
}

/// A counter kept in two time-scales: the running game and the learned
/// (persisted) history.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TwoScale {
    /// Value accumulated this game.
    pub current: f32,
    /// Value carried over from previous games.
    pub learned: f32,
}

impl TwoScale {
    /// Blend the two scales with the given weights.
    #[must_use]
    pub fn blended(&self, blend: ThreatBlend) -> f32 {
        blend.mix(self.learned, self.current)
    }
}

/// Edge of a sector a defence covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Western edge.
    West,
    /// Eastern edge.
    East,
    /// Northern edge.
    North,
    /// Southern edge.
    South,
    /// Middle of the sector.
    Center,
}

/// A stationary defence registered in a sector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SectorDefence {
    /// Live unit id.
    pub unit: UnitId,
    /// Entity type of the defence.
    pub unit_type: UnitTypeId,
    /// Edge the defence sits on, derived from its position.
    pub direction: Direction,
}

/// One cell of the sector grid.
#[derive(Debug, Clone)]
pub struct Sector {
    /// Grid coordinates.
    pub coord: SectorCoord,
    /// World-space bounding rectangle: west edge.
    pub left: f32,
    /// East edge.
    pub right: f32,
    /// North edge.
    pub top: f32,
    /// South edge.
    pub bottom: f32,

    /// Fraction of the sector covered by water (static, from terrain
    /// analysis).
    pub water_ratio: f32,
    /// Fraction of the sector flat enough to build on.
    pub flat_ratio: f32,
    /// Connected-region id of the dominant terrain, if known.
    pub continent: Option<ContinentId>,

    /// Hops to the nearest base sector; 0 = in base, -1 = unknown (no base).
    pub distance_to_base: i32,
    /// Whether every neighbour is also a base sector.
    pub interior: bool,

    /// Attacks on own structures here, by attacker category.
    pub attacked_by: [TwoScale; ASSAULT_CATEGORIES],
    /// Own units lost here, by attacker category.
    pub lost_units: [TwoScale; ASSAULT_CATEGORIES],
    /// Constructors lost here this game; feeds the safe-sector check.
    pub lost_constructors: f32,

    /// Own mobile combat power vs each category, rebuilt wholesale.
    pub own_mobile_power: [f32; COMBAT_CATEGORIES],
    /// Enemy mobile combat power vs each category, rebuilt wholesale on
    /// sensor refresh.
    pub enemy_mobile_power: [f32; COMBAT_CATEGORIES],
    /// Enemy stationary defence power vs each category.
    pub enemy_static_power: [f32; COMBAT_CATEGORIES],
    /// Enemy mobile units seen during the latest sensor refresh.
    pub enemy_units_visible: u32,

    /// Own structures by category.
    pub own_structures: BTreeMap<UnitCategory, u32>,
    /// Enemy structures currently known in this sector.
    pub enemy_structures: u32,
    /// Allied (non-own, friendly) structures; blocks base expansion.
    pub allied_structures: u32,
    /// Own stationary defences present.
    pub defences: Vec<SectorDefence>,
    /// Metal spots inside this sector.
    pub metal_spots: Vec<MetalSpot>,

    /// Round-robin cursor for buildsite placement inside the sector.
    buildsite_cursor: u32,
}

impl Sector {
    fn new(coord: SectorCoord, sector_size: f32) -> Self {
        Self {
            coord,
            left: coord.x as f32 * sector_size,
            right: (coord.x + 1) as f32 * sector_size,
            top: coord.y as f32 * sector_size,
            bottom: (coord.y + 1) as f32 * sector_size,
            water_ratio: 0.0,
            flat_ratio: 1.0,
            continent: None,
            distance_to_base: -1,
            interior: false,
            attacked_by: [TwoScale::default(); ASSAULT_CATEGORIES],
            lost_units: [TwoScale::default(); ASSAULT_CATEGORIES],
            lost_constructors: 0.0,
            own_mobile_power: [0.0; COMBAT_CATEGORIES],
            enemy_mobile_power: [0.0; COMBAT_CATEGORIES],
            enemy_static_power: [0.0; COMBAT_CATEGORIES],
            enemy_units_visible: 0,
            own_structures: BTreeMap::new(),
            enemy_structures: 0,
            allied_structures: 0,
            defences: Vec::new(),
            metal_spots: Vec::new(),
            buildsite_cursor: 0,
        }
    }

    /// Whether this sector belongs to the base.
    #[must_use]
    pub fn in_base(&self) -> bool {
        self.distance_to_base == 0
    }

    /// Center of the sector in world units.
    #[must_use]
    pub fn center(&self) -> WorldPos {
        WorldPos::new((self.left + self.right) / 2.0, (self.top + self.bottom) / 2.0)
    }

    /// Number of metal spots.
    #[must_use]
    pub fn metal_spot_count(&self) -> usize {
        self.metal_spots.len()
    }

    /// Whether any metal spot is unoccupied.
    #[must_use]
    pub fn has_free_metal_spot(&self) -> bool {
        self.metal_spots.iter().any(|s| !s.occupied())
    }

    /// Nearest unoccupied metal spot to `pos`.
    #[must_use]
    pub fn free_metal_spot_near(&self, pos: WorldPos) -> Option<WorldPos> {
        self.metal_spots
            .iter()
            .filter(|s| !s.occupied())
            .min_by(|a, b| {
                a.pos
                    .distance(pos)
                    .partial_cmp(&b.pos.distance(pos))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|s| s.pos)
    }

    /// Threat posed to this sector by one attacker category, blending the
    /// two time-scales.
    #[must_use]
    pub fn threat_by(&self, attacker: CombatCategory, blend: ThreatBlend) -> f32 {
        let Some(slot) = assault_index(attacker) else {
            return 0.0;
        };
        1.0 + 2.0 * self.attacked_by[slot].blended(blend)
    }

    /// Units lost in this sector weighted by attacker categories.
    #[must_use]
    pub fn lost_units_total(&self, blend: ThreatBlend) -> f32 {
        self.lost_units.iter().map(|l| l.blended(blend)).sum()
    }

    /// Own stationary defence power against one category. The baseline of 1
    /// keeps later threat/defence ratios finite.
    #[must_use]
    pub fn defence_power_vs(&self, category: CombatCategory, stats: &TypeStatsTable) -> f32 {
        let mut power = 1.0;
        for def in &self.defences {
            power += stats.efficiency_vs(def.unit_type, category);
        }
        power
    }

    /// Enemy defence power against an attack, summed over the categories an
    /// attacking force would expose itself to.
    #[must_use]
    pub fn enemy_defence_power(&self) -> f32 {
        self.enemy_static_power.iter().sum::<f32>()
            + self.enemy_mobile_power.iter().sum::<f32>()
    }

    /// Distance factor penalizing sectors at the map border (fewer directions
    /// an attack can come from, but also fewer escape routes).
    #[must_use]
    pub fn map_border_factor(&self, x_sectors: u32, y_sectors: u32) -> f32 {
        let mut result = 2.0;
        if self.coord.x == 0 || self.coord.x == x_sectors - 1 {
            result -= 0.5;
        }
        if self.coord.y == 0 || self.coord.y == y_sectors - 1 {
            result -= 0.5;
        }
        result
    }

    /// Total own structures of all categories.
    #[must_use]
    pub fn own_structure_count(&self) -> u32 {
        self.own_structures.values().sum()
    }
}

fn assault_index(category: CombatCategory) -> Option<usize> {
    CombatCategory::ASSAULT
        .iter()
        .position(|c| *c == category)
}

/// Terrain preference when picking sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorTerrain {
    /// Mostly dry land.
    Land,
    /// Mostly water.
    Water,
    /// Mixed coastline.
    Mixed,
}

/// The sector grid.
#[derive(Debug)]
pub struct SectorGrid {
    sectors: Vec<Sector>,
    x_sectors: u32,
    y_sectors: u32,
    sector_size: f32,
    /// Base sectors in insertion order.
    base: Vec<SectorCoord>,
    /// Base sectors that are mostly land / mostly water.
    land_base_sectors: u32,
    water_base_sectors: u32,
}

impl SectorGrid {
    /// Create a grid of `x_sectors × y_sectors` cells of the configured
    /// edge length. All sectors start unknown (`distance_to_base == -1`).
    #[must_use]
    pub fn new(x_sectors: u32, y_sectors: u32, config: &AiConfig) -> Self {
        let mut sectors = Vec::with_capacity((x_sectors * y_sectors) as usize);
        for y in 0..y_sectors {
            for x in 0..x_sectors {
                sectors.push(Sector::new(SectorCoord::new(x, y), config.sector_size));
            }
        }
        Self {
            sectors,
            x_sectors,
            y_sectors,
            sector_size: config.sector_size,
            base: Vec::new(),
            land_base_sectors: 0,
            water_base_sectors: 0,
        }
    }

    /// Grid width in sectors.
    #[must_use]
    pub fn x_sectors(&self) -> u32 {
        self.x_sectors
    }

    /// Grid height in sectors.
    #[must_use]
    pub fn y_sectors(&self) -> u32 {
        self.y_sectors
    }

    /// Sectors currently in the base, in insertion order.
    #[must_use]
    pub fn base_sectors(&self) -> &[SectorCoord] {
        &self.base
    }

    /// Mostly-land / mostly-water split of the base.
    #[must_use]
    pub fn base_terrain_counts(&self) -> (u32, u32) {
        (self.land_base_sectors, self.water_base_sectors)
    }

    fn index(&self, coord: SectorCoord) -> Option<usize> {
        if coord.x < self.x_sectors && coord.y < self.y_sectors {
            Some((coord.y * self.x_sectors + coord.x) as usize)
        } else {
            None
        }
    }

    /// Sector at grid coordinates; `None` when out of bounds.
    #[must_use]
    pub fn sector(&self, coord: SectorCoord) -> Option<&Sector> {
        self.index(coord).map(|i| &self.sectors[i])
    }

    /// Mutable sector access; `None` when out of bounds.
    pub fn sector_mut(&mut self, coord: SectorCoord) -> Option<&mut Sector> {
        self.index(coord).map(move |i| &mut self.sectors[i])
    }

    /// Map a world position to its sector. Off-map positions (including the
    /// landing points of stray projectiles) yield `None`.
    #[must_use]
    pub fn sector_at(&self, pos: WorldPos) -> Option<SectorCoord> {
        if pos.x < 0.0 || pos.z < 0.0 {
            return None;
        }
        let x = (pos.x / self.sector_size) as u32;
        let y = (pos.z / self.sector_size) as u32;
        let coord = SectorCoord::new(x, y);
        self.index(coord).map(|_| coord)
    }

    /// Iterate over all sectors in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = &Sector> {
        self.sectors.iter()
    }

    /// Iterate mutably over all sectors in row-major order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Sector> {
        self.sectors.iter_mut()
    }

    /// The four grid neighbours of a coordinate that exist.
    #[must_use]
    pub fn neighbours(&self, coord: SectorCoord) -> Vec<SectorCoord> {
        let mut result = Vec::with_capacity(4);
        if coord.x > 0 {
            result.push(SectorCoord::new(coord.x - 1, coord.y));
        }
        if coord.x + 1 < self.x_sectors {
            result.push(SectorCoord::new(coord.x + 1, coord.y));
        }
        if coord.y > 0 {
            result.push(SectorCoord::new(coord.x, coord.y - 1));
        }
        if coord.y + 1 < self.y_sectors {
            result.push(SectorCoord::new(coord.x, coord.y + 1));
        }
        result
    }

    /// Add a sector to the base. Returns false when the coordinate is out of
    /// bounds or already a base sector. Triggers the full distance-field
    /// recomputation; acceptable at the low call frequency of base changes.
    pub fn add_to_base(&mut self, coord: SectorCoord) -> bool {
        let Some(index) = self.index(coord) else {
            return false;
        };
        if self.sectors[index].in_base() {
            return false;
        }
        if self.sectors[index].water_ratio > 0.5 {
            self.water_base_sectors += 1;
        } else {
            self.land_base_sectors += 1;
        }
        self.base.push(coord);
        self.recompute_distances();
        true
    }

    /// Remove a sector from the base. Returns false when it was not a base
    /// sector.
    pub fn remove_from_base(&mut self, coord: SectorCoord) -> bool {
        let Some(position) = self.base.iter().position(|c| *c == coord) else {
            return false;
        };
        self.base.remove(position);
        if let Some(sector) = self.sector(coord) {
            if sector.water_ratio > 0.5 {
                self.water_base_sectors = self.water_base_sectors.saturating_sub(1);
            } else {
                self.land_base_sectors = self.land_base_sectors.saturating_sub(1);
            }
        }
        self.recompute_distances();
        true
    }

    /// Breadth-first relaxation of `distance_to_base` over the whole grid.
    /// O(#sectors); called only when the base set changes.
    fn recompute_distances(&mut self) {
        for sector in &mut self.sectors {
            sector.distance_to_base = -1;
            sector.interior = false;
        }

        let mut frontier: Vec<SectorCoord> = self.base.clone();
        for coord in &frontier {
            if let Some(i) = self.index(*coord) {
                self.sectors[i].distance_to_base = 0;
            }
        }

        let mut distance = 0;
        while !frontier.is_empty() {
            distance += 1;
            let mut next = Vec::new();
            for coord in frontier {
                for neighbour in self.neighbours(coord) {
                    let Some(i) = self.index(neighbour) else {
                        continue;
                    };
                    if self.sectors[i].distance_to_base == -1 {
                        self.sectors[i].distance_to_base = distance;
                        next.push(neighbour);
                    }
                }
            }
            frontier = next;
        }

        // a base sector is interior when no neighbour is outside the base
        for i in 0..self.sectors.len() {
            let coord = self.sectors[i].coord;
            if self.sectors[i].in_base() {
                let interior = self
                    .neighbours(coord)
                    .iter()
                    .all(|n| self.sector(*n).is_some_and(Sector::in_base));
                self.sectors[i].interior = interior;
            }
        }
    }

    /// Record a kill event in the sector containing `pos`. Structure losses
    /// raise the attacked-by counter (reduced weight for interior sectors);
    /// mobile losses raise the lost-units counter for the attacker category.
    pub fn update_threat(
        &mut self,
        pos: WorldPos,
        victim_category: UnitCategory,
        attacker_category: CombatCategory,
    ) {
        let Some(coord) = self.sector_at(pos) else {
            return;
        };
        let Some(slot) = assault_index(attacker_category) else {
            return;
        };
        let Some(sector) = self.sector_mut(coord) else {
            return;
        };

        if victim_category.is_structure() {
            let change = if sector.interior { 0.3 } else { 1.0 };
            sector.attacked_by[slot].current += change;
        } else {
            sector.lost_units[slot].current += 1.0;
            if victim_category.is_constructor() {
                sector.lost_constructors += 1.0;
            }
        }
    }

    /// Per-pass decay so old events are gradually forgotten.
    pub fn decay_pass(&mut self, config: &AiConfig) {
        for sector in &mut self.sectors {
            for slot in &mut sector.lost_units {
                slot.current *= config.lost_units_decay;
            }
            for slot in &mut sector.attacked_by {
                slot.current *= config.attacked_by_decay;
            }
            sector.lost_constructors *= config.lost_units_decay;
        }
    }

    /// The combat category this sector is least able to defend against, by
    /// the ratio of blended threat to present defence power. Interior
    /// sectors only ever need anti-air. Returns `None` for out-of-bounds
    /// coordinates or sectors already saturated with defences.
    #[must_use]
    pub fn weakest_category(
        &self,
        coord: SectorCoord,
        stats: &TypeStatsTable,
        blend: ThreatBlend,
        config: &AiConfig,
    ) -> Option<CombatCategory> {
        let sector = self.sector(coord)?;
        if sector.defences.len() >= config.max_defences_per_sector {
            return None;
        }
        if sector.interior {
            return Some(CombatCategory::Air);
        }

        let mut weakest = None;
        let mut most_important = 0.0_f32;
        for category in CombatCategory::ASSAULT {
            let importance =
                sector.threat_by(category, blend) / sector.defence_power_vs(category, stats);
            if importance > most_important {
                most_important = importance;
                weakest = Some(category);
            }
        }
        weakest
    }

    /// Begin a sensor refresh of one sector: the enemy accumulators are
    /// cleared and rebuilt from scratch by the subsequent
    /// [`add_enemy_unit`](Self::add_enemy_unit)/
    /// [`add_enemy_structure`](Self::add_enemy_structure) calls, never
    /// incrementally drifted.
    pub fn begin_sensor_refresh(&mut self, coord: SectorCoord) {
        if let Some(sector) = self.sector_mut(coord) {
            sector.enemy_mobile_power = [0.0; COMBAT_CATEGORIES];
            sector.enemy_static_power = [0.0; COMBAT_CATEGORIES];
            sector.enemy_units_visible = 0;
            sector.enemy_structures = 0;
        }
    }

    /// Account one sighted enemy mobile unit into the refresh.
    pub fn add_enemy_unit(
        &mut self,
        coord: SectorCoord,
        unit_type: UnitTypeId,
        stats: &TypeStatsTable,
    ) {
        let mut power = [0.0_f32; COMBAT_CATEGORIES];
        for category in CombatCategory::ALL {
            power[category.index()] = stats.efficiency_vs(unit_type, category);
        }
        if let Some(sector) = self.sector_mut(coord) {
            sector.enemy_units_visible += 1;
            for (slot, p) in sector.enemy_mobile_power.iter_mut().zip(power) {
                *slot += p;
            }
        }
    }

    /// Account one sighted enemy structure into the refresh.
    pub fn add_enemy_structure(
        &mut self,
        coord: SectorCoord,
        unit_type: UnitTypeId,
        is_defence: bool,
        stats: &TypeStatsTable,
    ) {
        let power: Vec<f32> = CombatCategory::ALL
            .iter()
            .map(|c| stats.efficiency_vs(unit_type, *c))
            .collect();
        if let Some(sector) = self.sector_mut(coord) {
            sector.enemy_structures += 1;
            if is_defence {
                for (slot, p) in sector.enemy_static_power.iter_mut().zip(power) {
                    *slot += p;
                }
            }
        }
    }

    /// A free buildsite inside the sector for a structure, or `None` when
    /// the sector has no buildable ground of the required kind. Edge strips
    /// toward neighbouring base sectors are reserved for defences, matching
    /// the placement discipline of the defence buildsite search.
    pub fn buildsite_in(&mut self, coord: SectorCoord, water: bool) -> Option<WorldPos> {
        let mut reserved = [false; 4]; // west, east, north, south
        for (neighbour, direction) in self.neighbour_directions(coord) {
            let frontier = self.sector(neighbour).is_some_and(|s| s.distance_to_base > 0);
            match direction {
                Direction::West => reserved[0] = frontier,
                Direction::East => reserved[1] = frontier,
                Direction::North => reserved[2] = frontier,
                Direction::South => reserved[3] = frontier,
                Direction::Center => {}
            }
        }
        let sector = self.sector_mut(coord)?;
        if water && sector.water_ratio < 0.05 {
            return None;
        }
        if !water && sector.flat_ratio < 0.05 {
            return None;
        }

        // reserve the edge strips toward frontier sectors for defences
        let margin = (sector.right - sector.left) / 8.0;
        let mut left = sector.left + margin / 2.0;
        let mut right = sector.right - margin / 2.0;
        let mut top = sector.top + margin / 2.0;
        let mut bottom = sector.bottom - margin / 2.0;
        if reserved[0] {
            left += margin;
        }
        if reserved[1] {
            right -= margin;
        }
        if reserved[2] {
            top += margin;
        }
        if reserved[3] {
            bottom -= margin;
        }

        // walk a deterministic 4x4 lattice inside the usable rectangle
        let slot = sector.buildsite_cursor % 16;
        sector.buildsite_cursor = sector.buildsite_cursor.wrapping_add(1);
        let fx = (slot % 4) as f32 / 4.0;
        let fz = (slot / 4) as f32 / 4.0;
        Some(WorldPos::new(
            left + (right - left) * (0.125 + 0.75 * fx),
            top + (bottom - top) * (0.125 + 0.75 * fz),
        ))
    }

    /// A defence buildsite on the weakest covered edge of the sector:
    /// frontier edges toward non-base neighbours are candidates, the one
    /// with the least accumulated defence power against `vs_category` wins.
    /// Anti-air goes to the center instead.
    #[must_use]
    pub fn defence_buildsite(
        &self,
        coord: SectorCoord,
        vs_category: CombatCategory,
        stats: &TypeStatsTable,
    ) -> Option<WorldPos> {
        let sector = self.sector(coord)?;
        if vs_category == CombatCategory::Air {
            return Some(sector.center());
        }

        // frontier directions: neighbours outside the base
        let mut directions = Vec::with_capacity(4);
        for (neighbour, direction) in self.neighbour_directions(coord) {
            if self.sector(neighbour).is_some_and(|s| s.distance_to_base > 0) {
                directions.push(direction);
            }
        }
        if directions.is_empty() {
            return Some(sector.center());
        }

        let mut weakest = directions[0];
        let mut weakest_power = f32::MAX;
        for direction in directions {
            let power: f32 = sector
                .defences
                .iter()
                .filter(|d| d.direction == direction)
                .map(|d| stats.efficiency_vs(d.unit_type, vs_category))
                .sum();
            if power == 0.0 {
                // an uncovered frontier always wins
                weakest = direction;
                break;
            }
            if power < weakest_power {
                weakest_power = power;
                weakest = direction;
            }
        }

        Some(edge_midpoint(sector, weakest))
    }

    /// The existing neighbours of a coordinate together with the edge they
    /// sit behind.
    fn neighbour_directions(&self, coord: SectorCoord) -> Vec<(SectorCoord, Direction)> {
        let mut result = Vec::with_capacity(4);
        if coord.x > 0 {
            result.push((SectorCoord::new(coord.x - 1, coord.y), Direction::West));
        }
        if coord.x + 1 < self.x_sectors {
            result.push((SectorCoord::new(coord.x + 1, coord.y), Direction::East));
        }
        if coord.y > 0 {
            result.push((SectorCoord::new(coord.x, coord.y - 1), Direction::North));
        }
        if coord.y + 1 < self.y_sectors {
            result.push((SectorCoord::new(coord.x, coord.y + 1), Direction::South));
        }
        result
    }

    /// Register an own structure finishing in a sector.
    pub fn add_own_structure(&mut self, coord: SectorCoord, category: UnitCategory) {
        if let Some(sector) = self.sector_mut(coord) {
            *sector.own_structures.entry(category).or_insert(0) += 1;
        }
    }

    /// Remove an own structure from a sector's bookkeeping.
    pub fn remove_own_structure(&mut self, coord: SectorCoord, category: UnitCategory) {
        if let Some(sector) = self.sector_mut(coord) {
            if let Some(count) = sector.own_structures.get_mut(&category) {
                *count = count.saturating_sub(1);
            }
        }
    }

    /// Register a stationary defence. The covered edge is derived from the
    /// position within the sector (outer sixth-strips map to an edge,
    /// anything else counts as center).
    pub fn add_defence(&mut self, coord: SectorCoord, unit: UnitId, unit_type: UnitTypeId, pos: WorldPos) {
        if let Some(sector) = self.sector_mut(coord) {
            let strip = (sector.right - sector.left) / 6.0;
            let direction = if pos.x <= sector.left + strip {
                Direction::West
            } else if pos.x >= sector.right - strip {
                Direction::East
            } else if pos.z <= sector.top + strip {
                Direction::North
            } else if pos.z >= sector.bottom - strip {
                Direction::South
            } else {
                Direction::Center
            };
            sector.defences.push(SectorDefence {
                unit,
                unit_type,
                direction,
            });
        }
    }

    /// Remove a stationary defence by unit id.
    pub fn remove_defence(&mut self, coord: SectorCoord, unit: UnitId) {
        if let Some(sector) = self.sector_mut(coord) {
            sector.defences.retain(|d| d.unit != unit);
        }
    }

    /// Mark the metal spot nearest to `pos` as occupied by `unit`.
    pub fn occupy_metal_spot(&mut self, pos: WorldPos, unit: UnitId) {
        let Some(coord) = self.sector_at(pos) else {
            return;
        };
        if let Some(sector) = self.sector_mut(coord) {
            let nearest = sector
                .metal_spots
                .iter_mut()
                .filter(|s| !s.occupied())
                .min_by(|a, b| {
                    a.pos
                        .distance(pos)
                        .partial_cmp(&b.pos.distance(pos))
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            if let Some(spot) = nearest {
                spot.extractor = Some(unit);
            }
        }
    }

    /// Release the metal spot held by `unit`, if any.
    pub fn release_metal_spot(&mut self, unit: UnitId) {
        for sector in &mut self.sectors {
            for spot in &mut sector.metal_spots {
                if spot.extractor == Some(unit) {
                    spot.extractor = None;
                    return;
                }
            }
        }
    }
}

fn edge_midpoint(sector: &Sector, direction: Direction) -> WorldPos {
    let center = sector.center();
    let inset = (sector.right - sector.left) / 12.0;
    match direction {
        Direction::West => WorldPos::new(sector.left + inset, center.z),
        Direction::East => WorldPos::new(sector.right - inset, center.z),
        Direction::North => WorldPos::new(center.x, sector.top + inset),
        Direction::South => WorldPos::new(center.x, sector.bottom - inset),
        Direction::Center => center,
    }
}
