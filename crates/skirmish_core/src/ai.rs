//! The AI facade.
//!
//! [`SkirmishAi`] owns every subsystem and implements the notification
//! surface the host engine's event-dispatch shim calls into. Execution is
//! single-threaded and tick-driven: each handler runs to completion, and the
//! heavier passes are gated to distinct, mutually offset prime intervals to
//! bound per-tick cost. Orders flow out through the [`CommandSink`] the
//! facade was constructed with.

use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::attack::AttackCoordinator;
use crate::brain::StrategicState;
use crate::catalog::{BuildCatalog, TypeStatsTable};
use crate::commands::{self, AiCommand, CommandSink};
use crate::config::AiConfig;
use crate::economy::ResourceSnapshot;
use crate::error::Result;
use crate::group::GroupSet;
use crate::learning::{LearningFile, MapCache};
use crate::map::{SectorGrid, SectorTerrain};
use crate::scheduler::{SchedulerContext, UrgencyScheduler};
use crate::types::{
    CombatCategory, GamePeriod, ThreatBlend, UnitCategory, UnitId, UnitTypeId, WorldPos,
    ASSAULT_CATEGORIES,
};
use crate::units::{ConstructorDuty, UnitRegistry};

/// Resource sampling interval in ticks.
const RESOURCE_INTERVAL: u64 = 45;
/// Urgency refresh + construction dispatch interval.
const CONSTRUCTION_INTERVAL: u64 = 97;
/// Group upkeep interval.
const GROUP_INTERVAL: u64 = 169;
/// Sector/strategic decay and sensor refresh interval.
const SECTOR_INTERVAL: u64 = 423;
/// Combat-unit production interval.
const PRODUCTION_INTERVAL: u64 = 649;
/// Attack coordination interval.
const ATTACK_INTERVAL: u64 = 911;
/// Defence capability recompute interval.
const DEFENCE_INTERVAL: u64 = 917;
/// Base expansion consideration interval.
const EXPANSION_INTERVAL: u64 = 1_573;
/// Rally point refresh interval.
const RALLY_INTERVAL: u64 = 1_877;
/// Efficiency average recompute interval.
const EFFICIENCY_INTERVAL: u64 = 2_927;

/// An enemy unit currently inside sensor range.
#[derive(Debug, Clone, Copy)]
pub struct EnemySighting {
    /// Entity type, resolved by the shim.
    pub unit_type: UnitTypeId,
    /// Last known position.
    pub pos: WorldPos,
    /// Whether the unit moves.
    pub mobile: bool,
    /// Whether the unit is a stationary defence.
    pub is_defence: bool,
}

/// The decision core behind one AI player.
pub struct SkirmishAi {
    config: AiConfig,
    catalog: Rc<BuildCatalog>,
    stats: TypeStatsTable,
    grid: SectorGrid,
    brain: StrategicState,
    registry: UnitRegistry,
    scheduler: UrgencyScheduler,
    groups: GroupSet,
    attacks: AttackCoordinator,
    sink: Box<dyn CommandSink>,
    rng: SmallRng,
    tick: u64,
    /// Enemies inside sensor range, keyed by unit id.
    enemies: BTreeMap<UnitId, EnemySighting>,
    /// Learned per-period attack frequencies from the learning file.
    learned_attacks: [[f32; ASSAULT_CATEGORIES]; 4],
}

impl SkirmishAi {
    /// Create an AI instance over a prepared catalog and grid size.
    #[must_use]
    pub fn new(
        catalog: Rc<BuildCatalog>,
        config: AiConfig,
        sink: Box<dyn CommandSink>,
        x_sectors: u32,
        y_sectors: u32,
        seed: u64,
    ) -> Self {
        let stats = TypeStatsTable::new(Rc::clone(&catalog), &config);
        let grid = SectorGrid::new(x_sectors, y_sectors, &config);
        let scheduler = UrgencyScheduler::new(&config, seed);
        Self {
            catalog,
            stats,
            grid,
            brain: StrategicState::new(),
            registry: UnitRegistry::new(),
            scheduler,
            groups: GroupSet::new(),
            attacks: AttackCoordinator::new(),
            sink,
            rng: SmallRng::seed_from_u64(seed.wrapping_add(1)),
            tick: 0,
            enemies: BTreeMap::new(),
            learned_attacks: [[0.0; ASSAULT_CATEGORIES]; 4],
            config,
        }
    }

    /// Create an AI instance with a configuration file. A load failure is
    /// fatal for initialization; the caller reports it to the host session
    /// and stops the AI without terminating the host process.
    pub fn new_with_config_file<P: AsRef<Path>>(
        catalog: Rc<BuildCatalog>,
        config_path: P,
        sink: Box<dyn CommandSink>,
        x_sectors: u32,
        y_sectors: u32,
        seed: u64,
    ) -> Result<Self> {
        let config = AiConfig::load(config_path)?;
        Ok(Self::new(catalog, config, sink, x_sectors, y_sectors, seed))
    }

    /// Claim the starting sector. Off-map starting positions are ignored
    /// (the base stays empty until a valid position arrives).
    pub fn init(&mut self, start_position: WorldPos) {
        let Some(coord) = self.grid.sector_at(start_position) else {
            tracing::warn!(?start_position, "starting position resolves to no sector");
            return;
        };
        self.brain.add_sector(&mut self.grid, coord);
        tracing::info!(x = coord.x, y = coord.y, "starting sector claimed");
    }

    /// Load the per-map cache. Version mismatches and missing files discard
    /// silently (one diagnostic line); the terrain analyzer regenerates.
    pub fn load_map_cache<P: AsRef<Path>>(&mut self, path: P) {
        match MapCache::load(&path) {
            Ok(cache) => cache.apply(&mut self.grid),
            Err(err) => tracing::warn!(%err, "map cache discarded, regenerating"),
        }
    }

    /// Seed the grid with freshly computed terrain analysis results (the
    /// in-memory path the external analyzer uses when no cache existed).
    pub fn apply_terrain(&mut self, cache: &MapCache) {
        cache.apply(&mut self.grid);
    }

    /// Load the per-map+mod learning file, seeding sector history, learned
    /// efficiency and per-period attack frequencies.
    pub fn load_learning<P: AsRef<Path>>(&mut self, path: P) {
        match LearningFile::load(&path) {
            Ok(file) => {
                self.learned_attacks = file.attack_frequency;
                file.apply(&mut self.grid, &mut self.stats);
            }
            Err(err) => tracing::warn!(%err, "learning file discarded, starting fresh"),
        }
    }

    /// Persist the learning file at shutdown, blending this game's counters
    /// into the learned history.
    ///
    /// # Errors
    ///
    /// Propagates save failures so the host can log them.
    pub fn save_learning<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        LearningFile::capture(&self.grid, &self.stats, &self.brain, &self.config).save(path)
    }

    /// Persist the map cache (written by whichever instance analyzed the
    /// terrain first).
    ///
    /// # Errors
    ///
    /// Propagates save failures so the host can log them.
    pub fn save_map_cache<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        MapCache::capture(&self.grid).save(path)
    }

    /// A new own unit entered construction.
    pub fn unit_created(
        &mut self,
        unit: UnitId,
        unit_type: UnitTypeId,
        pos: WorldPos,
        builder: Option<UnitId>,
    ) {
        let category = self.catalog.category_of(unit_type);
        if category == UnitCategory::Unknown {
            tracing::debug!(unit = unit.0, "created unit of unknown type, ignoring");
            return;
        }
        self.registry.on_created(unit, unit_type, category, pos, builder);
        if let Ok(stats) = self.stats.get_mut(unit_type) {
            stats.requested = stats.requested.saturating_sub(1);
            stats.under_construction += 1;
        }
        if category == UnitCategory::Extractor {
            self.grid.occupy_metal_spot(pos, unit);
        }
    }

    /// An own unit finished construction.
    pub fn unit_finished(&mut self, unit: UnitId) {
        self.registry.on_finished(unit);
        let Some(record) = self.registry.get(unit) else {
            return;
        };
        let unit_type = record.unit_type;
        let category = record.category;
        let pos = record.pos;

        if let Ok(stats) = self.stats.get_mut(unit_type) {
            stats.under_construction = stats.under_construction.saturating_sub(1);
            stats.active += 1;
        }
        self.scheduler.construction_finished(&self.catalog, unit_type);

        let Ok(def) = self.catalog.get(unit_type) else {
            return;
        };
        // every type this unit can construct became buildable
        for target in def.can_build.clone() {
            if let Ok(stats) = self.stats.get_mut(target) {
                stats.constructors_available += 1;
                stats.constructors_requested = stats.constructors_requested.saturating_sub(1);
            }
        }

        if category.is_structure() {
            if let Some(coord) = self.grid.sector_at(pos) {
                self.grid.add_own_structure(coord, category);
                if category == UnitCategory::StationaryDefence {
                    self.grid.add_defence(coord, unit, unit_type, pos);
                }
            }
            return;
        }

        if category.is_combat() {
            self.assign_to_group(unit, unit_type);
        }
    }

    fn assign_to_group(&mut self, unit: UnitId, unit_type: UnitTypeId) {
        let Ok(def) = self.catalog.get(unit_type) else {
            return;
        };
        let Some(record) = self.registry.get(unit) else {
            return;
        };
        let continent = if def.movement.continent_bound() {
            self.grid
                .sector_at(record.pos)
                .and_then(|c| self.grid.sector(c))
                .and_then(|s| s.continent)
        } else {
            None
        };

        let group_id = self.groups.find_or_create(
            def,
            &self.catalog,
            &self.stats,
            continent,
            &self.config,
        );
        if let Some(group) = self.groups.get_mut(group_id) {
            if group.rally_point.is_none() {
                group.rally_point = rally_point_for(&self.grid, &self.brain);
            }
            group.add_unit(unit, unit_type, &mut *self.sink);
        }
        if let Some(record) = self.registry.get_mut(unit) {
            record.group = Some(group_id);
        }
    }

    /// An own unit was destroyed. The attacker's type is resolved by the
    /// shim when known (it may be a foreign catalog entry).
    pub fn unit_destroyed(&mut self, unit: UnitId, attacker_type: Option<UnitTypeId>) {
        let Some(record) = self.registry.on_destroyed(unit) else {
            return;
        };

        if let Ok(stats) = self.stats.get_mut(record.unit_type) {
            if record.finished {
                stats.active = stats.active.saturating_sub(1);
            } else {
                stats.under_construction = stats.under_construction.saturating_sub(1);
            }
        }
        if let Ok(def) = self.catalog.get(record.unit_type) {
            for target in def.can_build.clone() {
                if let Ok(stats) = self.stats.get_mut(target) {
                    stats.constructors_available = stats.constructors_available.saturating_sub(1);
                }
            }
        }

        if record.category.is_structure() {
            if let Some(coord) = self.grid.sector_at(record.pos) {
                self.grid.remove_own_structure(coord, record.category);
                if record.category == UnitCategory::StationaryDefence {
                    self.grid.remove_defence(coord, unit);
                }
            }
            if record.category == UnitCategory::Extractor {
                self.grid.release_metal_spot(unit);
            }
        }

        if let Some(group_id) = record.group {
            let outcome = self.groups.remove_unit(group_id, unit);
            if let Some(attack) = outcome.detached_from {
                self.attacks.detach_group(attack, group_id);
            }
        }

        // threat statistics and efficiency learning
        let attacker_category = attacker_type
            .map(|t| self.catalog.category_of(t))
            .and_then(UnitCategory::combat_category);
        if let Some(attacker_cat) = attacker_category {
            self.grid
                .update_threat(record.pos, record.category, attacker_cat);
            let near_base = self
                .grid
                .sector_at(record.pos)
                .and_then(|c| self.grid.sector(c))
                .map_or(false, |s| (0..=1).contains(&s.distance_to_base));
            if near_base {
                self.brain
                    .attacked_by(attacker_cat, GamePeriod::from_tick(self.tick));
            }

            match attacker_type {
                Some(t) if self.catalog.get(t).is_ok() => {
                    self.stats.record_combat_result(t, record.unit_type);
                }
                _ => self.stats.record_defeat(record.unit_type, attacker_cat),
            }
        }
    }

    /// An own unit took damage. Structures in the base trigger a defensive
    /// response from the nearest idle group.
    pub fn unit_damaged(&mut self, unit: UnitId, attacker_pos: Option<WorldPos>) {
        let Some(record) = self.registry.get(unit) else {
            return;
        };
        if !record.category.is_structure() {
            return;
        }
        let in_base = self
            .grid
            .sector_at(record.pos)
            .and_then(|c| self.grid.sector(c))
            .map_or(false, |s| s.in_base());
        if !in_base {
            return;
        }
        let Some(enemy_pos) = attacker_pos else {
            return;
        };

        let defender = self
            .groups
            .iter()
            .find(|g| g.attack.is_none() && g.task == crate::group::GroupTask::Idle && g.size() > 0)
            .map(|g| g.id);
        if let Some(group_id) = defender {
            if let Some(group) = self.groups.get_mut(group_id) {
                group.defend(enemy_pos, &self.grid, 100.0, &mut *self.sink);
            }
        }
    }

    /// An enemy unit entered sensor range.
    pub fn enemy_entered_sensor_range(&mut self, enemy: UnitId, sighting: EnemySighting) {
        self.enemies.insert(enemy, sighting);
    }

    /// An enemy unit left sensor range (or died).
    pub fn enemy_left_sensor_range(&mut self, enemy: UnitId) {
        self.enemies.remove(&enemy);
    }

    /// An own unit went idle.
    pub fn unit_idle(&mut self, unit: UnitId) {
        let Some(record) = self.registry.get(unit) else {
            return;
        };
        let category = record.category;
        let group = record.group;

        match category {
            UnitCategory::StationaryConstructor => {
                let mut ctx = SchedulerContext {
                    catalog: &self.catalog,
                    stats: &mut self.stats,
                    grid: &mut self.grid,
                    brain: &mut self.brain,
                    registry: &mut self.registry,
                    config: &self.config,
                    tick: self.tick,
                    sink: &mut *self.sink,
                };
                self.scheduler.factory_idle(&mut ctx, unit);
            }
            UnitCategory::Commander | UnitCategory::MobileConstructor => {
                self.registry.set_duty(unit, ConstructorDuty::Idle);
            }
            _ => {
                if let Some(group_id) = group {
                    if let Some(g) = self.groups.get_mut(group_id) {
                        g.unit_idle(unit);
                    }
                }
            }
        }
    }

    /// An own unit failed to reach its move target: nudge it to a nearby
    /// position instead of letting it grind against the obstacle.
    pub fn unit_move_failed(&mut self, unit: UnitId) {
        let Some(record) = self.registry.get(unit) else {
            return;
        };
        let offset_x = self.rng.gen_range(-2..=2) as f32 * 32.0;
        let offset_z = self.rng.gen_range(-2..=2) as f32 * 32.0;
        let pos = WorldPos::new(record.pos.x + offset_x, record.pos.z + offset_z);
        commands::issue(&mut *self.sink, unit, AiCommand::MoveTo(pos), 5.0, "ai:unstick");
    }

    /// Update an own unit's last known position (piggybacked by the shim on
    /// whatever position data the engine exposes).
    pub fn unit_position(&mut self, unit: UnitId, pos: WorldPos) {
        if let Some(record) = self.registry.get_mut(unit) {
            record.pos = pos;
        }
        if let Some(group_id) = self.registry.get(unit).and_then(|r| r.group) {
            if let Some(group) = self.groups.get_mut(group_id) {
                group.position = pos;
            }
        }
    }

    /// One simulation tick. Subsystem passes run on their own offset prime
    /// intervals; everything runs to completion before returning.
    pub fn frame_tick(&mut self, resources: ResourceSnapshot) {
        self.tick += 1;
        let tick = self.tick;
        let blend = ThreatBlend::from_tick(tick);

        if tick % RESOURCE_INTERVAL == 0 {
            self.scheduler.sample_resources(resources);
        }

        if tick % CONSTRUCTION_INTERVAL == 0 {
            let mut ctx = SchedulerContext {
                catalog: &self.catalog,
                stats: &mut self.stats,
                grid: &mut self.grid,
                brain: &mut self.brain,
                registry: &mut self.registry,
                config: &self.config,
                tick,
                sink: &mut *self.sink,
            };
            self.scheduler.refresh_urgencies(&mut ctx);
            self.scheduler.check_construction(&mut ctx);
        }

        if tick % GROUP_INTERVAL == 0 {
            for group in self.groups.iter_mut() {
                group.update(&self.grid, &self.catalog, &self.config, &mut *self.sink);
            }
        }

        if tick % SECTOR_INTERVAL == 0 {
            self.grid.decay_pass(&self.config);
            self.brain.decay_pass(&self.config);
            self.refresh_sensor();
            self.brain.update_pressure(&self.grid);
        }

        if tick % PRODUCTION_INTERVAL == 0 {
            let learned = self.learned_attacks[GamePeriod::from_tick(tick).index()];
            let mut ctx = SchedulerContext {
                catalog: &self.catalog,
                stats: &mut self.stats,
                grid: &mut self.grid,
                brain: &mut self.brain,
                registry: &mut self.registry,
                config: &self.config,
                tick,
                sink: &mut *self.sink,
            };
            self.scheduler.produce_units(&mut ctx, &learned);
            self.scheduler.check_build_queues(&mut ctx);
        }

        if tick % ATTACK_INTERVAL == 0 {
            self.attacks.check_attacks(
                &mut self.groups,
                &self.grid,
                &self.stats,
                &self.brain,
                &self.config,
                blend,
                &mut *self.sink,
            );
            self.attacks.try_launch(
                &mut self.groups,
                &self.grid,
                &self.stats,
                &self.config,
                blend,
                &mut *self.sink,
            );
        }

        if tick % DEFENCE_INTERVAL == 0 {
            let powers: Vec<_> = self
                .groups
                .iter()
                .map(|g| g.combat_power(&self.stats))
                .collect();
            self.brain
                .update_defense_capability(powers, &self.grid, &self.stats);
        }

        if tick % EXPANSION_INTERVAL == 0 && self.brain.expandable() {
            let (land, water) = self.grid.base_terrain_counts();
            let terrain = if water > land {
                SectorTerrain::Water
            } else {
                SectorTerrain::Land
            };
            self.brain.expand_base(&mut self.grid, terrain, &self.config);
        }

        if tick % RALLY_INTERVAL == 0 {
            let rally = rally_point_for(&self.grid, &self.brain);
            if let Some(rally) = rally {
                for group in self.groups.iter_mut() {
                    if group.rally_point.is_none()
                        && group.task == crate::group::GroupTask::Idle
                    {
                        group.head_to_rally(rally, &mut *self.sink);
                    }
                }
            }
        }

        if tick % EFFICIENCY_INTERVAL == 0 {
            self.stats.recompute_averages();
        }
    }

    /// Rebuild every sector's enemy accumulators wholesale from the current
    /// sighting set. Also refreshes the spotted-enemy maxima.
    fn refresh_sensor(&mut self) {
        let coords: Vec<_> = self.grid.iter().map(|s| s.coord).collect();
        for coord in coords {
            self.grid.begin_sensor_refresh(coord);
        }

        let mut spotted = [0u32; ASSAULT_CATEGORIES];
        for sighting in self.enemies.values() {
            let Some(coord) = self.grid.sector_at(sighting.pos) else {
                continue;
            };
            if sighting.mobile {
                self.grid.add_enemy_unit(coord, sighting.unit_type, &self.stats);
                let category = self
                    .catalog
                    .category_of(sighting.unit_type)
                    .combat_category();
                if let Some(category) = category {
                    if let Some(slot) = CombatCategory::ASSAULT
                        .iter()
                        .position(|c| *c == category)
                    {
                        spotted[slot] += 1;
                    }
                }
            } else {
                self.grid.add_enemy_structure(
                    coord,
                    sighting.unit_type,
                    sighting.is_defence,
                    &self.stats,
                );
            }
        }
        self.brain.update_spotted(spotted);
    }

    /// Current tick.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// The sector grid (diagnostics and tests).
    #[must_use]
    pub fn grid(&self) -> &SectorGrid {
        &self.grid
    }

    /// The strategic state (diagnostics and tests).
    #[must_use]
    pub fn brain(&self) -> &StrategicState {
        &self.brain
    }

    /// The unit registry (diagnostics and tests).
    #[must_use]
    pub fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    /// The combat groups (diagnostics and tests).
    #[must_use]
    pub fn groups(&self) -> &GroupSet {
        &self.groups
    }

    /// The attack coordinator (diagnostics and tests).
    #[must_use]
    pub fn attacks(&self) -> &AttackCoordinator {
        &self.attacks
    }

    /// The per-type stats table (diagnostics and tests).
    #[must_use]
    pub fn stats(&self) -> &TypeStatsTable {
        &self.stats
    }

    /// The urgency scheduler (diagnostics and tests).
    #[must_use]
    pub fn scheduler(&self) -> &UrgencyScheduler {
        &self.scheduler
    }
}

/// A safe gathering point just outside the base: the first safe ring-1 or
/// ring-2 sector, preferring proximity to the base center.
fn rally_point_for(grid: &SectorGrid, brain: &StrategicState) -> Option<WorldPos> {
    for ring in 1..=2 {
        for coord in brain.ring(ring) {
            if let Some(sector) = grid.sector(*coord) {
                if StrategicState::is_safe_sector(sector) {
                    return Some(sector.center());
                }
            }
        }
    }
    // fall back to the base center itself on crowded maps
    if brain.ring(0).is_empty() {
        None
    } else {
        Some(brain.base_center())
    }
}
