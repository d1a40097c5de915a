//! Urgency scheduler.
//!
//! The scheduler converts resource state and sector threat into a
//! continuously growing priority table of construction categories, and every
//! pass dispatches the single highest-priority feasible action. Infeasible
//! actions are never errors: the category keeps its urgency and is retried
//! on a later pass, optionally after recursively requesting the missing
//! prerequisite (a factory for a builder, a builder for a factory).

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;

use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::catalog::{BuildCatalog, TypeStatsTable};
use crate::commands::{self, AiCommand, CommandSink};
use crate::config::AiConfig;
use crate::economy::{EconomyTracker, ResourceSnapshot};
use crate::map::{SectorCoord, SectorGrid, SectorTerrain};
use crate::brain::StrategicState;
use crate::selector::{self, CombatCriteria, SelectionConstraints};
use crate::types::{
    CombatCategory, ThreatBlend, UnitCategory, UnitId, UnitTypeId, WorldPos,
    ASSAULT_CATEGORIES, COMBAT_CATEGORIES,
};
use crate::units::{BuildTask, UnitRegistry};

/// Construction categories the urgency table ranks. The declaration order is
/// the tie-break order at dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildCategory {
    /// Energy production.
    PowerPlant,
    /// Metal extraction.
    Extractor,
    /// Factories.
    Factory,
    /// Stationary defences.
    Defence,
    /// Resource storage.
    Storage,
    /// Stationary recon (radar).
    Recon,
    /// Sensor jammers.
    Jammer,
    /// Stationary artillery.
    Artillery,
    /// Aircraft repair pads.
    AirBase,
    /// Metal makers.
    MetalMaker,
}

impl BuildCategory {
    /// All categories in tie-break order.
    pub const ALL: [Self; 10] = [
        Self::PowerPlant,
        Self::Extractor,
        Self::Factory,
        Self::Defence,
        Self::Storage,
        Self::Recon,
        Self::Jammer,
        Self::Artillery,
        Self::AirBase,
        Self::MetalMaker,
    ];

    const fn index(self) -> usize {
        match self {
            Self::PowerPlant => 0,
            Self::Extractor => 1,
            Self::Factory => 2,
            Self::Defence => 3,
            Self::Storage => 4,
            Self::Recon => 5,
            Self::Jammer => 6,
            Self::Artillery => 7,
            Self::AirBase => 8,
            Self::MetalMaker => 9,
        }
    }

    /// The catalog category dispatched builds come from.
    #[must_use]
    pub const fn unit_category(self) -> UnitCategory {
        match self {
            Self::PowerPlant => UnitCategory::PowerPlant,
            Self::Extractor => UnitCategory::Extractor,
            Self::Factory => UnitCategory::StationaryConstructor,
            Self::Defence => UnitCategory::StationaryDefence,
            Self::Storage => UnitCategory::Storage,
            Self::Recon => UnitCategory::Radar,
            Self::Jammer => UnitCategory::Jammer,
            Self::Artillery => UnitCategory::StationaryArtillery,
            Self::AirBase => UnitCategory::AirBase,
            Self::MetalMaker => UnitCategory::MetalMaker,
        }
    }
}

/// The per-category urgency scores.
#[derive(Debug, Clone, Default)]
pub struct UrgencyTable {
    values: [f32; BuildCategory::ALL.len()],
}

impl UrgencyTable {
    /// Current urgency of a category.
    #[must_use]
    pub fn get(&self, category: BuildCategory) -> f32 {
        self.values[category.index()]
    }

    /// Raise a category's urgency to at least `value` (monotone max-merge;
    /// urgency between passes only ever increases or is reset by dispatch).
    pub fn merge_max(&mut self, category: BuildCategory, value: f32) {
        let slot = &mut self.values[category.index()];
        if value > *slot {
            *slot = value;
        }
    }

    /// Force a category's urgency (used only by rules that also lower, e.g.
    /// jammers past their cap).
    pub fn set(&mut self, category: BuildCategory, value: f32) {
        self.values[category.index()] = value.max(0.0);
    }

    /// Reset after a successful dispatch.
    pub fn reset(&mut self, category: BuildCategory) {
        self.values[category.index()] = 0.0;
    }

    /// Per-pass growth: unspent urgency gains ~3% so starved categories
    /// eventually win; values past the cap are pulled back down.
    pub fn growth_pass(&mut self, config: &AiConfig) {
        for value in &mut self.values {
            *value *= config.urgency_growth;
            if *value > config.urgency_cap {
                *value -= 1.0;
            }
        }
    }

    /// Category with the highest urgency above the floor, ties broken by
    /// declaration order.
    #[must_use]
    pub fn highest(&self, floor: f32) -> Option<BuildCategory> {
        let mut best = None;
        let mut highest = floor;
        for category in BuildCategory::ALL {
            if self.get(category) > highest {
                highest = self.get(category);
                best = Some(category);
            }
        }
        best
    }
}

/// Outcome of a recursive prerequisite request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildRequestOutcome {
    /// A prerequisite has been requested (queued or urgency raised).
    Requested,
    /// The recursion budget ran out; retry on a later pass.
    DepthExhausted,
    /// The catalog has no provider at all for the requested type.
    NoProvider,
}

/// Everything a scheduler pass needs to touch, borrowed from the facade.
pub struct SchedulerContext<'a> {
    /// Shared immutable catalog.
    pub catalog: &'a Rc<BuildCatalog>,
    /// Mutable per-type stats.
    pub stats: &'a mut TypeStatsTable,
    /// The sector grid.
    pub grid: &'a mut SectorGrid,
    /// Strategic state.
    pub brain: &'a mut StrategicState,
    /// Live-unit registry.
    pub registry: &'a mut UnitRegistry,
    /// Configuration.
    pub config: &'a AiConfig,
    /// Current tick.
    pub tick: u64,
    /// Order sink.
    pub sink: &'a mut dyn CommandSink,
}

/// The urgency scheduler.
#[derive(Debug)]
pub struct UrgencyScheduler {
    urgency: UrgencyTable,
    /// Rolling resource windows and in-flight projections.
    pub economy: EconomyTracker,
    rng: SmallRng,
    /// Production queues per factory type.
    build_queues: BTreeMap<UnitTypeId, VecDeque<UnitTypeId>>,
    /// Factory types requested by prerequisite cascades, built first.
    requested_factories: BTreeSet<UnitTypeId>,
    /// Mobile units queued per pass, adapted to build-queue pressure.
    unit_production_rate: u32,
}

impl UrgencyScheduler {
    /// Create a scheduler with a seeded selection rng.
    #[must_use]
    pub fn new(config: &AiConfig, seed: u64) -> Self {
        Self {
            urgency: UrgencyTable::default(),
            economy: EconomyTracker::new(config.resource_window, config.metal_energy_ratio),
            rng: SmallRng::seed_from_u64(seed),
            build_queues: BTreeMap::new(),
            requested_factories: BTreeSet::new(),
            unit_production_rate: 1,
        }
    }

    /// Read access to the urgency table (tests and diagnostics).
    #[must_use]
    pub fn urgency(&self) -> &UrgencyTable {
        &self.urgency
    }

    /// Record a resource snapshot. Called on the sampling interval.
    pub fn sample_resources(&mut self, snapshot: ResourceSnapshot) {
        self.economy.sample(snapshot);
    }

    /// Refresh every category's target urgency from current counts, surplus
    /// and sector threat. Values are max-merged: a category's urgency only
    /// climbs until its dispatch succeeds.
    pub fn refresh_urgencies(&mut self, ctx: &mut SchedulerContext<'_>) {
        self.check_resources(ctx);
        self.check_factories(ctx);
        self.check_defences(ctx);
        self.check_recon(ctx);
        self.check_jammer(ctx);
        self.check_artillery(ctx);
        self.check_air_base(ctx);
    }

    fn check_resources(&mut self, ctx: &mut SchedulerContext<'_>) {
        let extractors = ctx.registry.counts(UnitCategory::Extractor).active;
        let plants = ctx.registry.counts(UnitCategory::PowerPlant).active;

        self.urgency
            .merge_max(BuildCategory::Extractor, self.economy.metal_urgency(extractors));
        self.urgency
            .merge_max(BuildCategory::PowerPlant, self.economy.energy_urgency(plants));

        let storage = ctx.registry.counts(UnitCategory::Storage);
        if storage.total() < ctx.config.max_storage
            && ctx.registry.active_factories() >= ctx.config.min_factories_for_storage
        {
            let urgency = self
                .economy
                .metal_storage_urgency()
                .max(self.economy.energy_storage_urgency());
            self.urgency.merge_max(BuildCategory::Storage, urgency);
        }

        let makers = ctx.registry.counts(UnitCategory::MetalMaker);
        if self.economy.energy_starved() {
            // accelerate plants instead of feeding converters
            self.urgency.set(BuildCategory::MetalMaker, 0.0);
            if ctx.registry.counts(UnitCategory::PowerPlant).future() > 0 {
                self.assist_category(ctx, UnitCategory::PowerPlant);
            }
            self.throttle_metal_makers(ctx, false);
        } else {
            if makers.total() < 2 && ctx.registry.active_factories() > 0 {
                self.urgency.merge_max(BuildCategory::MetalMaker, 0.15);
            }
            self.throttle_metal_makers(ctx, true);
        }

        if self.economy.metal_starved() {
            if ctx.registry.counts(UnitCategory::Extractor).future() > 0 {
                self.assist_category(ctx, UnitCategory::Extractor);
            }
        }
    }

    fn throttle_metal_makers(&mut self, ctx: &mut SchedulerContext<'_>, enable: bool) {
        let toggle = ctx
            .registry
            .metal_makers()
            .iter()
            .find(|(_, enabled)| **enabled != enable)
            .map(|(id, _)| *id);
        let Some(unit) = toggle else {
            return;
        };
        let Some(unit_type) = ctx.registry.get(unit).map(|r| r.unit_type) else {
            return;
        };
        commands::issue(
            ctx.sink,
            unit,
            AiCommand::SetActive(enable),
            10.0,
            "scheduler:metal-maker",
        );
        ctx.registry.set_metal_maker_enabled(unit, enable);
        let upkeep = ctx
            .catalog
            .get(unit_type)
            .map_or(0.0, |d| (-d.energy_production).max(0.0));
        if enable {
            self.economy.future_requested_energy -= upkeep;
        } else {
            self.economy.future_requested_energy += upkeep;
        }
    }

    fn check_factories(&mut self, ctx: &mut SchedulerContext<'_>) {
        let counts = ctx.registry.counts(UnitCategory::StationaryConstructor);
        if counts.future() > 0 {
            return;
        }
        if !self.requested_factories.is_empty() || counts.active == 0 {
            let urgency = if counts.active > 0 { 0.4 } else { 3.5 };
            self.urgency.merge_max(BuildCategory::Factory, urgency);
        }
    }

    fn check_defences(&mut self, ctx: &mut SchedulerContext<'_>) {
        let blend = ThreatBlend::from_tick(ctx.tick);
        // only defend sectors that hold something worth defending
        let mut worst = 0.0_f32;
        for coord in ctx.brain.ring(0).to_vec() {
            let Some(sector) = ctx.grid.sector(coord) else {
                continue;
            };
            if sector.own_structure_count() == 0 {
                continue;
            }
            if sector.defences.len() >= ctx.config.max_defences_per_sector {
                continue;
            }
            let mut threat = 0.0;
            for category in CombatCategory::ASSAULT {
                threat += sector.threat_by(category, blend)
                    / sector.defence_power_vs(category, ctx.stats);
            }
            worst = worst.max(threat);
        }
        if worst > 0.0 {
            let urgency = (0.1 * worst).min(2.0) + 0.3 * ctx.brain.enemy_pressure();
            self.urgency.merge_max(BuildCategory::Defence, urgency);
        }
    }

    fn check_recon(&mut self, ctx: &mut SchedulerContext<'_>) {
        let active = ctx.registry.counts(UnitCategory::Radar).active;
        let urgency = 0.02 + 0.5 / (2 * active + 1) as f32;
        self.urgency.merge_max(BuildCategory::Recon, urgency);
    }

    fn check_jammer(&mut self, ctx: &mut SchedulerContext<'_>) {
        let active = ctx.registry.counts(UnitCategory::Jammer).active;
        if ctx.registry.active_factories() < 2 || active as usize > ctx.brain.ring(0).len() {
            self.urgency.set(BuildCategory::Jammer, 0.0);
        } else {
            let urgency = 0.2 / (active + 1) as f32 + 0.05;
            self.urgency.merge_max(BuildCategory::Jammer, urgency);
        }
    }

    fn check_artillery(&mut self, ctx: &mut SchedulerContext<'_>) {
        let counts = ctx.registry.counts(UnitCategory::StationaryArtillery);
        if ctx.config.max_stationary_arty == 0
            || counts.future() > 0
            || counts.active >= ctx.config.max_stationary_arty
        {
            return;
        }
        self.urgency.merge_max(BuildCategory::Artillery, 0.05);
    }

    fn check_air_base(&mut self, ctx: &mut SchedulerContext<'_>) {
        let counts = ctx.registry.counts(UnitCategory::AirBase);
        let has_air_units = ctx.registry.counts(UnitCategory::AirAssault).active > 0;
        if counts.total() < ctx.config.max_air_bases && has_air_units {
            self.urgency.merge_max(BuildCategory::AirBase, 0.5);
        }
    }

    /// Dispatch pass: pick the category with the highest urgency above the
    /// floor and run its build routine. Urgency is reset only when the
    /// routine actually started construction; otherwise the category keeps
    /// its score and wins again next pass. Every score then grows ~3%.
    pub fn check_construction(&mut self, ctx: &mut SchedulerContext<'_>) {
        if let Some(category) = self.urgency.highest(ctx.config.urgency_floor) {
            let started = self.dispatch(category, ctx);
            if started {
                tracing::debug!(?category, "construction dispatched");
                self.urgency.reset(category);
            }
        }
        self.urgency.growth_pass(ctx.config);
    }

    fn dispatch(&mut self, category: BuildCategory, ctx: &mut SchedulerContext<'_>) -> bool {
        match category {
            BuildCategory::PowerPlant => self.build_power_plant(ctx),
            BuildCategory::Extractor => self.build_extractor(ctx),
            BuildCategory::Factory => self.build_factory(ctx),
            BuildCategory::Defence => self.build_defence(ctx),
            BuildCategory::Storage => self.build_storage(ctx),
            BuildCategory::Recon => self.build_sensor(ctx, UnitCategory::Radar),
            BuildCategory::Jammer => self.build_sensor(ctx, UnitCategory::Jammer),
            BuildCategory::Artillery => self.build_artillery(ctx),
            BuildCategory::AirBase => self.build_air_base(ctx),
            BuildCategory::MetalMaker => self.build_metal_maker(ctx),
        }
    }

    fn constraints(&self, ctx: &SchedulerContext<'_>, water: bool) -> SelectionConstraints {
        SelectionConstraints {
            must_be_buildable: true,
            water,
            max_cost: ctx.config.max_unit_cost,
            randomness: ctx.config.selection_randomness,
        }
    }

    fn build_power_plant(&mut self, ctx: &mut SchedulerContext<'_>) -> bool {
        let urgency = self.urgency.get(BuildCategory::PowerPlant);
        let cost_weight = 0.5 + urgency / 4.0;
        let constraints = self.constraints(ctx, false);
        let selected = selector::select_power_plant(
            ctx.catalog,
            ctx.stats,
            cost_weight,
            urgency,
            &constraints,
            &mut self.rng,
        );
        let Some(unit_type) = selected else {
            self.request_unbuildable(ctx, UnitCategory::PowerPlant);
            return false;
        };
        let Some(pos) = self.buildsite_near_base(ctx, false) else {
            return false;
        };
        self.start_construction(ctx, unit_type, pos)
    }

    fn build_extractor(&mut self, ctx: &mut SchedulerContext<'_>) -> bool {
        let constraints = self.constraints(ctx, false);
        let selected = selector::select_extractor(
            ctx.catalog,
            ctx.stats,
            0.5,
            &constraints,
            &mut self.rng,
        );
        let Some(unit_type) = selected else {
            self.request_unbuildable(ctx, UnitCategory::Extractor);
            return false;
        };

        // nearest free metal spot in the base, then in the first ring
        let mut spot = None;
        'rings: for ring in 0..=1 {
            for coord in ctx.brain.ring(ring) {
                if let Some(sector) = ctx.grid.sector(*coord) {
                    if let Some(pos) = sector.free_metal_spot_near(ctx.brain.base_center()) {
                        spot = Some(pos);
                        break 'rings;
                    }
                }
            }
        }
        let Some(pos) = spot else {
            // no free spot left: grow the base toward new metal
            let (land, water) = ctx.grid.base_terrain_counts();
            let terrain = if water > land {
                SectorTerrain::Water
            } else {
                SectorTerrain::Land
            };
            ctx.brain.expand_base(ctx.grid, terrain, ctx.config);
            return false;
        };
        self.start_construction(ctx, unit_type, pos)
    }

    fn build_factory(&mut self, ctx: &mut SchedulerContext<'_>) -> bool {
        // prerequisite cascades name concrete factory types; serve those
        // first, cheapest viable otherwise
        let requested = self.requested_factories.iter().copied().next();
        let unit_type = match requested {
            Some(t) => t,
            None => {
                let candidates = ctx.catalog.of_category(UnitCategory::StationaryConstructor);
                match candidates.first() {
                    Some(t) => *t,
                    None => return false,
                }
            }
        };

        let buildable = ctx
            .stats
            .get(unit_type)
            .map_or(0, |s| s.constructors_available)
            > 0;
        if !buildable {
            let depth = ctx.config.max_request_depth;
            let outcome = self.request_constructor_for(ctx, unit_type, depth);
            tracing::trace!(?outcome, "factory prerequisite request");
            return false;
        }
        let Some(pos) = self.buildsite_near_base(ctx, false) else {
            return false;
        };
        if self.start_construction(ctx, unit_type, pos) {
            self.requested_factories.remove(&unit_type);
            true
        } else {
            false
        }
    }

    fn build_defence(&mut self, ctx: &mut SchedulerContext<'_>) -> bool {
        let blend = ThreatBlend::from_tick(ctx.tick);
        // weakest defended base sector first
        let mut target: Option<(SectorCoord, CombatCategory, f32)> = None;
        for coord in ctx.brain.ring(0).to_vec() {
            let Some(weakest) =
                ctx.grid
                    .weakest_category(coord, ctx.stats, blend, ctx.config)
            else {
                continue;
            };
            let Some(sector) = ctx.grid.sector(coord) else {
                continue;
            };
            if sector.own_structure_count() == 0 {
                continue;
            }
            let severity = sector.threat_by(weakest, blend)
                / sector.defence_power_vs(weakest, ctx.stats);
            if target.map_or(true, |(_, _, s)| severity > s) {
                target = Some((coord, weakest, severity));
            }
        }
        let Some((coord, vs_category, _)) = target else {
            return false;
        };

        let mut threat = [0.0_f32; COMBAT_CATEGORIES];
        threat[vs_category.index()] = 1.0;
        let criteria = CombatCriteria {
            power: 1.0,
            efficiency: 1.0,
            cost: 0.5,
            speed: 0.0,
            range: 0.5,
        };
        let water = ctx
            .grid
            .sector(coord)
            .map_or(false, |s| s.water_ratio > 0.5);
        let constraints = self.constraints(ctx, water);
        let selected = selector::select_static_defence(
            ctx.catalog,
            ctx.stats,
            &threat,
            &criteria,
            &constraints,
            &mut self.rng,
        );
        let Some(unit_type) = selected else {
            self.request_unbuildable(ctx, UnitCategory::StationaryDefence);
            return false;
        };
        let Some(pos) = ctx.grid.defence_buildsite(coord, vs_category, ctx.stats) else {
            return false;
        };
        self.start_construction(ctx, unit_type, pos)
    }

    fn build_storage(&mut self, ctx: &mut SchedulerContext<'_>) -> bool {
        let constraints = self.constraints(ctx, false);
        let selected = selector::select_storage(
            ctx.catalog,
            ctx.stats,
            0.5,
            &constraints,
            &mut self.rng,
        );
        let Some(unit_type) = selected else {
            self.request_unbuildable(ctx, UnitCategory::Storage);
            return false;
        };
        let Some(pos) = self.buildsite_near_base(ctx, false) else {
            return false;
        };
        self.start_construction(ctx, unit_type, pos)
    }

    fn build_sensor(&mut self, ctx: &mut SchedulerContext<'_>, category: UnitCategory) -> bool {
        let constraints = self.constraints(ctx, false);
        let selected = selector::select_sensor(
            ctx.catalog,
            ctx.stats,
            category,
            0.5,
            &constraints,
            &mut self.rng,
        );
        let Some(unit_type) = selected else {
            self.request_unbuildable(ctx, category);
            return false;
        };
        let Some(pos) = self.buildsite_near_base(ctx, false) else {
            return false;
        };
        self.start_construction(ctx, unit_type, pos)
    }

    fn build_artillery(&mut self, ctx: &mut SchedulerContext<'_>) -> bool {
        let constraints = self.constraints(ctx, false);
        let selected = selector::select_artillery(
            ctx.catalog,
            ctx.stats,
            0.5,
            1.0,
            &constraints,
            &mut self.rng,
        );
        let Some(unit_type) = selected else {
            self.request_unbuildable(ctx, UnitCategory::StationaryArtillery);
            return false;
        };
        let Some(pos) = self.buildsite_near_base(ctx, false) else {
            return false;
        };
        self.start_construction(ctx, unit_type, pos)
    }

    fn build_air_base(&mut self, ctx: &mut SchedulerContext<'_>) -> bool {
        let constraints = self.constraints(ctx, false);
        let selected =
            selector::select_air_base(ctx.catalog, ctx.stats, &constraints, &mut self.rng);
        let Some(unit_type) = selected else {
            self.request_unbuildable(ctx, UnitCategory::AirBase);
            return false;
        };
        let Some(pos) = self.buildsite_near_base(ctx, false) else {
            return false;
        };
        self.start_construction(ctx, unit_type, pos)
    }

    fn build_metal_maker(&mut self, ctx: &mut SchedulerContext<'_>) -> bool {
        let constraints = self.constraints(ctx, false);
        let selected = selector::select_metal_maker(
            ctx.catalog,
            ctx.stats,
            0.5,
            &constraints,
            &mut self.rng,
        );
        let Some(unit_type) = selected else {
            self.request_unbuildable(ctx, UnitCategory::MetalMaker);
            return false;
        };
        let Some(pos) = self.buildsite_near_base(ctx, false) else {
            return false;
        };
        self.start_construction(ctx, unit_type, pos)
    }

    /// Sector-relative buildsite search: own base sectors first, widening to
    /// the first ring.
    fn buildsite_near_base(
        &mut self,
        ctx: &mut SchedulerContext<'_>,
        water: bool,
    ) -> Option<WorldPos> {
        for ring in 0..=1 {
            for coord in ctx.brain.ring(ring).to_vec() {
                if ring > 0 {
                    let safe = ctx
                        .grid
                        .sector(coord)
                        .map_or(false, StrategicState::is_safe_sector);
                    if !safe {
                        continue;
                    }
                }
                if let Some(pos) = ctx.grid.buildsite_in(coord, water) {
                    return Some(pos);
                }
            }
        }
        None
    }

    /// No candidate of `category` was buildable: ask for the missing
    /// prerequisite chain instead of giving up.
    fn request_unbuildable(&mut self, ctx: &mut SchedulerContext<'_>, category: UnitCategory) {
        let Some(first) = ctx.catalog.of_category(category).first().copied() else {
            return;
        };
        let depth = ctx.config.max_request_depth;
        let outcome = self.request_constructor_for(ctx, first, depth);
        tracing::trace!(?category, ?outcome, "prerequisite requested");
    }

    /// Request a constructor able to build `target`. Factories are routed
    /// through the factory urgency; mobile builders are queued at a factory
    /// that can produce them. The cascade is depth-bounded: a builder for a
    /// factory may itself need a factory, and so on.
    pub fn request_constructor_for(
        &mut self,
        ctx: &mut SchedulerContext<'_>,
        target: UnitTypeId,
        depth: u32,
    ) -> BuildRequestOutcome {
        if depth == 0 {
            return BuildRequestOutcome::DepthExhausted;
        }
        let constraints = SelectionConstraints {
            must_be_buildable: false,
            water: false,
            max_cost: ctx.config.max_unit_cost,
            randomness: ctx.config.selection_randomness,
        };
        let selected = selector::select_constructor_for(
            ctx.catalog,
            ctx.stats,
            target,
            &constraints,
            &mut self.rng,
        );
        let Some(constructor) = selected else {
            return BuildRequestOutcome::NoProvider;
        };

        if let Ok(stats) = ctx.stats.get_mut(target) {
            stats.constructors_requested += 1;
        }

        let category = ctx.catalog.category_of(constructor);
        if category == UnitCategory::StationaryConstructor {
            self.requested_factories.insert(constructor);
            let factory_urgency = if ctx.registry.active_factories() > 0 {
                0.4
            } else {
                3.5
            };
            self.urgency.merge_max(BuildCategory::Factory, factory_urgency);
            // the factory itself may not be buildable yet
            let buildable = ctx
                .stats
                .get(constructor)
                .map_or(0, |s| s.constructors_available)
                > 0;
            if !buildable {
                return self.request_constructor_for(ctx, constructor, depth - 1);
            }
            BuildRequestOutcome::Requested
        } else {
            // mobile builder: produce it from a factory
            self.queue_unit_production(ctx, constructor, depth - 1)
        }
    }

    /// Queue a mobile unit at a factory able to produce it; falls back to
    /// requesting such a factory when none is active.
    fn queue_unit_production(
        &mut self,
        ctx: &mut SchedulerContext<'_>,
        unit_type: UnitTypeId,
        depth: u32,
    ) -> BuildRequestOutcome {
        let producers = ctx.catalog.builders_of(unit_type);
        let active_producer = producers.iter().copied().find(|p| {
            ctx.stats.get(*p).map_or(0, |s| s.active) > 0
        });
        match active_producer {
            Some(factory_type) => {
                let queue = self.build_queues.entry(factory_type).or_default();
                if queue.len() >= ctx.config.max_buildqueue_size {
                    return BuildRequestOutcome::DepthExhausted;
                }
                queue.push_back(unit_type);
                if let Ok(stats) = ctx.stats.get_mut(unit_type) {
                    stats.requested += 1;
                }
                ctx.registry
                    .mark_requested(ctx.catalog.category_of(unit_type));
                BuildRequestOutcome::Requested
            }
            None => {
                if depth == 0 {
                    return BuildRequestOutcome::DepthExhausted;
                }
                self.request_constructor_for(ctx, unit_type, depth)
            }
        }
    }

    /// Public entry for queueing combat/support units (used by the unit
    /// production pass and tests).
    pub fn queue_unit(
        &mut self,
        ctx: &mut SchedulerContext<'_>,
        unit_type: UnitTypeId,
    ) -> BuildRequestOutcome {
        let depth = ctx.config.max_request_depth;
        self.queue_unit_production(ctx, unit_type, depth)
    }

    /// A factory finished its current job: hand it the next queued unit.
    pub fn factory_idle(&mut self, ctx: &mut SchedulerContext<'_>, factory: UnitId) {
        let Some(record) = ctx.registry.get(factory) else {
            return;
        };
        if record.category != UnitCategory::StationaryConstructor {
            return;
        }
        let factory_type = record.unit_type;
        let pos = record.pos;
        let Some(queue) = self.build_queues.get_mut(&factory_type) else {
            return;
        };
        let Some(unit_type) = queue.pop_front() else {
            return;
        };
        commands::issue(
            ctx.sink,
            factory,
            AiCommand::Build { unit_type, pos },
            15.0,
            "scheduler:factory-produce",
        );
    }

    /// Adapt the per-pass unit production rate to build-queue pressure.
    pub fn check_build_queues(&mut self, ctx: &mut SchedulerContext<'_>) {
        let mut queued = 0usize;
        let mut active_types = 0usize;
        for (factory_type, queue) in &self.build_queues {
            if ctx.stats.get(*factory_type).map_or(0, |s| s.active) > 0 {
                queued += queue.len();
                active_types += 1;
            }
        }
        if active_types == 0 {
            return;
        }
        let pressure = queued as f32 / active_types as f32;
        let max = ctx.config.max_buildqueue_size as f32;
        if pressure < max / 2.5 {
            self.unit_production_rate = (self.unit_production_rate + 1).min(70);
        } else if pressure > max / 1.5 {
            self.unit_production_rate = (self.unit_production_rate - 1).max(1);
        }
    }

    /// Queue combat units against the current threat estimate. The threat
    /// vector blends what has attacked this game with the learned per-period
    /// frequencies.
    pub fn produce_units(
        &mut self,
        ctx: &mut SchedulerContext<'_>,
        learned_attacks: &[f32; ASSAULT_CATEGORIES],
    ) {
        if ctx.registry.active_factories() == 0 {
            return;
        }

        let mut threat = [0.0_f32; COMBAT_CATEGORIES];
        let mut total = 0.0;
        for (i, category) in CombatCategory::ASSAULT.iter().enumerate() {
            let value = ctx.brain.attacks_by(*category, learned_attacks[i]) + 0.1;
            threat[category.index()] = value;
            total += value;
        }
        threat[CombatCategory::Static.index()] = total / 2.0;

        let criteria = CombatCriteria::default();
        let constraints = SelectionConstraints {
            must_be_buildable: true,
            water: false,
            max_cost: ctx.config.max_unit_cost,
            randomness: ctx.config.selection_randomness,
        };
        for _ in 0..self.unit_production_rate {
            let selected = selector::select_combat_unit(
                ctx.catalog,
                ctx.stats,
                UnitCategory::GroundAssault,
                &threat,
                &criteria,
                &constraints,
                &mut self.rng,
            );
            let Some(unit_type) = selected else {
                break;
            };
            if self.queue_unit(ctx, unit_type) != BuildRequestOutcome::Requested {
                break;
            }
        }

        // keep one scout available for the recon loop
        if ctx.registry.counts(UnitCategory::Scout).total() == 0 {
            if let Some(scout) = selector::select_scout(
                ctx.catalog,
                ctx.stats,
                0.5,
                &constraints,
                &mut self.rng,
            ) {
                let _ = self.queue_unit(ctx, scout);
            }
        }
    }

    /// Match one idle assistant to the in-flight task of `category` with the
    /// most remaining effort. Returns whether an assistant was attached.
    pub fn assist_category(
        &mut self,
        ctx: &mut SchedulerContext<'_>,
        category: UnitCategory,
    ) -> bool {
        let Some(task) = ctx
            .registry
            .assistable_task(category, ctx.config.max_assistants, ctx.tick)
        else {
            return false;
        };
        let builder = task.builder;
        let pos = task.pos;
        let Some(assistant) = ctx.registry.closest_assistant(ctx.catalog, pos, builder) else {
            return false;
        };
        commands::issue(
            ctx.sink,
            assistant,
            AiCommand::Guard(builder),
            10.0,
            "scheduler:assist",
        );
        ctx.registry.attach_assistant(builder, assistant);
        true
    }

    /// Issue a construction order: nearest eligible constructor, dynamic
    /// counters, projected resource demand. Returns false (leaving urgency
    /// untouched) when no constructor is available.
    fn start_construction(
        &mut self,
        ctx: &mut SchedulerContext<'_>,
        unit_type: UnitTypeId,
        pos: WorldPos,
    ) -> bool {
        let continent = ctx
            .grid
            .sector_at(pos)
            .and_then(|c| ctx.grid.sector(c))
            .and_then(|s| s.continent);
        let Some(builder) =
            ctx.registry
                .nearest_available_builder(ctx.catalog, unit_type, pos, continent)
        else {
            return false;
        };
        let Ok(def) = ctx.catalog.get(unit_type) else {
            return false;
        };

        commands::issue(
            ctx.sink,
            builder,
            AiCommand::Build { unit_type, pos },
            20.0,
            "scheduler:construct",
        );
        ctx.registry.add_task(BuildTask {
            builder,
            target_type: unit_type,
            category: def.category,
            pos,
            target_unit: None,
            started: ctx.tick,
            build_time: def.build_time,
            assistants: BTreeSet::new(),
        });
        ctx.registry.mark_requested(def.category);
        if let Ok(stats) = ctx.stats.get_mut(unit_type) {
            stats.requested += 1;
        }

        // projected resource effects of the new structure
        if def.energy_production > 0.0 {
            self.economy.future_available_energy += def.energy_production;
        } else if def.energy_production < 0.0 {
            self.economy.future_requested_energy += -def.energy_production;
        }
        if def.metal_production > 0.0 {
            self.economy.future_available_metal += def.metal_production;
        }
        if def.storage_capacity > 0.0 {
            self.economy.future_stored_metal += def.storage_capacity;
        }
        true
    }

    /// A structure finished: its projected resource contribution is now
    /// real and leaves the projection.
    pub fn construction_finished(&mut self, catalog: &BuildCatalog, unit_type: UnitTypeId) {
        let Ok(def) = catalog.get(unit_type) else {
            return;
        };
        if def.energy_production > 0.0 {
            self.economy.future_available_energy =
                (self.economy.future_available_energy - def.energy_production).max(0.0);
        }
        if def.metal_production > 0.0 {
            self.economy.future_available_metal =
                (self.economy.future_available_metal - def.metal_production).max(0.0);
        }
        if def.storage_capacity > 0.0 {
            self.economy.future_stored_metal =
                (self.economy.future_stored_metal - def.storage_capacity).max(0.0);
        }
    }
}
