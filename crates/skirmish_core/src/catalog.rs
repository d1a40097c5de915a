//! Entity-type catalog.
//!
//! The catalog holds the immutable static facts of every entity type the
//! played side can field, keyed by [`UnitTypeId`]. It is built once at match
//! start and shared by reference counting with every component that needs it;
//! there is no ambient global table.
//!
//! Mutable per-type state (learned efficiency, dynamic counters) lives in the
//! separate [`TypeStatsTable`], owned by the AI facade and mutated only from
//! the tick handler.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::config::AiConfig;
use crate::error::{AiError, Result};
use crate::types::{
    CombatCategory, MovementDomain, UnitCategory, UnitTypeId, COMBAT_CATEGORIES,
};

/// Number of speed buckets used to group units of one category.
const SPEED_BUCKETS: f32 = 4.0;

/// Immutable static facts of one entity type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitTypeData {
    /// Identifier of this type.
    pub id: UnitTypeId,
    /// Display name, used in debug logging only.
    pub name: String,
    /// Classification.
    pub category: UnitCategory,
    /// Movement capability.
    pub movement: MovementDomain,
    /// Metal cost.
    pub cost: f32,
    /// Build time in work units.
    pub build_time: f32,
    /// Maximum movement speed.
    pub speed: f32,
    /// Maximum weapon range (0 for unarmed types).
    pub range: f32,
    /// Construction speed contributed when building or assisting (0 for
    /// non-constructors).
    pub build_speed: f32,
    /// Energy produced per tick (power plants) or consumed (metal makers,
    /// negative values).
    pub energy_production: f32,
    /// Metal produced per tick (extractors, metal makers).
    pub metal_production: f32,
    /// Storage capacity added (storage buildings).
    pub storage_capacity: f32,
    /// Sensor radius (radar/jammer).
    pub sensor_range: f32,
    /// Whether this type can be placed on water.
    pub can_place_on_water: bool,
    /// Types this one can construct (empty for non-constructors).
    pub can_build: Vec<UnitTypeId>,
    /// Whether this type belongs to an opposing side. Foreign types are
    /// lookup-able (threat and efficiency bookkeeping) but never selection
    /// candidates.
    pub foreign: bool,
}

impl UnitTypeData {
    /// Create a type definition with the mandatory facts; optional facts
    /// default to zero/empty and are set with the `with_*` builders.
    #[must_use]
    pub fn new(
        id: UnitTypeId,
        name: impl Into<String>,
        category: UnitCategory,
        movement: MovementDomain,
        cost: f32,
        build_time: f32,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            category,
            movement,
            cost,
            build_time,
            speed: 0.0,
            range: 0.0,
            build_speed: 0.0,
            energy_production: 0.0,
            metal_production: 0.0,
            storage_capacity: 0.0,
            sensor_range: 0.0,
            can_place_on_water: false,
            can_build: Vec::new(),
            foreign: false,
        }
    }

    /// Set movement speed.
    #[must_use]
    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    /// Set weapon range.
    #[must_use]
    pub fn with_range(mut self, range: f32) -> Self {
        self.range = range;
        self
    }

    /// Set construction speed and build list.
    #[must_use]
    pub fn with_construction(mut self, build_speed: f32, can_build: Vec<UnitTypeId>) -> Self {
        self.build_speed = build_speed;
        self.can_build = can_build;
        self
    }

    /// Set resource production facts.
    #[must_use]
    pub fn with_production(mut self, metal: f32, energy: f32) -> Self {
        self.metal_production = metal;
        self.energy_production = energy;
        self
    }

    /// Set storage capacity.
    #[must_use]
    pub fn with_storage(mut self, capacity: f32) -> Self {
        self.storage_capacity = capacity;
        self
    }

    /// Set sensor radius.
    #[must_use]
    pub fn with_sensor_range(mut self, range: f32) -> Self {
        self.sensor_range = range;
        self
    }

    /// Allow placement on water.
    #[must_use]
    pub fn with_water_placement(mut self) -> Self {
        self.can_place_on_water = true;
        self
    }

    /// Mark as an opposing side's type.
    #[must_use]
    pub fn foreign(mut self) -> Self {
        self.foreign = true;
        self
    }

    /// Whether this type can construct the given type.
    #[must_use]
    pub fn can_construct(&self, target: UnitTypeId) -> bool {
        self.can_build.contains(&target)
    }
}

/// Static per-category aggregates used for score normalization and speed
/// bucketing. Computed once at catalog construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryAggregate {
    /// Highest metal cost within the category.
    pub max_cost: f32,
    /// Lowest metal cost within the category.
    pub min_cost: f32,
    /// Average metal cost within the category.
    pub avg_cost: f32,
    /// Highest weapon range within the category.
    pub max_range: f32,
    /// Highest movement speed within the category.
    pub max_speed: f32,
    /// Lowest movement speed within the category.
    pub min_speed: f32,
    /// Width of one speed bucket for group assignment.
    pub speed_bucket_width: f32,
}

impl CategoryAggregate {
    /// Speed bucket a unit of this category falls into.
    #[must_use]
    pub fn speed_bucket(&self, speed: f32) -> u32 {
        if self.speed_bucket_width <= f32::EPSILON {
            return 0;
        }
        ((speed - self.min_speed) / self.speed_bucket_width).floor() as u32
    }
}

/// The immutable catalog of entity types for the played side.
#[derive(Debug, Default)]
pub struct BuildCatalog {
    types: BTreeMap<UnitTypeId, UnitTypeData>,
    by_category: BTreeMap<UnitCategory, Vec<UnitTypeId>>,
    builders_of: BTreeMap<UnitTypeId, Vec<UnitTypeId>>,
    aggregates: BTreeMap<UnitCategory, CategoryAggregate>,
}

impl BuildCatalog {
    /// Build a catalog from type definitions. Derived tables (category
    /// buckets, reverse build lists, aggregates) are computed here.
    #[must_use]
    pub fn from_types(definitions: Vec<UnitTypeData>) -> Rc<Self> {
        let mut types = BTreeMap::new();
        let mut by_category: BTreeMap<UnitCategory, Vec<UnitTypeId>> = BTreeMap::new();
        let mut builders_of: BTreeMap<UnitTypeId, Vec<UnitTypeId>> = BTreeMap::new();

        for def in definitions {
            if !def.foreign {
                by_category.entry(def.category).or_default().push(def.id);
                for target in &def.can_build {
                    builders_of.entry(*target).or_default().push(def.id);
                }
            }
            types.insert(def.id, def);
        }

        let mut aggregates = BTreeMap::new();
        for (category, ids) in &by_category {
            let mut agg = CategoryAggregate {
                min_cost: f32::MAX,
                min_speed: f32::MAX,
                ..CategoryAggregate::default()
            };
            let mut total_cost = 0.0;
            for id in ids {
                let def = &types[id];
                agg.max_cost = agg.max_cost.max(def.cost);
                agg.min_cost = agg.min_cost.min(def.cost);
                agg.max_range = agg.max_range.max(def.range);
                agg.max_speed = agg.max_speed.max(def.speed);
                agg.min_speed = agg.min_speed.min(def.speed);
                total_cost += def.cost;
            }
            agg.avg_cost = total_cost / ids.len() as f32;
            agg.speed_bucket_width = (agg.max_speed - agg.min_speed) / SPEED_BUCKETS;
            aggregates.insert(*category, agg);
        }

        Rc::new(Self {
            types,
            by_category,
            builders_of,
            aggregates,
        })
    }

    /// Look up a type definition.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::UnknownUnitType`] for ids not present in the
    /// catalog.
    pub fn get(&self, id: UnitTypeId) -> Result<&UnitTypeData> {
        self.types.get(&id).ok_or(AiError::UnknownUnitType(id))
    }

    /// Classification of a type; [`UnitCategory::Unknown`] for foreign ids.
    #[must_use]
    pub fn category_of(&self, id: UnitTypeId) -> UnitCategory {
        self.types
            .get(&id)
            .map_or(UnitCategory::Unknown, |d| d.category)
    }

    /// All type ids of one category, in id order.
    #[must_use]
    pub fn of_category(&self, category: UnitCategory) -> &[UnitTypeId] {
        self.by_category
            .get(&category)
            .map_or(&[], |ids| ids.as_slice())
    }

    /// Types able to construct the given type, in id order.
    #[must_use]
    pub fn builders_of(&self, id: UnitTypeId) -> &[UnitTypeId] {
        self.builders_of
            .get(&id)
            .map_or(&[], |ids| ids.as_slice())
    }

    /// Static aggregates of one category, if any type of it exists.
    #[must_use]
    pub fn aggregate(&self, category: UnitCategory) -> Option<&CategoryAggregate> {
        self.aggregates.get(&category)
    }

    /// Iterate over all type definitions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &UnitTypeData> {
        self.types.values()
    }

    /// Number of known types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Mutable per-type state: learned efficiency plus dynamic counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeStats {
    /// Learned effectiveness against each combat category.
    pub efficiency: [f32; COMBAT_CATEGORIES],
    /// Finished units of this type currently alive.
    pub active: u32,
    /// Units ordered but not yet started.
    pub requested: u32,
    /// Units currently under construction.
    pub under_construction: u32,
    /// Live constructors able to build this type.
    pub constructors_available: u32,
    /// Constructors for this type that have been requested.
    pub constructors_requested: u32,
}

impl Default for TypeStats {
    fn default() -> Self {
        Self {
            efficiency: [1.0; COMBAT_CATEGORIES],
            active: 0,
            requested: 0,
            under_construction: 0,
            constructors_available: 0,
            constructors_requested: 0,
        }
    }
}

impl TypeStats {
    /// Units of this type that exist or will exist soon.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.active + self.requested + self.under_construction
    }
}

/// Owner of all mutable per-type state.
///
/// Exactly one stats table exists per AI instance. The scheduler and the
/// unit registry mutate it from the tick handler; rating code reads it.
#[derive(Debug)]
pub struct TypeStatsTable {
    catalog: Rc<BuildCatalog>,
    stats: BTreeMap<UnitTypeId, TypeStats>,
    /// Average efficiency per (assault category, target category) pair,
    /// recomputed wholesale on a slow tick to avoid drift.
    avg_efficiency: BTreeMap<UnitCategory, [f32; COMBAT_CATEGORIES]>,
    /// How fast combat outcomes shift learned efficiency.
    learn_rate: f32,
    min_efficiency: f32,
}

impl TypeStatsTable {
    /// Create a stats table covering every type in the catalog.
    #[must_use]
    pub fn new(catalog: Rc<BuildCatalog>, config: &AiConfig) -> Self {
        let stats = catalog
            .iter()
            .map(|def| (def.id, TypeStats::default()))
            .collect();
        let mut table = Self {
            catalog,
            stats,
            avg_efficiency: BTreeMap::new(),
            learn_rate: 0.2,
            min_efficiency: config.min_efficiency,
        };
        table.recompute_averages();
        table
    }

    /// Look up the stats of a type.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::UnknownUnitType`] for ids not present.
    pub fn get(&self, id: UnitTypeId) -> Result<&TypeStats> {
        self.stats.get(&id).ok_or(AiError::UnknownUnitType(id))
    }

    /// Mutable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::UnknownUnitType`] for ids not present.
    pub fn get_mut(&mut self, id: UnitTypeId) -> Result<&mut TypeStats> {
        self.stats.get_mut(&id).ok_or(AiError::UnknownUnitType(id))
    }

    /// Effectiveness of one type against one combat category, clamped to the
    /// configured minimum.
    #[must_use]
    pub fn efficiency_vs(&self, id: UnitTypeId, target: CombatCategory) -> f32 {
        self.stats
            .get(&id)
            .map_or(self.min_efficiency, |s| s.efficiency[target.index()])
            .max(self.min_efficiency)
    }

    /// Average efficiency vector of one unit category.
    #[must_use]
    pub fn avg_efficiency(&self, category: UnitCategory) -> [f32; COMBAT_CATEGORIES] {
        self.avg_efficiency
            .get(&category)
            .copied()
            .unwrap_or([1.0; COMBAT_CATEGORIES])
    }

    /// Record a kill: the killer's learned efficiency against the victim's
    /// combat category rises, the victim's against the killer's falls.
    /// Values never drop below the configured minimum.
    pub fn record_combat_result(&mut self, killer: UnitTypeId, victim: UnitTypeId) {
        let killer_cat = self.catalog.category_of(killer).combat_category();
        let victim_cat = self.catalog.category_of(victim).combat_category();
        let (Some(killer_cat), Some(victim_cat)) = (killer_cat, victim_cat) else {
            return;
        };

        let victim_eff = self.efficiency_vs(victim, killer_cat);
        if let Some(stats) = self.stats.get_mut(&killer) {
            let current = stats.efficiency[victim_cat.index()].max(self.min_efficiency);
            stats.efficiency[victim_cat.index()] += self.learn_rate * victim_eff / current;
        }
        if let Some(stats) = self.stats.get_mut(&victim) {
            let updated = stats.efficiency[killer_cat.index()] * (1.0 - self.learn_rate / 2.0);
            stats.efficiency[killer_cat.index()] = updated.max(self.min_efficiency);
        }
    }

    /// Record that one of our units killed something of `victim_category`
    /// when the victim's concrete type is not in the catalog.
    pub fn record_victory(&mut self, killer: UnitTypeId, victim_category: CombatCategory) {
        let rate = self.learn_rate;
        if let Some(stats) = self.stats.get_mut(&killer) {
            stats.efficiency[victim_category.index()] += rate / 2.0;
        }
    }

    /// Record that one of our units was killed by something of
    /// `attacker_category` when the attacker's concrete type is unknown.
    pub fn record_defeat(&mut self, victim: UnitTypeId, attacker_category: CombatCategory) {
        let rate = self.learn_rate;
        let min = self.min_efficiency;
        if let Some(stats) = self.stats.get_mut(&victim) {
            let updated = stats.efficiency[attacker_category.index()] * (1.0 - rate / 2.0);
            stats.efficiency[attacker_category.index()] = updated.max(min);
        }
    }

    /// Recompute the per-category average efficiency vectors from scratch.
    /// Called on a slow tick; a full pass avoids incremental drift.
    pub fn recompute_averages(&mut self) {
        let catalog = Rc::clone(&self.catalog);
        self.avg_efficiency.clear();
        for category in COMBAT_UNIT_CATEGORIES {
            let ids = catalog.of_category(category);
            if ids.is_empty() {
                continue;
            }
            let mut avg = [0.0_f32; COMBAT_CATEGORIES];
            for id in ids {
                let stats = &self.stats[id];
                for (slot, eff) in avg.iter_mut().zip(stats.efficiency.iter()) {
                    *slot += *eff;
                }
            }
            for slot in &mut avg {
                *slot = (*slot / ids.len() as f32).max(self.min_efficiency);
            }
            self.avg_efficiency.insert(category, avg);
        }
    }

    /// Overwrite the efficiency vector of a type (used when loading the
    /// learning file).
    pub fn set_efficiency(&mut self, id: UnitTypeId, efficiency: [f32; COMBAT_CATEGORIES]) {
        if let Some(stats) = self.stats.get_mut(&id) {
            for (slot, value) in stats.efficiency.iter_mut().zip(efficiency.iter()) {
                *slot = value.max(self.min_efficiency);
            }
        }
    }

    /// Iterate over all (id, stats) pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&UnitTypeId, &TypeStats)> {
        self.stats.iter()
    }
}

/// Unit categories that carry an efficiency average worth tracking.
const COMBAT_UNIT_CATEGORIES: [UnitCategory; 7] = [
    UnitCategory::GroundAssault,
    UnitCategory::AirAssault,
    UnitCategory::HoverAssault,
    UnitCategory::SeaAssault,
    UnitCategory::SubmarineAssault,
    UnitCategory::StationaryDefence,
    UnitCategory::StationaryArtillery,
];

#[cfg(test)]
mod tests {
    use super::*;

    fn tank(id: u32, cost: f32, speed: f32) -> UnitTypeData {
        UnitTypeData::new(
            UnitTypeId(id),
            format!("tank-{id}"),
            UnitCategory::GroundAssault,
            MovementDomain::Ground,
            cost,
            100.0,
        )
        .with_speed(speed)
        .with_range(250.0)
    }

    fn small_catalog() -> Rc<BuildCatalog> {
        let factory = UnitTypeData::new(
            UnitTypeId(1),
            "factory",
            UnitCategory::StationaryConstructor,
            MovementDomain::Static,
            600.0,
            800.0,
        )
        .with_construction(100.0, vec![UnitTypeId(10), UnitTypeId(11)]);
        BuildCatalog::from_types(vec![factory, tank(10, 100.0, 2.0), tank(11, 300.0, 4.0)])
    }

    #[test]
    fn typed_lookup_failure() {
        let catalog = small_catalog();
        assert!(catalog.get(UnitTypeId(10)).is_ok());
        assert!(matches!(
            catalog.get(UnitTypeId(99)),
            Err(AiError::UnknownUnitType(UnitTypeId(99)))
        ));
        assert_eq!(catalog.category_of(UnitTypeId(99)), UnitCategory::Unknown);
    }

    #[test]
    fn reverse_build_lists() {
        let catalog = small_catalog();
        assert_eq!(catalog.builders_of(UnitTypeId(10)), &[UnitTypeId(1)]);
        assert!(catalog.builders_of(UnitTypeId(1)).is_empty());
    }

    #[test]
    fn aggregates_cover_category() {
        let catalog = small_catalog();
        let agg = catalog.aggregate(UnitCategory::GroundAssault).unwrap();
        assert_eq!(agg.max_cost, 300.0);
        assert_eq!(agg.min_cost, 100.0);
        assert_eq!(agg.max_speed, 4.0);
        // fast tank lands in a higher bucket than the slow one
        assert!(agg.speed_bucket(4.0) > agg.speed_bucket(2.0));
    }

    #[test]
    fn combat_result_shifts_efficiency() {
        let catalog = small_catalog();
        let mut stats = TypeStatsTable::new(Rc::clone(&catalog), &AiConfig::default());
        let before_killer = stats.efficiency_vs(UnitTypeId(10), CombatCategory::Ground);
        let before_victim = stats.efficiency_vs(UnitTypeId(11), CombatCategory::Ground);

        stats.record_combat_result(UnitTypeId(10), UnitTypeId(11));

        assert!(stats.efficiency_vs(UnitTypeId(10), CombatCategory::Ground) > before_killer);
        assert!(stats.efficiency_vs(UnitTypeId(11), CombatCategory::Ground) < before_victim);
    }

    #[test]
    fn efficiency_never_below_minimum() {
        let catalog = small_catalog();
        let config = AiConfig::default();
        let mut stats = TypeStatsTable::new(Rc::clone(&catalog), &config);
        for _ in 0..200 {
            stats.record_combat_result(UnitTypeId(11), UnitTypeId(10));
        }
        assert!(
            stats.efficiency_vs(UnitTypeId(10), CombatCategory::Ground) >= config.min_efficiency
        );
    }

    #[test]
    fn averages_recomputed_wholesale() {
        let catalog = small_catalog();
        let mut stats = TypeStatsTable::new(Rc::clone(&catalog), &AiConfig::default());
        stats
            .get_mut(UnitTypeId(10))
            .unwrap()
            .efficiency = [3.0; COMBAT_CATEGORIES];
        stats.recompute_averages();
        let avg = stats.avg_efficiency(UnitCategory::GroundAssault);
        assert!((avg[CombatCategory::Ground.index()] - 2.0).abs() < 1e-5);
    }
}
