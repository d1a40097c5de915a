//! Unit-selection rating engine.
//!
//! Every function here is a pure, read-only query over the catalog and the
//! stats table: given a category and weighted criteria it returns the best
//! concrete entity type, or `None` when every candidate is excluded. Scores
//! are weighted linear sums where each axis is normalized by the maximum
//! observed value within the candidate set, so no axis dominates on absolute
//! scale alone. A bounded jitter term breaks deterministic lock-in; the rng
//! is passed in seeded, so selection is reproducible.

use rand::rngs::SmallRng;
use rand::Rng;

use crate::catalog::{BuildCatalog, TypeStatsTable};
use crate::types::{CombatCategory, MovementDomain, UnitCategory, UnitTypeId, COMBAT_CATEGORIES};

/// Sentinel score for excluded candidates.
const EXCLUDED: f32 = -10_000.0;

/// Weights for combat-unit selection.
#[derive(Debug, Clone, Copy)]
pub struct CombatCriteria {
    /// Weight on absolute combat power against the requested threat vector.
    pub power: f32,
    /// Weight on combat power per metal cost.
    pub efficiency: f32,
    /// Weight on metal cost (subtracted).
    pub cost: f32,
    /// Weight on movement speed.
    pub speed: f32,
    /// Weight on weapon range.
    pub range: f32,
}

impl Default for CombatCriteria {
    fn default() -> Self {
        Self {
            power: 1.0,
            efficiency: 1.0,
            cost: 0.5,
            speed: 0.25,
            range: 0.25,
        }
    }
}

/// Hard filters applied before scoring.
#[derive(Debug, Clone, Copy)]
pub struct SelectionConstraints {
    /// Exclude types without an available constructor.
    pub must_be_buildable: bool,
    /// Require water placement (structures) or water capability (units).
    pub water: bool,
    /// Metal-cost ceiling.
    pub max_cost: f32,
    /// Jitter bound; the jitter term is `0.1 × (rng mod randomness)`.
    pub randomness: u32,
}

impl Default for SelectionConstraints {
    fn default() -> Self {
        Self {
            must_be_buildable: true,
            water: false,
            max_cost: f32::MAX,
            randomness: 3,
        }
    }
}

fn jitter(rng: &mut SmallRng, randomness: u32) -> f32 {
    if randomness <= 1 {
        return 0.0;
    }
    0.1 * rng.gen_range(0..randomness) as f32
}

fn passes_filters(
    catalog: &BuildCatalog,
    stats: &TypeStatsTable,
    id: UnitTypeId,
    constraints: &SelectionConstraints,
) -> bool {
    let Ok(def) = catalog.get(id) else {
        return false;
    };
    if def.cost > constraints.max_cost {
        return false;
    }
    if constraints.water {
        match def.movement {
            MovementDomain::Static if !def.can_place_on_water => return false,
            MovementDomain::Ground => return false,
            _ => {}
        }
    }
    if constraints.must_be_buildable {
        let available = stats
            .get(id)
            .map_or(0, |s| s.constructors_available);
        if available == 0 {
            return false;
        }
    }
    true
}

/// Select the best combat unit of `category` against a threat vector.
///
/// The threat vector weights each combat category the unit is expected to
/// face; a unit's combat power is the dot product of the vector with its
/// learned efficiency.
pub fn select_combat_unit(
    catalog: &BuildCatalog,
    stats: &TypeStatsTable,
    category: UnitCategory,
    threat: &[f32; COMBAT_CATEGORIES],
    criteria: &CombatCriteria,
    constraints: &SelectionConstraints,
    rng: &mut SmallRng,
) -> Option<UnitTypeId> {
    let candidates = catalog.of_category(category);
    if candidates.is_empty() {
        return None;
    }
    let agg = catalog.aggregate(category)?;

    // normalization maxima over the candidate set
    let mut max_power = 0.0_f32;
    let mut max_efficiency = 0.0_f32;
    let mut powers = Vec::with_capacity(candidates.len());
    for id in candidates {
        let mut power = 0.0;
        for combat in CombatCategory::ALL {
            power += threat[combat.index()] * stats.efficiency_vs(*id, combat);
        }
        let cost = catalog.get(*id).map_or(1.0, |d| d.cost.max(1.0));
        max_power = max_power.max(power);
        max_efficiency = max_efficiency.max(power / cost);
        powers.push(power);
    }
    let max_power = max_power.max(1.0);
    let max_efficiency = max_efficiency.max(f32::MIN_POSITIVE);
    let max_cost = agg.max_cost.max(1.0);
    let max_range = agg.max_range.max(1.0);
    let max_speed = agg.max_speed.max(1.0);

    let mut best = None;
    let mut best_score = EXCLUDED;
    for (id, power) in candidates.iter().zip(powers) {
        let score = if passes_filters(catalog, stats, *id, constraints) {
            let def = catalog.get(*id).ok()?;
            criteria.power * power / max_power - criteria.cost * def.cost / max_cost
                + criteria.efficiency * (power / def.cost.max(1.0)) / max_efficiency
                + criteria.range * def.range / max_range
                + criteria.speed * def.speed / max_speed
                + jitter(rng, constraints.randomness)
        } else {
            EXCLUDED
        };
        if score > best_score {
            best_score = score;
            best = Some(*id);
        }
    }
    best.filter(|_| best_score > EXCLUDED)
}

/// Select a power plant trading energy output against cost and build time.
/// Higher `urgency` shifts the choice toward quick cheap plants.
pub fn select_power_plant(
    catalog: &BuildCatalog,
    stats: &TypeStatsTable,
    cost_weight: f32,
    urgency: f32,
    constraints: &SelectionConstraints,
    rng: &mut SmallRng,
) -> Option<UnitTypeId> {
    rate_structures(
        catalog,
        stats,
        UnitCategory::PowerPlant,
        constraints,
        rng,
        |def, maxima| {
            def.energy_production / maxima.production - cost_weight * def.cost / maxima.cost
                - urgency * def.build_time / maxima.build_time
        },
    )
}

/// Select a metal extractor by extraction rate against cost.
pub fn select_extractor(
    catalog: &BuildCatalog,
    stats: &TypeStatsTable,
    cost_weight: f32,
    constraints: &SelectionConstraints,
    rng: &mut SmallRng,
) -> Option<UnitTypeId> {
    rate_structures(
        catalog,
        stats,
        UnitCategory::Extractor,
        constraints,
        rng,
        |def, maxima| {
            def.metal_production / maxima.production - cost_weight * def.cost / maxima.cost
        },
    )
}

/// Select a metal maker by conversion rate against energy upkeep and cost.
pub fn select_metal_maker(
    catalog: &BuildCatalog,
    stats: &TypeStatsTable,
    cost_weight: f32,
    constraints: &SelectionConstraints,
    rng: &mut SmallRng,
) -> Option<UnitTypeId> {
    rate_structures(
        catalog,
        stats,
        UnitCategory::MetalMaker,
        constraints,
        rng,
        |def, maxima| {
            let upkeep = (-def.energy_production).max(1.0);
            (def.metal_production / upkeep) / maxima.conversion
                - cost_weight * def.cost / maxima.cost
        },
    )
}

/// Select a storage building by added capacity against cost.
pub fn select_storage(
    catalog: &BuildCatalog,
    stats: &TypeStatsTable,
    cost_weight: f32,
    constraints: &SelectionConstraints,
    rng: &mut SmallRng,
) -> Option<UnitTypeId> {
    rate_structures(
        catalog,
        stats,
        UnitCategory::Storage,
        constraints,
        rng,
        |def, maxima| {
            def.storage_capacity / maxima.storage - cost_weight * def.cost / maxima.cost
        },
    )
}

/// Select a stationary defence against a threat vector.
pub fn select_static_defence(
    catalog: &BuildCatalog,
    stats: &TypeStatsTable,
    threat: &[f32; COMBAT_CATEGORIES],
    criteria: &CombatCriteria,
    constraints: &SelectionConstraints,
    rng: &mut SmallRng,
) -> Option<UnitTypeId> {
    select_combat_unit(
        catalog,
        stats,
        UnitCategory::StationaryDefence,
        threat,
        criteria,
        constraints,
        rng,
    )
}

/// Select stationary artillery: range and power against cost.
pub fn select_artillery(
    catalog: &BuildCatalog,
    stats: &TypeStatsTable,
    cost_weight: f32,
    range_weight: f32,
    constraints: &SelectionConstraints,
    rng: &mut SmallRng,
) -> Option<UnitTypeId> {
    rate_structures(
        catalog,
        stats,
        UnitCategory::StationaryArtillery,
        constraints,
        rng,
        |def, maxima| {
            range_weight * def.range / maxima.range - cost_weight * def.cost / maxima.cost
        },
    )
}

/// Select a sensor structure (radar or jammer) by coverage against cost.
pub fn select_sensor(
    catalog: &BuildCatalog,
    stats: &TypeStatsTable,
    category: UnitCategory,
    cost_weight: f32,
    constraints: &SelectionConstraints,
    rng: &mut SmallRng,
) -> Option<UnitTypeId> {
    rate_structures(catalog, stats, category, constraints, rng, |def, maxima| {
        def.sensor_range / maxima.sensor - cost_weight * def.cost / maxima.cost
    })
}

/// Select an air base: cheapest buildable pad.
pub fn select_air_base(
    catalog: &BuildCatalog,
    stats: &TypeStatsTable,
    constraints: &SelectionConstraints,
    rng: &mut SmallRng,
) -> Option<UnitTypeId> {
    rate_structures(
        catalog,
        stats,
        UnitCategory::AirBase,
        constraints,
        rng,
        |def, maxima| 1.0 - def.cost / maxima.cost,
    )
}

/// Select a scout: sensor coverage and speed against cost.
pub fn select_scout(
    catalog: &BuildCatalog,
    stats: &TypeStatsTable,
    cost_weight: f32,
    constraints: &SelectionConstraints,
    rng: &mut SmallRng,
) -> Option<UnitTypeId> {
    rate_structures(
        catalog,
        stats,
        UnitCategory::Scout,
        constraints,
        rng,
        |def, maxima| {
            def.sensor_range / maxima.sensor + 0.5 * def.speed / maxima.speed
                - cost_weight * def.cost / maxima.cost
        },
    )
}

/// Rate candidate constructors for producing `target`: construction speed
/// and mobility against cost. Used when the scheduler has to request the
/// missing prerequisite of an unbuildable selection.
pub fn select_constructor_for(
    catalog: &BuildCatalog,
    stats: &TypeStatsTable,
    target: UnitTypeId,
    constraints: &SelectionConstraints,
    rng: &mut SmallRng,
) -> Option<UnitTypeId> {
    let candidates = catalog.builders_of(target);
    if candidates.is_empty() {
        return None;
    }

    let mut max_cost = 1.0_f32;
    let mut max_build_speed = 1.0_f32;
    for id in candidates {
        if let Ok(def) = catalog.get(*id) {
            max_cost = max_cost.max(def.cost);
            max_build_speed = max_build_speed.max(def.build_speed);
        }
    }

    let mut best = None;
    let mut best_score = EXCLUDED;
    for id in candidates {
        // a constructor nothing can produce (the commander) cannot be
        // requested, only inherited
        if catalog.builders_of(*id).is_empty() {
            continue;
        }
        let mut local = *constraints;
        // a prerequisite request may itself cascade, so buildability is
        // checked by the caller, not here
        local.must_be_buildable = false;
        let score = if passes_filters(catalog, stats, *id, &local) {
            let def = catalog.get(*id).ok()?;
            def.build_speed / max_build_speed - 0.5 * def.cost / max_cost
                + jitter(rng, constraints.randomness)
        } else {
            EXCLUDED
        };
        if score > best_score {
            best_score = score;
            best = Some(*id);
        }
    }
    best.filter(|_| best_score > EXCLUDED)
}

/// Normalization maxima for structure rating closures.
struct StructureMaxima {
    cost: f32,
    build_time: f32,
    production: f32,
    storage: f32,
    sensor: f32,
    range: f32,
    speed: f32,
    conversion: f32,
}

fn rate_structures<F>(
    catalog: &BuildCatalog,
    stats: &TypeStatsTable,
    category: UnitCategory,
    constraints: &SelectionConstraints,
    rng: &mut SmallRng,
    score_fn: F,
) -> Option<UnitTypeId>
where
    F: Fn(&crate::catalog::UnitTypeData, &StructureMaxima) -> f32,
{
    let candidates = catalog.of_category(category);
    if candidates.is_empty() {
        return None;
    }

    let mut maxima = StructureMaxima {
        cost: 1.0,
        build_time: 1.0,
        production: 1.0,
        storage: 1.0,
        sensor: 1.0,
        range: 1.0,
        speed: 1.0,
        conversion: 1.0,
    };
    for id in candidates {
        if let Ok(def) = catalog.get(*id) {
            maxima.cost = maxima.cost.max(def.cost);
            maxima.build_time = maxima.build_time.max(def.build_time);
            maxima.production = maxima
                .production
                .max(def.energy_production.max(def.metal_production));
            maxima.storage = maxima.storage.max(def.storage_capacity);
            maxima.sensor = maxima.sensor.max(def.sensor_range);
            maxima.range = maxima.range.max(def.range);
            maxima.speed = maxima.speed.max(def.speed);
            let upkeep = (-def.energy_production).max(1.0);
            maxima.conversion = maxima.conversion.max(def.metal_production / upkeep);
        }
    }

    let mut best = None;
    let mut best_score = EXCLUDED;
    for id in candidates {
        let score = if passes_filters(catalog, stats, *id, constraints) {
            let def = catalog.get(*id).ok()?;
            score_fn(def, &maxima) + jitter(rng, constraints.randomness)
        } else {
            EXCLUDED
        };
        if score > best_score {
            best_score = score;
            best = Some(*id);
        }
    }
    best.filter(|_| best_score > EXCLUDED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::UnitTypeData;
    use crate::config::AiConfig;
    use crate::types::MovementDomain;
    use rand::SeedableRng;
    use std::rc::Rc;

    fn catalog() -> Rc<BuildCatalog> {
        let cheap_tank = UnitTypeData::new(
            UnitTypeId(1),
            "cheap-tank",
            UnitCategory::GroundAssault,
            MovementDomain::Ground,
            100.0,
            150.0,
        )
        .with_speed(3.0)
        .with_range(200.0);
        let heavy_tank = UnitTypeData::new(
            UnitTypeId(2),
            "heavy-tank",
            UnitCategory::GroundAssault,
            MovementDomain::Ground,
            900.0,
            700.0,
        )
        .with_speed(1.5)
        .with_range(400.0);
        let small_plant = UnitTypeData::new(
            UnitTypeId(3),
            "small-plant",
            UnitCategory::PowerPlant,
            MovementDomain::Static,
            150.0,
            200.0,
        )
        .with_production(0.0, 20.0);
        let big_plant = UnitTypeData::new(
            UnitTypeId(4),
            "big-plant",
            UnitCategory::PowerPlant,
            MovementDomain::Static,
            1200.0,
            1800.0,
        )
        .with_production(0.0, 300.0);
        let factory = UnitTypeData::new(
            UnitTypeId(5),
            "factory",
            UnitCategory::StationaryConstructor,
            MovementDomain::Static,
            700.0,
            900.0,
        )
        .with_construction(90.0, vec![UnitTypeId(1), UnitTypeId(2)]);
        let builder = UnitTypeData::new(
            UnitTypeId(6),
            "builder",
            UnitCategory::MobileConstructor,
            MovementDomain::Ground,
            120.0,
            250.0,
        )
        .with_speed(1.8)
        .with_construction(60.0, vec![UnitTypeId(5)]);
        BuildCatalog::from_types(vec![
            cheap_tank, heavy_tank, small_plant, big_plant, factory, builder,
        ])
    }

    fn stats_with_builders(catalog: &Rc<BuildCatalog>) -> TypeStatsTable {
        let mut stats = TypeStatsTable::new(Rc::clone(catalog), &AiConfig::default());
        for id in [1, 2, 3, 4, 5, 6] {
            stats.get_mut(UnitTypeId(id)).unwrap().constructors_available = 1;
        }
        stats
    }

    fn rng(seed: u64) -> SmallRng {
        SmallRng::seed_from_u64(seed)
    }

    fn uniform_threat() -> [f32; COMBAT_CATEGORIES] {
        [1.0; COMBAT_CATEGORIES]
    }

    #[test]
    fn same_seed_same_choice() {
        let catalog = catalog();
        let stats = stats_with_builders(&catalog);
        let threat = uniform_threat();
        let criteria = CombatCriteria::default();
        let constraints = SelectionConstraints::default();

        let a = select_combat_unit(
            &catalog,
            &stats,
            UnitCategory::GroundAssault,
            &threat,
            &criteria,
            &constraints,
            &mut rng(42),
        );
        let b = select_combat_unit(
            &catalog,
            &stats,
            UnitCategory::GroundAssault,
            &threat,
            &criteria,
            &constraints,
            &mut rng(42),
        );
        assert!(a.is_some());
        assert_eq!(a, b);
    }

    #[test]
    fn unbuildable_candidates_are_excluded() {
        let catalog = catalog();
        let stats = TypeStatsTable::new(Rc::clone(&catalog), &AiConfig::default());
        // no constructors registered anywhere
        let picked = select_combat_unit(
            &catalog,
            &stats,
            UnitCategory::GroundAssault,
            &uniform_threat(),
            &CombatCriteria::default(),
            &SelectionConstraints::default(),
            &mut rng(1),
        );
        assert!(picked.is_none());

        // lifting the buildability requirement brings candidates back
        let constraints = SelectionConstraints {
            must_be_buildable: false,
            ..SelectionConstraints::default()
        };
        assert!(select_combat_unit(
            &catalog,
            &stats,
            UnitCategory::GroundAssault,
            &uniform_threat(),
            &CombatCriteria::default(),
            &constraints,
            &mut rng(1),
        )
        .is_some());
    }

    #[test]
    fn cost_ceiling_excludes_expensive_types() {
        let catalog = catalog();
        let stats = stats_with_builders(&catalog);
        let constraints = SelectionConstraints {
            max_cost: 200.0,
            randomness: 1,
            ..SelectionConstraints::default()
        };
        let picked = select_combat_unit(
            &catalog,
            &stats,
            UnitCategory::GroundAssault,
            &uniform_threat(),
            &CombatCriteria::default(),
            &constraints,
            &mut rng(1),
        );
        assert_eq!(picked, Some(UnitTypeId(1)));
    }

    #[test]
    fn efficiency_learning_steers_selection() {
        let catalog = catalog();
        let mut stats = stats_with_builders(&catalog);
        // the heavy tank has proven vastly more effective vs ground
        stats.get_mut(UnitTypeId(2)).unwrap().efficiency
            [CombatCategory::Ground.index()] = 50.0;

        let mut threat = [0.0; COMBAT_CATEGORIES];
        threat[CombatCategory::Ground.index()] = 1.0;
        let criteria = CombatCriteria {
            power: 2.0,
            efficiency: 1.0,
            cost: 0.5,
            speed: 0.0,
            range: 0.0,
        };
        let constraints = SelectionConstraints {
            randomness: 1,
            ..SelectionConstraints::default()
        };
        let picked = select_combat_unit(
            &catalog,
            &stats,
            UnitCategory::GroundAssault,
            &threat,
            &criteria,
            &constraints,
            &mut rng(7),
        );
        assert_eq!(picked, Some(UnitTypeId(2)));
    }

    #[test]
    fn urgency_prefers_quick_plants() {
        let catalog = catalog();
        let stats = stats_with_builders(&catalog);
        let constraints = SelectionConstraints {
            randomness: 1,
            ..SelectionConstraints::default()
        };

        let urgent = select_power_plant(&catalog, &stats, 1.0, 4.0, &constraints, &mut rng(3));
        assert_eq!(urgent, Some(UnitTypeId(3)));

        let relaxed = select_power_plant(&catalog, &stats, 0.2, 0.0, &constraints, &mut rng(3));
        assert_eq!(relaxed, Some(UnitTypeId(4)));
    }

    #[test]
    fn empty_category_yields_none() {
        let catalog = catalog();
        let stats = stats_with_builders(&catalog);
        assert!(select_sensor(
            &catalog,
            &stats,
            UnitCategory::Radar,
            0.5,
            &SelectionConstraints::default(),
            &mut rng(1),
        )
        .is_none());
    }

    #[test]
    fn constructor_request_rates_factories() {
        let catalog = catalog();
        let stats = TypeStatsTable::new(Rc::clone(&catalog), &AiConfig::default());
        let picked = select_constructor_for(
            &catalog,
            &stats,
            UnitTypeId(1),
            &SelectionConstraints::default(),
            &mut rng(5),
        );
        assert_eq!(picked, Some(UnitTypeId(5)));
        // nothing can build the factory itself in this catalog
        assert!(select_constructor_for(
            &catalog,
            &stats,
            UnitTypeId(5),
            &SelectionConstraints::default(),
            &mut rng(5),
        )
        .is_none());
    }

    #[test]
    fn selection_never_mutates_state() {
        let catalog = catalog();
        let stats = stats_with_builders(&catalog);
        let before: Vec<_> = stats.iter().map(|(id, s)| (*id, s.clone())).collect();
        let _ = select_combat_unit(
            &catalog,
            &stats,
            UnitCategory::GroundAssault,
            &uniform_threat(),
            &CombatCriteria::default(),
            &SelectionConstraints::default(),
            &mut rng(9),
        );
        let after: Vec<_> = stats.iter().map(|(id, s)| (*id, s.clone())).collect();
        assert_eq!(before.len(), after.len());
        for ((id_a, a), (id_b, b)) in before.iter().zip(after.iter()) {
            assert_eq!(id_a, id_b);
            assert_eq!(a.efficiency, b.efficiency);
            assert_eq!(a.active, b.active);
        }
    }
}
