//! Catalog and grid fixtures.
//!
//! A small but complete tech tree covering every construction category the
//! scheduler knows, plus helpers to set up grids with metal spots.

use std::rc::Rc;

use skirmish_core::prelude::*;

/// Type ids used by the standard catalog, named for readable tests.
pub mod ids {
    use skirmish_core::types::UnitTypeId;

    /// The starting commander.
    pub const COMMANDER: UnitTypeId = UnitTypeId(1);
    /// Metal extractor.
    pub const EXTRACTOR: UnitTypeId = UnitTypeId(2);
    /// Power plant.
    pub const POWER_PLANT: UnitTypeId = UnitTypeId(3);
    /// Ground factory.
    pub const FACTORY: UnitTypeId = UnitTypeId(4);
    /// Mobile builder.
    pub const BUILDER: UnitTypeId = UnitTypeId(5);
    /// Ground tank.
    pub const TANK: UnitTypeId = UnitTypeId(6);
    /// Anti-air bot.
    pub const AA_BOT: UnitTypeId = UnitTypeId(7);
    /// Defence turret.
    pub const TURRET: UnitTypeId = UnitTypeId(8);
    /// Radar tower.
    pub const RADAR: UnitTypeId = UnitTypeId(9);
    /// Jammer tower.
    pub const JAMMER: UnitTypeId = UnitTypeId(10);
    /// Stationary artillery.
    pub const ARTILLERY: UnitTypeId = UnitTypeId(11);
    /// Metal storage.
    pub const STORAGE: UnitTypeId = UnitTypeId(12);
    /// Metal maker.
    pub const METAL_MAKER: UnitTypeId = UnitTypeId(13);
    /// Scout bot.
    pub const SCOUT: UnitTypeId = UnitTypeId(14);
}

/// A complete single-side tech tree: the commander builds the economy and
/// the factory; the factory produces the mobile units; the builder covers
/// everything the commander can plus artillery and air support.
#[must_use]
pub fn standard_catalog() -> Rc<BuildCatalog> {
    use ids::*;

    let economy = vec![
        EXTRACTOR, POWER_PLANT, FACTORY, TURRET, RADAR, JAMMER, ARTILLERY, STORAGE, METAL_MAKER,
    ];

    let commander = UnitTypeData::new(
        COMMANDER,
        "commander",
        UnitCategory::Commander,
        MovementDomain::Amphibious,
        2500.0,
        10_000.0,
    )
    .with_speed(1.2)
    .with_construction(300.0, economy.clone());

    let extractor = UnitTypeData::new(
        EXTRACTOR,
        "metal-extractor",
        UnitCategory::Extractor,
        MovementDomain::Static,
        50.0,
        300.0,
    )
    .with_production(2.0, 0.0);

    let power_plant = UnitTypeData::new(
        POWER_PLANT,
        "solar-collector",
        UnitCategory::PowerPlant,
        MovementDomain::Static,
        150.0,
        500.0,
    )
    .with_production(0.0, 25.0);

    let factory = UnitTypeData::new(
        FACTORY,
        "vehicle-plant",
        UnitCategory::StationaryConstructor,
        MovementDomain::Static,
        600.0,
        1500.0,
    )
    .with_construction(100.0, vec![BUILDER, TANK, AA_BOT, SCOUT]);

    let builder = UnitTypeData::new(
        BUILDER,
        "construction-vehicle",
        UnitCategory::MobileConstructor,
        MovementDomain::Ground,
        110.0,
        350.0,
    )
    .with_speed(1.8)
    .with_construction(80.0, economy);

    let tank = UnitTypeData::new(
        TANK,
        "medium-tank",
        UnitCategory::GroundAssault,
        MovementDomain::Ground,
        120.0,
        400.0,
    )
    .with_speed(2.5)
    .with_range(220.0);

    let aa_bot = UnitTypeData::new(
        AA_BOT,
        "flak-bot",
        UnitCategory::GroundAssault,
        MovementDomain::Ground,
        140.0,
        420.0,
    )
    .with_speed(2.2)
    .with_range(350.0);

    let turret = UnitTypeData::new(
        TURRET,
        "light-laser-tower",
        UnitCategory::StationaryDefence,
        MovementDomain::Static,
        200.0,
        600.0,
    )
    .with_range(420.0);

    let radar = UnitTypeData::new(
        RADAR,
        "radar-tower",
        UnitCategory::Radar,
        MovementDomain::Static,
        60.0,
        250.0,
    )
    .with_sensor_range(1800.0);

    let jammer = UnitTypeData::new(
        JAMMER,
        "jammer-tower",
        UnitCategory::Jammer,
        MovementDomain::Static,
        90.0,
        300.0,
    )
    .with_sensor_range(900.0);

    let artillery = UnitTypeData::new(
        ARTILLERY,
        "plasma-battery",
        UnitCategory::StationaryArtillery,
        MovementDomain::Static,
        900.0,
        2200.0,
    )
    .with_range(1200.0);

    let storage = UnitTypeData::new(
        STORAGE,
        "metal-storage",
        UnitCategory::Storage,
        MovementDomain::Static,
        250.0,
        700.0,
    )
    .with_storage(3000.0);

    let metal_maker = UnitTypeData::new(
        METAL_MAKER,
        "metal-maker",
        UnitCategory::MetalMaker,
        MovementDomain::Static,
        180.0,
        550.0,
    )
    .with_production(1.0, -60.0);

    let scout = UnitTypeData::new(
        SCOUT,
        "scout-bot",
        UnitCategory::Scout,
        MovementDomain::Ground,
        40.0,
        150.0,
    )
    .with_speed(4.5)
    .with_sensor_range(700.0);

    BuildCatalog::from_types(vec![
        commander,
        extractor,
        power_plant,
        factory,
        builder,
        tank,
        aa_bot,
        turret,
        radar,
        jammer,
        artillery,
        storage,
        metal_maker,
        scout,
    ])
}

/// An anti-air-leaning stats table: the flak bot's learned efficiency vs air
/// is boosted so it classifies into the anti-air group role.
#[must_use]
pub fn stats_with_aa_specialist(catalog: &Rc<BuildCatalog>, config: &AiConfig) -> TypeStatsTable {
    let mut stats = TypeStatsTable::new(Rc::clone(catalog), config);
    if let Ok(s) = stats.get_mut(ids::AA_BOT) {
        s.efficiency[CombatCategory::Air.index()] = 8.0;
    }
    stats.recompute_averages();
    stats
}

/// Round-trip a catalog's definitions through RON, the way data-driven unit
/// sets would be shipped.
#[must_use]
pub fn catalog_via_ron(definitions: &[UnitTypeData]) -> Rc<BuildCatalog> {
    let text = ron::ser::to_string(&definitions.to_vec()).expect("serializable definitions");
    let parsed: Vec<UnitTypeData> = ron::from_str(&text).expect("round-trip");
    BuildCatalog::from_types(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_catalog_covers_all_build_categories() {
        let catalog = standard_catalog();
        for category in [
            UnitCategory::PowerPlant,
            UnitCategory::Extractor,
            UnitCategory::StationaryConstructor,
            UnitCategory::StationaryDefence,
            UnitCategory::Storage,
            UnitCategory::Radar,
            UnitCategory::Jammer,
            UnitCategory::StationaryArtillery,
            UnitCategory::MetalMaker,
        ] {
            assert!(
                !catalog.of_category(category).is_empty(),
                "missing {category:?}"
            );
        }
    }

    #[test]
    fn factory_produces_the_mobile_units() {
        let catalog = standard_catalog();
        let factory = catalog.get(ids::FACTORY).unwrap();
        assert!(factory.can_construct(ids::TANK));
        assert!(factory.can_construct(ids::BUILDER));
        assert_eq!(catalog.builders_of(ids::TANK), &[ids::FACTORY]);
    }

    #[test]
    fn ron_round_trip_preserves_the_catalog() {
        let defs = vec![UnitTypeData::new(
            UnitTypeId(42),
            "test-unit",
            UnitCategory::GroundAssault,
            MovementDomain::Ground,
            100.0,
            200.0,
        )
        .with_speed(2.0)];
        let catalog = catalog_via_ron(&defs);
        assert_eq!(catalog.get(UnitTypeId(42)).unwrap().name, "test-unit");
    }
}
