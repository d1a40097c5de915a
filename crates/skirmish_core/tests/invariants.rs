//! Property tests for the core invariants.

use proptest::prelude::*;

use skirmish_core::config::AiConfig;
use skirmish_core::map::{SectorCoord, SectorGrid};
use skirmish_core::scheduler::{BuildCategory, UrgencyTable};

proptest! {
    /// For all base sets: `distance_to_base == 0` iff the sector is in the
    /// base, and every sector at distance k > 0 has a neighbour at k - 1.
    #[test]
    fn distance_field_is_consistent(
        base in proptest::collection::btree_set((0u32..6, 0u32..6), 1..8)
    ) {
        let config = AiConfig::default();
        let mut grid = SectorGrid::new(6, 6, &config);
        for (x, y) in &base {
            grid.add_to_base(SectorCoord::new(*x, *y));
        }

        for sector in grid.iter() {
            let coord = sector.coord;
            let d = sector.distance_to_base;
            let in_base = base.contains(&(coord.x, coord.y));
            prop_assert_eq!(d == 0, in_base);
            if d > 0 {
                let relaxed = grid
                    .neighbours(coord)
                    .iter()
                    .any(|n| grid.sector(*n).unwrap().distance_to_base == d - 1);
                prop_assert!(relaxed, "sector at distance {} has no closer neighbour", d);
            }
        }
    }

    /// Removing everything again leaves the whole grid unreached.
    #[test]
    fn empty_base_has_no_distances(
        base in proptest::collection::btree_set((0u32..4, 0u32..4), 1..5)
    ) {
        let config = AiConfig::default();
        let mut grid = SectorGrid::new(4, 4, &config);
        for (x, y) in &base {
            grid.add_to_base(SectorCoord::new(*x, *y));
        }
        for (x, y) in &base {
            grid.remove_from_base(SectorCoord::new(*x, *y));
        }
        for sector in grid.iter() {
            prop_assert_eq!(sector.distance_to_base, -1);
        }
    }

    /// Without a dispatch, urgency never goes negative and never grows by
    /// more than the configured ~3% per pass.
    #[test]
    fn urgency_growth_is_bounded(
        seeds in proptest::collection::vec(0.0f32..30.0, 10),
        passes in 1usize..20
    ) {
        let config = AiConfig::default();
        let mut table = UrgencyTable::default();
        for (category, seed) in BuildCategory::ALL.iter().zip(&seeds) {
            table.merge_max(*category, *seed);
        }

        for _ in 0..passes {
            let before: Vec<f32> = BuildCategory::ALL.iter().map(|c| table.get(*c)).collect();
            table.growth_pass(&config);
            for (category, prev) in BuildCategory::ALL.iter().zip(before) {
                let now = table.get(*category);
                prop_assert!(now >= 0.0);
                prop_assert!(now <= prev * config.urgency_growth + f32::EPSILON);
            }
        }
    }

    /// Selection is a pure function of (catalog, stats, seed): two runs with
    /// the same seed agree.
    #[test]
    fn selection_is_deterministic(seed in 0u64..10_000) {
        use rand::SeedableRng;
        use skirmish_core::catalog::TypeStatsTable;
        use skirmish_core::selector::{
            select_combat_unit, CombatCriteria, SelectionConstraints,
        };
        use skirmish_core::types::{UnitCategory, COMBAT_CATEGORIES};
        use skirmish_test_utils::fixtures::standard_catalog;

        let catalog = standard_catalog();
        let config = AiConfig::default();
        let mut stats = TypeStatsTable::new(std::rc::Rc::clone(&catalog), &config);
        for def in catalog.iter() {
            if let Ok(s) = stats.get_mut(def.id) {
                s.constructors_available = 1;
            }
        }

        let threat = [1.0; COMBAT_CATEGORIES];
        let criteria = CombatCriteria::default();
        let constraints = SelectionConstraints::default();

        let mut rng_a = rand::rngs::SmallRng::seed_from_u64(seed);
        let mut rng_b = rand::rngs::SmallRng::seed_from_u64(seed);
        let a = select_combat_unit(
            &catalog,
            &stats,
            UnitCategory::GroundAssault,
            &threat,
            &criteria,
            &constraints,
            &mut rng_a,
        );
        let b = select_combat_unit(
            &catalog,
            &stats,
            UnitCategory::GroundAssault,
            &threat,
            &criteria,
            &constraints,
            &mut rng_b,
        );
        prop_assert_eq!(a, b);
        prop_assert!(a.is_some());
    }
}
