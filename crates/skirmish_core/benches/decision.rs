//! Decision-path benchmarks for skirmish_core.
//!
//! Run with: `cargo bench -p skirmish_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::SeedableRng;

use skirmish_core::catalog::TypeStatsTable;
use skirmish_core::config::AiConfig;
use skirmish_core::map::{SectorCoord, SectorGrid};
use skirmish_core::selector::{select_combat_unit, CombatCriteria, SelectionConstraints};
use skirmish_core::types::{UnitCategory, COMBAT_CATEGORIES};
use skirmish_test_utils::fixtures::standard_catalog;

/// The full-grid distance relaxation triggered by base changes.
pub fn distance_field_benchmark(c: &mut Criterion) {
    let config = AiConfig::default();
    c.bench_function("base_distance_relaxation_32x32", |b| {
        b.iter(|| {
            let mut grid = SectorGrid::new(32, 32, &config);
            grid.add_to_base(SectorCoord::new(4, 4));
            grid.add_to_base(SectorCoord::new(5, 4));
            black_box(grid.sector(SectorCoord::new(31, 31)).unwrap().distance_to_base)
        })
    });
}

/// One unit-selection query over the standard catalog.
pub fn selection_benchmark(c: &mut Criterion) {
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

    c.bench_function("combat_unit_selection", |b| {
        let mut rng = rand::rngs::SmallRng::seed_from_u64(42);
        b.iter(|| {
            black_box(select_combat_unit(
                &catalog,
                &stats,
                UnitCategory::GroundAssault,
                &threat,
                &criteria,
                &constraints,
                &mut rng,
            ))
        })
    });
}

criterion_group!(benches, distance_field_benchmark, selection_benchmark);
criterion_main!(benches);
