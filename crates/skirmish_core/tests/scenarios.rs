//! End-to-end scenarios driving the full facade through the scripted host.

use skirmish_core::prelude::*;
use skirmish_test_utils::fixtures::{ids, standard_catalog, stats_with_aa_specialist};
use skirmish_test_utils::harness::ScriptedHost;

fn income() -> ResourceSnapshot {
    ResourceSnapshot {
        metal_income: 2.0,
        energy_income: 25.0,
        ..ResourceSnapshot::default()
    }
}

fn fresh_host(seed: u64) -> ScriptedHost {
    let mut host = ScriptedHost::new(standard_catalog(), AiConfig::default(), 5, 5, seed);
    host.seed_metal_spots(&[
        WorldPos::new(80.0, 80.0),
        WorldPos::new(300.0, 300.0),
        WorldPos::new(700.0, 120.0),
    ]);
    host.ai.init(WorldPos::new(100.0, 100.0));
    host.spawn(ids::COMMANDER, WorldPos::new(100.0, 100.0));
    host
}

/// A freshly initialized AI with one starting sector and zero resources
/// must order metal extraction before any defence: with no active
/// categories, metal urgency dominates from the first pass.
#[test]
fn extraction_comes_before_defence() {
    let mut host = fresh_host(11);
    host.run(2000, income());

    let orders = host.build_orders();
    let first_extractor = orders.iter().position(|t| *t == ids::EXTRACTOR);
    let first_turret = orders.iter().position(|t| *t == ids::TURRET);

    let extractor_at = first_extractor.expect("an extractor must have been ordered");
    if let Some(turret_at) = first_turret {
        assert!(
            extractor_at < turret_at,
            "defence ordered before extraction"
        );
    }
}

/// The economy bootstraps itself: extractor, power plant and factory all
/// appear within the opening minutes.
#[test]
fn economy_bootstraps() {
    let mut host = fresh_host(12);
    host.run(6000, income());

    let orders = host.build_orders();
    assert!(orders.contains(&ids::EXTRACTOR));
    assert!(orders.contains(&ids::POWER_PLANT));
    assert!(orders.contains(&ids::FACTORY));
}

fn spawn_full_tank_group(host: &mut ScriptedHost) {
    for i in 0..12 {
        host.spawn(
            ids::TANK,
            WorldPos::new(120.0 + 10.0 * i as f32, 140.0),
        );
    }
}

fn sight_enemy_structures(host: &mut ScriptedHost, base_pos: WorldPos, count: u32, first_id: u32) {
    for i in 0..count {
        host.ai.enemy_entered_sensor_range(
            UnitId(first_id + i),
            EnemySighting {
                unit_type: ids::TURRET,
                pos: WorldPos::new(base_pos.x + 10.0 * i as f32, base_pos.z),
                mobile: false,
                is_defence: false,
            },
        );
    }
}

/// Sectors without enemy structures are never attack targets: every attack
/// launched over the whole run aims at the one sector that holds them.
#[test]
fn enemy_free_sectors_are_never_attacked() {
    let mut host = fresh_host(13);
    host.auto_complete = false;
    spawn_full_tank_group(&mut host);
    // enemy structures only in sector (2, 0)
    sight_enemy_structures(&mut host, WorldPos::new(1100.0, 100.0), 3, 9000);

    let target = host.ai.grid().sector_at(WorldPos::new(1100.0, 100.0)).unwrap();
    let mut saw_attack = false;
    for _ in 0..4000 {
        host.run(1, ResourceSnapshot::default());
        for attack in host.ai.attacks().attacks() {
            saw_attack = true;
            assert_eq!(attack.target, target, "attacked an enemy-free sector");
        }
    }
    assert!(saw_attack, "an attack should have been launched");
}

/// With no enemies sighted anywhere, no attack ever launches.
#[test]
fn no_enemies_no_attacks() {
    let mut host = fresh_host(14);
    host.auto_complete = false;
    spawn_full_tank_group(&mut host);
    host.run(4000, ResourceSnapshot::default());
    assert!(host.ai.attacks().is_empty());
}

/// An attack whose groups fall behind the defenders' power fails, retreats
/// its groups, and is unregistered.
#[test]
fn outgunned_attack_retreats() {
    let mut host = fresh_host(15);
    host.auto_complete = false;
    spawn_full_tank_group(&mut host);
    sight_enemy_structures(&mut host, WorldPos::new(1100.0, 100.0), 3, 9000);

    // run until the attack is in flight
    let mut launched_at = None;
    for tick in 0..4000 {
        host.run(1, ResourceSnapshot::default());
        if !host.ai.attacks().is_empty() {
            launched_at = Some(tick);
            break;
        }
    }
    assert!(launched_at.is_some(), "attack never launched");

    // a wall of defences appears in the target sector
    for i in 0..40 {
        host.ai.enemy_entered_sensor_range(
            UnitId(9500 + i),
            EnemySighting {
                unit_type: ids::TURRET,
                pos: WorldPos::new(1100.0 + 5.0 * i as f32, 140.0),
                mobile: false,
                is_defence: true,
            },
        );
    }

    // sensor refresh and the next coordination pass drop the attack
    host.run(2000, ResourceSnapshot::default());
    assert!(host.ai.attacks().is_empty(), "failed attack still in flight");

    let retreating = host
        .ai
        .groups()
        .iter()
        .filter(|g| g.task == skirmish_core::group::GroupTask::Retreating)
        .count();
    assert!(retreating > 0, "no group retreated");
}

/// Types whose learned anti-air efficiency dwarfs their surface efficiency
/// form escort groups rather than assault groups.
#[test]
fn flak_bots_classify_as_anti_air() {
    let catalog = standard_catalog();
    let config = AiConfig::default();
    // verify the fixture's flak bot really classifies as anti-air
    let stats = stats_with_aa_specialist(&catalog, &config);
    let def = catalog.get(ids::AA_BOT).unwrap();
    assert_eq!(
        skirmish_core::group::GroupRole::classify(def, &stats, &config),
        skirmish_core::group::GroupRole::AntiAir
    );
}

/// Destroyed units feed the sector threat statistics and the learning loop.
#[test]
fn losses_update_threat_statistics() {
    let mut host = fresh_host(16);
    let extractor = host.spawn(ids::EXTRACTOR, WorldPos::new(80.0, 80.0));

    host.ai.unit_destroyed(extractor, Some(ids::TANK));

    let sector = host.ai.grid().sector(SectorCoord::new(0, 0)).unwrap();
    let ground_slot = 0; // CombatCategory::ASSAULT order starts with Ground
    assert!(sector.attacked_by[ground_slot].current > 0.0);
}
