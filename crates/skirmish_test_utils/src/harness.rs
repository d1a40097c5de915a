//! Scripted host harness.
//!
//! Stands in for the engine-side shims: records every order the core
//! issues, and optionally plays the role of the simulation by completing
//! construction orders after a short delay (created + finished events fed
//! back into the facade). This closes the core's feedback loop well enough
//! for end-to-end scenario tests without a game engine.

use std::cell::RefCell;
use std::rc::Rc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use skirmish_core::prelude::*;

/// A declarative scenario: how long to run and on what income. Shipped as
/// RON so test matrices can be data files rather than code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name, for logging.
    pub name: String,
    /// Ticks to simulate.
    pub ticks: u64,
    /// Constant metal income per tick.
    pub metal_income: f32,
    /// Constant energy income per tick.
    pub energy_income: f32,
    /// Metal spots seeded into the grid.
    pub metal_spots: Vec<(f32, f32)>,
}

impl Scenario {
    /// Parse a scenario from RON text.
    ///
    /// # Errors
    ///
    /// Returns the RON parse error unchanged.
    pub fn from_ron(text: &str) -> std::result::Result<Self, ron::error::SpannedError> {
        ron::from_str(text)
    }

    /// The income snapshot this scenario feeds each tick.
    #[must_use]
    pub fn income(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            metal_income: self.metal_income,
            energy_income: self.energy_income,
            ..ResourceSnapshot::default()
        }
    }
}

/// A recording command sink sharing its log with the test.
pub struct RecordingSink {
    log: Rc<RefCell<Vec<IssuedCommand>>>,
}

impl CommandSink for RecordingSink {
    fn issue(&mut self, command: IssuedCommand) {
        self.log.borrow_mut().push(command);
    }
}

/// Scripted host: drives the facade tick by tick and feeds construction
/// completions back.
pub struct ScriptedHost {
    /// The AI under test.
    pub ai: SkirmishAi,
    log: Rc<RefCell<Vec<IssuedCommand>>>,
    /// How many orders have already been replayed into the AI.
    replayed: usize,
    next_unit: u32,
    rng: SmallRng,
    /// When true, build orders complete instantly (created + finished).
    pub auto_complete: bool,
}

impl ScriptedHost {
    /// Create a host around a fresh AI on an `x × y` sector map.
    #[must_use]
    pub fn new(catalog: Rc<BuildCatalog>, config: AiConfig, x_sectors: u32, y_sectors: u32, seed: u64) -> Self {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Box::new(RecordingSink {
            log: Rc::clone(&log),
        });
        let ai = SkirmishAi::new(catalog, config, sink, x_sectors, y_sectors, seed);
        Self {
            ai,
            log,
            replayed: 0,
            next_unit: 1000,
            rng: SmallRng::seed_from_u64(seed),
            auto_complete: true,
        }
    }

    /// Plant metal spots into the AI's grid via the terrain-analysis
    /// handoff, as the external analyzer would.
    pub fn seed_metal_spots(&mut self, spots: &[WorldPos]) {
        let mut cache = MapCache::capture(self.ai.grid());
        for sector in &mut cache.sectors {
            sector.metal_spots.clear();
        }
        for pos in spots {
            if let Some(coord) = self.ai.grid().sector_at(*pos) {
                if let Some(sector) = cache.sectors.iter_mut().find(|s| s.coord == coord) {
                    sector.metal_spots.push(*pos);
                }
            }
        }
        self.ai.apply_terrain(&cache);
    }

    /// Spawn a finished own unit directly (starting forces).
    pub fn spawn(&mut self, unit_type: UnitTypeId, pos: WorldPos) -> UnitId {
        let id = UnitId(self.next_unit);
        self.next_unit += 1;
        self.ai.unit_created(id, unit_type, pos, None);
        self.ai.unit_finished(id);
        id
    }

    /// Run `ticks` simulation ticks with a constant income, completing
    /// build orders as they are issued.
    pub fn run(&mut self, ticks: u64, income: ResourceSnapshot) {
        for _ in 0..ticks {
            self.ai.frame_tick(income);
            if self.auto_complete {
                self.complete_builds();
            }
        }
    }

    /// Run a declarative [`Scenario`]: seed its metal spots, then simulate.
    pub fn run_scenario(&mut self, scenario: &Scenario) {
        tracing::debug!(name = %scenario.name, ticks = scenario.ticks, "running scenario");
        let spots: Vec<WorldPos> = scenario
            .metal_spots
            .iter()
            .map(|(x, z)| WorldPos::new(*x, *z))
            .collect();
        self.seed_metal_spots(&spots);
        self.run(scenario.ticks, scenario.income());
    }

    fn complete_builds(&mut self) {
        let pending: Vec<(UnitId, UnitTypeId, WorldPos)> = {
            let log = self.log.borrow();
            log[self.replayed..]
                .iter()
                .filter_map(|c| match c.command {
                    AiCommand::Build { unit_type, pos } => Some((c.unit, unit_type, pos)),
                    _ => None,
                })
                .collect()
        };
        self.replayed = self.log.borrow().len();

        for (builder, unit_type, pos) in pending {
            let id = UnitId(self.next_unit);
            self.next_unit += 1;
            // slight placement scatter, the way a real engine resolves
            // overlapping sites
            let jitter = self.rng.gen_range(-8..=8) as f32;
            let pos = WorldPos::new(pos.x + jitter, pos.z + jitter);
            self.ai.unit_created(id, unit_type, pos, Some(builder));
            self.ai.unit_finished(id);
            self.ai.unit_idle(builder);
        }
    }

    /// Every order issued so far.
    #[must_use]
    pub fn commands(&self) -> Vec<IssuedCommand> {
        self.log.borrow().clone()
    }

    /// Build orders issued so far, in order, as entity types.
    #[must_use]
    pub fn build_orders(&self) -> Vec<UnitTypeId> {
        self.log
            .borrow()
            .iter()
            .filter_map(|c| match c.command {
                AiCommand::Build { unit_type, .. } => Some(unit_type),
                _ => None,
            })
            .collect()
    }
}
