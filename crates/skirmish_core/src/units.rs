//! Live-unit bookkeeping.
//!
//! The registry tracks every own unit the host engine has reported, the
//! per-category active/under-construction/requested counts the scheduler
//! rules read, constructor duties, and the construction tasks that
//! assistants can be matched to.

use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::BuildCatalog;
use crate::types::{
    ContinentId, GroupId, UnitCategory, UnitId, UnitTypeId, WorldPos,
};

/// What a constructor is currently doing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstructorDuty {
    /// Free for assignment.
    Idle,
    /// Building a structure or unit.
    Building {
        /// Type under construction.
        target_type: UnitTypeId,
    },
    /// Guarding another constructor to speed up its build.
    Assisting {
        /// The constructor being helped.
        builder: UnitId,
    },
}

/// A construction order in flight.
#[derive(Debug, Clone)]
pub struct BuildTask {
    /// Constructor executing the order.
    pub builder: UnitId,
    /// Type being built.
    pub target_type: UnitTypeId,
    /// Category of the type being built.
    pub category: UnitCategory,
    /// Placement position.
    pub pos: WorldPos,
    /// The entity under construction, once the host reports it.
    pub target_unit: Option<UnitId>,
    /// Tick the order was issued.
    pub started: u64,
    /// Total build effort of the target type.
    pub build_time: f32,
    /// Assistants attached to this task.
    pub assistants: BTreeSet<UnitId>,
}

impl BuildTask {
    /// Rough remaining effort, assuming one work unit per tick per builder.
    /// Used only to rank tasks for assistance.
    #[must_use]
    pub fn remaining(&self, tick: u64) -> f32 {
        let workers = 1 + self.assistants.len();
        self.build_time - tick.saturating_sub(self.started) as f32 * workers as f32
    }
}

/// One live own unit.
#[derive(Debug, Clone)]
pub struct UnitRecord {
    /// Host-assigned unit id.
    pub id: UnitId,
    /// Entity type.
    pub unit_type: UnitTypeId,
    /// Classification, cached from the catalog.
    pub category: UnitCategory,
    /// Last known position.
    pub pos: WorldPos,
    /// Continent the unit sits on, when continent-bound.
    pub continent: Option<ContinentId>,
    /// Combat group membership.
    pub group: Option<GroupId>,
    /// Whether construction of this unit has finished.
    pub finished: bool,
}

/// Per-category counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryCounts {
    /// Finished and alive.
    pub active: u32,
    /// Reported by the host, still being built.
    pub under_construction: u32,
    /// Ordered, not yet reported.
    pub requested: u32,
}

impl CategoryCounts {
    /// Units that exist or will exist soon.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.active + self.under_construction + self.requested
    }

    /// Units on the way but not finished.
    #[must_use]
    pub fn future(&self) -> u32 {
        self.under_construction + self.requested
    }
}

/// Registry of all own units and in-flight construction.
#[derive(Debug, Default)]
pub struct UnitRegistry {
    units: BTreeMap<UnitId, UnitRecord>,
    counts: BTreeMap<UnitCategory, CategoryCounts>,
    duties: BTreeMap<UnitId, ConstructorDuty>,
    tasks: Vec<BuildTask>,
    metal_makers: BTreeMap<UnitId, bool>,
}

impl UnitRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a unit of this category has been ordered.
    pub fn mark_requested(&mut self, category: UnitCategory) {
        self.counts.entry(category).or_default().requested += 1;
    }

    /// Drop one pending request (order failed or was superseded).
    pub fn unmark_requested(&mut self, category: UnitCategory) {
        let counts = self.counts.entry(category).or_default();
        counts.requested = counts.requested.saturating_sub(1);
    }

    /// The host reported a new unit entering construction.
    pub fn on_created(
        &mut self,
        id: UnitId,
        unit_type: UnitTypeId,
        category: UnitCategory,
        pos: WorldPos,
        builder: Option<UnitId>,
    ) {
        let counts = self.counts.entry(category).or_default();
        counts.requested = counts.requested.saturating_sub(1);
        counts.under_construction += 1;

        self.units.insert(
            id,
            UnitRecord {
                id,
                unit_type,
                category,
                pos,
                continent: None,
                group: None,
                finished: false,
            },
        );

        if let Some(builder) = builder {
            if let Some(task) = self.tasks.iter_mut().find(|t| t.builder == builder) {
                task.target_unit = Some(id);
            }
        }
    }

    /// The host reported a unit finishing construction.
    pub fn on_finished(&mut self, id: UnitId) {
        let Some(record) = self.units.get_mut(&id) else {
            return;
        };
        if record.finished {
            return;
        }
        record.finished = true;
        let category = record.category;
        let counts = self.counts.entry(category).or_default();
        counts.under_construction = counts.under_construction.saturating_sub(1);
        counts.active += 1;

        if category.is_constructor() {
            self.duties.insert(id, ConstructorDuty::Idle);
        }
        if category == UnitCategory::MetalMaker {
            self.metal_makers.insert(id, true);
        }

        // the task that produced this unit is complete
        self.finish_tasks_for(id);
    }

    fn finish_tasks_for(&mut self, produced: UnitId) {
        let mut released = Vec::new();
        self.tasks.retain(|task| {
            if task.target_unit == Some(produced) {
                released.push(task.builder);
                released.extend(task.assistants.iter().copied());
                false
            } else {
                true
            }
        });
        for unit in released {
            if self.duties.contains_key(&unit) {
                self.duties.insert(unit, ConstructorDuty::Idle);
            }
        }
    }

    /// The host reported a unit destroyed. Returns its record.
    pub fn on_destroyed(&mut self, id: UnitId) -> Option<UnitRecord> {
        let record = self.units.remove(&id)?;
        let counts = self.counts.entry(record.category).or_default();
        if record.finished {
            counts.active = counts.active.saturating_sub(1);
        } else {
            counts.under_construction = counts.under_construction.saturating_sub(1);
        }
        self.duties.remove(&id);
        self.metal_makers.remove(&id);

        // a dead builder abandons its task; a dead assistant detaches
        let mut released = Vec::new();
        self.tasks.retain(|task| {
            if task.builder == id {
                released.extend(task.assistants.iter().copied());
                false
            } else {
                true
            }
        });
        for task in &mut self.tasks {
            task.assistants.remove(&id);
        }
        for unit in released {
            if self.duties.contains_key(&unit) {
                self.duties.insert(unit, ConstructorDuty::Idle);
            }
        }
        Some(record)
    }

    /// Look up a unit record.
    #[must_use]
    pub fn get(&self, id: UnitId) -> Option<&UnitRecord> {
        self.units.get(&id)
    }

    /// Mutable unit record access.
    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut UnitRecord> {
        self.units.get_mut(&id)
    }

    /// Counters for one category.
    #[must_use]
    pub fn counts(&self, category: UnitCategory) -> CategoryCounts {
        self.counts.get(&category).copied().unwrap_or_default()
    }

    /// Active factories across all factory types.
    #[must_use]
    pub fn active_factories(&self) -> u32 {
        self.counts(UnitCategory::StationaryConstructor).active
    }

    /// Iterate over all unit records in id order.
    pub fn iter(&self) -> impl Iterator<Item = &UnitRecord> {
        self.units.values()
    }

    /// Current duty of a constructor.
    #[must_use]
    pub fn duty(&self, id: UnitId) -> Option<ConstructorDuty> {
        self.duties.get(&id).copied()
    }

    /// Assign a duty to a constructor.
    pub fn set_duty(&mut self, id: UnitId, duty: ConstructorDuty) {
        if self.duties.contains_key(&id) {
            self.duties.insert(id, duty);
        }
    }

    /// Register a new construction task.
    pub fn add_task(&mut self, task: BuildTask) {
        self.duties.insert(
            task.builder,
            ConstructorDuty::Building {
                target_type: task.target_type,
            },
        );
        self.tasks.push(task);
    }

    /// All tasks in flight.
    #[must_use]
    pub fn tasks(&self) -> &[BuildTask] {
        &self.tasks
    }

    /// Attach an assistant to the task run by `builder`.
    pub fn attach_assistant(&mut self, builder: UnitId, assistant: UnitId) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.builder == builder) {
            task.assistants.insert(assistant);
            self.duties
                .insert(assistant, ConstructorDuty::Assisting { builder });
        }
    }

    /// The in-flight task of `category` with the most remaining effort and
    /// room for another assistant.
    #[must_use]
    pub fn assistable_task(
        &self,
        category: UnitCategory,
        max_assistants: usize,
        tick: u64,
    ) -> Option<&BuildTask> {
        self.tasks
            .iter()
            .filter(|t| t.category == category && t.assistants.len() < max_assistants)
            .max_by(|a, b| {
                a.remaining(tick)
                    .partial_cmp(&b.remaining(tick))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    /// Nearest idle constructor able to build `target_type`. Continent-bound
    /// constructors only qualify when they share the target's continent; the
    /// distance metric is divided by movement speed so fast builders win
    /// over marginally closer slow ones.
    #[must_use]
    pub fn nearest_available_builder(
        &self,
        catalog: &BuildCatalog,
        target_type: UnitTypeId,
        pos: WorldPos,
        continent: Option<ContinentId>,
    ) -> Option<UnitId> {
        let mut best = None;
        let mut best_metric = f32::MAX;
        for record in self.units.values() {
            if !record.finished || !record.category.is_constructor() {
                continue;
            }
            if self.duty(record.id) != Some(ConstructorDuty::Idle) {
                continue;
            }
            let Ok(def) = catalog.get(record.unit_type) else {
                continue;
            };
            if !def.can_construct(target_type) {
                continue;
            }
            if def.movement.continent_bound()
                && continent.is_some()
                && record.continent != continent
            {
                continue;
            }
            let speed = def.speed.max(1.0);
            let metric = record.pos.distance(pos) / speed;
            if metric < best_metric {
                best_metric = metric;
                best = Some(record.id);
            }
        }
        best
    }

    /// Nearest idle constructor that can assist (any mobile builder).
    #[must_use]
    pub fn closest_assistant(
        &self,
        catalog: &BuildCatalog,
        pos: WorldPos,
        exclude: UnitId,
    ) -> Option<UnitId> {
        let mut best = None;
        let mut best_dist = f32::MAX;
        for record in self.units.values() {
            if record.id == exclude
                || !record.finished
                || record.category != UnitCategory::MobileConstructor
            {
                continue;
            }
            if self.duty(record.id) != Some(ConstructorDuty::Idle) {
                continue;
            }
            if catalog.get(record.unit_type).map_or(0.0, |d| d.build_speed) <= 0.0 {
                continue;
            }
            let dist = record.pos.distance(pos);
            if dist < best_dist {
                best_dist = dist;
                best = Some(record.id);
            }
        }
        best
    }

    /// Metal makers and their tracked on/off state.
    #[must_use]
    pub fn metal_makers(&self) -> &BTreeMap<UnitId, bool> {
        &self.metal_makers
    }

    /// Track a metal maker's on/off state after a toggle order.
    pub fn set_metal_maker_enabled(&mut self, id: UnitId, enabled: bool) {
        if let Some(state) = self.metal_makers.get_mut(&id) {
            *state = enabled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::UnitTypeData;
    use crate::types::MovementDomain;
    use std::rc::Rc;

    fn catalog() -> Rc<BuildCatalog> {
        let builder = UnitTypeData::new(
            UnitTypeId(1),
            "builder",
            UnitCategory::MobileConstructor,
            MovementDomain::Ground,
            120.0,
            200.0,
        )
        .with_speed(2.0)
        .with_construction(10.0, vec![UnitTypeId(2)]);
        let plant = UnitTypeData::new(
            UnitTypeId(2),
            "plant",
            UnitCategory::PowerPlant,
            MovementDomain::Static,
            300.0,
            500.0,
        );
        BuildCatalog::from_types(vec![builder, plant])
    }

    fn registry_with_builder(pos: WorldPos) -> UnitRegistry {
        let mut reg = UnitRegistry::new();
        reg.mark_requested(UnitCategory::MobileConstructor);
        reg.on_created(
            UnitId(10),
            UnitTypeId(1),
            UnitCategory::MobileConstructor,
            pos,
            None,
        );
        reg.on_finished(UnitId(10));
        reg
    }

    #[test]
    fn lifecycle_moves_counts_forward() {
        let mut reg = UnitRegistry::new();
        reg.mark_requested(UnitCategory::PowerPlant);
        assert_eq!(reg.counts(UnitCategory::PowerPlant).requested, 1);

        reg.on_created(
            UnitId(1),
            UnitTypeId(2),
            UnitCategory::PowerPlant,
            WorldPos::ZERO,
            None,
        );
        let counts = reg.counts(UnitCategory::PowerPlant);
        assert_eq!(counts.requested, 0);
        assert_eq!(counts.under_construction, 1);

        reg.on_finished(UnitId(1));
        let counts = reg.counts(UnitCategory::PowerPlant);
        assert_eq!(counts.under_construction, 0);
        assert_eq!(counts.active, 1);

        reg.on_destroyed(UnitId(1));
        assert_eq!(reg.counts(UnitCategory::PowerPlant).active, 0);
    }

    #[test]
    fn counts_never_go_negative() {
        let mut reg = UnitRegistry::new();
        reg.unmark_requested(UnitCategory::PowerPlant);
        assert_eq!(reg.counts(UnitCategory::PowerPlant).requested, 0);
        // destroying an unknown unit is a no-op
        assert!(reg.on_destroyed(UnitId(99)).is_none());
    }

    #[test]
    fn unfinished_units_decrement_under_construction() {
        let mut reg = UnitRegistry::new();
        reg.mark_requested(UnitCategory::PowerPlant);
        reg.on_created(
            UnitId(1),
            UnitTypeId(2),
            UnitCategory::PowerPlant,
            WorldPos::ZERO,
            None,
        );
        reg.on_destroyed(UnitId(1));
        let counts = reg.counts(UnitCategory::PowerPlant);
        assert_eq!(counts.under_construction, 0);
        assert_eq!(counts.active, 0);
    }

    #[test]
    fn builder_lookup_honors_duty_and_ability() {
        let catalog = catalog();
        let reg = registry_with_builder(WorldPos::new(10.0, 10.0));

        let found =
            reg.nearest_available_builder(&catalog, UnitTypeId(2), WorldPos::ZERO, None);
        assert_eq!(found, Some(UnitId(10)));

        // a builder cannot build itself
        assert!(reg
            .nearest_available_builder(&catalog, UnitTypeId(1), WorldPos::ZERO, None)
            .is_none());
    }

    #[test]
    fn busy_builders_are_skipped() {
        let catalog = catalog();
        let mut reg = registry_with_builder(WorldPos::ZERO);
        reg.set_duty(
            UnitId(10),
            ConstructorDuty::Building {
                target_type: UnitTypeId(2),
            },
        );
        assert!(reg
            .nearest_available_builder(&catalog, UnitTypeId(2), WorldPos::ZERO, None)
            .is_none());
    }

    #[test]
    fn finished_task_releases_builder_and_assistants() {
        let mut reg = registry_with_builder(WorldPos::ZERO);
        // a second builder to act as assistant
        reg.mark_requested(UnitCategory::MobileConstructor);
        reg.on_created(
            UnitId(11),
            UnitTypeId(1),
            UnitCategory::MobileConstructor,
            WorldPos::ZERO,
            None,
        );
        reg.on_finished(UnitId(11));

        reg.add_task(BuildTask {
            builder: UnitId(10),
            target_type: UnitTypeId(2),
            category: UnitCategory::PowerPlant,
            pos: WorldPos::ZERO,
            target_unit: None,
            started: 0,
            build_time: 500.0,
            assistants: BTreeSet::new(),
        });
        reg.attach_assistant(UnitId(10), UnitId(11));
        assert!(matches!(
            reg.duty(UnitId(11)),
            Some(ConstructorDuty::Assisting { .. })
        ));

        reg.mark_requested(UnitCategory::PowerPlant);
        reg.on_created(
            UnitId(20),
            UnitTypeId(2),
            UnitCategory::PowerPlant,
            WorldPos::ZERO,
            Some(UnitId(10)),
        );
        reg.on_finished(UnitId(20));

        assert!(reg.tasks().is_empty());
        assert_eq!(reg.duty(UnitId(10)), Some(ConstructorDuty::Idle));
        assert_eq!(reg.duty(UnitId(11)), Some(ConstructorDuty::Idle));
    }

    #[test]
    fn assistable_task_prefers_most_remaining() {
        let mut reg = registry_with_builder(WorldPos::ZERO);
        reg.add_task(BuildTask {
            builder: UnitId(10),
            target_type: UnitTypeId(2),
            category: UnitCategory::PowerPlant,
            pos: WorldPos::ZERO,
            target_unit: None,
            started: 0,
            build_time: 500.0,
            assistants: BTreeSet::new(),
        });
        reg.add_task(BuildTask {
            builder: UnitId(99),
            target_type: UnitTypeId(2),
            category: UnitCategory::PowerPlant,
            pos: WorldPos::ZERO,
            target_unit: None,
            started: 0,
            build_time: 100.0,
            assistants: BTreeSet::new(),
        });

        let task = reg
            .assistable_task(UnitCategory::PowerPlant, 4, 10)
            .unwrap();
        assert_eq!(task.builder, UnitId(10));
    }
}
