//! Attack coordination.
//!
//! Attacks aggregate combat groups (assault, anti-air escort, artillery)
//! against one target sector at a time. The coordinator runs on its own slow
//! interval: it drops attacks that can no longer out-power the defenders,
//! chains cleared targets to follow-up sectors, and launches new attacks
//! when enough idle combat power has accumulated. Groups are referenced by
//! id; an attack with no member groups left in any role bucket is
//! unregistered immediately.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::brain::StrategicState;
use crate::catalog::TypeStatsTable;
use crate::commands::CommandSink;
use crate::config::AiConfig;
use crate::group::{GroupRole, GroupSet};
use crate::map::{SectorCoord, SectorGrid};
use crate::types::{AttackId, CombatCategory, GroupId, ThreatBlend, WorldPos};

/// One attack in flight.
#[derive(Debug)]
pub struct Attack {
    /// Identifier of this attack.
    pub id: AttackId,
    /// Sector the attack is currently aimed at.
    pub target: SectorCoord,
    /// Main assault groups.
    pub assault: BTreeSet<GroupId>,
    /// Anti-air escort groups.
    pub anti_air: BTreeSet<GroupId>,
    /// Long-range support groups.
    pub artillery: BTreeSet<GroupId>,
    /// Whether the attack fights over land.
    pub land: bool,
    /// Whether the attack fights over water.
    pub water: bool,
}

impl Attack {
    /// All member groups across the three role buckets.
    pub fn group_ids(&self) -> impl Iterator<Item = GroupId> + '_ {
        self.assault
            .iter()
            .chain(self.anti_air.iter())
            .chain(self.artillery.iter())
            .copied()
    }

    /// Whether every role bucket is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assault.is_empty() && self.anti_air.is_empty() && self.artillery.is_empty()
    }

    /// Drop a group from whichever bucket holds it.
    pub fn remove_group(&mut self, group: GroupId) {
        self.assault.remove(&group);
        self.anti_air.remove(&group);
        self.artillery.remove(&group);
    }

    /// Summed power of the striking groups against stationary defences.
    #[must_use]
    pub fn strike_power(&self, groups: &GroupSet, stats: &TypeStatsTable) -> f32 {
        self.assault
            .iter()
            .chain(self.artillery.iter())
            .filter_map(|id| groups.get(*id))
            .map(|g| g.combat_power_vs(CombatCategory::Static, stats))
            .sum()
    }

    /// Strongest defender response the target sector can muster against any
    /// of the striking groups' combat categories.
    #[must_use]
    pub fn defender_power(&self, groups: &GroupSet, grid: &SectorGrid) -> f32 {
        let Some(sector) = grid.sector(self.target) else {
            return 0.0;
        };
        self.assault
            .iter()
            .chain(self.artillery.iter())
            .filter_map(|id| groups.get(*id))
            .map(|g| {
                sector.enemy_static_power[g.combat_category.index()]
                    + sector.enemy_mobile_power[g.combat_category.index()]
            })
            .fold(0.0, f32::max)
    }

    /// Whether the attack has lost the power contest against the target's
    /// defenders.
    #[must_use]
    pub fn failed(
        &self,
        groups: &GroupSet,
        grid: &SectorGrid,
        stats: &TypeStatsTable,
        config: &AiConfig,
    ) -> bool {
        if self.is_empty() {
            return true;
        }
        self.strike_power(groups, stats)
            < self.defender_power(groups, grid) * config.aggressiveness
    }
}

/// Owner and driver of all attacks.
#[derive(Debug, Default)]
pub struct AttackCoordinator {
    attacks: BTreeMap<AttackId, Attack>,
    next_id: u32,
}

impl AttackCoordinator {
    /// Coordinator with no attacks in flight.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attacks currently in flight.
    pub fn attacks(&self) -> impl Iterator<Item = &Attack> {
        self.attacks.values()
    }

    /// Number of attacks in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attacks.len()
    }

    /// Whether no attack is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attacks.is_empty()
    }

    /// Look up an attack.
    #[must_use]
    pub fn get(&self, id: AttackId) -> Option<&Attack> {
        self.attacks.get(&id)
    }

    /// Detach a group that dropped out (destroyed or below viability). The
    /// attack is unregistered when its last group leaves.
    pub fn detach_group(&mut self, attack: AttackId, group: GroupId) {
        if let Some(entry) = self.attacks.get_mut(&attack) {
            entry.remove_group(group);
            if entry.is_empty() {
                tracing::debug!(attack = attack.0, "attack lost its last group");
                self.attacks.remove(&attack);
            }
        }
    }

    /// Stop an attack: every member group retreats to the fallback position
    /// and is released for new assignments, and the attack is unregistered.
    pub fn stop_attack(
        &mut self,
        id: AttackId,
        groups: &mut GroupSet,
        grid: &SectorGrid,
        fallback: WorldPos,
        sink: &mut dyn CommandSink,
    ) {
        let Some(attack) = self.attacks.remove(&id) else {
            return;
        };
        for group_id in attack.group_ids() {
            if let Some(group) = groups.get_mut(group_id) {
                group.attack = None;
                let rally = group.rally_point.unwrap_or(fallback);
                group.retreat(rally, grid, sink);
            }
        }
        tracing::debug!(attack = id.0, "attack stopped");
    }

    /// Per-pass upkeep of all attacks: drop the failed, chain the cleared,
    /// unregister the emptied.
    pub fn check_attacks(
        &mut self,
        groups: &mut GroupSet,
        grid: &SectorGrid,
        stats: &TypeStatsTable,
        brain: &StrategicState,
        config: &AiConfig,
        blend: ThreatBlend,
        sink: &mut dyn CommandSink,
    ) {
        let ids: Vec<AttackId> = self.attacks.keys().copied().collect();
        for id in ids {
            let Some(attack) = self.attacks.get(&id) else {
                continue;
            };

            if attack.failed(groups, grid, stats, config) {
                tracing::debug!(attack = id.0, "attack failed, retreating");
                self.stop_attack(id, groups, grid, brain.base_center(), sink);
                continue;
            }

            let cleared = grid
                .sector(attack.target)
                .map_or(true, |s| s.enemy_structures == 0);
            if !cleared {
                continue;
            }

            // target wiped: move on to the next worthwhile sector nearby
            let next = brain.next_attack_dest(grid, attack.target, attack.land, attack.water, blend);
            match next {
                Some(dest) => {
                    if let Some(attack) = self.attacks.get_mut(&id) {
                        attack.target = dest;
                        let members: Vec<GroupId> = attack.group_ids().collect();
                        for group_id in members {
                            if let Some(group) = groups.get_mut(group_id) {
                                group.attack_sector(dest, grid, 100.0, sink);
                            }
                        }
                    }
                }
                None => {
                    self.stop_attack(id, groups, grid, brain.base_center(), sink);
                }
            }
        }
    }

    /// Launch a new attack when below the concurrency ceiling and enough
    /// idle combat power exists. Sectors are rated by enemy structures,
    /// recent losses, the attack/defence power ratio and distance to the
    /// base; enemy-free sectors are never targets.
    pub fn try_launch(
        &mut self,
        groups: &mut GroupSet,
        grid: &SectorGrid,
        stats: &TypeStatsTable,
        config: &AiConfig,
        blend: ThreatBlend,
        sink: &mut dyn CommandSink,
    ) -> Option<AttackId> {
        if self.attacks.len() >= config.max_attacks {
            return None;
        }

        // collect idle, sufficiently powerful groups by role
        let mut assault = Vec::new();
        let mut anti_air = Vec::new();
        let mut artillery = Vec::new();
        for group in groups.iter() {
            if !group.available_for_attack(stats) {
                continue;
            }
            match group.role {
                GroupRole::Assault => assault.push(group.id),
                GroupRole::AntiAir => anti_air.push(group.id),
                GroupRole::Artillery => artillery.push(group.id),
            }
        }
        if assault.is_empty() {
            return None;
        }

        let attack_power: f32 = assault
            .iter()
            .chain(artillery.iter())
            .filter_map(|id| groups.get(*id))
            .map(|g| g.combat_power_vs(CombatCategory::Static, stats))
            .sum();

        // normalize losses by the worst sector on the map
        let max_losses = grid
            .iter()
            .map(|s| s.lost_units_total(blend))
            .fold(0.0, f32::max);

        let mut best: Option<(SectorCoord, f32, bool)> = None;
        for sector in grid.iter() {
            if sector.in_base() || sector.enemy_structures == 0 || sector.distance_to_base < 0 {
                continue;
            }
            let water_sector = sector.water_ratio > 0.6;
            let land_sector = sector.water_ratio < 0.4;
            if !water_sector && !land_sector {
                continue;
            }

            // continent-bound attackers must be able to reach the sector
            let reachable = assault.iter().any(|id| {
                groups.get(*id).is_some_and(|g| {
                    g.continent.is_none()
                        || sector.continent.is_none()
                        || g.continent == sector.continent
                })
            });
            if !reachable {
                continue;
            }

            let losses = if max_losses > 0.0 {
                sector.lost_units_total(blend) / max_losses
            } else {
                0.0
            };
            let defender = 1.0 + sector.enemy_defence_power();
            let rating = sector.enemy_structures as f32 * (1.0 - losses)
                * (attack_power / defender)
                / (2.0 + sector.distance_to_base as f32);
            if best.map_or(true, |(_, r, _)| rating > r) {
                best = Some((sector.coord, rating, water_sector));
            }
        }

        let (target, _, water) = best?;
        let id = AttackId(self.next_id);
        self.next_id += 1;

        let target_continent = grid.sector(target).and_then(|s| s.continent);
        let mut attack = Attack {
            id,
            target,
            assault: BTreeSet::new(),
            anti_air: BTreeSet::new(),
            artillery: BTreeSet::new(),
            land: !water,
            water,
        };

        for group_id in assault {
            let Some(group) = groups.get_mut(group_id) else {
                continue;
            };
            let compatible = group.continent.is_none()
                || target_continent.is_none()
                || group.continent == target_continent;
            if !compatible {
                continue;
            }
            group.attack = Some(id);
            group.attack_sector(target, grid, 102.0, sink);
            attack.assault.insert(group_id);
        }
        if attack.assault.is_empty() {
            return None;
        }
        for group_id in artillery {
            if let Some(group) = groups.get_mut(group_id) {
                group.attack = Some(id);
                group.attack_sector(target, grid, 101.0, sink);
                attack.artillery.insert(group_id);
            }
        }
        for group_id in anti_air.into_iter().take(config.max_anti_air_escorts) {
            if let Some(group) = groups.get_mut(group_id) {
                group.attack = Some(id);
                group.attack_sector(target, grid, 100.0, sink);
                attack.anti_air.insert(group_id);
            }
        }

        tracing::info!(
            attack = id.0,
            x = target.x,
            y = target.y,
            assault_groups = attack.assault.len(),
            "launching attack"
        );
        self.attacks.insert(id, attack);
        Some(id)
    }
}
