//! Shared identifier and classification types.
//!
//! All cross-references between subsystems go through the new-type ids
//! defined here; raw integers never index into parallel arrays directly.

use serde::{Deserialize, Serialize};

/// Unique identifier for an entity-type definition in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitTypeId(pub u32);

impl UnitTypeId {
    /// Create a new unit type ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

/// Unique identifier for a live unit instance reported by the host engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub u32);

/// Unique identifier for a combat group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u32);

/// Unique identifier for an attack in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttackId(pub u32);

/// Identifier of a connected terrain/water region. Continent-bound movement
/// domains (ground, sea) can only be matched to tasks on the same continent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContinentId(pub u32);

/// A position in world units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldPos {
    /// East-west coordinate.
    pub x: f32,
    /// North-south coordinate.
    pub z: f32,
}

impl WorldPos {
    /// Origin position.
    pub const ZERO: Self = Self { x: 0.0, z: 0.0 };

    /// Create a position from coordinates.
    #[must_use]
    pub const fn new(x: f32, z: f32) -> Self {
        Self { x, z }
    }

    /// Euclidean distance to another position.
    #[must_use]
    pub fn distance(&self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }
}

/// Combat categories an entity can deal or receive damage as.
///
/// The efficiency vector of every entity type has one entry per category;
/// threat and defence accumulators are likewise indexed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombatCategory {
    /// Ground combat units.
    Ground,
    /// Aircraft.
    Air,
    /// Hovercraft.
    Hover,
    /// Surface ships.
    Sea,
    /// Submerged units.
    Submarine,
    /// Stationary defences.
    Static,
}

impl CombatCategory {
    /// All combat categories, in efficiency-vector order.
    pub const ALL: [Self; 6] = [
        Self::Ground,
        Self::Air,
        Self::Hover,
        Self::Sea,
        Self::Submarine,
        Self::Static,
    ];

    /// Mobile attacker categories, i.e. everything a sector can be
    /// attacked by.
    pub const ASSAULT: [Self; 5] = [
        Self::Ground,
        Self::Air,
        Self::Hover,
        Self::Sea,
        Self::Submarine,
    ];

    /// Index into efficiency vectors and per-category accumulator arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Ground => 0,
            Self::Air => 1,
            Self::Hover => 2,
            Self::Sea => 3,
            Self::Submarine => 4,
            Self::Static => 5,
        }
    }
}

/// Number of combat categories (length of every efficiency vector).
pub const COMBAT_CATEGORIES: usize = CombatCategory::ALL.len();

/// Number of mobile assault categories.
pub const ASSAULT_CATEGORIES: usize = CombatCategory::ASSAULT.len();

/// Classification of an entity-type definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UnitCategory {
    /// Sentinel for types the catalog could not classify.
    Unknown,
    /// Energy production.
    PowerPlant,
    /// Metal extraction on a metal spot.
    Extractor,
    /// Converts energy surplus into metal.
    MetalMaker,
    /// Metal/energy storage.
    Storage,
    /// Stationary defence building.
    StationaryDefence,
    /// Long-range stationary artillery.
    StationaryArtillery,
    /// Stationary sensor coverage.
    Radar,
    /// Stationary sensor jamming.
    Jammer,
    /// Repair/rearm pad for aircraft.
    AirBase,
    /// Factory producing mobile units.
    StationaryConstructor,
    /// The starting commander unit.
    Commander,
    /// Mobile construction unit.
    MobileConstructor,
    /// Fast reconnaissance unit.
    Scout,
    /// Ground combat unit.
    GroundAssault,
    /// Air combat unit.
    AirAssault,
    /// Hover combat unit.
    HoverAssault,
    /// Sea combat unit.
    SeaAssault,
    /// Submarine combat unit.
    SubmarineAssault,
}

impl UnitCategory {
    /// Whether this category describes a structure.
    #[must_use]
    pub const fn is_structure(self) -> bool {
        matches!(
            self,
            Self::PowerPlant
                | Self::Extractor
                | Self::MetalMaker
                | Self::Storage
                | Self::StationaryDefence
                | Self::StationaryArtillery
                | Self::Radar
                | Self::Jammer
                | Self::AirBase
                | Self::StationaryConstructor
        )
    }

    /// Whether units of this category fight as part of combat groups.
    #[must_use]
    pub const fn is_combat(self) -> bool {
        self.combat_category().is_some()
    }

    /// Whether this category can construct other entities.
    #[must_use]
    pub const fn is_constructor(self) -> bool {
        matches!(
            self,
            Self::Commander | Self::MobileConstructor | Self::StationaryConstructor
        )
    }

    /// The combat category units of this category attack as, if any.
    #[must_use]
    pub const fn combat_category(self) -> Option<CombatCategory> {
        match self {
            Self::GroundAssault => Some(CombatCategory::Ground),
            Self::AirAssault => Some(CombatCategory::Air),
            Self::HoverAssault => Some(CombatCategory::Hover),
            Self::SeaAssault => Some(CombatCategory::Sea),
            Self::SubmarineAssault => Some(CombatCategory::Submarine),
            Self::StationaryDefence | Self::StationaryArtillery => Some(CombatCategory::Static),
            _ => None,
        }
    }
}

/// Movement capability of an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementDomain {
    /// Does not move.
    Static,
    /// Ground-bound vehicles and bots.
    Ground,
    /// Aircraft, unrestricted by terrain.
    Air,
    /// Hovercraft, crossing land and water.
    Hover,
    /// Surface ships.
    Sea,
    /// Amphibious units crossing the land/water boundary.
    Amphibious,
}

impl MovementDomain {
    /// Continent-bound domains can only reach tasks on their own continent.
    #[must_use]
    pub const fn continent_bound(self) -> bool {
        matches!(self, Self::Ground | Self::Sea)
    }
}

/// Coarse game phase, used to index learned statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GamePeriod {
    /// Up to 10 minutes.
    Opening,
    /// 10 to 20 minutes.
    Early,
    /// 20 to 40 minutes.
    Mid,
    /// Beyond 40 minutes.
    Late,
}

impl GamePeriod {
    /// All periods in chronological order.
    pub const ALL: [Self; 4] = [Self::Opening, Self::Early, Self::Mid, Self::Late];

    /// Classify a simulation tick into a period.
    #[must_use]
    pub const fn from_tick(tick: u64) -> Self {
        if tick < 18_000 {
            Self::Opening
        } else if tick < 36_000 {
            Self::Early
        } else if tick < 72_000 {
            Self::Mid
        } else {
            Self::Late
        }
    }

    /// Index into per-period statistic tables.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Opening => 0,
            Self::Early => 1,
            Self::Mid => 2,
            Self::Late => 3,
        }
    }
}

/// Blend weights between learned (cross-game) and current-game statistics.
///
/// Early in a match the learned history dominates; as the game progresses the
/// weights shift toward what has actually been observed this game. Passed
/// explicitly into every rating call that mixes the two time-scales.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThreatBlend {
    /// Weight of the learned (persisted) statistics.
    pub learned: f32,
    /// Weight of the current-game statistics.
    pub current: f32,
}

impl ThreatBlend {
    /// Compute the blend for a simulation tick.
    #[must_use]
    pub fn from_tick(tick: u64) -> Self {
        let learned = 60_000.0 / (tick as f32 + 30_000.0) + 0.5;
        Self {
            learned,
            current: 2.5 - learned,
        }
    }

    /// Weighted average of a learned and a current value.
    #[must_use]
    pub fn mix(&self, learned_value: f32, current_value: f32) -> f32 {
        (self.learned * learned_value + self.current * current_value)
            / (self.learned + self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combat_category_indices_match_vector_order() {
        for (i, cat) in CombatCategory::ALL.iter().enumerate() {
            assert_eq!(cat.index(), i);
        }
    }

    #[test]
    fn game_period_thresholds() {
        assert_eq!(GamePeriod::from_tick(0), GamePeriod::Opening);
        assert_eq!(GamePeriod::from_tick(17_999), GamePeriod::Opening);
        assert_eq!(GamePeriod::from_tick(18_000), GamePeriod::Early);
        assert_eq!(GamePeriod::from_tick(36_000), GamePeriod::Mid);
        assert_eq!(GamePeriod::from_tick(72_000), GamePeriod::Late);
    }

    #[test]
    fn threat_blend_shifts_toward_current() {
        let early = ThreatBlend::from_tick(0);
        let late = ThreatBlend::from_tick(100_000);
        assert!(early.learned > late.learned);
        assert!(early.current < late.current);
        // mix() stays within the input range
        let mixed = late.mix(1.0, 3.0);
        assert!(mixed > 1.0 && mixed < 3.0);
    }

    #[test]
    fn category_classification() {
        assert!(UnitCategory::PowerPlant.is_structure());
        assert!(!UnitCategory::GroundAssault.is_structure());
        assert!(UnitCategory::StationaryConstructor.is_constructor());
        assert_eq!(
            UnitCategory::SeaAssault.combat_category(),
            Some(CombatCategory::Sea)
        );
        assert_eq!(UnitCategory::Scout.combat_category(), None);
    }
}
