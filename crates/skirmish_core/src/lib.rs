//! # Skirmish Core
//!
//! Decision core of an autonomous skirmish AI for real-time-strategy games.
//!
//! Given a stream of per-tick world events (units built, destroyed, damaged,
//! enemies sighted), the core continuously decides what to build, where to
//! build it, and how to group and commit combat units to attacks — with no
//! human input. Five subsystems form one feedback loop:
//!
//! - [`map`] - the sector grid: spatial statistics per fixed world cell
//! - [`brain`] - strategic state: base topology, phase, pressure estimates
//! - [`scheduler`] - urgency-driven construction dispatch
//! - [`selector`] - multi-criteria entity-type rating
//! - [`group`] / [`attack`] - combat group and attack lifecycles
//!
//! The core is **single-threaded, cooperative and tick-driven**: the host
//! engine calls in once per simulation tick, every pass runs to completion,
//! and no operation blocks. Persistence (cross-game learning, map cache) is
//! read once at startup and written once at shutdown.
//!
//! The facade in [`ai`] wires everything to the host's notification surface;
//! orders leave through the [`commands::CommandSink`] boundary.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod ai;
pub mod attack;
pub mod brain;
pub mod catalog;
pub mod commands;
pub mod config;
pub mod economy;
pub mod error;
pub mod group;
pub mod learning;
pub mod map;
pub mod scheduler;
pub mod selector;
pub mod types;
pub mod units;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::ai::{EnemySighting, SkirmishAi};
    pub use crate::catalog::{BuildCatalog, TypeStats, TypeStatsTable, UnitTypeData};
    pub use crate::commands::{AiCommand, CommandSink, IssuedCommand};
    pub use crate::config::AiConfig;
    pub use crate::economy::ResourceSnapshot;
    pub use crate::error::{AiError, Result};
    pub use crate::learning::{LearningFile, MapCache, SectorStatic};
    pub use crate::map::{SectorCoord, SectorGrid, SectorTerrain};
    pub use crate::types::{
        AttackId, CombatCategory, ContinentId, GamePeriod, GroupId, MovementDomain, ThreatBlend,
        UnitCategory, UnitId, UnitTypeId, WorldPos,
    };
}
