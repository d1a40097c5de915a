//! Outgoing command vocabulary.
//!
//! The core never talks to the host engine directly; every order it wants
//! executed is handed to a [`CommandSink`] implemented by the order-issuing
//! shim. Each order carries an importance value and a static debug label.
//! The label is used only for logging and never affects behavior.

use crate::types::{UnitId, UnitTypeId, WorldPos};

/// An order the core wants the host engine to execute for one unit.
#[derive(Debug, Clone, PartialEq)]
pub enum AiCommand {
    /// Move to a position.
    MoveTo(WorldPos),
    /// Construct an entity of the given type at the given position.
    Build {
        /// Type to construct.
        unit_type: UnitTypeId,
        /// Placement position.
        pos: WorldPos,
    },
    /// Fight toward a position, engaging targets on the way.
    FightTo(WorldPos),
    /// Attack a specific target unit.
    Attack(UnitId),
    /// Guard another unit (assist its construction or protect it).
    Guard(UnitId),
    /// Patrol toward a position.
    Patrol(WorldPos),
    /// Reclaim or resurrect a target unit or wreck.
    Reclaim(UnitId),
    /// Stop all current activity.
    Stop,
    /// Toggle a structure's production on or off (metal-maker throttling).
    SetActive(bool),
}

/// A command bound to a unit, tagged for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedCommand {
    /// Unit that receives the order.
    pub unit: UnitId,
    /// The order itself.
    pub command: AiCommand,
    /// Relative importance; the shim may use it to arbitrate conflicting
    /// orders for the same unit.
    pub importance: f32,
    /// Static label naming the code path that issued the order. Logging only.
    pub label: &'static str,
}

/// Receiver for orders produced by the core.
///
/// Implementations must not block; the core calls this from the tick handler.
pub trait CommandSink {
    /// Deliver one order to the host engine.
    fn issue(&mut self, command: IssuedCommand);
}

/// Convenience constructor used throughout the core.
pub(crate) fn issue(
    sink: &mut dyn CommandSink,
    unit: UnitId,
    command: AiCommand,
    importance: f32,
    label: &'static str,
) {
    tracing::trace!(unit = unit.0, ?command, importance, label, "issuing order");
    sink.issue(IssuedCommand {
        unit,
        command,
        importance,
        label,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Vec<IssuedCommand>);

    impl CommandSink for Recorder {
        fn issue(&mut self, command: IssuedCommand) {
            self.0.push(command);
        }
    }

    #[test]
    fn issue_forwards_to_sink() {
        let mut sink = Recorder::default();
        issue(
            &mut sink,
            UnitId(7),
            AiCommand::MoveTo(WorldPos::new(10.0, 20.0)),
            5.0,
            "test",
        );
        assert_eq!(sink.0.len(), 1);
        assert_eq!(sink.0[0].unit, UnitId(7));
        assert_eq!(sink.0[0].label, "test");
    }
}
