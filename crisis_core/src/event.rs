use crate::phase::{Outcome, Phase};
use crate::player::Character;
use crate::prelude::*;

/// What changed a node's infection level
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum InfectionCause {
    Infect,
    Treat,
    Cleanse,
    Bulldoze,
}

/// Named state changes for renderers, audio and logs to react to.
///
/// Sent after the change is already applied to `BoardState` and
/// `SessionPhaseState`; presentation never mutates core state.
#[derive(Clone, Debug, Event, PartialEq)]
pub enum BoardEvent {
    PlayerMoved {
        player: String,
        from: NodeId,
        to: NodeId,
    },
    InfectionLevelChanged {
        node: NodeId,
        previous: u32,
        count: u32,
        cause: InfectionCause,
    },
    PhaseChanged {
        from: Phase,
        to: Phase,
    },
    RoundChanged(u32),
    ResearchNodeMoved {
        from: Option<NodeId>,
        to: NodeId,
    },
    ResearchProgress {
        count: u32,
        max: u32,
    },
    /// Research reached its maximum. The server decides what that means.
    CureComplete,
    OutbreakProgress {
        node: NodeId,
        count: u32,
        max: u32,
    },
    ManaChanged {
        player: String,
        mana: u32,
    },
    ActionCountChanged {
        player: String,
        count: u32,
    },
    PromotionProgress {
        player: String,
        remaining: Option<u32>,
    },
    CharacterChanged {
        player: String,
        from: Character,
        to: Character,
    },
    PlayerJoined {
        player: String,
        node: NodeId,
    },
    PlayerLeft {
        player: String,
    },
    Countdown {
        remaining: u32,
        phase: Phase,
    },
    GameOver(Outcome),
    SessionFrozen {
        reason: String,
    },
}
