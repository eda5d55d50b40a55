use getset::CopyGetters;
use serde::{Deserialize, Serialize};

use crate::prelude::*;

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Reflect, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Lobby,
    Action,
    Infection,
    Ended,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Reflect, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Won,
    Lost,
}

/// Round sub-stage and room-wide counters, mirrored from room variables.
///
/// `research_node_id` always names the node `BoardState` flags as research.
#[derive(Clone, CopyGetters, Debug, Default, Resource)]
#[getset(get_copy = "pub")]
pub struct SessionPhaseState {
    phase: Phase,
    round: u32,
    research_node_id: Option<NodeId>,
    research_count: u32,
    outbreak_count: u32,
    outcome: Option<Outcome>,
    /// Advisory only, the server drives the clock
    countdown: Option<u32>,
}

impl SessionPhaseState {
    pub fn new(phase: Phase, round: u32) -> Self {
        SessionPhaseState {
            phase,
            round,
            ..default()
        }
    }

    pub fn is_action_phase(&self) -> bool {
        self.phase == Phase::Action
    }

    /// Returns the previous phase if it differed. Once an outcome is known
    /// the phase stays `Ended`.
    pub(crate) fn set_phase(&mut self, phase: Phase) -> Option<Phase> {
        if let Some(outcome) = self.outcome {
            if phase != self.phase {
                log::debug!("Game already {outcome:?}, ignoring phase {phase:?}");
            }
            None
        } else if self.phase == phase {
            None
        } else {
            self.countdown = None;
            Some(std::mem::replace(&mut self.phase, phase))
        }
    }

    pub(crate) fn set_round(&mut self, round: u32) -> bool {
        std::mem::replace(&mut self.round, round) != round
    }

    pub(crate) fn set_research_node_id(&mut self, node: NodeId) {
        self.research_node_id = Some(node);
    }

    pub(crate) fn set_research_count(&mut self, count: u32) -> bool {
        std::mem::replace(&mut self.research_count, count) != count
    }

    pub(crate) fn set_outbreak_count(&mut self, count: u32) -> bool {
        std::mem::replace(&mut self.outbreak_count, count) != count
    }

    pub(crate) fn set_countdown(&mut self, remaining: u32) {
        self.countdown = Some(remaining);
    }

    pub(crate) fn end(&mut self, outcome: Outcome) -> bool {
        if self.outcome.is_some() {
            return false;
        }
        self.outcome = Some(outcome);
        self.phase = Phase::Ended;
        self.countdown = None;
        true
    }
}
