use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::board::BoardState;
use crate::configuration::CoreConfiguration;
use crate::graph::BoardGraph;
use crate::network::{ActionRequest, Session, TransportError};
use crate::node::NodeState;
use crate::phase::{Phase, SessionPhaseState};
use crate::player::{Character, PlayerState};
use crate::prelude::*;

#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Move,
    Treat,
    Research,
    Charge,
    Travel,
    Cleanse,
    Bulldoze,
}

impl ActionKind {
    pub const ALL: [ActionKind; 7] = [
        ActionKind::Move,
        ActionKind::Treat,
        ActionKind::Research,
        ActionKind::Charge,
        ActionKind::Travel,
        ActionKind::Cleanse,
        ActionKind::Bulldoze,
    ];

    /// Charge goes straight to confirmation, everything else picks a node
    pub fn needs_target(self) -> bool {
        self != ActionKind::Charge
    }

    /// Only offered to characters that unlock it
    pub fn is_character_skill(self) -> bool {
        matches!(self, ActionKind::Cleanse | ActionKind::Bulldoze)
    }
}

#[derive(Clone, Debug, Event)]
pub struct Op<O> {
    pub op: O,
    pub player: String,
}

impl<O> Op<O> {
    pub fn new(player: impl Into<String>, op: O) -> Self {
        Op {
            op,
            player: player.into(),
        }
    }

    pub fn op(&self) -> &O {
        &self.op
    }

    pub fn player(&self) -> &str {
        &self.player
    }
}

/// Local interaction with the action controls
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ActionOp {
    Select { action: ActionKind },
    PickTarget { node: NodeId },
    Confirm,
    Cancel,
}

impl ActionOp {
    pub fn for_player(self, player: impl Into<String>) -> Op<Self> {
        Op::new(player, self)
    }
}

#[derive(Debug, Error)]
pub enum OpError {
    /// The op does not make sense in the current state, usually a stale click
    #[error("Invalid op: {0}")]
    InvalidOp(String),
    /// Confirmation arrived after the action phase ended
    #[error("Confirmation dropped, phase is now {0:?}")]
    StalePhase(Phase),
    #[error("Session is not open")]
    SessionClosed,
    #[error("Unable to forward action: {0}")]
    Transport(#[from] TransportError),
}

impl From<String> for OpError {
    fn from(value: String) -> Self {
        Self::InvalidOp(value)
    }
}

impl From<&str> for OpError {
    fn from(value: &str) -> Self {
        Self::InvalidOp(String::from(value))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OpOutcome {
    Selected(ActionKind),
    TargetPicked(NodeId),
    Submitted(ActionRequest),
    Cancelled,
}

#[derive(Debug, Event, getset::Getters)]
pub struct OpResult<O> {
    #[getset(get = "pub")]
    source: Op<O>,
    #[getset(get = "pub")]
    result: Result<OpOutcome, OpError>,
}

impl<O: Clone> OpResult<O> {
    pub fn new(source: &Op<O>, result: Result<OpOutcome, OpError>) -> Self {
        OpResult {
            source: source.clone(),
            result,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum GateState {
    #[default]
    Idle,
    AwaitingTargetSelection {
        action: ActionKind,
        targets: BTreeSet<NodeId>,
    },
    AwaitingConfirmation {
        action: ActionKind,
        target: Option<NodeId>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ActionAvailability {
    pub action: ActionKind,
    pub cost: u32,
    pub enabled: bool,
}

/// What presentation should show for the action controls
#[derive(Clone, Debug, Event, PartialEq)]
pub enum GateEvent {
    ActionsChanged(Vec<ActionAvailability>),
    TargetsHighlighted {
        action: ActionKind,
        targets: Vec<NodeId>,
    },
    AwaitingConfirmation {
        action: ActionKind,
        target: Option<NodeId>,
    },
    HighlightsCleared,
    Submitted(ActionRequest),
    /// A confirmation was refused locally and nothing was sent
    Suppressed(String),
}

/// Asks the gate to recompute what is on offer
#[derive(Clone, Copy, Debug, Default, Eq, Event, PartialEq)]
pub struct GatingRefresh {
    /// Also drop any selection or confirmation in progress
    pub invalidate: bool,
}

impl GatingRefresh {
    pub fn merge(self, other: Option<GatingRefresh>) -> Self {
        GatingRefresh {
            invalidate: self.invalidate || other.is_some_and(|other| other.invalidate),
        }
    }
}

/// Read-only view of everything legality depends on.
#[derive(Debug)]
pub struct GateView<'a> {
    pub graph: &'a BoardGraph,
    pub board: &'a BoardState,
    pub phase_state: &'a SessionPhaseState,
    pub config: &'a CoreConfiguration,
    pub player: &'a str,
}

impl GateView<'_> {
    fn local(&self) -> Option<&PlayerState> {
        self.board.player(self.player)
    }

    fn character(&self) -> Character {
        self.local().map(PlayerState::character).unwrap_or_default()
    }

    /// Actions with a control for this player's character
    pub fn offered(&self) -> Vec<ActionKind> {
        let character = self.character();
        ActionKind::ALL
            .into_iter()
            .filter(|action| !action.is_character_skill() || character.unlocks(*action))
            .collect()
    }

    pub fn cost(&self, action: ActionKind) -> u32 {
        self.config.cost_of(action, self.character())
    }

    pub fn targets(&self, action: ActionKind) -> BTreeSet<NodeId> {
        let Some(here) = self.local().map(PlayerState::location) else {
            return BTreeSet::new();
        };
        match action {
            ActionKind::Move | ActionKind::Bulldoze => self.graph.neighbors(here),
            ActionKind::Cleanse => {
                let mut targets = self.graph.neighbors(here);
                targets.insert(here);
                targets
            },
            ActionKind::Treat | ActionKind::Research => BTreeSet::from([here]),
            ActionKind::Travel => self.graph.nodes_except(here).into_iter().collect(),
            ActionKind::Charge => BTreeSet::new(),
        }
    }

    fn precondition_holds(&self, action: ActionKind, player: &PlayerState) -> bool {
        let here = self.board.node(player.location());
        match action {
            ActionKind::Treat => here.is_some_and(NodeState::has_virus),
            ActionKind::Research => here.is_some_and(NodeState::is_research),
            // Local guard only, the server keeps its own limit
            ActionKind::Charge => player.mana() < self.config.charge_mana_ceiling,
            ActionKind::Move | ActionKind::Travel | ActionKind::Cleanse | ActionKind::Bulldoze => {
                !self.targets(action).is_empty()
            },
        }
    }

    pub fn is_enabled(&self, action: ActionKind) -> bool {
        let Some(player) = self.local() else {
            return false;
        };
        self.phase_state.is_action_phase()
            && player.action_count() < self.config.max_actions_per_phase
            && (!action.is_character_skill() || player.character().unlocks(action))
            && player.mana() >= self.cost(action)
            && self.precondition_holds(action, player)
    }

    pub fn availability(&self) -> Vec<ActionAvailability> {
        self.offered()
            .into_iter()
            .map(|action| ActionAvailability {
                action,
                cost: self.cost(action),
                enabled: self.is_enabled(action),
            })
            .collect()
    }
}

/// Idle -> AwaitingTargetSelection -> AwaitingConfirmation -> Idle
#[derive(Debug, Default, Resource)]
pub struct ActionGate {
    state: GateState,
    /// Set once a request is forwarded, cleared by the next refresh
    awaiting_server: bool,
}

impl ActionGate {
    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == GateState::Idle
    }

    pub fn is_awaiting_server(&self) -> bool {
        self.awaiting_server
    }

    pub fn availability(&self, view: &GateView) -> Vec<ActionAvailability> {
        let mut availability = view.availability();
        if self.awaiting_server {
            disable_all(&mut availability);
        }
        availability
    }

    pub fn select(&mut self, view: &GateView, action: ActionKind) -> Result<(), OpError> {
        if self.awaiting_server || !view.is_enabled(action) {
            return Err(format!("{action:?} is not available").into());
        }
        self.state = if action.needs_target() {
            GateState::AwaitingTargetSelection {
                action,
                targets: view.targets(action),
            }
        } else {
            GateState::AwaitingConfirmation {
                action,
                target: None,
            }
        };
        Ok(())
    }

    /// What presentation should highlight for the selection in progress
    fn pending_event(&self) -> Option<GateEvent> {
        match &self.state {
            GateState::Idle => None,
            GateState::AwaitingTargetSelection { action, targets } => {
                Some(GateEvent::TargetsHighlighted {
                    action: *action,
                    targets: targets.iter().copied().collect(),
                })
            },
            GateState::AwaitingConfirmation { action, target } => {
                Some(GateEvent::AwaitingConfirmation {
                    action: *action,
                    target: *target,
                })
            },
        }
    }

    pub fn pick_target(&mut self, node: NodeId) -> Result<ActionKind, OpError> {
        match &self.state {
            GateState::AwaitingTargetSelection { action, targets } if targets.contains(&node) => {
                let action = *action;
                self.state = GateState::AwaitingConfirmation {
                    action,
                    target: Some(node),
                };
                Ok(action)
            },
            GateState::AwaitingTargetSelection { action, .. } => {
                Err(format!("node [{node}] is not a target for {action:?}").into())
            },
            _ => Err("no action is waiting for a target".into()),
        }
    }

    /// Forwards the pending action if `phase` is still the action phase.
    ///
    /// `phase` has to be read at confirmation time: the server may have moved
    /// on while the confirmation was pending. The gate returns to idle
    /// whether or not anything is sent.
    pub fn confirm(&mut self, phase: Phase, session: &Session) -> Result<ActionRequest, OpError> {
        let (action, target) = match &self.state {
            GateState::AwaitingConfirmation { action, target } => (*action, *target),
            _ => return Err("nothing is waiting for confirmation".into()),
        };
        self.state = GateState::Idle;
        if phase != Phase::Action {
            return Err(OpError::StalePhase(phase));
        }
        if !session.is_open() {
            return Err(OpError::SessionClosed);
        }
        let request = ActionRequest {
            action,
            target_node_id: target,
        };
        session.send(&request)?;
        self.awaiting_server = true;
        Ok(request)
    }

    /// Returns true if there was anything to cancel
    pub fn cancel(&mut self) -> bool {
        std::mem::take(&mut self.state) != GateState::Idle
    }

    /// Returns true if a selection in progress was dropped
    pub fn refresh(&mut self, invalidate: bool) -> bool {
        self.awaiting_server = false;
        invalidate && self.cancel()
    }

    pub fn perform(
        &mut self,
        view: &GateView,
        session: &Session,
        op: &Op<ActionOp>,
        events: &mut Vec<GateEvent>,
    ) -> Result<OpOutcome, OpError> {
        if !session.is_local(op.player()) {
            return Err(format!("player [{}] is not controlled by this client", op.player()).into());
        }
        match op.op() {
            ActionOp::Select { action } => {
                if !session.is_open() {
                    return Err(OpError::SessionClosed);
                }
                let was_active = !self.is_idle();
                self.select(view, *action)?;
                if was_active {
                    events.push(GateEvent::HighlightsCleared);
                }
                events.extend(self.pending_event());
                Ok(OpOutcome::Selected(*action))
            },
            ActionOp::PickTarget { node } => {
                let action = self.pick_target(*node)?;
                events.push(GateEvent::AwaitingConfirmation {
                    action,
                    target: Some(*node),
                });
                Ok(OpOutcome::TargetPicked(*node))
            },
            ActionOp::Confirm => {
                let was_confirming = matches!(self.state, GateState::AwaitingConfirmation { .. });
                let result = self.confirm(view.phase_state.phase(), session);
                if was_confirming {
                    events.push(GateEvent::HighlightsCleared);
                    if let Err(e) = &result {
                        events.push(GateEvent::Suppressed(e.to_string()));
                    }
                }
                let request = result?;
                events.push(GateEvent::Submitted(request.clone()));
                events.push(GateEvent::ActionsChanged(self.availability(view)));
                Ok(OpOutcome::Submitted(request))
            },
            ActionOp::Cancel => {
                if self.cancel() {
                    events.push(GateEvent::HighlightsCleared);
                }
                Ok(OpOutcome::Cancelled)
            },
        }
    }
}

fn disable_all(availability: &mut [ActionAvailability]) {
    for entry in availability.iter_mut() {
        entry.enabled = false;
    }
}

pub fn sys_refresh_gate(
    mut evr_refresh: EventReader<GatingRefresh>,
    graph: Res<BoardGraph>,
    board: Res<BoardState>,
    phase_state: Res<SessionPhaseState>,
    config: Res<CoreConfiguration>,
    session: Res<Session>,
    mut gate: ResMut<ActionGate>,
    mut evw_gate: EventWriter<GateEvent>,
) {
    let Some(refresh) = evr_refresh
        .read()
        .copied()
        .reduce(|acc, refresh| acc.merge(Some(refresh)))
    else {
        return;
    };
    if gate.refresh(refresh.invalidate) {
        evw_gate.send(GateEvent::HighlightsCleared);
    }
    let view = GateView {
        graph: &graph,
        board: &board,
        phase_state: &phase_state,
        config: &config,
        player: session.local_player(),
    };
    let mut availability = gate.availability(&view);
    if !session.is_open() {
        disable_all(&mut availability);
    }
    evw_gate.send(GateEvent::ActionsChanged(availability));
}

pub fn sys_action_ops(
    mut evr_ops: EventReader<Op<ActionOp>>,
    graph: Res<BoardGraph>,
    board: Res<BoardState>,
    phase_state: Res<SessionPhaseState>,
    config: Res<CoreConfiguration>,
    session: Res<Session>,
    mut gate: ResMut<ActionGate>,
    mut evw_gate: EventWriter<GateEvent>,
    mut evw_results: EventWriter<OpResult<ActionOp>>,
) {
    for op in evr_ops.read() {
        let view = GateView {
            graph: &graph,
            board: &board,
            phase_state: &phase_state,
            config: &config,
            player: session.local_player(),
        };
        let mut events = Vec::new();
        let result = gate.perform(&view, &session, op, &mut events);
        match &result {
            Ok(outcome) => log::debug!("Action op {:?} -> {outcome:?}", op.op()),
            Err(OpError::StalePhase(phase)) => {
                log::warn!("Dropping confirmation of {:?}, phase is {phase:?}", op.op())
            },
            Err(OpError::Transport(e)) => log::error!("Action not forwarded: {e}"),
            Err(e) => log::debug!("Action op {:?} rejected: {e}", op.op()),
        }
        evw_gate.send_batch(events);
        evw_results.send(OpResult::new(op, result));
    }
}
