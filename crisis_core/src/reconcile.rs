use thiserror::Error;

use crate::board::BoardState;
use crate::configuration::CoreConfiguration;
use crate::event::{BoardEvent, InfectionCause};
use crate::network::{RemoteNotification, Session};
use crate::op::GatingRefresh;
use crate::phase::{Outcome, Phase, SessionPhaseState};
use crate::player::{Character, ResourceField};
use crate::prelude::*;

mod key {
    use typed_key::{typed_key, Key};

    use crate::graph::NodeId;
    use crate::phase::Phase;
    use crate::player::Character;

    pub const PHASE: Key<Phase> = typed_key!("phase");
    pub const ROUND: Key<u32> = typed_key!("round");
    pub const RESEARCH_NODE_ID: Key<NodeId> = typed_key!("researchNodeId");
    pub const RESEARCH_COUNT: Key<u32> = typed_key!("researchCount");
    pub const NODE_PID: Key<NodeId> = typed_key!("nodePid");
    pub const PREVIOUS_NODE_PID: Key<NodeId> = typed_key!("previousNodePid");
    pub const MANA: Key<u32> = typed_key!("mana");
    pub const ACTION_COUNT: Key<u32> = typed_key!("actionCount");
    pub const PROMOTE_COUNT: Key<u32> = typed_key!("promoteCount");
    pub const CHARACTER: Key<Character> = typed_key!("char");
    pub const TARGET_NODE_ID: Key<NodeId> = typed_key!("targetNodeId");
    pub const NODE_ID: Key<NodeId> = typed_key!("nodeId");
    pub const VIRUS_COUNT: Key<u32> = typed_key!("virusCount");
    pub const OUTBREAK_COUNT: Key<u32> = typed_key!("outbreakCount");
    pub const REMAINING: Key<u32> = typed_key!("remaining");
}

mod cmd {
    pub const TREAT_RESOLVE: &str = "treatResolve";
    pub const CLEANSE_RESOLVE: &str = "cleanseResolve";
    pub const BULLDOZE_RESOLVE: &str = "bulldozeResolve";
    pub const INFECT: &str = "infect";
    pub const OUTBREAK: &str = "outbreak";
    pub const COUNTDOWN_TICK: &str = "countdownTick";
    pub const GAME_WON: &str = "gameWon";
    pub const GAME_LOST: &str = "gameLost";
}

/// A notification that could not be decoded. Nothing from it is applied.
#[derive(Debug, Error)]
#[error("{context} rejected: {source}")]
pub struct DecodeError {
    context: String,
    #[source]
    source: VarBatchError,
}

impl DecodeError {
    fn in_context(context: impl Into<String>) -> impl FnOnce(VarBatchError) -> Self {
        let context = context.into();
        move |source| DecodeError { context, source }
    }
}

/// One typed change decoded from a notification.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RemoteChange {
    Phase(Phase),
    Round(u32),
    ResearchNode(NodeId),
    ResearchCount(u32),
    Relocate {
        player: String,
        from: NodeId,
        to: NodeId,
    },
    Counter {
        player: String,
        field: ResourceField,
        value: u32,
    },
    Character {
        player: String,
        character: Character,
    },
    VirusLevel {
        node: NodeId,
        count: u32,
        cause: InfectionCause,
    },
    Outbreak {
        node: NodeId,
        count: u32,
    },
    Countdown(u32),
    GameOver(Outcome),
    PlayerJoined {
        player: String,
        character: Character,
        node: Option<NodeId>,
    },
    PlayerLeft(String),
    ConnectionLost(String),
}

impl RemoteChange {
    /// Decodes every change a notification carries, or none of them.
    pub fn decode(notification: &RemoteNotification) -> Result<Vec<RemoteChange>, DecodeError> {
        match notification {
            RemoteNotification::RoomVariables { batch } => {
                decode_room(batch).map_err(DecodeError::in_context("room variables"))
            },
            RemoteNotification::UserVariables { user, batch } => {
                decode_user(user, batch).map_err(DecodeError::in_context(format!("variables of [{user}]")))
            },
            RemoteNotification::Extension { cmd, params } => {
                decode_extension(cmd, params).map_err(DecodeError::in_context(format!("command [{cmd}]")))
            },
            RemoteNotification::PlayerJoined { name, vars } => {
                let join = || -> Result<RemoteChange, VarBatchError> {
                    Ok(RemoteChange::PlayerJoined {
                        player: name.clone(),
                        character: vars.get_optional(key::CHARACTER)?.unwrap_or_default(),
                        node: vars.get_optional(key::NODE_PID)?,
                    })
                };
                join()
                    .map(|change| vec![change])
                    .map_err(DecodeError::in_context(format!("join of [{name}]")))
            },
            RemoteNotification::PlayerLeft { name } => Ok(vec![RemoteChange::PlayerLeft(name.clone())]),
            RemoteNotification::ConnectionLost { reason } => {
                Ok(vec![RemoteChange::ConnectionLost(reason.clone())])
            },
        }
    }
}

fn decode_room(batch: &VarBatch) -> Result<Vec<RemoteChange>, VarBatchError> {
    let mut changes = Vec::new();
    if let Some(phase) = batch.get_changed(key::PHASE)? {
        changes.push(RemoteChange::Phase(phase));
    }
    if let Some(round) = batch.get_changed(key::ROUND)? {
        changes.push(RemoteChange::Round(round));
    }
    if let Some(node) = batch.get_changed(key::RESEARCH_NODE_ID)? {
        changes.push(RemoteChange::ResearchNode(node));
    }
    if let Some(count) = batch.get_changed(key::RESEARCH_COUNT)? {
        changes.push(RemoteChange::ResearchCount(count));
    }
    Ok(changes)
}

fn decode_user(user: &str, batch: &VarBatch) -> Result<Vec<RemoteChange>, VarBatchError> {
    let mut changes = Vec::new();
    if batch.has_changed(key::NODE_PID) && batch.has_changed(key::PREVIOUS_NODE_PID) {
        // Both ends must come from this one batch
        changes.push(RemoteChange::Relocate {
            player: user.to_owned(),
            from: batch.get_required(key::PREVIOUS_NODE_PID)?,
            to: batch.get_required(key::NODE_PID)?,
        });
    } else if batch.has_changed(key::NODE_PID) {
        log::debug!("[{user}] nodePid changed without previousNodePid, not relocating");
    }
    for (field, counter_key) in [
        (ResourceField::Mana, key::MANA),
        (ResourceField::ActionCount, key::ACTION_COUNT),
        (ResourceField::PromoteCount, key::PROMOTE_COUNT),
    ] {
        if let Some(value) = batch.get_changed(counter_key)? {
            changes.push(RemoteChange::Counter {
                player: user.to_owned(),
                field,
                value,
            });
        }
    }
    if let Some(character) = batch.get_changed(key::CHARACTER)? {
        changes.push(RemoteChange::Character {
            player: user.to_owned(),
            character,
        });
    }
    Ok(changes)
}

fn decode_extension(command: &str, params: &VarBatch) -> Result<Vec<RemoteChange>, VarBatchError> {
    let resolved = |cause| -> Result<RemoteChange, VarBatchError> {
        Ok(RemoteChange::VirusLevel {
            node: params.get_required(key::TARGET_NODE_ID)?,
            count: params.get_required(key::VIRUS_COUNT)?,
            cause,
        })
    };
    let change = match command {
        cmd::TREAT_RESOLVE => resolved(InfectionCause::Treat)?,
        cmd::CLEANSE_RESOLVE => resolved(InfectionCause::Cleanse)?,
        cmd::BULLDOZE_RESOLVE => resolved(InfectionCause::Bulldoze)?,
        cmd::INFECT => RemoteChange::VirusLevel {
            node: params.get_required(key::NODE_ID)?,
            count: params.get_required(key::VIRUS_COUNT)?,
            cause: InfectionCause::Infect,
        },
        cmd::OUTBREAK => RemoteChange::Outbreak {
            node: params.get_required(key::NODE_ID)?,
            count: params.get_required(key::OUTBREAK_COUNT)?,
        },
        cmd::COUNTDOWN_TICK => RemoteChange::Countdown(params.get_required(key::REMAINING)?),
        cmd::GAME_WON => RemoteChange::GameOver(Outcome::Won),
        cmd::GAME_LOST => RemoteChange::GameOver(Outcome::Lost),
        other => {
            log::debug!("Ignoring extension command [{other}]");
            return Ok(Vec::new());
        },
    };
    Ok(vec![change])
}

/// Applies decoded changes to the mirrored state.
///
/// Every applied change yields at most one `BoardEvent`, sent only when
/// something actually changed. Changes naming unknown nodes or players are
/// logged and dropped.
#[derive(Debug)]
pub struct Reconciler<'a> {
    pub board: &'a mut BoardState,
    pub phase_state: &'a mut SessionPhaseState,
    pub session: &'a mut Session,
    pub config: &'a CoreConfiguration,
}

impl Reconciler<'_> {
    pub fn apply_notification(
        &mut self,
        notification: &RemoteNotification,
        events: &mut Vec<BoardEvent>,
    ) -> Option<GatingRefresh> {
        if !self.session.is_open() {
            log::debug!("Session is {:?}, ignoring {notification:?}", self.session.status());
            return None;
        }
        let changes = match RemoteChange::decode(notification) {
            Ok(changes) => changes,
            Err(e) => {
                log::warn!("{e}");
                return None;
            },
        };
        changes.into_iter().fold(None, |refresh, change| {
            match self.apply(change, events) {
                Some(next) => Some(next.merge(refresh)),
                None => refresh,
            }
        })
    }

    fn is_local(&self, player: &str) -> bool {
        self.session.is_local(player)
    }

    fn local_location(&self) -> Option<NodeId> {
        self.board
            .player(self.session.local_player())
            .map(|player| player.location())
    }

    fn refresh_if(&self, condition: bool) -> Option<GatingRefresh> {
        condition.then(GatingRefresh::default)
    }

    pub fn apply(&mut self, change: RemoteChange, events: &mut Vec<BoardEvent>) -> Option<GatingRefresh> {
        match change {
            RemoteChange::Phase(phase) => {
                let from = self.phase_state.set_phase(phase)?;
                events.push(BoardEvent::PhaseChanged { from, to: phase });
                Some(GatingRefresh { invalidate: true })
            },
            RemoteChange::Round(round) => {
                if self.phase_state.set_round(round) {
                    events.push(BoardEvent::RoundChanged(round));
                }
                None
            },
            RemoteChange::ResearchNode(node) => {
                let from = self.phase_state.research_node_id();
                match self.board.set_research_node(node) {
                    Ok(changed) => {
                        self.phase_state.set_research_node_id(node);
                        if changed {
                            events.push(BoardEvent::ResearchNodeMoved { from, to: node });
                        }
                        self.refresh_if(changed)
                    },
                    Err(e) => {
                        log::warn!("Dropping research node update: {e}");
                        None
                    },
                }
            },
            RemoteChange::ResearchCount(count) => {
                let max = self.config.max_research;
                let count = capped(count, max);
                if !self.phase_state.set_research_count(count) {
                    return None;
                }
                events.push(BoardEvent::ResearchProgress { count, max });
                if count >= max {
                    events.push(BoardEvent::CureComplete);
                }
                self.refresh_if(true)
            },
            RemoteChange::Relocate { player, from, to } => {
                match self.board.relocate(&player, from, to) {
                    Ok(true) => {
                        let local = self.is_local(&player);
                        events.push(BoardEvent::PlayerMoved { player, from, to });
                        self.refresh_if(local)
                    },
                    Ok(false) => {
                        log::debug!("[{player}] is already at [{to}]");
                        None
                    },
                    Err(e) => {
                        log::warn!("Dropping relocation {from} -> {to}: {e}");
                        None
                    },
                }
            },
            RemoteChange::Counter { player, field, value } => {
                match self.board.apply_resource_counter(&player, field, value) {
                    Ok(Some(_)) => {
                        let local = self.is_local(&player);
                        let event = match field {
                            ResourceField::Mana => BoardEvent::ManaChanged { player, mana: value },
                            ResourceField::ActionCount => BoardEvent::ActionCountChanged {
                                player,
                                count: value,
                            },
                            ResourceField::PromoteCount => {
                                let remaining = self
                                    .board
                                    .player(&player)
                                    .and_then(|state| state.promotion_remaining(self.config));
                                BoardEvent::PromotionProgress { player, remaining }
                            },
                        };
                        events.push(event);
                        self.refresh_if(local && field != ResourceField::PromoteCount)
                    },
                    Ok(None) => None,
                    Err(e) => {
                        log::warn!("Dropping {field:?} update: {e}");
                        None
                    },
                }
            },
            RemoteChange::Character { player, character } => {
                match self.board.apply_character(&player, character) {
                    Ok(Some(from)) => {
                        let local = self.is_local(&player);
                        let remaining = self
                            .board
                            .player(&player)
                            .and_then(|state| state.promotion_remaining(self.config));
                        events.push(BoardEvent::CharacterChanged {
                            player: player.clone(),
                            from,
                            to: character,
                        });
                        events.push(BoardEvent::PromotionProgress { player, remaining });
                        self.refresh_if(local)
                    },
                    Ok(None) => None,
                    Err(e) => {
                        log::warn!("Dropping character update: {e}");
                        None
                    },
                }
            },
            RemoteChange::VirusLevel { node, count, cause } => {
                match self.board.set_virus_count(node, count) {
                    Ok(Some(previous)) => {
                        events.push(BoardEvent::InfectionLevelChanged {
                            node,
                            previous,
                            count,
                            cause,
                        });
                        self.refresh_if(self.local_location() == Some(node))
                    },
                    Ok(None) => None,
                    Err(e) => {
                        log::warn!("Dropping {cause:?} of level {count}: {e}");
                        None
                    },
                }
            },
            RemoteChange::Outbreak { node, count } => {
                if self.board.node(node).is_none() {
                    log::warn!("Dropping outbreak {count} at unknown node [{node}]");
                    return None;
                }
                let max = self.config.max_outbreak;
                let count = capped(count, max);
                if self.phase_state.set_outbreak_count(count) {
                    events.push(BoardEvent::OutbreakProgress { node, count, max });
                }
                None
            },
            RemoteChange::Countdown(remaining) => {
                self.phase_state.set_countdown(remaining);
                events.push(BoardEvent::Countdown {
                    remaining,
                    phase: self.phase_state.phase(),
                });
                None
            },
            RemoteChange::GameOver(outcome) => {
                let from = self.phase_state.phase();
                if !self.phase_state.end(outcome) {
                    return None;
                }
                if from != Phase::Ended {
                    events.push(BoardEvent::PhaseChanged {
                        from,
                        to: Phase::Ended,
                    });
                }
                events.push(BoardEvent::GameOver(outcome));
                Some(GatingRefresh { invalidate: true })
            },
            RemoteChange::PlayerJoined {
                player,
                character,
                node,
            } => {
                let node = node.unwrap_or(self.config.starting_node);
                match self.board.add_player(&player, character, node) {
                    Ok(true) => {
                        let local = self.is_local(&player);
                        events.push(BoardEvent::PlayerJoined { player, node });
                        self.refresh_if(local)
                    },
                    Ok(false) => {
                        log::debug!("[{player}] is already on the board");
                        None
                    },
                    Err(e) => {
                        log::warn!("Dropping join of [{player}]: {e}");
                        None
                    },
                }
            },
            RemoteChange::PlayerLeft(player) => {
                self.board.remove_player(&player)?;
                let local = self.is_local(&player);
                events.push(BoardEvent::PlayerLeft { player });
                local.then_some(GatingRefresh { invalidate: true })
            },
            RemoteChange::ConnectionLost(reason) => {
                if !self.session.freeze(&reason) {
                    return None;
                }
                log::error!("Connection lost, board frozen: {reason}");
                events.push(BoardEvent::SessionFrozen { reason });
                Some(GatingRefresh { invalidate: true })
            },
        }
    }
}

pub fn sys_reconcile(
    mut evr_remote: EventReader<RemoteNotification>,
    config: Res<CoreConfiguration>,
    mut session: ResMut<Session>,
    mut board: ResMut<BoardState>,
    mut phase_state: ResMut<SessionPhaseState>,
    mut evw_board: EventWriter<BoardEvent>,
    mut evw_refresh: EventWriter<GatingRefresh>,
) {
    if evr_remote.is_empty() {
        return;
    }
    let mut reconciler = Reconciler {
        board: &mut board,
        phase_state: &mut phase_state,
        session: &mut session,
        config: &config,
    };
    let mut events = Vec::new();
    let mut refresh: Option<GatingRefresh> = None;
    for notification in evr_remote.read() {
        if let Some(next) = reconciler.apply_notification(notification, &mut events) {
            refresh = Some(next.merge(refresh));
        }
    }
    evw_board.send_batch(events);
    if let Some(refresh) = refresh {
        evw_refresh.send(refresh);
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;
    use crate::graph::{BoardGraph, NodeDescriptor, NodeKind, Topology};
    use crate::network::RecordingTransport;

    struct Fixture {
        board: BoardState,
        phase_state: SessionPhaseState,
        session: Session,
        config: CoreConfiguration,
    }

    impl Fixture {
        /// Nodes 1-2-3 in a line with node 3 the research node. "ana" is
        /// local on node 1, "bo" is remote on node 2.
        fn new() -> Self {
            let graph = BoardGraph::new(&Topology {
                nodes: vec![
                    NodeDescriptor { id: 1, kind: NodeKind::Normal },
                    NodeDescriptor { id: 2, kind: NodeKind::Normal },
                    NodeDescriptor { id: 3, kind: NodeKind::Research },
                ],
                edges: vec![(1, 2), (2, 3)],
            });
            let mut board = BoardState::new(&graph);
            board.add_player("ana", Character::Pawn, 1).unwrap();
            board.add_player("bo", Character::Rook, 2).unwrap();
            let mut phase_state = SessionPhaseState::new(Phase::Action, 1);
            phase_state.set_research_node_id(3);
            Fixture {
                board,
                phase_state,
                session: Session::open("ana", RecordingTransport::default()),
                config: CoreConfiguration::default(),
            }
        }

        fn apply(&mut self, notification: RemoteNotification) -> (Vec<BoardEvent>, Option<GatingRefresh>) {
            let mut events = Vec::new();
            let refresh = Reconciler {
                board: &mut self.board,
                phase_state: &mut self.phase_state,
                session: &mut self.session,
                config: &self.config,
            }
            .apply_notification(&notification, &mut events);
            (events, refresh)
        }
    }

    fn user(name: &str, batch: VarBatch) -> RemoteNotification {
        RemoteNotification::UserVariables {
            user: name.to_owned(),
            batch,
        }
    }

    fn room(batch: VarBatch) -> RemoteNotification {
        RemoteNotification::RoomVariables { batch }
    }

    fn extension(cmd: &str, params: VarBatch) -> RemoteNotification {
        RemoteNotification::Extension {
            cmd: cmd.to_owned(),
            params,
        }
    }

    fn moved(from: NodeId, to: NodeId) -> VarBatch {
        VarBatch::new()
            .with_changed("nodePid", json!(to))
            .with_changed("previousNodePid", json!(from))
    }

    #[test]
    fn relocation_uses_both_ids_from_one_batch() {
        let mut fixture = Fixture::new();
        let (events, refresh) = fixture.apply(user("ana", moved(1, 2)));
        assert_eq!(
            vec![BoardEvent::PlayerMoved {
                player: "ana".into(),
                from: 1,
                to: 2
            }],
            events
        );
        assert_eq!(Some(GatingRefresh { invalidate: false }), refresh);
        assert!(fixture.board.occupants(1).is_empty());
        assert_eq!(vec!["ana", "bo"], fixture.board.occupants(2));
        fixture.board.check_invariants().unwrap();
    }

    #[test]
    fn node_pid_alone_does_not_relocate() {
        let mut fixture = Fixture::new();
        let batch = VarBatch::new()
            .with_changed("nodePid", json!(2))
            .with_carried("previousNodePid", json!(1));
        let (events, _) = fixture.apply(user("ana", batch));
        assert!(events.is_empty());
        assert_eq!(1, fixture.board.player("ana").unwrap().location());
    }

    #[test]
    fn redelivered_relocation_changes_nothing() {
        let mut fixture = Fixture::new();
        fixture.apply(user("bo", moved(2, 3)));
        let (events, refresh) = fixture.apply(user("bo", moved(2, 3)));
        assert!(events.is_empty());
        assert_eq!(None, refresh);
        assert_eq!(vec!["bo"], fixture.board.occupants(3));
        fixture.board.check_invariants().unwrap();
    }

    #[test]
    fn relocation_to_unknown_node_is_dropped() {
        let mut fixture = Fixture::new();
        let (events, _) = fixture.apply(user("bo", moved(2, 42)));
        assert!(events.is_empty());
        assert_eq!(vec!["bo"], fixture.board.occupants(2));
        fixture.board.check_invariants().unwrap();
    }

    #[test]
    fn clearing_infection_keeps_occupants() {
        let mut fixture = Fixture::new();
        let infect = VarBatch::new()
            .with_changed("nodeId", json!(1))
            .with_changed("virusCount", json!(3));
        fixture.apply(extension("infect", infect));
        let treat = VarBatch::new()
            .with_changed("targetNodeId", json!(1))
            .with_changed("virusCount", json!(0));
        let (events, refresh) = fixture.apply(extension("treatResolve", treat));

        assert_eq!(
            vec![BoardEvent::InfectionLevelChanged {
                node: 1,
                previous: 3,
                count: 0,
                cause: InfectionCause::Treat
            }],
            events
        );
        assert!(refresh.is_some());
        assert_eq!(vec!["ana"], fixture.board.occupants(1));
        assert_eq!(Some(0), fixture.board.virus_count(1));
    }

    #[test]
    fn research_node_moves_and_stays_consistent() {
        let mut fixture = Fixture::new();
        let (events, _) = fixture.apply(room(VarBatch::new().with_changed("researchNodeId", json!(1))));
        assert_eq!(
            vec![BoardEvent::ResearchNodeMoved {
                from: Some(3),
                to: 1
            }],
            events
        );
        assert_eq!(Some(1), fixture.phase_state.research_node_id());
        assert_eq!(Some(1), fixture.board.research_node());
        fixture.board.check_invariants().unwrap();
    }

    #[test]
    fn phase_change_invalidates_the_gate() {
        let mut fixture = Fixture::new();
        let batch = VarBatch::new()
            .with_changed("phase", json!("infection"))
            .with_changed("round", json!(2));
        let (events, refresh) = fixture.apply(room(batch));
        assert_eq!(
            vec![
                BoardEvent::PhaseChanged {
                    from: Phase::Action,
                    to: Phase::Infection
                },
                BoardEvent::RoundChanged(2),
            ],
            events
        );
        assert_eq!(Some(GatingRefresh { invalidate: true }), refresh);
    }

    #[test]
    fn malformed_batch_is_rejected_whole() {
        let mut fixture = Fixture::new();
        let batch = VarBatch::new()
            .with_changed("phase", json!("infection"))
            .with_changed("round", json!("two"));
        let (events, refresh) = fixture.apply(room(batch));
        assert!(events.is_empty());
        assert_eq!(None, refresh);
        assert_eq!(Phase::Action, fixture.phase_state.phase());
        assert_eq!(1, fixture.phase_state.round());
    }

    #[test]
    fn research_progress_caps_and_completes() {
        let mut fixture = Fixture::new();
        let (events, _) = fixture.apply(room(VarBatch::new().with_changed("researchCount", json!(12))));
        assert_eq!(
            vec![
                BoardEvent::ResearchProgress { count: 10, max: 10 },
                BoardEvent::CureComplete,
            ],
            events
        );
        let (events, _) = fixture.apply(room(VarBatch::new().with_changed("researchCount", json!(10))));
        assert!(events.is_empty());
    }

    #[test]
    fn outbreak_count_is_capped() {
        let mut fixture = Fixture::new();
        let outbreak = VarBatch::new()
            .with_changed("nodeId", json!(2))
            .with_changed("outbreakCount", json!(9));
        let (events, refresh) = fixture.apply(extension("outbreak", outbreak));
        assert_eq!(
            vec![BoardEvent::OutbreakProgress {
                node: 2,
                count: 5,
                max: 5
            }],
            events
        );
        assert_eq!(None, refresh);
        assert_eq!(5, fixture.phase_state.outbreak_count());
    }

    #[test]
    fn outbreak_at_unknown_node_is_dropped() {
        let mut fixture = Fixture::new();
        let outbreak = VarBatch::new()
            .with_changed("nodeId", json!(99))
            .with_changed("outbreakCount", json!(9));
        let (events, refresh) = fixture.apply(extension("outbreak", outbreak));
        assert!(events.is_empty());
        assert_eq!(None, refresh);
        assert_eq!(0, fixture.phase_state.outbreak_count());
    }

    #[test]
    fn countdown_tick_reports_the_current_phase() {
        let mut fixture = Fixture::new();
        let tick = VarBatch::new().with_changed("remaining", json!(3));
        let (events, refresh) = fixture.apply(extension("countdownTick", tick));
        assert_eq!(
            vec![BoardEvent::Countdown {
                remaining: 3,
                phase: Phase::Action
            }],
            events
        );
        assert_eq!(None, refresh);
        assert_eq!(Some(3), fixture.phase_state.countdown());
    }

    #[test]
    fn cleanse_and_bulldoze_report_their_cause() {
        let mut fixture = Fixture::new();
        let infect = VarBatch::new()
            .with_changed("nodeId", json!(2))
            .with_changed("virusCount", json!(4));
        fixture.apply(extension("infect", infect));

        let cleanse = VarBatch::new()
            .with_changed("targetNodeId", json!(2))
            .with_changed("virusCount", json!(1));
        let (events, _) = fixture.apply(extension("cleanseResolve", cleanse));
        assert_eq!(
            vec![BoardEvent::InfectionLevelChanged {
                node: 2,
                previous: 4,
                count: 1,
                cause: InfectionCause::Cleanse
            }],
            events
        );

        let bulldoze = VarBatch::new()
            .with_changed("targetNodeId", json!(2))
            .with_changed("virusCount", json!(0));
        let (events, _) = fixture.apply(extension("bulldozeResolve", bulldoze));
        assert_eq!(
            vec![BoardEvent::InfectionLevelChanged {
                node: 2,
                previous: 1,
                count: 0,
                cause: InfectionCause::Bulldoze
            }],
            events
        );
        assert_eq!(vec!["bo"], fixture.board.occupants(2));
    }

    #[test]
    fn remote_counters_do_not_refresh_local_gate() {
        let mut fixture = Fixture::new();
        let (events, refresh) =
            fixture.apply(user("bo", VarBatch::new().with_changed("mana", json!(4))));
        assert_eq!(
            vec![BoardEvent::ManaChanged {
                player: "bo".into(),
                mana: 4
            }],
            events
        );
        assert_eq!(None, refresh);

        let (_, refresh) = fixture.apply(user("ana", VarBatch::new().with_changed("mana", json!(4))));
        assert_eq!(Some(GatingRefresh::default()), refresh);
    }

    #[test]
    fn character_change_reports_promotion_progress() {
        let mut fixture = Fixture::new();
        let batch = VarBatch::new()
            .with_changed("promoteCount", json!(1))
            .with_changed("char", json!("queen"));
        let (events, _) = fixture.apply(user("ana", batch));
        assert_eq!(
            vec![
                BoardEvent::PromotionProgress {
                    player: "ana".into(),
                    remaining: Some(6)
                },
                BoardEvent::CharacterChanged {
                    player: "ana".into(),
                    from: Character::Pawn,
                    to: Character::Queen
                },
                BoardEvent::PromotionProgress {
                    player: "ana".into(),
                    remaining: Some(2)
                },
            ],
            events
        );
    }

    #[test]
    fn game_over_ends_the_session_phase() {
        let mut fixture = Fixture::new();
        let (events, refresh) = fixture.apply(extension("gameLost", VarBatch::new()));
        assert_eq!(
            vec![
                BoardEvent::PhaseChanged {
                    from: Phase::Action,
                    to: Phase::Ended
                },
                BoardEvent::GameOver(Outcome::Lost),
            ],
            events
        );
        assert_eq!(Some(GatingRefresh { invalidate: true }), refresh);
        let (events, _) = fixture.apply(extension("gameWon", VarBatch::new()));
        assert!(events.is_empty());
        assert_eq!(Some(Outcome::Lost), fixture.phase_state.outcome());
    }

    #[test]
    fn phase_updates_after_game_over_are_ignored() {
        let mut fixture = Fixture::new();
        fixture.apply(extension("gameLost", VarBatch::new()));
        let (events, refresh) = fixture.apply(room(VarBatch::new().with_changed("phase", json!("action"))));
        assert!(events.is_empty());
        assert_eq!(None, refresh);
        assert_eq!(Phase::Ended, fixture.phase_state.phase());
        assert_eq!(Some(Outcome::Lost), fixture.phase_state.outcome());
    }

    #[test]
    fn connection_loss_freezes_further_updates() {
        let mut fixture = Fixture::new();
        let (events, _) = fixture.apply(RemoteNotification::ConnectionLost {
            reason: "socket closed".into(),
        });
        assert_eq!(
            vec![BoardEvent::SessionFrozen {
                reason: "socket closed".into()
            }],
            events
        );
        let (events, refresh) = fixture.apply(user("ana", moved(1, 2)));
        assert!(events.is_empty());
        assert_eq!(None, refresh);
        assert_eq!(1, fixture.board.player("ana").unwrap().location());
    }

    #[test]
    fn players_join_at_their_node_and_leave() {
        let mut fixture = Fixture::new();
        let (events, _) = fixture.apply(RemoteNotification::PlayerJoined {
            name: "cy".into(),
            vars: VarBatch::new().with_carried("char", json!("bishop")),
        });
        assert_eq!(
            vec![BoardEvent::PlayerJoined {
                player: "cy".into(),
                node: 1
            }],
            events
        );
        assert_eq!(Character::Bishop, fixture.board.player("cy").unwrap().character());

        let (events, _) = fixture.apply(RemoteNotification::PlayerLeft { name: "cy".into() });
        assert_eq!(vec![BoardEvent::PlayerLeft { player: "cy".into() }], events);
        let (events, _) = fixture.apply(RemoteNotification::PlayerLeft { name: "cy".into() });
        assert!(events.is_empty());
    }

    #[test]
    fn unknown_commands_are_ignored() {
        let mut fixture = Fixture::new();
        let (events, refresh) = fixture.apply(extension("chat", VarBatch::new()));
        assert!(events.is_empty());
        assert_eq!(None, refresh);
    }
}
