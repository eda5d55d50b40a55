pub mod board;
pub mod common;
pub mod configuration;
pub mod event;
pub mod graph;
pub mod network;
pub mod node;
pub mod op;
pub mod phase;
pub mod player;
pub mod prelude;
pub mod reconcile;

use self::board::{BoardSnapshot, BoardState};
use self::configuration::CoreConfiguration;
use self::event::BoardEvent;
use self::graph::{BoardGraph, Topology};
use self::network::{PlayerAnnouncement, RemoteInbox, RemoteNotification, Session};
use self::op::{ActionGate, ActionOp, GateEvent, GatingRefresh, OpResult};
use self::phase::SessionPhaseState;
use self::prelude::*;

#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum CrisisCoreSet {
    RawInputs,
    Reconcile,
    RefreshGate,
    ProcessOps,
}

#[derive(Debug)]
pub struct CrisisCorePlugin;

impl Plugin for CrisisCorePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<CoreConfiguration>()
            .init_resource::<RemoteInbox>()
            .init_resource::<ActionGate>()
            .add_event::<RemoteNotification>()
            .add_event::<BoardEvent>()
            .add_event::<GatingRefresh>()
            .add_event::<GateEvent>()
            .add_event::<Op<ActionOp>>()
            .add_event::<OpResult<ActionOp>>()
            .configure_sets(
                Update,
                (
                    CrisisCoreSet::RawInputs,
                    CrisisCoreSet::Reconcile,
                    CrisisCoreSet::RefreshGate,
                    CrisisCoreSet::ProcessOps,
                )
                    .chain(),
            )
            .add_systems(
                Update,
                (
                    network::sys_drain_remote_inbox.in_set(CrisisCoreSet::RawInputs),
                    reconcile::sys_reconcile.in_set(CrisisCoreSet::Reconcile),
                    op::sys_refresh_gate.in_set(CrisisCoreSet::RefreshGate),
                    op::sys_action_ops.in_set(CrisisCoreSet::ProcessOps),
                )
                    .run_if(resource_exists::<Session>),
            );
    }
}

/// Builds the board from the topology and the room snapshot, then opens
/// the session. Any previous session state is replaced.
///
/// A local player missing from the snapshot announces itself at the
/// configured starting node. The board picks it up once the server echoes
/// the join.
pub fn start_session(
    world: &mut World,
    topology: &Topology,
    snapshot: &BoardSnapshot,
    session: Session,
) {
    let config = world
        .get_resource_or_insert_with(CoreConfiguration::default)
        .clone();
    let graph = BoardGraph::new(topology);
    let board = BoardState::from_snapshot(&graph, snapshot, &config);
    if let Err(e) = board.check_invariants() {
        log::error!("Snapshot produced an inconsistent board: {e}");
    }

    let mut phase_state = SessionPhaseState::new(snapshot.phase, snapshot.round);
    phase_state.set_research_count(capped(snapshot.research_count, config.max_research));
    phase_state.set_outbreak_count(capped(snapshot.outbreak_count, config.max_outbreak));
    if let Some(research) = board.research_node() {
        phase_state.set_research_node_id(research);
    }

    let joined = snapshot
        .players
        .iter()
        .any(|player| session.is_local(&player.name));
    if !joined {
        let announcement = PlayerAnnouncement::entering_at(config.starting_node);
        if let Err(e) = session.announce(&announcement) {
            log::warn!("Could not announce [{}]: {e}", session.local_player());
        }
    }

    log::info!(
        "Session started for [{}] with {} nodes and {} players",
        session.local_player(),
        graph.len(),
        snapshot.players.len()
    );
    world.insert_resource(graph);
    world.insert_resource(board);
    world.insert_resource(phase_state);
    world.insert_resource(session);
    world.insert_resource(ActionGate::default());
    world.send_event(GatingRefresh { invalidate: true });
}

/// Disposes the session and everything mirrored for it.
pub fn end_session(world: &mut World) {
    if let Some(mut session) = world.remove_resource::<Session>() {
        session.close();
        log::info!("Session for [{}] closed", session.local_player());
    }
    world.remove_resource::<BoardState>();
    world.remove_resource::<BoardGraph>();
    world.remove_resource::<SessionPhaseState>();
    world.insert_resource(ActionGate::default());
}
