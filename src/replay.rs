use anyhow::Context;
use bevy::prelude::{App, EventReader, Plugin, PostUpdate};
use crisis_core::board::BoardSnapshot;
use crisis_core::configuration::CoreConfiguration;
use crisis_core::event::BoardEvent;
use crisis_core::graph::Topology;
use crisis_core::network::{
    ActionRequest, RecordingTransport, RemoteInbox, RemoteNotification, Session,
};
use crisis_core::op::{ActionOp, GateEvent, OpError, OpResult};
use crisis_core::phase::{Outcome, SessionPhaseState};
use crisis_core::{end_session, start_session, CrisisCorePlugin};
use serde::Deserialize;

/// One line of a replay script
#[derive(Debug, Deserialize)]
#[serde(tag = "line", rename_all = "camelCase")]
pub enum ScriptLine {
    /// Starts a new session from a room snapshot
    Snapshot(BoardSnapshot),
    Remote(RemoteNotification),
    Op {
        /// Defaults to the local player
        #[serde(default)]
        player: Option<String>,
        action: ActionOp,
    },
    /// Advances a frame with no input
    Tick,
}

#[derive(Debug)]
pub struct ReplaySummary {
    pub lines: usize,
    pub sent: Vec<ActionRequest>,
    pub outcome: Option<Outcome>,
}

/// Logs what the core reports so a replay can be read back from the log
#[derive(Debug)]
pub struct ReplayPlugin;

impl Plugin for ReplayPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            PostUpdate,
            (log_board_events, log_gate_events, log_op_results),
        );
    }
}

fn log_board_events(mut evr_board: EventReader<BoardEvent>) {
    for event in evr_board.read() {
        log::info!("BOARD {event:?}");
    }
}

fn log_gate_events(mut evr_gate: EventReader<GateEvent>) {
    for event in evr_gate.read() {
        log::debug!("GATE {event:?}");
    }
}

fn log_op_results(mut evr_results: EventReader<OpResult<ActionOp>>) {
    for op_result in evr_results.read() {
        match op_result.result() {
            Ok(outcome) => log::debug!("ACTION_OP_RESULT {outcome:?}"),
            Err(OpError::InvalidOp(reason)) => log::info!("ACTION_OP_REJECTED {reason}"),
            Err(e) => log::warn!("ACTION_OP_FAILED {:?}: {e}", op_result.source().op()),
        }
    }
}

/// Runs each script line through the core, one frame per line.
pub fn run(
    script: &str,
    player: &str,
    topology: Topology,
    config: CoreConfiguration,
) -> anyhow::Result<ReplaySummary> {
    let mut app = App::new();
    app.insert_resource(config)
        .add_plugins((CrisisCorePlugin, ReplayPlugin));
    let transport = RecordingTransport::default();
    let inbox = app.world().resource::<RemoteInbox>().handle();

    let mut lines = 0;
    for (number, line) in script.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parsed: ScriptLine = serde_json::from_str(line)
            .with_context(|| format!("parsing script line {}", number + 1))?;
        match parsed {
            ScriptLine::Snapshot(snapshot) => {
                end_session(app.world_mut());
                start_session(
                    app.world_mut(),
                    &topology,
                    &snapshot,
                    Session::open(player, transport.clone()),
                );
            },
            ScriptLine::Remote(notification) => inbox.deliver(notification)?,
            ScriptLine::Op {
                player: op_player,
                action,
            } => {
                let op_player = op_player.unwrap_or_else(|| player.to_owned());
                app.world_mut().send_event(action.for_player(op_player));
            },
            ScriptLine::Tick => {},
        }
        app.update();
        lines += 1;
    }

    let outcome = app
        .world()
        .get_resource::<SessionPhaseState>()
        .and_then(SessionPhaseState::outcome);
    end_session(app.world_mut());
    Ok(ReplaySummary {
        lines,
        sent: transport.sent(),
        outcome,
    })
}
