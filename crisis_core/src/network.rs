use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::op::ActionKind;
use crate::prelude::*;

/// A notification pushed by the server, in the transport's own terms.
///
/// The reconciler decodes these into typed changes before anything is applied.
#[derive(Clone, Debug, Deserialize, Event, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RemoteNotification {
    /// Room-level shared variables
    RoomVariables { batch: VarBatch },
    /// Per-player shared variables
    UserVariables { user: String, batch: VarBatch },
    /// A server extension command and its parameters
    Extension {
        cmd: String,
        #[serde(default)]
        params: VarBatch,
    },
    PlayerJoined {
        name: String,
        #[serde(default)]
        vars: VarBatch,
    },
    PlayerLeft { name: String },
    ConnectionLost { reason: String },
}

/// Payload of the `playerAction` extension request.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    #[serde(rename = "type")]
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_node_id: Option<NodeId>,
}

impl ActionRequest {
    pub const COMMAND: &'static str = "playerAction";
}

/// User variables a client publishes for itself when it joins a board it
/// is not yet part of.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerAnnouncement {
    pub is_in_game: bool,
    pub node_pid: NodeId,
    pub action_count: u32,
    pub mana: u32,
}

impl PlayerAnnouncement {
    pub fn entering_at(node_pid: NodeId) -> Self {
        PlayerAnnouncement {
            is_in_game: true,
            node_pid,
            action_count: 0,
            mana: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is disconnected")]
    Disconnected,
    #[error("transport failure: {0}")]
    Other(#[from] anyhow::Error),
}

/// Outbound half of the connection to the server. Sends are fire-and-forget:
/// no response is awaited, the effect shows up later as a notification.
pub trait Transport: std::fmt::Debug + Send + Sync + 'static {
    fn send(&self, request: &ActionRequest) -> Result<(), TransportError>;

    /// Publishes the local player's own user variables
    fn announce(&self, announcement: &PlayerAnnouncement) -> Result<(), TransportError>;
}

/// Transport that keeps every request it is asked to send.
#[derive(Clone, Debug, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<ActionRequest>>>,
    announced: Arc<Mutex<Vec<PlayerAnnouncement>>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<ActionRequest> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn announced(&self) -> Vec<PlayerAnnouncement> {
        self.announced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, request: &ActionRequest) -> Result<(), TransportError> {
        log::debug!("Recording {} {:?}", ActionRequest::COMMAND, request);
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        Ok(())
    }

    fn announce(&self, announcement: &PlayerAnnouncement) -> Result<(), TransportError> {
        log::debug!("Recording announcement {announcement:?}");
        self.announced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(announcement.clone());
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SessionStatus {
    Open,
    /// The connection dropped. State is kept as it was but no longer updated.
    Frozen { reason: String },
    Closed,
}

/// The connection context for one game session, created when the board is
/// built and disposed when the session ends.
#[derive(Debug, Resource)]
pub struct Session {
    local_player: String,
    transport: Option<Box<dyn Transport>>,
    status: SessionStatus,
}

impl Session {
    pub fn open<T: Transport>(local_player: impl Into<String>, transport: T) -> Self {
        Session {
            local_player: local_player.into(),
            transport: Some(Box::new(transport)),
            status: SessionStatus::Open,
        }
    }

    pub fn local_player(&self) -> &str {
        &self.local_player
    }

    pub fn is_local(&self, player: &str) -> bool {
        self.local_player == player
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }

    fn open_transport(&self) -> Result<&dyn Transport, TransportError> {
        match (&self.status, self.transport.as_deref()) {
            (SessionStatus::Open, Some(transport)) => Ok(transport),
            _ => Err(TransportError::Disconnected),
        }
    }

    pub fn send(&self, request: &ActionRequest) -> Result<(), TransportError> {
        self.open_transport()?.send(request)
    }

    pub fn announce(&self, announcement: &PlayerAnnouncement) -> Result<(), TransportError> {
        self.open_transport()?.announce(announcement)
    }

    /// Returns false if the session was not open
    pub(crate) fn freeze(&mut self, reason: &str) -> bool {
        if !self.is_open() {
            return false;
        }
        self.transport = None;
        self.status = SessionStatus::Frozen {
            reason: reason.to_owned(),
        };
        true
    }

    pub fn close(&mut self) {
        self.transport = None;
        self.status = SessionStatus::Closed;
    }
}

/// Where the transport thread drops incoming notifications until the next
/// frame drains them into `RemoteNotification` events.
#[derive(Debug, Resource)]
pub struct RemoteInbox {
    send: Sender<RemoteNotification>,
    recv: Mutex<Receiver<RemoteNotification>>,
}

impl Default for RemoteInbox {
    fn default() -> Self {
        let (send, recv) = mpsc::channel();
        RemoteInbox {
            send,
            recv: Mutex::new(recv),
        }
    }
}

impl RemoteInbox {
    pub fn handle(&self) -> RemoteHandle {
        RemoteHandle(self.send.clone())
    }
}

/// Cloneable sender handed to whatever receives from the server
#[derive(Clone, Debug)]
pub struct RemoteHandle(Sender<RemoteNotification>);

impl RemoteHandle {
    pub fn deliver(&self, notification: RemoteNotification) -> Result<(), TransportError> {
        self.0
            .send(notification)
            .map_err(|_| TransportError::Disconnected)
    }
}

pub fn sys_drain_remote_inbox(
    inbox: Res<RemoteInbox>,
    mut evw_remote: EventWriter<RemoteNotification>,
) {
    let recv = inbox.recv.lock().unwrap_or_else(PoisonError::into_inner);
    for notification in recv.try_iter() {
        evw_remote.send(notification);
    }
}
