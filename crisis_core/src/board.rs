use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::configuration::CoreConfiguration;
use crate::graph::{BoardGraph, NodeKind};
use crate::node::NodeState;
use crate::phase::Phase;
use crate::player::{Character, PlayerState, ResourceField};
use crate::prelude::*;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum BoardError {
    #[error("no node with id [{0}]")]
    UnknownNode(NodeId),
    #[error("no player named [{0}]")]
    UnknownPlayer(String),
    #[error("player [{player}] is not at node [{expected}], they are at [{actual}]")]
    NotAtSource {
        player: String,
        expected: NodeId,
        actual: NodeId,
    },
    #[error("board invariant broken: {0}")]
    Invariant(String),
}

type Result<T> = std::result::Result<T, BoardError>;

/// Full room state sent when a client enters a running game.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnapshot {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub round: u32,
    #[serde(default)]
    pub research_node_id: Option<NodeId>,
    #[serde(default)]
    pub research_count: u32,
    #[serde(default)]
    pub outbreak_count: u32,
    /// Position `i` holds the level of node `i + 1`
    #[serde(default)]
    pub virus_counts: Vec<u32>,
    #[serde(default)]
    pub players: Vec<PlayerSnapshot>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub name: String,
    #[serde(default, rename = "char")]
    pub character: Character,
    #[serde(default)]
    pub node_pid: Option<NodeId>,
    #[serde(default)]
    pub mana: u32,
    #[serde(default)]
    pub action_count: u32,
    #[serde(default)]
    pub promote_count: u32,
}

/// Mutable per-node and per-player state.
///
/// Fields are private: presentation reads through the accessors and only the
/// reconciler calls the mutators. Every mutator leaves the board consistent:
/// each player sits in exactly one occupant set and exactly one node is
/// flagged research once a research node is known.
#[derive(Debug, Default, Resource)]
pub struct BoardState {
    order: Vec<NodeId>,
    nodes: HashMap<NodeId, NodeState>,
    players: HashMap<String, PlayerState>,
    research_node: Option<NodeId>,
}

impl BoardState {
    pub fn new(graph: &BoardGraph) -> Self {
        let mut board = BoardState::default();
        for descriptor in graph.descriptors() {
            let mut node = NodeState::new(descriptor);
            node.set_kind(NodeKind::Normal);
            board.order.push(descriptor.id);
            board.nodes.insert(descriptor.id, node);
        }
        if let Some(research) = graph.flagged_research_node() {
            let flagged = graph
                .descriptors()
                .filter(|d| d.kind == NodeKind::Research)
                .count();
            if flagged > 1 {
                log::warn!("Topology flags {flagged} research nodes, using [{research}]");
            }
            // Known node, cannot fail
            let _ = board.set_research_node(research);
        }
        board
    }

    pub fn from_snapshot(
        graph: &BoardGraph,
        snapshot: &BoardSnapshot,
        config: &CoreConfiguration,
    ) -> Self {
        let mut board = BoardState::new(graph);
        if let Some(research) = snapshot.research_node_id {
            if let Err(e) = board.set_research_node(research) {
                log::warn!("Snapshot research node ignored: {e}");
            }
        }
        for (index, &count) in snapshot.virus_counts.iter().enumerate() {
            let node_id = index as NodeId + 1;
            if let Err(e) = board.set_virus_count(node_id, count) {
                log::warn!("Snapshot virus level ignored: {e}");
            }
        }
        for player in snapshot.players.iter() {
            let location = player.node_pid.unwrap_or(config.starting_node);
            if let Err(e) = board.add_player(&player.name, player.character, location) {
                log::warn!("Snapshot player [{}] ignored: {e}", player.name);
                continue;
            }
            for (field, value) in [
                (ResourceField::Mana, player.mana),
                (ResourceField::ActionCount, player.action_count),
                (ResourceField::PromoteCount, player.promote_count),
            ] {
                let _ = board.apply_resource_counter(&player.name, field, value);
            }
        }
        board
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeState> {
        self.nodes.get(&id)
    }

    /// Nodes in topology order
    pub fn nodes(&self) -> impl Iterator<Item = &NodeState> + '_ {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn player(&self, name: &str) -> Option<&PlayerState> {
        self.players.get(name)
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerState> + '_ {
        self.players.values()
    }

    pub fn virus_count(&self, id: NodeId) -> Option<u32> {
        self.node(id).map(NodeState::virus_count)
    }

    pub fn occupants(&self, id: NodeId) -> Vec<&str> {
        self.node(id)
            .map(|node| node.occupants().iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn research_node(&self) -> Option<NodeId> {
        self.research_node
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeState> {
        self.nodes.get_mut(&id).ok_or(BoardError::UnknownNode(id))
    }

    fn player_mut(&mut self, name: &str) -> Result<&mut PlayerState> {
        self.players
            .get_mut(name)
            .ok_or_else(|| BoardError::UnknownPlayer(name.to_owned()))
    }

    /// Replaces the node's infection level. Returns the previous level if it
    /// changed, `None` if the node already had this level.
    pub fn set_virus_count(&mut self, id: NodeId, count: u32) -> Result<Option<u32>> {
        Ok(self.node_mut(id)?.set_virus_count(count))
    }

    /// Moves a player from `from` to `to` in one step.
    ///
    /// Returns `Ok(true)` if the player moved and `Ok(false)` if the player is
    /// already at `to`, so redelivering a pair is harmless. A player found
    /// anywhere other than `from` or `to` is left where they are.
    pub fn relocate(&mut self, player: &str, from: NodeId, to: NodeId) -> Result<bool> {
        if !self.nodes.contains_key(&from) {
            return Err(BoardError::UnknownNode(from));
        }
        if !self.nodes.contains_key(&to) {
            return Err(BoardError::UnknownNode(to));
        }
        let actual = self
            .player(player)
            .ok_or_else(|| BoardError::UnknownPlayer(player.to_owned()))?
            .location();
        if actual == to {
            return Ok(false);
        }
        if actual != from {
            return Err(BoardError::NotAtSource {
                player: player.to_owned(),
                expected: from,
                actual,
            });
        }
        // All lookups are checked above, nothing below can fail midway
        self.node_mut(from)?.remove_occupant(player);
        self.node_mut(to)?.add_occupant(player);
        self.player_mut(player)?.set_location(to);
        Ok(true)
    }

    /// Returns the previous character if it changed
    pub fn apply_character(
        &mut self,
        player: &str,
        character: Character,
    ) -> Result<Option<Character>> {
        Ok(self.player_mut(player)?.set_character(character))
    }

    /// Returns the previous value if it changed
    pub fn apply_resource_counter(
        &mut self,
        player: &str,
        field: ResourceField,
        value: u32,
    ) -> Result<Option<u32>> {
        Ok(self.player_mut(player)?.set_counter(field, value))
    }

    /// Adds a player at `location`. Returns `Ok(false)` if the player is
    /// already on the board, in which case nothing changes.
    pub fn add_player(&mut self, name: &str, character: Character, location: NodeId) -> Result<bool> {
        if self.players.contains_key(name) {
            return Ok(false);
        }
        self.node_mut(location)?.add_occupant(name);
        self.players.insert(
            name.to_owned(),
            PlayerState::new(name.to_owned(), character, location),
        );
        Ok(true)
    }

    pub fn remove_player(&mut self, name: &str) -> Option<PlayerState> {
        let player = self.players.remove(name)?;
        if let Some(node) = self.nodes.get_mut(&player.location()) {
            node.remove_occupant(name);
        }
        Some(player)
    }

    /// Flags `id` as the research node and reverts the old one to normal.
    /// Returns `Ok(false)` if `id` already was the research node.
    pub fn set_research_node(&mut self, id: NodeId) -> Result<bool> {
        if !self.nodes.contains_key(&id) {
            return Err(BoardError::UnknownNode(id));
        }
        if self.research_node == Some(id) {
            return Ok(false);
        }
        if let Some(old) = self.research_node.and_then(|old| self.nodes.get_mut(&old)) {
            old.set_kind(NodeKind::Normal);
        }
        self.node_mut(id)?.set_kind(NodeKind::Research);
        self.research_node = Some(id);
        Ok(true)
    }

    /// Checks occupancy and research-node consistency
    pub fn check_invariants(&self) -> Result<()> {
        for player in self.players.values() {
            let holders: Vec<NodeId> = self
                .nodes()
                .filter(|node| node.is_occupied_by(player.name()))
                .map(NodeState::id)
                .collect();
            if holders != [player.location()] {
                return Err(BoardError::Invariant(format!(
                    "player [{}] at [{}] is held by nodes {holders:?}",
                    player.name(),
                    player.location()
                )));
            }
        }
        let research: Vec<NodeId> = self
            .nodes()
            .filter(|node| node.is_research())
            .map(NodeState::id)
            .collect();
        let Some(expected) = self.research_node else {
            return Err(BoardError::Invariant(format!(
                "no research node, flagged nodes are {research:?}"
            )));
        };
        if research != [expected] {
            return Err(BoardError::Invariant(format!(
                "research nodes {research:?} do not match {expected:?}"
            )));
        }
        Ok(())
    }
}
