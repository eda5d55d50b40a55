use std::collections::BTreeSet;

use getset::{CopyGetters, Getters};

use crate::graph::{NodeDescriptor, NodeKind};
use crate::prelude::*;

/// Mutable state of one board location.
#[derive(Clone, CopyGetters, Debug, Getters, PartialEq)]
pub struct NodeState {
    #[getset(get_copy = "pub")]
    id: NodeId,
    #[getset(get_copy = "pub")]
    kind: NodeKind,
    /// Absolute infection level as last reported by the server
    #[getset(get_copy = "pub")]
    virus_count: u32,
    /// Names of the players standing here
    #[getset(get = "pub")]
    occupants: BTreeSet<String>,
}

impl NodeState {
    pub(crate) fn new(descriptor: &NodeDescriptor) -> Self {
        NodeState {
            id: descriptor.id,
            kind: descriptor.kind,
            virus_count: 0,
            occupants: BTreeSet::new(),
        }
    }

    pub fn is_research(&self) -> bool {
        self.kind == NodeKind::Research
    }

    pub fn has_virus(&self) -> bool {
        self.virus_count > 0
    }

    pub fn is_occupied_by(&self, player: &str) -> bool {
        self.occupants.contains(player)
    }

    pub(crate) fn set_kind(&mut self, kind: NodeKind) {
        self.kind = kind;
    }

    /// Returns the previous level if it differed
    pub(crate) fn set_virus_count(&mut self, count: u32) -> Option<u32> {
        if self.virus_count == count {
            None
        } else {
            Some(std::mem::replace(&mut self.virus_count, count))
        }
    }

    pub(crate) fn add_occupant(&mut self, player: &str) -> bool {
        self.occupants.insert(player.to_owned())
    }

    pub(crate) fn remove_occupant(&mut self, player: &str) -> bool {
        self.occupants.remove(player)
    }
}
