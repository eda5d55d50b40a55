use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::prelude::*;

pub type NodeId = u32;

const CLUSTER_WEB: &str = include_str!("../assets/topology/cluster_web.toml");

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Reflect, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    #[default]
    Normal,
    Research,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct NodeDescriptor {
    pub id: NodeId,
    #[serde(default, rename = "type")]
    pub kind: NodeKind,
}

/// Static board layout as it appears in configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Topology {
    #[serde(default)]
    pub nodes: Vec<NodeDescriptor>,
    #[serde(default)]
    pub edges: Vec<(NodeId, NodeId)>,
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("no node with id [{0}]")]
    NotFound(NodeId),
    #[error("unable to parse topology: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unable to read topology: {0}")]
    Io(#[from] std::io::Error),
}

impl Topology {
    pub fn from_toml_str(source: &str) -> Result<Self, GraphError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, GraphError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// The board bundled with the crate
    pub fn cluster_web() -> Result<Self, GraphError> {
        Self::from_toml_str(CLUSTER_WEB)
    }
}

/// Node identity and adjacency. Built once per session and never mutated.
///
/// Edges are recorded as configured: duplicates collapse in the adjacency
/// sets and self-loops make a node its own neighbor. Edges naming a node that
/// is not in the node list are left out of the adjacency.
#[derive(Debug, Resource)]
pub struct BoardGraph {
    order: Vec<NodeId>,
    nodes: HashMap<NodeId, NodeDescriptor>,
    edges: Vec<(NodeId, NodeId)>,
    adjacency: HashMap<NodeId, BTreeSet<NodeId>>,
}

impl BoardGraph {
    pub fn new(topology: &Topology) -> Self {
        let mut order = Vec::with_capacity(topology.nodes.len());
        let mut nodes = HashMap::default();
        for descriptor in topology.nodes.iter() {
            if nodes.insert(descriptor.id, descriptor.clone()).is_some() {
                log::warn!("Topology lists node [{}] more than once, last entry wins", descriptor.id);
            } else {
                order.push(descriptor.id);
            }
        }

        let mut adjacency: HashMap<NodeId, BTreeSet<NodeId>> = HashMap::default();
        for &(a, b) in topology.edges.iter() {
            if !nodes.contains_key(&a) || !nodes.contains_key(&b) {
                log::warn!("Topology edge ({a}, {b}) names an unknown node, skipping it");
                continue;
            }
            adjacency.entry(a).or_default().insert(b);
            adjacency.entry(b).or_default().insert(a);
        }

        BoardGraph {
            order,
            nodes,
            edges: topology.edges.clone(),
            adjacency,
        }
    }

    pub fn lookup(&self, id: NodeId) -> Result<&NodeDescriptor, GraphError> {
        self.nodes.get(&id).ok_or(GraphError::NotFound(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Symmetric: `b` is a neighbor of `a` exactly when `a` is a neighbor of `b`.
    pub fn neighbors(&self, id: NodeId) -> BTreeSet<NodeId> {
        self.adjacency.get(&id).cloned().unwrap_or_default()
    }

    /// Every node but `id`, in configured order
    pub fn nodes_except(&self, id: NodeId) -> Vec<NodeId> {
        self.order.iter().copied().filter(|&n| n != id).collect()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.order.iter().copied()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &NodeDescriptor> + '_ {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn edges(&self) -> &[(NodeId, NodeId)] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// First node the topology flags as the research node
    pub fn flagged_research_node(&self) -> Option<NodeId> {
        self.descriptors()
            .find(|descriptor| descriptor.kind == NodeKind::Research)
            .map(|descriptor| descriptor.id)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn line_topology() -> Topology {
        Topology {
            nodes: vec![
                NodeDescriptor { id: 1, kind: NodeKind::Normal },
                NodeDescriptor { id: 2, kind: NodeKind::Normal },
                NodeDescriptor { id: 3, kind: NodeKind::Research },
            ],
            edges: vec![(1, 2), (2, 3)],
        }
    }

    #[test]
    fn every_configured_edge_is_symmetric() {
        let topology = Topology::cluster_web().unwrap();
        let graph = BoardGraph::new(&topology);
        for &(a, b) in graph.edges() {
            assert!(graph.neighbors(a).contains(&b), "{b} should neighbor {a}");
            assert!(graph.neighbors(b).contains(&a), "{a} should neighbor {b}");
        }
    }

    #[test]
    fn lookup_unknown_id_is_not_found() {
        let graph = BoardGraph::new(&line_topology());
        assert!(graph.lookup(2).is_ok());
        assert!(matches!(graph.lookup(42), Err(GraphError::NotFound(42))));
        assert!(graph.neighbors(42).is_empty());
    }

    #[test]
    fn nodes_except_keeps_configured_order() {
        let graph = BoardGraph::new(&line_topology());
        assert_eq!(vec![1, 3], graph.nodes_except(2));
        assert_eq!(vec![1, 2, 3], graph.nodes_except(99));
    }

    #[test]
    fn duplicate_edges_and_self_loops_are_not_rejected() {
        let mut topology = line_topology();
        topology.edges.extend([(2, 1), (3, 3), (1, 7)]);
        let graph = BoardGraph::new(&topology);
        assert_eq!(vec![2], graph.neighbors(1).into_iter().collect::<Vec<_>>());
        assert!(graph.neighbors(3).contains(&3));
        assert!(!graph.contains(7));
        assert_eq!(5, graph.edges().len());
    }

    #[test]
    fn cluster_web_has_one_research_node() {
        let graph = BoardGraph::new(&Topology::cluster_web().unwrap());
        assert_eq!(13, graph.len());
        assert_eq!(Some(13), graph.flagged_research_node());
        assert_eq!(
            vec![8, 9],
            graph.neighbors(13).into_iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn topology_parses_from_toml() {
        let topology = Topology::from_toml_str(
            r#"
            nodes = [{ id = 1 }, { id = 2, type = "research" }]
            edges = [[1, 2]]
            "#,
        )
        .unwrap();
        assert_eq!(NodeKind::Research, topology.nodes[1].kind);
        assert_eq!(vec![(1, 2)], topology.edges);
        assert!(Topology::from_toml_str("nodes = 3").is_err());
    }
}
