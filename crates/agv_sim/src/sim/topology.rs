//! Declarative warehouse layouts: a flat node/edge spec validated into a
//! [`NavGraph`], plus the built-in demo floor.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::Vec2;

use super::graph::{NavGraph, Node, NodeKind};
use super::types::{ItemId, NodeId};

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("topology has no nodes")]
    Empty,
    #[error("duplicate node id: {0}")]
    DuplicateNode(NodeId),
    #[error("edge references unknown node: {from} -> {to}")]
    DanglingEdge { from: NodeId, to: NodeId },
    #[error("self edge on node: {0}")]
    SelfEdge(NodeId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    pub kind: NodeKind,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub item: Option<ItemId>,
}

impl NodeSpec {
    pub fn new(id: impl Into<NodeId>, kind: NodeKind, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            kind,
            x,
            y,
            item: None,
        }
    }

    pub fn with_item(mut self, item: impl Into<ItemId>) -> Self {
        self.item = Some(item.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TopologySpec {
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<(NodeId, NodeId)>,
}

impl TopologySpec {
    /// Validates the layout and materializes the navigation graph. Edges
    /// are undirected; each endpoint must name a declared node.
    pub fn build(&self) -> Result<NavGraph, TopologyError> {
        if self.nodes.is_empty() {
            return Err(TopologyError::Empty);
        }
        let mut graph = NavGraph::default();
        for spec in &self.nodes {
            if graph.node(&spec.id).is_some() {
                return Err(TopologyError::DuplicateNode(spec.id.clone()));
            }
            let mut node = Node::new(spec.id.clone(), spec.kind, Vec2::new(spec.x, spec.y));
            node.item_id = spec.item.clone();
            graph.insert_node(node);
        }
        for (from, to) in &self.edges {
            if from == to {
                return Err(TopologyError::SelfEdge(from.clone()));
            }
            if !graph.connect(from, to) {
                return Err(TopologyError::DanglingEdge {
                    from: from.clone(),
                    to: to.clone(),
                });
            }
        }
        Ok(graph)
    }
}

/// Built-in demo floor: a two-rail corridor with storage racks on the top
/// side, reception and shipping docks at the ends, chargers and a waiting
/// bay on the bottom rail.
pub fn demo_layout() -> TopologySpec {
    let mut nodes = Vec::new();
    let mut edges: Vec<(NodeId, NodeId)> = Vec::new();

    // Main corridor, 10 m spacing.
    for i in 0..8 {
        nodes.push(NodeSpec::new(
            format!("c{i}"),
            if i % 3 == 0 {
                NodeKind::Intersection
            } else {
                NodeKind::Path
            },
            i as f64 * 10.0,
            0.0,
        ));
        if i > 0 {
            edges.push((format!("c{}", i - 1), format!("c{i}")));
        }
    }

    // Storage racks hang off the corridor.
    for i in 0..6 {
        let rack = format!("s{}", i + 1);
        nodes.push(NodeSpec::new(&rack, NodeKind::Storage, (i + 1) as f64 * 10.0, 8.0));
        edges.push((format!("c{}", i + 1), rack));
    }

    // Docks at the corridor ends.
    nodes.push(NodeSpec::new("r1", NodeKind::Reception, -8.0, 0.0));
    edges.push(("r1".into(), "c0".into()));
    nodes.push(NodeSpec::new("x1", NodeKind::Shipping, 78.0, 0.0));
    edges.push(("c7".into(), "x1".into()));

    // Chargers and a waiting bay below the corridor.
    nodes.push(NodeSpec::new("ch1", NodeKind::Charging, 10.0, -8.0));
    edges.push(("c1".into(), "ch1".into()));
    nodes.push(NodeSpec::new("ch2", NodeKind::Charging, 60.0, -8.0));
    edges.push(("c6".into(), "ch2".into()));
    nodes.push(NodeSpec::new("w1", NodeKind::Waiting, 30.0, -8.0));
    edges.push(("c3".into(), "w1".into()));

    TopologySpec { nodes, edges }
}
