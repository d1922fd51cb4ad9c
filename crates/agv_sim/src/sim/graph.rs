//! Navigation graph: nodes, symmetric edges, reservations, and A* search.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use crate::geometry::{distance, Vec2};

use super::types::{AgentId, ItemId, NodeId};

// ============================================================================
// Nodes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Path,
    Intersection,
    Storage,
    Reception,
    Shipping,
    Charging,
    Waiting,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub position: Vec2,
    pub kind: NodeKind,
    pub neighbors: BTreeSet<NodeId>,
    /// An agent is physically standing on this node.
    pub occupied: bool,
    /// An agent has claimed this node as part of an in-progress route.
    pub reserved_by: Option<AgentId>,
    /// Stored goods, meaningful for storage-kind nodes.
    pub item_id: Option<ItemId>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind, position: Vec2) -> Self {
        Self {
            id: id.into(),
            position,
            kind,
            neighbors: BTreeSet::new(),
            occupied: false,
            reserved_by: None,
            item_id: None,
        }
    }

    /// Free for routing and assignment: neither occupied nor reserved.
    pub fn is_available(&self) -> bool {
        !self.occupied && self.reserved_by.is_none()
    }
}

// ============================================================================
// Navigation Graph
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NavGraph {
    nodes: BTreeMap<NodeId, Node>,
}

impl NavGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Construction only; not exposed past topology building.
    pub(crate) fn insert_node(&mut self, node: Node) -> bool {
        if self.nodes.contains_key(&node.id) {
            return false;
        }
        self.nodes.insert(node.id.clone(), node);
        true
    }

    /// Adds a symmetric edge; construction only, edges are fixed after setup.
    pub(crate) fn connect(&mut self, a: &str, b: &str) -> bool {
        if a == b || !self.nodes.contains_key(a) || !self.nodes.contains_key(b) {
            return false;
        }
        if let Some(node) = self.nodes.get_mut(a) {
            node.neighbors.insert(b.to_string());
        }
        if let Some(node) = self.nodes.get_mut(b) {
            node.neighbors.insert(a.to_string());
        }
        true
    }

    /// Closest node to a position by straight-line distance, optionally
    /// restricted to one kind. Ties break toward the smaller node id.
    pub fn find_nearest(&self, position: Vec2, kind: Option<NodeKind>) -> Option<&Node> {
        let mut best: Option<(&Node, f64)> = None;
        for node in self.nodes.values() {
            if let Some(kind) = kind {
                if node.kind != kind {
                    continue;
                }
            }
            let d = distance(position, node.position);
            match best {
                Some((_, best_d)) if d >= best_d => {}
                _ => best = Some((node, d)),
            }
        }
        best.map(|(node, _)| node)
    }

    /// First available node of the given kind, in id order.
    pub fn find_available(&self, kind: NodeKind) -> Option<NodeId> {
        self.nodes
            .values()
            .find(|n| n.kind == kind && n.is_available())
            .map(|n| n.id.clone())
    }

    /// Random available storage node, filtered by whether it holds an item.
    pub fn find_storage(&self, with_item: bool, rng: &mut impl Rng) -> Option<NodeId> {
        let candidates: Vec<&Node> = self
            .nodes
            .values()
            .filter(|n| {
                n.kind == NodeKind::Storage
                    && n.is_available()
                    && n.item_id.is_some() == with_item
            })
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let pick = rng.gen_range(0..candidates.len());
        Some(candidates[pick].id.clone())
    }

    // ------------------------------------------------------------------------
    // Reservations and occupancy
    // ------------------------------------------------------------------------

    /// Claim a node for an agent's route. Idempotent for the same agent;
    /// fails when another agent already holds the claim.
    pub fn try_reserve(&mut self, id: &str, agent: &str) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        match &node.reserved_by {
            Some(holder) if holder != agent => false,
            _ => {
                node.reserved_by = Some(agent.to_string());
                true
            }
        }
    }

    /// Drop any reservation on a node. Idempotent.
    pub fn release(&mut self, id: &str) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.reserved_by = None;
        }
    }

    /// Drop a reservation only if the given agent holds it.
    pub fn release_if_held(&mut self, id: &str, agent: &str) {
        if let Some(node) = self.nodes.get_mut(id) {
            if node.reserved_by.as_deref() == Some(agent) {
                node.reserved_by = None;
            }
        }
    }

    /// Release every reservation held by an agent (route teardown).
    pub fn release_all(&mut self, agent: &str) {
        for node in self.nodes.values_mut() {
            if node.reserved_by.as_deref() == Some(agent) {
                node.reserved_by = None;
            }
        }
    }

    pub fn set_occupied(&mut self, id: &str, occupied: bool) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.occupied = occupied;
        }
    }

    // ------------------------------------------------------------------------
    // Storage payloads
    // ------------------------------------------------------------------------

    pub fn put_item(&mut self, id: &str, item: ItemId) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.item_id = Some(item);
                true
            }
            None => false,
        }
    }

    pub fn take_item(&mut self, id: &str) -> Option<ItemId> {
        self.nodes.get_mut(id).and_then(|node| node.item_id.take())
    }

    // ------------------------------------------------------------------------
    // Path search
    // ------------------------------------------------------------------------

    /// A* over the graph using straight-line distance as both edge cost and
    /// heuristic. Occupied nodes are pruned from expansion unless they are
    /// the goal itself: destination occupancy does not block arrival, but it
    /// does block stepping through.
    ///
    /// An empty result means "no path"; callers defer and retry, this is not
    /// an error. Equal-cost ties pop in discovery order so searches are
    /// deterministic.
    pub fn find_path(&self, start: &str, goal: &str) -> Vec<NodeId> {
        if !self.nodes.contains_key(start) || !self.nodes.contains_key(goal) {
            return Vec::new();
        }
        let goal_pos = match self.nodes.get(goal) {
            Some(node) => node.position,
            None => return Vec::new(),
        };
        if start == goal {
            return vec![start.to_string()];
        }

        let mut open = BinaryHeap::new();
        let mut came_from: BTreeMap<NodeId, NodeId> = BTreeMap::new();
        let mut g_score: BTreeMap<NodeId, f64> = BTreeMap::new();
        let mut seq: u64 = 0;

        g_score.insert(start.to_string(), 0.0);
        open.push(OpenEntry {
            f: distance(self.nodes[start].position, goal_pos),
            seq,
            node: start.to_string(),
        });

        while let Some(OpenEntry { node: current, .. }) = open.pop() {
            if current == goal {
                return reconstruct(&came_from, &current);
            }
            let base_g = match g_score.get(&current) {
                Some(g) => *g,
                None => continue,
            };
            let Some(current_node) = self.nodes.get(&current) else {
                continue;
            };
            for neighbor_id in &current_node.neighbors {
                let Some(neighbor) = self.nodes.get(neighbor_id) else {
                    continue;
                };
                if neighbor.occupied && neighbor_id != goal {
                    continue;
                }
                let tentative_g = base_g + distance(current_node.position, neighbor.position);
                let known = g_score.get(neighbor_id).copied().unwrap_or(f64::INFINITY);
                if tentative_g < known {
                    came_from.insert(neighbor_id.clone(), current.clone());
                    g_score.insert(neighbor_id.clone(), tentative_g);
                    seq += 1;
                    open.push(OpenEntry {
                        f: tentative_g + distance(neighbor.position, goal_pos),
                        seq,
                        node: neighbor_id.clone(),
                    });
                }
            }
        }

        Vec::new()
    }
}

fn reconstruct(came_from: &BTreeMap<NodeId, NodeId>, goal: &str) -> Vec<NodeId> {
    let mut path = vec![goal.to_string()];
    let mut cursor = goal.to_string();
    while let Some(prev) = came_from.get(&cursor) {
        path.push(prev.clone());
        cursor = prev.clone();
    }
    path.reverse();
    path
}

/// Open-set entry. The heap is a max-heap, so ordering is inverted: lower
/// f-score wins, and on equal f the earlier sequence number wins.
#[derive(Debug, Clone)]
struct OpenEntry {
    f: f64,
    seq: u64,
    node: NodeId,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.f == other.f && self.seq == other.seq
    }
}

impl Eq for OpenEntry {}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .partial_cmp(&self.f)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
