//! Outbound records consumed by rendering/persistence collaborators.
//!
//! The core publishes plain data; no transport or storage format is owned
//! here. Every record is appended to a journal the host drains each tick.

use serde::{Deserialize, Serialize};

use super::task::{Task, TaskKind, TaskStatus};
use super::types::{ItemId, NodeId, SimEventId, SimTime, TaskId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub status: super::agent::AgvStatus,
    pub battery: f64,
    pub speed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub pickup: NodeId,
    pub dropoff: NodeId,
    pub payload: Option<ItemId>,
    pub created_at: SimTime,
    pub started_at: Option<SimTime>,
    pub completed_at: Option<SimTime>,
}

impl TaskEvent {
    pub fn from_task(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            kind: task.kind,
            status: task.status,
            pickup: task.pickup.clone(),
            dropoff: task.dropoff.clone(),
            payload: task.payload.clone(),
            created_at: task.created_at,
            started_at: task.started_at,
            completed_at: task.completed_at,
        }
    }
}

/// Published when a storage node's payload is attached or detached.
/// Carries the node's post-change state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockChange {
    pub location_id: NodeId,
    pub occupied: bool,
    pub payload: Option<ItemId>,
}

/// Goods metadata tracked alongside storage payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockItem {
    pub id: ItemId,
    pub fill_level: u8,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    pub id: SimEventId,
    pub time: SimTime,
    pub kind: SimEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SimEventKind {
    Agent(AgentSnapshot),
    Task(TaskEvent),
    Stock(StockChange),
    StockItem(StockItem),
}

// ============================================================================
// Event Sink
// ============================================================================

/// Append-only journal of outbound records, drained by the host loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EventSink {
    next_id: SimEventId,
    events: Vec<SimEvent>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, time: SimTime, kind: SimEventKind) {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        self.events.push(SimEvent { id, time, kind });
    }

    pub fn task_event(&mut self, time: SimTime, task: &Task) {
        self.push(time, SimEventKind::Task(TaskEvent::from_task(task)));
    }

    pub fn stock_change(&mut self, time: SimTime, location_id: &str, payload: Option<ItemId>) {
        self.push(
            time,
            SimEventKind::Stock(StockChange {
                location_id: location_id.to_string(),
                occupied: payload.is_some(),
                payload,
            }),
        );
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    /// Hand all buffered records to the caller, leaving the journal empty.
    pub fn drain(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.events)
    }
}
