//! Task value type and its lifecycle state machine.

use serde::{Deserialize, Serialize};

use super::types::{AgentId, ItemId, NodeId, SimTime, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Inbound,
    Outbound,
    Relocate,
    Charging,
}

/// Lifecycle: Pending -> Assigned -> InProgress -> Completed | Failed.
/// Transitions never go backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    /// Higher is more urgent; ties serve in creation order.
    pub priority: i32,
    pub pickup: NodeId,
    pub dropoff: NodeId,
    pub payload: Option<ItemId>,
    pub status: TaskStatus,
    pub assigned_agent: Option<AgentId>,
    pub created_at: SimTime,
    pub started_at: Option<SimTime>,
    pub completed_at: Option<SimTime>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        kind: TaskKind,
        pickup: impl Into<String>,
        dropoff: impl Into<String>,
        payload: Option<ItemId>,
        priority: i32,
        created_at: SimTime,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            priority,
            pickup: pickup.into(),
            dropoff: dropoff.into(),
            payload,
            status: TaskStatus::Pending,
            assigned_agent: None,
            created_at,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Pending -> Assigned. Records the agent and the start timestamp.
    pub fn assign(&mut self, agent: impl Into<String>, now: SimTime) {
        debug_assert_eq!(self.status, TaskStatus::Pending);
        if self.status != TaskStatus::Pending {
            return;
        }
        self.status = TaskStatus::Assigned;
        self.assigned_agent = Some(agent.into());
        self.started_at = Some(now);
    }

    /// Assigned -> InProgress: the agent has begun physically executing.
    pub fn start(&mut self) {
        debug_assert_eq!(self.status, TaskStatus::Assigned);
        if self.status != TaskStatus::Assigned {
            return;
        }
        self.status = TaskStatus::InProgress;
    }

    /// InProgress -> Completed.
    pub fn complete(&mut self, now: SimTime) {
        debug_assert_eq!(self.status, TaskStatus::InProgress);
        if self.status != TaskStatus::InProgress {
            return;
        }
        self.status = TaskStatus::Completed;
        self.completed_at = Some(now);
    }

    /// Assigned | InProgress -> Failed.
    pub fn fail(&mut self, now: SimTime) {
        debug_assert!(matches!(
            self.status,
            TaskStatus::Assigned | TaskStatus::InProgress
        ));
        if self.is_terminal() || self.status == TaskStatus::Pending {
            return;
        }
        self.status = TaskStatus::Failed;
        self.completed_at = Some(now);
    }

    /// Wall-clock-free duration from assignment to terminal state.
    pub fn duration(&self) -> Option<f64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}
