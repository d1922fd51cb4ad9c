//! Discrete-tick warehouse AGV fleet simulation.
//!
//! - [`graph`]: navigation graph, reservations and A* routing
//! - [`agent`]: per-vehicle motion and mission state machine
//! - [`dispatcher`]: task queue, matching, demand and fleet stats
//! - [`task`]: transport mission records and lifecycle
//! - [`events`]: append-only journal of observable world changes
//! - [`topology`]: declarative layouts validated into graphs
//! - [`runner`]: the simulation host tying everything together
//! - [`persist`]: versioned JSON snapshots

pub mod agent;
pub mod dispatcher;
pub mod events;
pub mod graph;
pub mod persist;
pub mod runner;
pub mod task;
pub mod topology;
pub mod types;

#[cfg(test)]
mod tests;

pub use agent::{AgvController, AgvStatus, MovePhase};
pub use dispatcher::{DispatchStats, Dispatcher, FleetKpis};
pub use events::{AgentSnapshot, EventSink, SimEvent, SimEventKind, StockChange, StockItem, TaskEvent};
pub use graph::{NavGraph, Node, NodeKind};
pub use persist::{PersistError, SimSnapshot};
pub use runner::Simulation;
pub use task::{Task, TaskKind, TaskStatus};
pub use topology::{demo_layout, NodeSpec, TopologyError, TopologySpec};
pub use types::{
    AgentId, ItemId, NodeId, SimConfig, SimEventId, SimTime, TaskId, SNAPSHOT_VERSION,
};
