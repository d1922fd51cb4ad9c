//! Warehouse AGV fleet simulator: deterministic tick engine with graph
//! routing, reservation-based traffic control, battery management and a
//! priority task dispatcher.

pub mod geometry;
pub mod sim;

pub use geometry::{Pose, Vec2};
pub use sim::{
    demo_layout, AgvController, AgvStatus, Dispatcher, FleetKpis, NavGraph, NodeKind, SimConfig,
    SimSnapshot, Simulation, Task, TaskKind, TaskStatus, TopologySpec,
};
