//! Top-level simulation host: owns the clock, graph, dispatcher and event
//! journal, and advances everything one tick at a time.

use tracing::info;

use super::dispatcher::{Dispatcher, FleetKpis};
use super::events::{EventSink, SimEvent};
use super::graph::NavGraph;
use super::persist::{PersistError, SimSnapshot};
use super::task::TaskKind;
use super::topology::{TopologyError, TopologySpec};
use super::agent::AgvController;
use super::types::{ItemId, NodeId, SimConfig, SimTime, TaskId, SNAPSHOT_VERSION};

#[derive(Debug, Clone)]
pub struct Simulation {
    config: SimConfig,
    graph: NavGraph,
    dispatcher: Dispatcher,
    events: EventSink,
    time: SimTime,
    paused: bool,
    speed_multiplier: f64,
}

impl Simulation {
    pub fn new(topology: &TopologySpec, config: SimConfig) -> Result<Self, TopologyError> {
        let config = config.sanitized();
        let graph = topology.build()?;
        let dispatcher = Dispatcher::new(&config);
        info!(nodes = graph.len(), "simulation initialized");
        Ok(Self {
            config,
            graph,
            dispatcher,
            events: EventSink::default(),
            time: 0.0,
            paused: false,
            speed_multiplier: 1.0,
        })
    }

    // --------------------------------------------------------------------
    // Clock
    // --------------------------------------------------------------------

    /// Advance the world by one tick of wall-clock time. Simulated time
    /// moves `real_dt * speed_multiplier`; no-op while paused.
    pub fn tick(&mut self, real_dt: f64) {
        if self.paused || real_dt <= 0.0 {
            return;
        }
        let dt = real_dt * self.speed_multiplier;
        self.time += dt;
        self.dispatcher
            .update(dt, self.time, &mut self.graph, &mut self.events, &self.config);
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_speed_multiplier(&mut self, multiplier: f64) {
        if multiplier.is_finite() && multiplier > 0.0 {
            self.speed_multiplier = multiplier;
        }
    }

    pub fn speed_multiplier(&self) -> f64 {
        self.speed_multiplier
    }

    pub fn time(&self) -> SimTime {
        self.time
    }

    // --------------------------------------------------------------------
    // World access
    // --------------------------------------------------------------------

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn graph(&self) -> &NavGraph {
        &self.graph
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn kpis(&self) -> FleetKpis {
        self.dispatcher.kpis()
    }

    pub fn register_fleet(&mut self, agents: Vec<AgvController>) {
        self.dispatcher.register_fleet(agents);
    }

    /// Places a fresh agent at the given node and adds it to the fleet.
    pub fn spawn_agent(&mut self, id: impl Into<String>, at: &str) -> bool {
        let mut agent = AgvController::new(id);
        if !agent.place_at(at, &mut self.graph) {
            return false;
        }
        self.dispatcher.register_agent(agent);
        true
    }

    pub fn submit_task(
        &mut self,
        kind: TaskKind,
        pickup: impl Into<NodeId>,
        dropoff: impl Into<NodeId>,
        payload: Option<ItemId>,
        priority: i32,
    ) -> TaskId {
        self.dispatcher
            .submit(kind, pickup, dropoff, payload, priority, self.time)
    }

    // --------------------------------------------------------------------
    // Events
    // --------------------------------------------------------------------

    pub fn events(&self) -> &[SimEvent] {
        self.events.events()
    }

    /// Hands the accumulated journal to the caller and clears it.
    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        self.events.drain()
    }

    // --------------------------------------------------------------------
    // Persistence
    // --------------------------------------------------------------------

    pub fn snapshot(&self) -> SimSnapshot {
        SimSnapshot {
            version: SNAPSHOT_VERSION,
            time: self.time,
            paused: self.paused,
            speed_multiplier: self.speed_multiplier,
            config: self.config.clone(),
            graph: self.graph.clone(),
            dispatcher: self.dispatcher.clone(),
            events: self.events.clone(),
        }
    }

    pub fn from_snapshot(snapshot: SimSnapshot) -> Result<Self, PersistError> {
        snapshot.validate_version()?;
        Ok(Self {
            config: snapshot.config.sanitized(),
            graph: snapshot.graph,
            dispatcher: snapshot.dispatcher,
            events: snapshot.events,
            time: snapshot.time,
            paused: snapshot.paused,
            speed_multiplier: snapshot.speed_multiplier,
        })
    }

    pub fn save_to_path(&self, path: impl AsRef<std::path::Path>) -> Result<(), PersistError> {
        self.snapshot().save_to_path(path)
    }

    pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<Self, PersistError> {
        Self::from_snapshot(SimSnapshot::load_from_path(path)?)
    }
}
