//! Per-AGV controller: motion/operation state machine, battery model, and
//! mission execution against the navigation graph.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::geometry::{distance, heading_to, wrap_angle, Pose};

use super::events::{AgentSnapshot, EventSink, SimEventKind};
use super::graph::{NavGraph, NodeKind};
use super::task::{Task, TaskKind, TaskStatus};
use super::types::{AgentId, NodeId, SimConfig, SimTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgvStatus {
    #[default]
    Idle,
    MovingToPick,
    Loading,
    MovingToDrop,
    Unloading,
    Charging,
}

impl AgvStatus {
    pub fn is_moving(&self) -> bool {
        matches!(self, AgvStatus::MovingToPick | AgvStatus::MovingToDrop)
    }

    /// Counted toward fleet utilization.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AgvStatus::MovingToPick
                | AgvStatus::Loading
                | AgvStatus::MovingToDrop
                | AgvStatus::Unloading
        )
    }
}

/// Sub-state of any moving status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MovePhase {
    Rotating,
    Traveling,
    #[default]
    Arrived,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgvController {
    pub id: AgentId,
    pub pose: Pose,
    /// State of charge, 0-100.
    pub battery: f64,
    pub speed: f64,
    pub status: AgvStatus,
    pub move_phase: MovePhase,
    pub current_task: Option<Task>,
    pub(crate) route: Vec<NodeId>,
    pub(crate) waypoint_index: usize,
    pub(crate) dwell_timer: f64,
    pub(crate) path_retries: u32,
    /// Node the agent currently occupies, if any.
    pub(crate) current_node: Option<NodeId>,
    /// Destination of a task-less charging run.
    pub(crate) charge_goal: Option<NodeId>,
    last_snapshot: Option<AgentSnapshot>,
}

impl AgvController {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pose: Pose::default(),
            battery: 100.0,
            speed: 0.0,
            status: AgvStatus::Idle,
            move_phase: MovePhase::Arrived,
            current_task: None,
            route: Vec::new(),
            waypoint_index: 0,
            dwell_timer: 0.0,
            path_retries: 0,
            current_node: None,
            charge_goal: None,
            last_snapshot: None,
        }
    }

    /// Drop the agent onto a graph node at fleet initialization.
    pub fn place_at(&mut self, node_id: &str, graph: &mut NavGraph) -> bool {
        let Some(node) = graph.node(node_id) else {
            return false;
        };
        let position = node.position;
        self.pose = Pose::at(position);
        graph.set_occupied(node_id, true);
        self.current_node = Some(node_id.to_string());
        true
    }

    /// Availability predicate for new work.
    pub fn is_eligible(&self, reserve_pct: f64) -> bool {
        self.status == AgvStatus::Idle
            && self.current_task.is_none()
            && self.battery > reserve_pct
    }

    pub fn route(&self) -> &[NodeId] {
        &self.route
    }

    pub fn current_node(&self) -> Option<&str> {
        self.current_node.as_deref()
    }

    // ------------------------------------------------------------------------
    // Mission start
    // ------------------------------------------------------------------------

    /// Accept an assigned task and begin moving toward its pickup node.
    ///
    /// An empty path while not colocated is not fatal: the agent enters the
    /// moving state with no route and re-queries the graph on later ticks,
    /// bounded by the retry budget.
    pub fn assign_task(
        &mut self,
        task: Task,
        graph: &mut NavGraph,
        cfg: &SimConfig,
    ) {
        debug_assert!(self.current_task.is_none());
        debug_assert_eq!(task.status, TaskStatus::Assigned);
        let pickup = task.pickup.clone();
        self.current_task = Some(task);
        self.path_retries = 0;
        self.route.clear();
        self.waypoint_index = 0;
        self.move_phase = MovePhase::Rotating;

        let start = self.start_node(graph);
        let Some(start) = start else {
            self.status = AgvStatus::MovingToPick;
            return;
        };
        if start == pickup {
            self.status = AgvStatus::Loading;
            self.dwell_timer = cfg.motion.dwell_secs;
            return;
        }
        self.status = AgvStatus::MovingToPick;
        let path = graph.find_path(&start, &pickup);
        if !path.is_empty() {
            self.set_route(path, graph);
        }
    }

    // ------------------------------------------------------------------------
    // Per-tick update
    // ------------------------------------------------------------------------

    /// Advance the controller by `dt` simulated seconds. Returns the task if
    /// it reached a terminal state this tick; the dispatcher reaps it.
    pub fn update(
        &mut self,
        dt: f64,
        now: SimTime,
        graph: &mut NavGraph,
        events: &mut EventSink,
        cfg: &SimConfig,
    ) -> Option<Task> {
        self.start_task_if_pending(now, events);

        let mut finished = None;
        match self.status {
            AgvStatus::Idle => {
                self.speed = 0.0;
                if self.current_task.is_none() && self.battery < cfg.battery.reserve_pct {
                    self.try_start_charge_run(graph);
                }
            }
            AgvStatus::MovingToPick | AgvStatus::MovingToDrop => {
                if self.battery < cfg.battery.reserve_pct
                    && self.charge_goal.is_none()
                    && self.current_task.is_some()
                {
                    finished = self.divert_to_charging(now, graph, events);
                } else if self.route.is_empty() || self.waypoint_index >= self.route.len() {
                    finished = self.retry_leg(now, graph, events, cfg);
                } else {
                    let arrived = self.advance_motion(dt, graph, cfg);
                    if self.speed > 0.0 {
                        self.battery = (self.battery - cfg.battery.drain_per_sec * dt).max(0.0);
                    }
                    if arrived {
                        finished = self.on_leg_complete(now, graph, events, cfg);
                    }
                }
            }
            AgvStatus::Loading => {
                self.dwell_timer -= dt;
                if self.dwell_timer <= 0.0 {
                    finished = self.on_loading_done(now, graph, events, cfg);
                }
            }
            AgvStatus::Unloading => {
                self.dwell_timer -= dt;
                if self.dwell_timer <= 0.0 {
                    finished = self.on_unloading_done(now, graph, events);
                }
            }
            AgvStatus::Charging => {
                self.speed = 0.0;
                self.battery = (self.battery + cfg.battery.charge_per_sec * dt).min(100.0);
                if self.battery >= cfg.battery.resume_pct {
                    debug!(agent = %self.id, battery = self.battery, "charge complete");
                    self.status = AgvStatus::Idle;
                }
            }
        }

        self.publish(now, events);
        finished
    }

    /// Assigned -> InProgress once the agent has left idle.
    fn start_task_if_pending(&mut self, now: SimTime, events: &mut EventSink) {
        if self.status == AgvStatus::Idle {
            return;
        }
        let needs_start = self
            .current_task
            .as_ref()
            .map(|t| t.status == TaskStatus::Assigned)
            .unwrap_or(false);
        if needs_start {
            if let Some(task) = self.current_task.as_mut() {
                task.start();
            }
            if let Some(task) = self.current_task.as_ref() {
                events.task_event(now, task);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Motion
    // ------------------------------------------------------------------------

    /// One motion step toward the current waypoint. Returns true when the
    /// final waypoint of the route is reached.
    fn advance_motion(&mut self, dt: f64, graph: &mut NavGraph, cfg: &SimConfig) -> bool {
        let target_id = self.route[self.waypoint_index].clone();
        let Some(target) = graph.node(&target_id) else {
            // Route references a node that no longer resolves; re-route.
            self.route.clear();
            self.waypoint_index = 0;
            return false;
        };
        let target_pos = target.position;
        let dist = distance(self.pose.position, target_pos);

        if dist <= cfg.motion.waypoint_tolerance {
            self.pose.position = target_pos;
            self.arrive_at(graph, &target_id);
            self.waypoint_index += 1;
            if self.waypoint_index >= self.route.len() {
                self.move_phase = MovePhase::Arrived;
                self.speed = 0.0;
                return true;
            }
            self.move_phase = MovePhase::Rotating;
            return false;
        }

        let desired = heading_to(self.pose.position, target_pos);
        let delta = wrap_angle(desired - self.pose.heading);
        if delta.abs() > cfg.motion.heading_tolerance {
            // Turn in place; no translation until aligned.
            self.move_phase = MovePhase::Rotating;
            self.speed = 0.0;
            let step = cfg.motion.rotation_rate * dt;
            if delta.abs() <= step {
                self.pose.heading = desired;
            } else if delta > 0.0 {
                self.pose.heading = wrap_angle(self.pose.heading + step);
            } else {
                self.pose.heading = wrap_angle(self.pose.heading - step);
            }
            return false;
        }

        self.pose.heading = desired;
        self.move_phase = MovePhase::Traveling;
        let final_leg = self.waypoint_index + 1 == self.route.len();
        let target_speed = if final_leg && dist <= cfg.motion.approach_distance {
            cfg.motion.approach_speed
        } else {
            cfg.motion.cruise_speed
        };
        if self.speed < target_speed {
            self.speed = (self.speed + cfg.motion.acceleration * dt).min(target_speed);
        } else if self.speed > target_speed {
            self.speed = (self.speed - cfg.motion.deceleration * dt).max(target_speed);
        }
        if self.speed < cfg.motion.speed_epsilon {
            self.speed = 0.0;
            return false;
        }
        let step = (self.speed * dt).min(dist);
        self.pose.position.x += step * self.pose.heading.cos();
        self.pose.position.y += step * self.pose.heading.sin();
        false
    }

    /// Occupancy handoff on waypoint arrival: claim the new node, free the
    /// previous one, convert this node's reservation into occupancy.
    fn arrive_at(&mut self, graph: &mut NavGraph, node_id: &str) {
        if let Some(prev) = self.current_node.take() {
            if prev != node_id {
                graph.set_occupied(&prev, false);
            }
        }
        graph.set_occupied(node_id, true);
        graph.release_if_held(node_id, &self.id);
        self.current_node = Some(node_id.to_string());
    }

    fn set_route(&mut self, path: Vec<NodeId>, graph: &mut NavGraph) {
        for id in path.iter().skip(1) {
            if !graph.try_reserve(id, &self.id) {
                // Another agent holds this node; its claim stays intact.
                debug!(agent = %self.id, node = %id, "route overlaps a foreign reservation");
            }
        }
        self.route = path;
        self.waypoint_index = 0;
        self.move_phase = MovePhase::Rotating;
    }

    fn clear_route(&mut self, graph: &mut NavGraph) {
        graph.release_all(&self.id);
        self.route.clear();
        self.waypoint_index = 0;
    }

    fn start_node(&self, graph: &NavGraph) -> Option<NodeId> {
        match &self.current_node {
            Some(id) => Some(id.clone()),
            None => graph
                .find_nearest(self.pose.position, None)
                .map(|n| n.id.clone()),
        }
    }

    fn leg_target(&self) -> Option<NodeId> {
        if let Some(goal) = &self.charge_goal {
            return Some(goal.clone());
        }
        let task = self.current_task.as_ref()?;
        match self.status {
            AgvStatus::MovingToPick => Some(task.pickup.clone()),
            AgvStatus::MovingToDrop => Some(task.dropoff.clone()),
            _ => None,
        }
    }

    /// A moving state with no route: re-query the graph, counting against
    /// the retry budget. Exhaustion fails the task.
    fn retry_leg(
        &mut self,
        now: SimTime,
        graph: &mut NavGraph,
        events: &mut EventSink,
        cfg: &SimConfig,
    ) -> Option<Task> {
        let Some(target) = self.leg_target() else {
            self.status = AgvStatus::Idle;
            self.move_phase = MovePhase::Arrived;
            return None;
        };
        let Some(start) = self.start_node(graph) else {
            return self.exhaust_retry(now, graph, events, cfg);
        };
        if start == target {
            self.move_phase = MovePhase::Arrived;
            return self.on_leg_complete(now, graph, events, cfg);
        }
        let path = graph.find_path(&start, &target);
        if path.is_empty() {
            return self.exhaust_retry(now, graph, events, cfg);
        }
        self.set_route(path, graph);
        None
    }

    fn exhaust_retry(
        &mut self,
        now: SimTime,
        graph: &mut NavGraph,
        events: &mut EventSink,
        cfg: &SimConfig,
    ) -> Option<Task> {
        self.path_retries += 1;
        if self.path_retries <= cfg.dispatch.path_retry_budget {
            return None;
        }
        if self.charge_goal.is_some() {
            // Abandon the charge run; idle keeps retrying from scratch.
            self.charge_goal = None;
            self.clear_route(graph);
            self.status = AgvStatus::Idle;
            self.move_phase = MovePhase::Arrived;
            self.path_retries = 0;
            return None;
        }
        self.fail_current(now, graph, events)
    }

    // ------------------------------------------------------------------------
    // Leg completion and dwell
    // ------------------------------------------------------------------------

    fn on_leg_complete(
        &mut self,
        now: SimTime,
        graph: &mut NavGraph,
        events: &mut EventSink,
        cfg: &SimConfig,
    ) -> Option<Task> {
        self.speed = 0.0;
        self.clear_route(graph);

        if self.charge_goal.take().is_some() {
            self.status = AgvStatus::Charging;
            self.path_retries = 0;
            return None;
        }

        match self.status {
            AgvStatus::MovingToPick => {
                let is_charging_task = self
                    .current_task
                    .as_ref()
                    .map(|t| t.kind == TaskKind::Charging)
                    .unwrap_or(false);
                if is_charging_task {
                    // A charging task's destination is the charger itself.
                    if let Some(mut task) = self.current_task.take() {
                        task.complete(now);
                        events.task_event(now, &task);
                        self.status = AgvStatus::Charging;
                        return Some(task);
                    }
                }
                self.status = AgvStatus::Loading;
                self.dwell_timer = cfg.motion.dwell_secs;
                self.path_retries = 0;
            }
            AgvStatus::MovingToDrop => {
                self.status = AgvStatus::Unloading;
                self.dwell_timer = cfg.motion.dwell_secs;
            }
            _ => {}
        }
        None
    }

    fn on_loading_done(
        &mut self,
        now: SimTime,
        graph: &mut NavGraph,
        events: &mut EventSink,
        cfg: &SimConfig,
    ) -> Option<Task> {
        let Some(pickup) = self.current_task.as_ref().map(|t| t.pickup.clone()) else {
            self.status = AgvStatus::Idle;
            return None;
        };
        // Detach the payload from the pickup node.
        if let Some(item) = graph.take_item(&pickup) {
            if let Some(task) = self.current_task.as_mut() {
                if task.payload.is_none() {
                    task.payload = Some(item);
                }
            }
            events.stock_change(now, &pickup, None);
        }

        let dropoff = match self.current_task.as_ref() {
            Some(task) => task.dropoff.clone(),
            None => {
                self.status = AgvStatus::Idle;
                return None;
            }
        };
        if self.current_node.as_deref() == Some(dropoff.as_str()) {
            self.status = AgvStatus::Unloading;
            self.dwell_timer = cfg.motion.dwell_secs;
            return None;
        }
        self.status = AgvStatus::MovingToDrop;
        self.move_phase = MovePhase::Rotating;
        self.path_retries = 0;
        self.route.clear();
        self.waypoint_index = 0;
        // Route immediately; empty results fall into the retry budget.
        self.retry_leg(now, graph, events, cfg)
    }

    fn on_unloading_done(
        &mut self,
        now: SimTime,
        graph: &mut NavGraph,
        events: &mut EventSink,
    ) -> Option<Task> {
        let Some(mut task) = self.current_task.take() else {
            self.status = AgvStatus::Idle;
            return None;
        };
        if let Some(item) = task.payload.clone() {
            graph.put_item(&task.dropoff, item.clone());
            events.stock_change(now, &task.dropoff, Some(item));
        }
        task.complete(now);
        events.task_event(now, &task);
        info!(task = %task.id, agent = %self.id, "task completed");
        self.status = AgvStatus::Idle;
        self.move_phase = MovePhase::Arrived;
        self.path_retries = 0;
        Some(task)
    }

    // ------------------------------------------------------------------------
    // Battery recovery
    // ------------------------------------------------------------------------

    /// Mid-mission battery drop below the reserve: the task fails and the
    /// agent reroutes to a charger.
    fn divert_to_charging(
        &mut self,
        now: SimTime,
        graph: &mut NavGraph,
        events: &mut EventSink,
    ) -> Option<Task> {
        let failed = self.fail_current(now, graph, events);
        self.try_start_charge_run(graph);
        failed
    }

    fn fail_current(
        &mut self,
        now: SimTime,
        graph: &mut NavGraph,
        events: &mut EventSink,
    ) -> Option<Task> {
        self.clear_route(graph);
        self.speed = 0.0;
        self.status = AgvStatus::Idle;
        self.move_phase = MovePhase::Arrived;
        self.path_retries = 0;
        let mut task = self.current_task.take()?;
        task.fail(now);
        events.task_event(now, &task);
        warn!(task = %task.id, agent = %self.id, "task failed");
        Some(task)
    }

    /// Task-less charging mission: route to the nearest available charger.
    /// Silently stays idle when no charger or no path is available; idle
    /// ticks keep retrying.
    fn try_start_charge_run(&mut self, graph: &mut NavGraph) {
        // Already standing on a charger: dock in place.
        if let Some(current) = &self.current_node {
            if graph
                .node(current)
                .map(|n| n.kind == NodeKind::Charging)
                .unwrap_or(false)
            {
                self.status = AgvStatus::Charging;
                return;
            }
        }

        let mut best: Option<(NodeId, f64)> = None;
        for node in graph.nodes() {
            if node.kind != NodeKind::Charging || !node.is_available() {
                continue;
            }
            let d = distance(self.pose.position, node.position);
            match &best {
                Some((_, best_d)) if d >= *best_d => {}
                _ => best = Some((node.id.clone(), d)),
            }
        }
        let Some((goal, _)) = best else {
            return;
        };
        let Some(start) = self.start_node(graph) else {
            return;
        };
        if start == goal {
            self.status = AgvStatus::Charging;
            return;
        }
        let path = graph.find_path(&start, &goal);
        if path.is_empty() {
            return;
        }
        debug!(agent = %self.id, battery = self.battery, charger = %goal, "low battery, heading to charger");
        self.charge_goal = Some(goal);
        self.status = AgvStatus::MovingToPick;
        self.path_retries = 0;
        self.set_route(path, graph);
    }

    // ------------------------------------------------------------------------
    // Publication
    // ------------------------------------------------------------------------

    fn publish(&mut self, now: SimTime, events: &mut EventSink) {
        let snapshot = AgentSnapshot {
            id: self.id.clone(),
            x: self.pose.position.x,
            y: self.pose.position.y,
            heading: self.pose.heading,
            status: self.status,
            battery: self.battery,
            speed: self.speed,
        };
        if self.last_snapshot.as_ref() != Some(&snapshot) {
            self.last_snapshot = Some(snapshot.clone());
            events.push(now, SimEventKind::Agent(snapshot));
        }
    }
}
