//! Central task dispatcher: pending queue, agent matching, synthetic
//! demand, and terminal-task reaping with fleet statistics.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info};

use crate::geometry::distance;

use super::agent::{AgvController, AgvStatus};
use super::events::{EventSink, SimEventKind, StockItem};
use super::graph::{NavGraph, NodeKind};
use super::task::{Task, TaskKind, TaskStatus};
use super::types::{AgentId, ItemId, NodeId, SimConfig, SimTime, TaskId};

const ITEM_CATEGORIES: &[&str] = &["ambient", "chilled", "fragile", "bulk"];

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DispatchStats {
    pub created: u64,
    pub completed: u64,
    pub failed: u64,
    /// Incremental mean of completed-task durations, in simulated seconds.
    pub avg_completion_secs: f64,
}

impl DispatchStats {
    fn record_completion(&mut self, duration: f64) {
        self.completed += 1;
        let n = self.completed as f64;
        self.avg_completion_secs += (duration - self.avg_completion_secs) / n;
    }
}

/// Computable fleet-level aggregates, published for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FleetKpis {
    pub total_agvs: usize,
    pub active_agvs: usize,
    pub idle_agvs: usize,
    pub charging_agvs: usize,
    pub avg_battery: f64,
    pub avg_speed: f64,
    /// Percent of the fleet doing useful work.
    pub utilization_pct: f64,
    /// Completed over all terminal tasks, percent.
    pub mission_success_pct: f64,
}

// ============================================================================
// Deterministic demand randomness
// ============================================================================

/// Serializable RNG state: each decision draws a fresh stream derived from
/// the seed and a monotone draw counter, so snapshots restore determinism.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
struct RngState {
    seed: u64,
    draws: u64,
}

impl RngState {
    fn new(seed: u64) -> Self {
        Self { seed, draws: 0 }
    }

    fn stream(&mut self) -> StdRng {
        self.draws = self.draws.wrapping_add(1);
        StdRng::seed_from_u64(
            self.seed
                .wrapping_mul(0x9E37_79B9_7F4A_7C15)
                .wrapping_add(self.draws),
        )
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispatcher {
    /// Not-yet-assigned tasks, insertion order preserved.
    pending: Vec<Task>,
    /// Task id -> executing agent, for tasks handed to the fleet.
    active: BTreeMap<TaskId, AgentId>,
    fleet: Vec<AgvController>,
    stats: DispatchStats,
    history: VecDeque<Task>,
    items: BTreeMap<ItemId, StockItem>,
    next_task_seq: u64,
    next_item_seq: u64,
    demand_elapsed: f64,
    rng: RngState,
}

impl Dispatcher {
    pub fn new(cfg: &SimConfig) -> Self {
        Self {
            pending: Vec::new(),
            active: BTreeMap::new(),
            fleet: Vec::new(),
            stats: DispatchStats::default(),
            history: VecDeque::new(),
            items: BTreeMap::new(),
            next_task_seq: 0,
            next_item_seq: 0,
            demand_elapsed: 0.0,
            rng: RngState::new(cfg.demand.seed),
        }
    }

    // --------------------------------------------------------------------
    // Fleet and task intake
    // --------------------------------------------------------------------

    pub fn register_fleet(&mut self, agents: Vec<AgvController>) {
        self.fleet.extend(agents);
    }

    pub fn register_agent(&mut self, agent: AgvController) {
        self.fleet.push(agent);
    }

    pub fn fleet(&self) -> &[AgvController] {
        &self.fleet
    }

    pub fn fleet_mut(&mut self) -> &mut [AgvController] {
        &mut self.fleet
    }

    pub fn agent(&self, id: &str) -> Option<&AgvController> {
        self.fleet.iter().find(|a| a.id == id)
    }

    pub fn pending(&self) -> &[Task] {
        &self.pending
    }

    pub fn active(&self) -> &BTreeMap<TaskId, AgentId> {
        &self.active
    }

    pub fn history(&self) -> impl Iterator<Item = &Task> {
        self.history.iter()
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn items(&self) -> &BTreeMap<ItemId, StockItem> {
        &self.items
    }

    /// External task injection.
    pub fn submit(
        &mut self,
        kind: TaskKind,
        pickup: impl Into<NodeId>,
        dropoff: impl Into<NodeId>,
        payload: Option<ItemId>,
        priority: i32,
        now: SimTime,
    ) -> TaskId {
        self.next_task_seq += 1;
        let id = format!("task-{}", self.next_task_seq);
        let task = Task::new(id.clone(), kind, pickup, dropoff, payload, priority, now);
        self.stats.created += 1;
        self.pending.push(task);
        id
    }

    // --------------------------------------------------------------------
    // Per-tick update
    // --------------------------------------------------------------------

    pub fn update(
        &mut self,
        dt: f64,
        now: SimTime,
        graph: &mut NavGraph,
        events: &mut EventSink,
        cfg: &SimConfig,
    ) {
        if cfg.demand.enabled {
            self.generate_demand(dt, now, graph, events, cfg);
        }
        self.match_pending(now, graph, events, cfg);

        let mut finished = Vec::new();
        for agent in &mut self.fleet {
            if let Some(task) = agent.update(dt, now, graph, events, cfg) {
                finished.push(task);
            }
        }
        for task in finished {
            self.reap(task, cfg);
        }
    }

    // --------------------------------------------------------------------
    // Matching
    // --------------------------------------------------------------------

    /// One matching pass: highest priority first (FIFO within equal
    /// priority), nearest eligible agent to the pickup node, at most one
    /// task per agent per pass.
    pub(crate) fn match_pending(
        &mut self,
        now: SimTime,
        graph: &mut NavGraph,
        events: &mut EventSink,
        cfg: &SimConfig,
    ) {
        loop {
            if self.pending.is_empty() {
                return;
            }
            let eligible: Vec<usize> = self
                .fleet
                .iter()
                .enumerate()
                .filter(|(_, a)| a.is_eligible(cfg.battery.reserve_pct))
                .map(|(i, _)| i)
                .collect();
            if eligible.is_empty() {
                return;
            }

            let best = best_pending_index(&self.pending);
            let mut task = self.pending.remove(best);

            let pickup_pos = graph.node(&task.pickup).map(|n| n.position);
            let chosen = match pickup_pos {
                Some(pos) => {
                    let mut best_agent = eligible[0];
                    let mut best_d = f64::INFINITY;
                    for &i in &eligible {
                        let d = distance(self.fleet[i].pose.position, pos);
                        if d < best_d {
                            best_d = d;
                            best_agent = i;
                        }
                    }
                    best_agent
                }
                None => eligible[0],
            };

            let agent_id = self.fleet[chosen].id.clone();
            task.assign(agent_id.clone(), now);
            events.task_event(now, &task);
            info!(task = %task.id, agent = %agent_id, priority = task.priority, "task assigned");
            self.active.insert(task.id.clone(), agent_id);
            self.fleet[chosen].assign_task(task, graph, cfg);
        }
    }

    // --------------------------------------------------------------------
    // Reaping
    // --------------------------------------------------------------------

    fn reap(&mut self, task: Task, cfg: &SimConfig) {
        debug_assert!(task.is_terminal());
        self.active.remove(&task.id);
        match task.status {
            TaskStatus::Completed => {
                if let Some(duration) = task.duration() {
                    self.stats.record_completion(duration);
                } else {
                    self.stats.completed += 1;
                }
            }
            TaskStatus::Failed => {
                self.stats.failed += 1;
            }
            _ => {}
        }
        self.history.push_back(task);
        while self.history.len() > cfg.dispatch.history_limit {
            self.history.pop_front();
        }
    }

    // --------------------------------------------------------------------
    // Synthetic demand
    // --------------------------------------------------------------------

    fn generate_demand(
        &mut self,
        dt: f64,
        now: SimTime,
        graph: &mut NavGraph,
        events: &mut EventSink,
        cfg: &SimConfig,
    ) {
        self.demand_elapsed += dt;
        while self.demand_elapsed >= cfg.demand.interval_secs {
            self.demand_elapsed -= cfg.demand.interval_secs;
            self.generate_one(now, graph, events, cfg);
            self.churn_stock(now, events, cfg);
        }
    }

    /// Pair an available source with an available destination; skip
    /// silently when no such pair exists.
    fn generate_one(
        &mut self,
        now: SimTime,
        graph: &mut NavGraph,
        events: &mut EventSink,
        cfg: &SimConfig,
    ) {
        let mut rng = self.rng.stream();
        let inbound = rng.gen_bool(0.5);
        if inbound {
            let Some(reception) = graph.find_available(NodeKind::Reception) else {
                return;
            };
            let Some(storage) = graph.find_storage(false, &mut rng) else {
                return;
            };
            let item = self.mint_item(&mut rng);
            graph.put_item(&reception, item.id.clone());
            events.stock_change(now, &reception, Some(item.id.clone()));
            events.push(now, SimEventKind::StockItem(item.clone()));
            let id = self.submit(TaskKind::Inbound, reception, storage, Some(item.id), 0, now);
            debug!(task = %id, "generated inbound demand");
        } else {
            let Some(storage) = graph.find_storage(true, &mut rng) else {
                return;
            };
            let Some(shipping) = graph.find_available(NodeKind::Shipping) else {
                return;
            };
            let payload = graph.node(&storage).and_then(|n| n.item_id.clone());
            let id = self.submit(TaskKind::Outbound, storage, shipping, payload, 0, now);
            debug!(task = %id, "generated outbound demand");
        }
    }

    fn mint_item(&mut self, rng: &mut StdRng) -> StockItem {
        self.next_item_seq += 1;
        let category = ITEM_CATEGORIES[rng.gen_range(0..ITEM_CATEGORIES.len())];
        let item = StockItem {
            id: format!("sku-{}", self.next_item_seq),
            fill_level: rng.gen_range(40..=100),
            category: category.to_string(),
        };
        self.items.insert(item.id.clone(), item.clone());
        item
    }

    /// Random fill-level churn on a stored item, mirroring external stock
    /// movements the sim does not model.
    fn churn_stock(&mut self, now: SimTime, events: &mut EventSink, cfg: &SimConfig) {
        let mut rng = self.rng.stream();
        if self.items.is_empty() || !rng.gen_bool(cfg.demand.stock_churn_probability) {
            return;
        }
        let pick = rng.gen_range(0..self.items.len());
        if let Some(item) = self.items.values_mut().nth(pick) {
            item.fill_level = rng.gen_range(40..=100);
            let item = item.clone();
            events.push(now, SimEventKind::StockItem(item));
        }
    }

    // --------------------------------------------------------------------
    // KPIs
    // --------------------------------------------------------------------

    pub fn kpis(&self) -> FleetKpis {
        let total = self.fleet.len();
        let mut kpis = FleetKpis {
            total_agvs: total,
            ..FleetKpis::default()
        };
        if total > 0 {
            let mut battery_sum = 0.0;
            let mut speed_sum = 0.0;
            for agent in &self.fleet {
                battery_sum += agent.battery;
                speed_sum += agent.speed;
                match agent.status {
                    AgvStatus::Idle => kpis.idle_agvs += 1,
                    AgvStatus::Charging => kpis.charging_agvs += 1,
                    _ => {}
                }
                if agent.status.is_active() {
                    kpis.active_agvs += 1;
                }
            }
            kpis.avg_battery = battery_sum / total as f64;
            kpis.avg_speed = speed_sum / total as f64;
            kpis.utilization_pct = kpis.active_agvs as f64 / total as f64 * 100.0;
        }
        let terminal = self.stats.completed + self.stats.failed;
        if terminal > 0 {
            kpis.mission_success_pct = self.stats.completed as f64 / terminal as f64 * 100.0;
        }
        kpis
    }
}

/// Index of the highest-priority pending task; equal priorities keep
/// insertion order.
fn best_pending_index(pending: &[Task]) -> usize {
    let mut best = 0;
    for (i, task) in pending.iter().enumerate() {
        if task.priority > pending[best].priority {
            best = i;
        }
    }
    best
}
