use super::types::{DEFAULT_BATTERY_RESERVE_PCT, DEFAULT_DWELL_SECS};
use super::*;
use crate::geometry::Vec2;

// ----------------------------------------------------------------------------
// Fixtures
// ----------------------------------------------------------------------------

/// Straight line: r1(Reception) - a - b - s1(Storage), 5 m spacing, plus an
/// isolated storage node z and a charger ch1 hanging off node a.
fn line_layout() -> TopologySpec {
    TopologySpec {
        nodes: vec![
            NodeSpec::new("r1", NodeKind::Reception, 0.0, 0.0),
            NodeSpec::new("a", NodeKind::Path, 5.0, 0.0),
            NodeSpec::new("b", NodeKind::Path, 10.0, 0.0),
            NodeSpec::new("s1", NodeKind::Storage, 15.0, 0.0),
            NodeSpec::new("z", NodeKind::Storage, 50.0, 50.0),
            NodeSpec::new("ch1", NodeKind::Charging, 5.0, -5.0),
        ],
        edges: vec![
            ("r1".into(), "a".into()),
            ("a".into(), "b".into()),
            ("b".into(), "s1".into()),
            ("a".into(), "ch1".into()),
        ],
    }
}

/// Diamond: a - (b | c) - d, giving two routes of equal hop count.
fn diamond_layout() -> TopologySpec {
    TopologySpec {
        nodes: vec![
            NodeSpec::new("a", NodeKind::Intersection, 0.0, 0.0),
            NodeSpec::new("b", NodeKind::Path, 5.0, 5.0),
            NodeSpec::new("c", NodeKind::Path, 5.0, -5.0),
            NodeSpec::new("d", NodeKind::Intersection, 10.0, 0.0),
        ],
        edges: vec![
            ("a".into(), "b".into()),
            ("a".into(), "c".into()),
            ("b".into(), "d".into()),
            ("c".into(), "d".into()),
        ],
    }
}

fn run_ticks(sim: &mut Simulation, ticks: usize, dt: f64) {
    for _ in 0..ticks {
        sim.tick(dt);
    }
}

// ----------------------------------------------------------------------------
// Topology validation
// ----------------------------------------------------------------------------

#[test]
fn topology_builds_symmetric_edges() {
    let graph = line_layout().build().unwrap();
    assert_eq!(graph.len(), 6);
    let a = graph.node("a").unwrap();
    assert!(a.neighbors.contains("r1"));
    assert!(a.neighbors.contains("b"));
    assert!(a.neighbors.contains("ch1"));
    let r1 = graph.node("r1").unwrap();
    assert!(r1.neighbors.contains("a"));
}

#[test]
fn topology_rejects_empty() {
    let spec = TopologySpec::default();
    assert!(matches!(spec.build(), Err(TopologyError::Empty)));
}

#[test]
fn topology_rejects_duplicate_node() {
    let spec = TopologySpec {
        nodes: vec![
            NodeSpec::new("a", NodeKind::Path, 0.0, 0.0),
            NodeSpec::new("a", NodeKind::Path, 1.0, 0.0),
        ],
        edges: vec![],
    };
    assert!(matches!(spec.build(), Err(TopologyError::DuplicateNode(_))));
}

#[test]
fn topology_rejects_dangling_edge() {
    let spec = TopologySpec {
        nodes: vec![NodeSpec::new("a", NodeKind::Path, 0.0, 0.0)],
        edges: vec![("a".into(), "ghost".into())],
    };
    assert!(matches!(
        spec.build(),
        Err(TopologyError::DanglingEdge { .. })
    ));
}

#[test]
fn topology_rejects_self_edge() {
    let spec = TopologySpec {
        nodes: vec![NodeSpec::new("a", NodeKind::Path, 0.0, 0.0)],
        edges: vec![("a".into(), "a".into())],
    };
    assert!(matches!(spec.build(), Err(TopologyError::SelfEdge(_))));
}

#[test]
fn demo_layout_is_valid() {
    let graph = demo_layout().build().unwrap();
    assert!(graph.len() > 10);
    assert!(graph.find_available(NodeKind::Reception).is_some());
    assert!(graph.find_available(NodeKind::Shipping).is_some());
    assert!(graph.find_available(NodeKind::Charging).is_some());
}

// ----------------------------------------------------------------------------
// Routing
// ----------------------------------------------------------------------------

#[test]
fn path_edges_are_all_graph_edges() {
    let graph = line_layout().build().unwrap();
    let path = graph.find_path("r1", "s1");
    assert_eq!(path, vec!["r1", "a", "b", "s1"]);
    for pair in path.windows(2) {
        let node = graph.node(&pair[0]).unwrap();
        assert!(node.neighbors.contains(&pair[1]));
    }
}

#[test]
fn path_to_self_is_single_node() {
    let graph = line_layout().build().unwrap();
    assert_eq!(graph.find_path("a", "a"), vec!["a"]);
}

#[test]
fn path_to_unreachable_is_empty() {
    let graph = line_layout().build().unwrap();
    assert!(graph.find_path("r1", "z").is_empty());
}

#[test]
fn path_avoids_occupied_nodes() {
    let mut graph = diamond_layout().build().unwrap();
    graph.set_occupied("b", true);
    let path = graph.find_path("a", "d");
    assert_eq!(path, vec!["a", "c", "d"]);
}

#[test]
fn occupied_goal_is_still_reachable() {
    let mut graph = line_layout().build().unwrap();
    graph.set_occupied("s1", true);
    let path = graph.find_path("r1", "s1");
    assert_eq!(path.last().map(String::as_str), Some("s1"));
}

#[test]
fn fully_blocked_route_yields_empty_path() {
    let mut graph = diamond_layout().build().unwrap();
    graph.set_occupied("b", true);
    graph.set_occupied("c", true);
    assert!(graph.find_path("a", "d").is_empty());
}

#[test]
fn path_search_is_deterministic() {
    let graph = diamond_layout().build().unwrap();
    let first = graph.find_path("a", "d");
    for _ in 0..10 {
        assert_eq!(graph.find_path("a", "d"), first);
    }
}

// ----------------------------------------------------------------------------
// Reservations
// ----------------------------------------------------------------------------

#[test]
fn reservation_is_idempotent_per_agent() {
    let mut graph = line_layout().build().unwrap();
    assert!(graph.try_reserve("a", "agv-1"));
    assert!(graph.try_reserve("a", "agv-1"));
    assert_eq!(graph.node("a").unwrap().reserved_by.as_deref(), Some("agv-1"));
}

#[test]
fn reservation_conflict_is_rejected() {
    let mut graph = line_layout().build().unwrap();
    assert!(graph.try_reserve("a", "agv-1"));
    assert!(!graph.try_reserve("a", "agv-2"));
    assert_eq!(graph.node("a").unwrap().reserved_by.as_deref(), Some("agv-1"));
}

#[test]
fn release_all_frees_every_claim() {
    let mut graph = line_layout().build().unwrap();
    graph.try_reserve("a", "agv-1");
    graph.try_reserve("b", "agv-1");
    graph.try_reserve("s1", "agv-2");
    graph.release_all("agv-1");
    assert!(graph.node("a").unwrap().reserved_by.is_none());
    assert!(graph.node("b").unwrap().reserved_by.is_none());
    assert_eq!(graph.node("s1").unwrap().reserved_by.as_deref(), Some("agv-2"));
}

#[test]
fn route_reservation_leaves_foreign_claims_intact() {
    let cfg = SimConfig::default();
    let mut graph = line_layout().build().unwrap();
    graph.try_reserve("b", "agv-1");

    let mut agent = AgvController::new("agv-2");
    agent.place_at("r1", &mut graph);
    let mut task = Task::new("t1", TaskKind::Inbound, "s1", "r1", None, 0, 0.0);
    task.assign("agv-2", 0.0);
    agent.assign_task(task, &mut graph, &cfg);

    // Route r1 -> a -> b -> s1: the contested node keeps its holder, the
    // rest of the route is claimed normally.
    assert_eq!(agent.route().to_vec(), vec!["r1", "a", "b", "s1"]);
    assert_eq!(graph.node("b").unwrap().reserved_by.as_deref(), Some("agv-1"));
    assert_eq!(graph.node("a").unwrap().reserved_by.as_deref(), Some("agv-2"));
    assert_eq!(graph.node("s1").unwrap().reserved_by.as_deref(), Some("agv-2"));
}

// ----------------------------------------------------------------------------
// Task lifecycle
// ----------------------------------------------------------------------------

#[test]
fn task_lifecycle_is_monotone() {
    let mut task = Task::new("t1", TaskKind::Inbound, "r1", "s1", None, 0, 0.0);
    assert_eq!(task.status, TaskStatus::Pending);
    task.assign("agv-1", 1.0);
    assert_eq!(task.status, TaskStatus::Assigned);
    assert_eq!(task.assigned_agent.as_deref(), Some("agv-1"));
    assert_eq!(task.started_at, Some(1.0));
    task.start();
    assert_eq!(task.status, TaskStatus::InProgress);
    task.complete(11.0);
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.is_terminal());
    assert_eq!(task.duration(), Some(10.0));
}

#[test]
fn task_failure_from_in_progress() {
    let mut task = Task::new("t1", TaskKind::Outbound, "s1", "x1", None, 0, 0.0);
    task.assign("agv-1", 1.0);
    task.start();
    task.fail(5.0);
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.is_terminal());
}

// ----------------------------------------------------------------------------
// Dispatcher matching
// ----------------------------------------------------------------------------

fn dispatcher_fixture() -> (Dispatcher, NavGraph, EventSink, SimConfig) {
    let cfg = SimConfig::default();
    let graph = line_layout().build().unwrap();
    let dispatcher = Dispatcher::new(&cfg);
    (dispatcher, graph, EventSink::default(), cfg)
}

#[test]
fn highest_priority_wins() {
    let (mut dispatcher, mut graph, mut events, cfg) = dispatcher_fixture();
    let mut agent = AgvController::new("agv-1");
    agent.place_at("r1", &mut graph);
    dispatcher.register_agent(agent);

    dispatcher.submit(TaskKind::Inbound, "r1", "s1", None, 1, 0.0);
    let high = dispatcher.submit(TaskKind::Inbound, "r1", "s1", None, 3, 0.0);
    dispatcher.submit(TaskKind::Inbound, "r1", "s1", None, 2, 0.0);

    dispatcher.match_pending(0.0, &mut graph, &mut events, &cfg);

    let assigned = dispatcher.agent("agv-1").unwrap().current_task.as_ref().unwrap();
    assert_eq!(assigned.id, high);
    assert_eq!(assigned.status, TaskStatus::Assigned);
    assert_eq!(dispatcher.pending().len(), 2);
}

#[test]
fn priorities_drain_highest_first_across_fleet() {
    let (mut dispatcher, mut graph, mut events, cfg) = dispatcher_fixture();
    // Nearest-to-pickup order for s1 at (15,0): b, a, r1.
    let mut at_r1 = AgvController::new("agv-r1");
    at_r1.place_at("r1", &mut graph);
    let mut at_a = AgvController::new("agv-a");
    at_a.place_at("a", &mut graph);
    let mut at_b = AgvController::new("agv-b");
    at_b.place_at("b", &mut graph);
    dispatcher.register_fleet(vec![at_r1, at_a, at_b]);

    let p1 = dispatcher.submit(TaskKind::Inbound, "s1", "r1", None, 1, 0.0);
    let p3 = dispatcher.submit(TaskKind::Inbound, "s1", "r1", None, 3, 0.0);
    let p2 = dispatcher.submit(TaskKind::Inbound, "s1", "r1", None, 2, 0.0);

    dispatcher.match_pending(0.0, &mut graph, &mut events, &cfg);
    assert!(dispatcher.pending().is_empty());

    // Highest priority is matched first and therefore gets the closest agent.
    let task_of = |agent: &str| {
        dispatcher
            .agent(agent)
            .unwrap()
            .current_task
            .clone()
            .unwrap()
    };
    assert_eq!(task_of("agv-b").id, p3);
    assert_eq!(task_of("agv-a").id, p2);
    assert_eq!(task_of("agv-r1").id, p1);

    // No agent appears on two tasks.
    let agents: Vec<_> = dispatcher.active().values().collect();
    let unique: std::collections::BTreeSet<_> = agents.iter().collect();
    assert_eq!(agents.len(), unique.len());
}

#[test]
fn equal_priority_is_fifo() {
    let (mut dispatcher, mut graph, mut events, cfg) = dispatcher_fixture();
    let mut agent = AgvController::new("agv-1");
    agent.place_at("r1", &mut graph);
    dispatcher.register_agent(agent);

    let first = dispatcher.submit(TaskKind::Inbound, "r1", "s1", None, 0, 0.0);
    let second = dispatcher.submit(TaskKind::Inbound, "r1", "s1", None, 0, 0.0);

    dispatcher.match_pending(0.0, &mut graph, &mut events, &cfg);
    let assigned = dispatcher.agent("agv-1").unwrap().current_task.clone().unwrap();
    assert_eq!(assigned.id, first);

    // Free the agent and match again; the queue keeps submission order.
    {
        let agent = &mut dispatcher.fleet_mut()[0];
        agent.current_task = None;
        agent.status = AgvStatus::Idle;
    }
    dispatcher.match_pending(1.0, &mut graph, &mut events, &cfg);
    let assigned = dispatcher.agent("agv-1").unwrap().current_task.clone().unwrap();
    assert_eq!(assigned.id, second);
}

#[test]
fn one_task_per_agent_per_pass() {
    let (mut dispatcher, mut graph, mut events, cfg) = dispatcher_fixture();
    let mut agent = AgvController::new("agv-1");
    agent.place_at("r1", &mut graph);
    dispatcher.register_agent(agent);

    dispatcher.submit(TaskKind::Inbound, "r1", "s1", None, 0, 0.0);
    dispatcher.submit(TaskKind::Inbound, "r1", "s1", None, 0, 0.0);
    dispatcher.match_pending(0.0, &mut graph, &mut events, &cfg);

    assert!(dispatcher.agent("agv-1").unwrap().current_task.is_some());
    assert_eq!(dispatcher.pending().len(), 1);
    assert_eq!(dispatcher.active().len(), 1);
}

#[test]
fn nearest_eligible_agent_is_chosen() {
    let (mut dispatcher, mut graph, mut events, cfg) = dispatcher_fixture();
    let mut far = AgvController::new("agv-far");
    far.place_at("r1", &mut graph);
    let mut near = AgvController::new("agv-near");
    near.place_at("b", &mut graph);
    dispatcher.register_fleet(vec![far, near]);

    dispatcher.submit(TaskKind::Outbound, "s1", "r1", None, 0, 0.0);
    dispatcher.match_pending(0.0, &mut graph, &mut events, &cfg);

    assert!(dispatcher.agent("agv-near").unwrap().current_task.is_some());
    assert!(dispatcher.agent("agv-far").unwrap().current_task.is_none());
}

#[test]
fn low_battery_agent_is_ineligible() {
    let (mut dispatcher, mut graph, mut events, cfg) = dispatcher_fixture();
    let mut agent = AgvController::new("agv-1");
    agent.place_at("r1", &mut graph);
    agent.battery = cfg.battery.reserve_pct - 1.0;
    dispatcher.register_agent(agent);

    dispatcher.submit(TaskKind::Inbound, "r1", "s1", None, 0, 0.0);
    dispatcher.match_pending(0.0, &mut graph, &mut events, &cfg);

    assert!(dispatcher.agent("agv-1").unwrap().current_task.is_none());
    assert_eq!(dispatcher.pending().len(), 1);
}

#[test]
fn assignment_emits_task_event() {
    let (mut dispatcher, mut graph, mut events, cfg) = dispatcher_fixture();
    let mut agent = AgvController::new("agv-1");
    agent.place_at("r1", &mut graph);
    dispatcher.register_agent(agent);
    let id = dispatcher.submit(TaskKind::Inbound, "r1", "s1", None, 0, 0.0);
    dispatcher.match_pending(0.0, &mut graph, &mut events, &cfg);

    let found = events.events().iter().any(|e| match &e.kind {
        SimEventKind::Task(t) => t.id == id && t.status == TaskStatus::Assigned,
        _ => false,
    });
    assert!(found);
}

// ----------------------------------------------------------------------------
// Battery model
// ----------------------------------------------------------------------------

#[test]
fn idle_agent_holds_charge() {
    let cfg = SimConfig::default();
    let mut graph = line_layout().build().unwrap();
    let mut events = EventSink::default();
    let mut agent = AgvController::new("agv-1");
    agent.place_at("b", &mut graph);
    agent.battery = 50.0;
    for _ in 0..100 {
        agent.update(0.1, 0.0, &mut graph, &mut events, &cfg);
    }
    assert_eq!(agent.battery, 50.0);
    assert_eq!(agent.status, AgvStatus::Idle);
}

#[test]
fn charging_clamps_at_full() {
    let cfg = SimConfig::default();
    let mut graph = line_layout().build().unwrap();
    let mut events = EventSink::default();
    let mut agent = AgvController::new("agv-1");
    agent.place_at("ch1", &mut graph);
    agent.battery = 99.9;
    agent.status = AgvStatus::Charging;
    agent.update(5.0, 0.0, &mut graph, &mut events, &cfg);
    assert_eq!(agent.battery, 100.0);
    assert_eq!(agent.status, AgvStatus::Idle);
}

#[test]
fn low_battery_idle_agent_docks_and_recharges() {
    let cfg = SimConfig::default();
    let mut graph = line_layout().build().unwrap();
    let mut events = EventSink::default();
    let mut agent = AgvController::new("agv-1");
    // Already standing on the charger: no travel needed.
    agent.place_at("ch1", &mut graph);
    agent.battery = 10.0;
    let mut now = 0.0;
    for _ in 0..400 {
        agent.update(0.05, now, &mut graph, &mut events, &cfg);
        now += 0.05;
        if agent.status == AgvStatus::Idle && agent.battery >= cfg.battery.resume_pct {
            break;
        }
    }
    assert_eq!(agent.status, AgvStatus::Idle);
    assert!(agent.battery >= cfg.battery.resume_pct);
    assert!(agent.battery <= 100.0);
}

#[test]
fn moving_drain_is_proportional_to_time_at_speed() {
    let cfg = SimConfig::default();
    let mut graph = line_layout().build().unwrap();
    let mut events = EventSink::default();
    let mut agent = AgvController::new("agv-1");
    agent.place_at("r1", &mut graph);
    let mut task = Task::new("t1", TaskKind::Relocate, "s1", "s1", None, 0, 0.0);
    task.assign("agv-1", 0.0);
    agent.assign_task(task, &mut graph, &cfg);

    let dt = 0.05;
    let mut now = 0.0;
    let mut time_at_speed = 0.0;
    for _ in 0..2000 {
        agent.update(dt, now, &mut graph, &mut events, &cfg);
        now += dt;
        // Drain applies exactly on ticks that end with nonzero speed.
        if agent.speed > 0.0 {
            time_at_speed += dt;
        }
        if agent.status == AgvStatus::Idle && agent.current_task.is_none() {
            break;
        }
    }

    assert!(time_at_speed > 0.0);
    let expected = 100.0 - cfg.battery.drain_per_sec * time_at_speed;
    assert!((agent.battery - expected).abs() < 1e-6);
}

#[test]
fn mid_route_battery_dip_fails_task_and_recharges() {
    let cfg = SimConfig::default();
    let mut graph = line_layout().build().unwrap();
    let mut events = EventSink::default();
    let mut dispatcher = Dispatcher::new(&cfg);
    let mut agent = AgvController::new("agv-1");
    agent.place_at("r1", &mut graph);
    // Barely eligible: the reserve threshold is crossed on the way to pickup.
    agent.battery = cfg.battery.reserve_pct + 0.4;
    dispatcher.register_agent(agent);
    dispatcher.submit(TaskKind::Outbound, "s1", "r1", None, 0, 0.0);

    let mut now = 0.0;
    for _ in 0..4000 {
        dispatcher.update(0.05, now, &mut graph, &mut events, &cfg);
        now += 0.05;
    }

    let history: Vec<_> = dispatcher.history().collect();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, TaskStatus::Failed);
    assert_eq!(dispatcher.stats().failed, 1);
    assert_eq!(dispatcher.stats().completed, 0);

    let agent = dispatcher.agent("agv-1").unwrap();
    assert!(agent.current_task.is_none());
    assert_eq!(agent.status, AgvStatus::Idle);
    assert!(agent.battery >= cfg.battery.resume_pct);
    assert_eq!(agent.current_node(), Some("ch1"));
}

// ----------------------------------------------------------------------------
// End-to-end missions
// ----------------------------------------------------------------------------

#[test]
fn inbound_mission_completes() {
    let mut layout = line_layout();
    layout.nodes[0] = NodeSpec::new("r1", NodeKind::Reception, 0.0, 0.0).with_item("sku-9");
    let mut sim = Simulation::new(&layout, SimConfig::default()).unwrap();
    assert!(sim.spawn_agent("agv-1", "r1"));
    sim.submit_task(TaskKind::Inbound, "r1", "s1", Some("sku-9".into()), 0);

    run_ticks(&mut sim, 2000, 0.05);

    let history: Vec<_> = sim.dispatcher().history().collect();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, TaskStatus::Completed);
    assert_eq!(
        sim.graph().node("s1").unwrap().item_id.as_deref(),
        Some("sku-9")
    );
    assert!(sim.graph().node("r1").unwrap().item_id.is_none());

    let agent = sim.dispatcher().agent("agv-1").unwrap();
    assert_eq!(agent.status, AgvStatus::Idle);
    assert!(agent.battery < 100.0);
    assert!(agent.battery > 0.0);
    assert_eq!(agent.current_node(), Some("s1"));

    let stats = sim.dispatcher().stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 0);
    assert!(stats.avg_completion_secs > 0.0);
}

#[test]
fn unreachable_dropoff_fails_within_retry_budget() {
    let mut sim = Simulation::new(&line_layout(), SimConfig::default()).unwrap();
    assert!(sim.spawn_agent("agv-1", "r1"));
    sim.submit_task(TaskKind::Inbound, "r1", "z", None, 0);

    run_ticks(&mut sim, 400, 0.05);

    let history: Vec<_> = sim.dispatcher().history().collect();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, TaskStatus::Failed);
    assert_eq!(sim.dispatcher().stats().failed, 1);
    assert_eq!(
        sim.dispatcher().agent("agv-1").unwrap().status,
        AgvStatus::Idle
    );
}

#[test]
fn second_task_runs_after_first() {
    let mut sim = Simulation::new(&line_layout(), SimConfig::default()).unwrap();
    assert!(sim.spawn_agent("agv-1", "r1"));
    sim.submit_task(TaskKind::Relocate, "r1", "s1", None, 0);
    sim.submit_task(TaskKind::Relocate, "s1", "b", None, 0);

    run_ticks(&mut sim, 4000, 0.05);

    assert_eq!(sim.dispatcher().stats().completed, 2);
    assert!(sim.dispatcher().pending().is_empty());
}

// ----------------------------------------------------------------------------
// Clock control
// ----------------------------------------------------------------------------

#[test]
fn paused_simulation_does_not_advance() {
    let mut sim = Simulation::new(&line_layout(), SimConfig::default()).unwrap();
    sim.pause();
    run_ticks(&mut sim, 10, 0.1);
    assert_eq!(sim.time(), 0.0);
    sim.resume();
    sim.tick(0.1);
    assert!(sim.time() > 0.0);
}

#[test]
fn speed_multiplier_scales_simulated_time() {
    let mut sim = Simulation::new(&line_layout(), SimConfig::default()).unwrap();
    sim.set_speed_multiplier(4.0);
    sim.tick(0.5);
    assert!((sim.time() - 2.0).abs() < 1e-9);

    // Nonpositive multipliers are rejected.
    sim.set_speed_multiplier(0.0);
    assert_eq!(sim.speed_multiplier(), 4.0);
    sim.set_speed_multiplier(-1.0);
    assert_eq!(sim.speed_multiplier(), 4.0);
}

// ----------------------------------------------------------------------------
// Events
// ----------------------------------------------------------------------------

#[test]
fn event_ids_are_monotone_across_drain() {
    let mut sink = EventSink::default();
    sink.stock_change(0.0, "r1", Some("sku-1".into()));
    sink.stock_change(1.0, "r1", None);
    let first = sink.drain();
    assert_eq!(first.len(), 2);
    assert!(first[0].id < first[1].id);
    assert!(sink.is_empty());

    sink.stock_change(2.0, "s1", Some("sku-2".into()));
    let second = sink.drain();
    assert!(second[0].id > first[1].id);
}

#[test]
fn agent_snapshots_publish_only_on_change() {
    let cfg = SimConfig::default();
    let mut graph = line_layout().build().unwrap();
    let mut events = EventSink::default();
    let mut agent = AgvController::new("agv-1");
    agent.place_at("b", &mut graph);
    for _ in 0..50 {
        agent.update(0.1, 0.0, &mut graph, &mut events, &cfg);
    }
    let snapshots = events
        .events()
        .iter()
        .filter(|e| matches!(e.kind, SimEventKind::Agent(_)))
        .count();
    assert_eq!(snapshots, 1);
}

// ----------------------------------------------------------------------------
// Synthetic demand
// ----------------------------------------------------------------------------

fn demand_config(seed: u64) -> SimConfig {
    let mut cfg = SimConfig::default();
    cfg.demand.enabled = true;
    cfg.demand.interval_secs = 1.0;
    cfg.demand.seed = seed;
    cfg
}

#[test]
fn demand_generates_paired_tasks() {
    let mut sim = Simulation::new(&demo_layout(), demand_config(7)).unwrap();
    run_ticks(&mut sim, 100, 0.5);
    let created = sim.dispatcher().stats().created;
    assert!(created > 0);
    for task in sim.dispatcher().pending() {
        let pickup = sim.graph().node(&task.pickup);
        let dropoff = sim.graph().node(&task.dropoff);
        assert!(pickup.is_some());
        assert!(dropoff.is_some());
        assert_ne!(task.pickup, task.dropoff);
    }
}

#[test]
fn demand_is_deterministic_per_seed() {
    let mut a = Simulation::new(&demo_layout(), demand_config(42)).unwrap();
    let mut b = Simulation::new(&demo_layout(), demand_config(42)).unwrap();
    run_ticks(&mut a, 60, 0.5);
    run_ticks(&mut b, 60, 0.5);
    let ids_a: Vec<_> = a.dispatcher().pending().iter().map(|t| t.pickup.clone()).collect();
    let ids_b: Vec<_> = b.dispatcher().pending().iter().map(|t| t.pickup.clone()).collect();
    assert_eq!(ids_a, ids_b);
    assert_eq!(a.dispatcher().stats().created, b.dispatcher().stats().created);
}

// ----------------------------------------------------------------------------
// KPIs
// ----------------------------------------------------------------------------

#[test]
fn kpis_aggregate_fleet_state() {
    let cfg = SimConfig::default();
    let mut graph = line_layout().build().unwrap();
    let mut dispatcher = Dispatcher::new(&cfg);
    let mut idle = AgvController::new("agv-idle");
    idle.place_at("r1", &mut graph);
    idle.battery = 80.0;
    let mut charging = AgvController::new("agv-charge");
    charging.place_at("ch1", &mut graph);
    charging.battery = 40.0;
    charging.status = AgvStatus::Charging;
    dispatcher.register_fleet(vec![idle, charging]);

    let kpis = dispatcher.kpis();
    assert_eq!(kpis.total_agvs, 2);
    assert_eq!(kpis.idle_agvs, 1);
    assert_eq!(kpis.charging_agvs, 1);
    assert_eq!(kpis.active_agvs, 0);
    assert!((kpis.avg_battery - 60.0).abs() < 1e-9);
    assert_eq!(kpis.utilization_pct, 0.0);
}

// ----------------------------------------------------------------------------
// Persistence
// ----------------------------------------------------------------------------

#[test]
fn snapshot_round_trips_through_json() {
    let mut sim = Simulation::new(&line_layout(), SimConfig::default()).unwrap();
    sim.spawn_agent("agv-1", "r1");
    sim.submit_task(TaskKind::Inbound, "r1", "s1", None, 0);
    run_ticks(&mut sim, 20, 0.05);

    let snapshot = sim.snapshot();
    let json = snapshot.to_json().unwrap();
    let restored = SimSnapshot::from_json(&json).unwrap();
    assert_eq!(snapshot, restored);

    let resumed = Simulation::from_snapshot(restored).unwrap();
    assert_eq!(resumed.time(), sim.time());
    assert_eq!(resumed.graph(), sim.graph());
    assert_eq!(resumed.dispatcher(), sim.dispatcher());
}

#[test]
fn restored_simulation_continues_identically() {
    let mut sim = Simulation::new(&line_layout(), SimConfig::default()).unwrap();
    sim.spawn_agent("agv-1", "r1");
    sim.submit_task(TaskKind::Inbound, "r1", "s1", None, 0);
    run_ticks(&mut sim, 50, 0.05);

    let mut resumed = Simulation::from_snapshot(sim.snapshot()).unwrap();
    run_ticks(&mut sim, 50, 0.05);
    run_ticks(&mut resumed, 50, 0.05);
    assert_eq!(sim.dispatcher(), resumed.dispatcher());
    assert_eq!(sim.graph(), resumed.graph());
}

#[test]
fn snapshot_saves_and_loads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sim.json");

    let mut sim = Simulation::new(&line_layout(), SimConfig::default()).unwrap();
    sim.spawn_agent("agv-1", "r1");
    run_ticks(&mut sim, 10, 0.05);
    sim.save_to_path(&path).unwrap();

    let loaded = Simulation::load_from_path(&path).unwrap();
    assert_eq!(loaded.time(), sim.time());
    assert_eq!(loaded.dispatcher(), sim.dispatcher());
}

#[test]
fn mismatched_snapshot_version_is_rejected() {
    let sim = Simulation::new(&line_layout(), SimConfig::default()).unwrap();
    let mut snapshot = sim.snapshot();
    snapshot.version = SNAPSHOT_VERSION + 1;
    let json = serde_json::to_string(&snapshot).unwrap();
    assert!(matches!(
        SimSnapshot::from_json(&json),
        Err(PersistError::UnsupportedVersion { .. })
    ));
}

// ----------------------------------------------------------------------------
// Config sanitation
// ----------------------------------------------------------------------------

#[test]
fn sanitized_config_repairs_nonsense_values() {
    let mut cfg = SimConfig::default();
    cfg.motion.cruise_speed = -3.0;
    cfg.motion.waypoint_tolerance = 0.0;
    cfg.battery.reserve_pct = 150.0;
    cfg.battery.resume_pct = -5.0;
    cfg.demand.interval_secs = 0.0;
    cfg.dispatch.history_limit = 0;
    let cfg = cfg.sanitized();
    assert!(cfg.motion.cruise_speed > 0.0);
    assert!(cfg.motion.waypoint_tolerance > 0.0);
    assert!(cfg.battery.reserve_pct <= 100.0);
    assert!(cfg.battery.resume_pct >= cfg.battery.reserve_pct);
    assert!(cfg.demand.interval_secs > 0.0);
    assert!(cfg.dispatch.history_limit >= 1);
}

#[test]
fn config_deserializes_from_partial_json() {
    let cfg: SimConfig =
        serde_json::from_str(r#"{"motion": {"cruise_speed": 3.5}}"#).unwrap();
    assert_eq!(cfg.motion.cruise_speed, 3.5);
    assert_eq!(cfg.battery.reserve_pct, DEFAULT_BATTERY_RESERVE_PCT);
    assert_eq!(cfg.motion.dwell_secs, DEFAULT_DWELL_SECS);
}

// ----------------------------------------------------------------------------
// Nearest-node lookup
// ----------------------------------------------------------------------------

#[test]
fn find_nearest_filters_by_kind() {
    let graph = line_layout().build().unwrap();
    let near_origin = graph.find_nearest(Vec2::new(1.0, 0.0), None).unwrap();
    assert_eq!(near_origin.id, "r1");
    let storage = graph
        .find_nearest(Vec2::new(1.0, 0.0), Some(NodeKind::Storage))
        .unwrap();
    assert_eq!(storage.id, "s1");
}
