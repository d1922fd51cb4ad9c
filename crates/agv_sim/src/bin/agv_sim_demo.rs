//! Headless fleet demo: runs the built-in warehouse layout with synthetic
//! demand for a fixed stretch of simulated time, then prints fleet KPIs.
//!
//! Usage:
//!   agv_sim_demo [--seconds N] [--agvs N] [--seed N] [--speed N] [--snapshot PATH]

use agv_sim::{demo_layout, SimConfig, Simulation, TaskStatus};

struct Options {
    seconds: f64,
    agvs: usize,
    seed: u64,
    speed: f64,
    snapshot: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            seconds: 300.0,
            agvs: 3,
            seed: 1,
            speed: 1.0,
            snapshot: None,
        }
    }
}

fn parse_args() -> Result<Options, String> {
    let mut opts = Options::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .ok_or_else(|| format!("{name} requires a value"))
        };
        match arg.as_str() {
            "--seconds" => {
                opts.seconds = value("--seconds")?
                    .parse()
                    .map_err(|e| format!("--seconds: {e}"))?;
            }
            "--agvs" => {
                opts.agvs = value("--agvs")?
                    .parse()
                    .map_err(|e| format!("--agvs: {e}"))?;
            }
            "--seed" => {
                opts.seed = value("--seed")?
                    .parse()
                    .map_err(|e| format!("--seed: {e}"))?;
            }
            "--speed" => {
                opts.speed = value("--speed")?
                    .parse()
                    .map_err(|e| format!("--speed: {e}"))?;
            }
            "--snapshot" => {
                opts.snapshot = Some(value("--snapshot")?);
            }
            "--help" | "-h" => {
                println!(
                    "usage: agv_sim_demo [--seconds N] [--agvs N] [--seed N] [--speed N] [--snapshot PATH]"
                );
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(opts)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let opts = match parse_args() {
        Ok(opts) => opts,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    };

    let mut config = SimConfig::default();
    config.demand.enabled = true;
    config.demand.seed = opts.seed;

    let mut sim = match Simulation::new(&demo_layout(), config) {
        Ok(sim) => sim,
        Err(err) => {
            eprintln!("error: layout rejected: {err}");
            std::process::exit(1);
        }
    };
    sim.set_speed_multiplier(opts.speed);

    // Spread the fleet over the bottom rail and the corridor start.
    let spawn_points = ["w1", "ch1", "ch2", "c0", "c2", "c4", "c5", "c7"];
    let mut spawned = 0;
    for point in spawn_points.iter() {
        if spawned >= opts.agvs {
            break;
        }
        let id = format!("agv-{}", spawned + 1);
        if sim.spawn_agent(&id, point) {
            spawned += 1;
        }
    }
    if spawned < opts.agvs {
        eprintln!("warning: only {spawned} of {} AGVs placed", opts.agvs);
    }

    let dt = 0.05;
    let ticks = (opts.seconds / dt).ceil() as u64;
    for _ in 0..ticks {
        sim.tick(dt);
    }

    let kpis = sim.kpis();
    let stats = sim.dispatcher().stats();
    println!("=== fleet report after {:.0} sim-seconds ===", sim.time());
    println!("fleet size        : {}", kpis.total_agvs);
    println!("tasks created     : {}", stats.created);
    println!("tasks completed   : {}", stats.completed);
    println!("tasks failed      : {}", stats.failed);
    println!("avg completion    : {:.1}s", stats.avg_completion_secs);
    println!("mission success   : {:.1}%", kpis.mission_success_pct);
    println!("utilization       : {:.1}%", kpis.utilization_pct);
    println!("avg battery       : {:.1}%", kpis.avg_battery);
    println!("pending backlog   : {}", sim.dispatcher().pending().len());
    let in_flight = sim
        .dispatcher()
        .fleet()
        .iter()
        .filter(|a| {
            a.current_task
                .as_ref()
                .map(|t| t.status == TaskStatus::InProgress)
                .unwrap_or(false)
        })
        .count();
    println!("missions in flight: {in_flight}");

    if let Some(path) = opts.snapshot {
        match sim.save_to_path(&path) {
            Ok(()) => println!("snapshot written to {path}"),
            Err(err) => {
                eprintln!("error: snapshot failed: {err}");
                std::process::exit(1);
            }
        }
    }
}
