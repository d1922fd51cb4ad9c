//! Core type definitions: IDs, constants, and simulation configuration.

use serde::{Deserialize, Serialize};

// ============================================================================
// Type Aliases
// ============================================================================

pub type NodeId = String;
pub type AgentId = String;
pub type TaskId = String;
pub type ItemId = String;
/// Simulated seconds since simulation start.
pub type SimTime = f64;
pub type SimEventId = u64;

// ============================================================================
// Constants
// ============================================================================

pub const DEFAULT_BATTERY_RESERVE_PCT: f64 = 20.0;
pub const DEFAULT_BATTERY_RESUME_PCT: f64 = 95.0;
pub const DEFAULT_DWELL_SECS: f64 = 1.5;
pub const DEFAULT_CRUISE_SPEED_MPS: f64 = 2.0;
pub const DEFAULT_PATH_RETRY_BUDGET: u32 = 5;
pub const SNAPSHOT_VERSION: u32 = 1;

// ============================================================================
// Simulation Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SimConfig {
    pub motion: MotionConfig,
    pub battery: BatteryConfig,
    pub dispatch: DispatchConfig,
    pub demand: DemandConfig,
}

impl SimConfig {
    pub fn sanitized(mut self) -> Self {
        self.motion = self.motion.sanitized();
        self.battery = self.battery.sanitized();
        self.dispatch = self.dispatch.sanitized();
        self.demand = self.demand.sanitized();
        self
    }
}

/// Motion numerics shared by every AGV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Steady travel speed in m/s.
    pub cruise_speed: f64,
    /// Reduced speed used when the final waypoint is near, for a smooth stop.
    pub approach_speed: f64,
    /// Distance to the final waypoint below which approach speed applies, in m.
    pub approach_distance: f64,
    pub acceleration: f64,
    /// Deceleration is stronger than acceleration.
    pub deceleration: f64,
    /// Turn-in-place rate in rad/s; translation is zero while rotating.
    pub rotation_rate: f64,
    /// Snap radius for waypoint arrival, in m.
    pub waypoint_tolerance: f64,
    /// Heading error below which the AGV is considered aligned, in rad.
    pub heading_tolerance: f64,
    /// Speeds below this clamp to exactly zero.
    pub speed_epsilon: f64,
    /// Fixed time spent in loading/unloading, in s.
    pub dwell_secs: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            cruise_speed: DEFAULT_CRUISE_SPEED_MPS,
            approach_speed: 0.5,
            approach_distance: 2.0,
            acceleration: 1.5,
            deceleration: 3.0,
            rotation_rate: 2.0,
            waypoint_tolerance: 0.2,
            heading_tolerance: 0.05,
            speed_epsilon: 0.01,
            dwell_secs: DEFAULT_DWELL_SECS,
        }
    }
}

impl MotionConfig {
    pub fn sanitized(mut self) -> Self {
        if self.cruise_speed <= 0.0 {
            self.cruise_speed = DEFAULT_CRUISE_SPEED_MPS;
        }
        if self.approach_speed <= 0.0 || self.approach_speed > self.cruise_speed {
            self.approach_speed = (self.cruise_speed * 0.25).max(0.1);
        }
        if self.approach_distance < 0.0 {
            self.approach_distance = 0.0;
        }
        if self.acceleration <= 0.0 {
            self.acceleration = 1.5;
        }
        if self.deceleration <= 0.0 {
            self.deceleration = 3.0;
        }
        if self.rotation_rate <= 0.0 {
            self.rotation_rate = 2.0;
        }
        if self.waypoint_tolerance <= 0.0 {
            self.waypoint_tolerance = 0.2;
        }
        if self.heading_tolerance <= 0.0 {
            self.heading_tolerance = 0.05;
        }
        if self.speed_epsilon < 0.0 {
            self.speed_epsilon = 0.0;
        }
        if self.dwell_secs < 0.0 {
            self.dwell_secs = 0.0;
        }
        self
    }
}

/// Battery model: drain while moving, recharge while docked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    /// Percent drained per second spent at nonzero speed.
    pub drain_per_sec: f64,
    /// Percent gained per second while charging.
    pub charge_per_sec: f64,
    /// Below this an agent is ineligible for work and seeks a charger.
    pub reserve_pct: f64,
    /// Charging ends and the agent returns to idle at this level.
    pub resume_pct: f64,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            drain_per_sec: 0.5,
            charge_per_sec: 10.0,
            reserve_pct: DEFAULT_BATTERY_RESERVE_PCT,
            resume_pct: DEFAULT_BATTERY_RESUME_PCT,
        }
    }
}

impl BatteryConfig {
    pub fn sanitized(mut self) -> Self {
        if self.drain_per_sec < 0.0 {
            self.drain_per_sec = 0.0;
        }
        if self.charge_per_sec <= 0.0 {
            self.charge_per_sec = 10.0;
        }
        self.reserve_pct = self.reserve_pct.clamp(0.0, 100.0);
        self.resume_pct = self.resume_pct.clamp(self.reserve_pct, 100.0);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Empty-path results per mission leg tolerated before the task fails.
    pub path_retry_budget: u32,
    /// Terminal tasks retained for statistics.
    pub history_limit: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            path_retry_budget: DEFAULT_PATH_RETRY_BUDGET,
            history_limit: 256,
        }
    }
}

impl DispatchConfig {
    pub fn sanitized(mut self) -> Self {
        if self.history_limit == 0 {
            self.history_limit = 1;
        }
        self
    }
}

/// Synthetic demand generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemandConfig {
    pub enabled: bool,
    /// Seconds between generation attempts.
    pub interval_secs: f64,
    pub seed: u64,
    /// Chance per interval of a random stock fill-level change.
    pub stock_churn_probability: f64,
}

impl Default for DemandConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 10.0,
            seed: 0,
            stock_churn_probability: 0.05,
        }
    }
}

impl DemandConfig {
    pub fn sanitized(mut self) -> Self {
        if self.interval_secs <= 0.0 {
            self.interval_secs = 10.0;
        }
        self.stock_churn_probability = self.stock_churn_probability.clamp(0.0, 1.0);
        self
    }
}
