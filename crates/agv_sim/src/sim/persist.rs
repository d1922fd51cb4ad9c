//! Versioned JSON snapshots of the whole simulation.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::dispatcher::Dispatcher;
use super::events::EventSink;
use super::graph::NavGraph;
use super::types::{SimConfig, SimTime, SNAPSHOT_VERSION};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unsupported snapshot version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },
}

fn default_snapshot_version() -> u32 {
    SNAPSHOT_VERSION
}

/// Complete serialized world state. The version field gates loading so a
/// stale file fails loudly instead of deserializing into garbage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimSnapshot {
    #[serde(default = "default_snapshot_version")]
    pub version: u32,
    pub time: SimTime,
    pub paused: bool,
    pub speed_multiplier: f64,
    pub config: SimConfig,
    pub graph: NavGraph,
    pub dispatcher: Dispatcher,
    pub events: EventSink,
}

impl SimSnapshot {
    pub fn validate_version(&self) -> Result<(), PersistError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(PersistError::UnsupportedVersion {
                found: self.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PersistError> {
        let snapshot: SimSnapshot = serde_json::from_str(json)?;
        snapshot.validate_version()?;
        Ok(snapshot)
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
