//! Simulation session configuration

use serde::{Deserialize, Serialize};

/// Configuration sent with `START_SIM_SESSION`
///
/// Only the fields the client reasons about are typed. The raid and unit
/// setup is owned by the simulator and travels through `extra` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimConfig {
    /// Encounter duration, in the unit the simulator expects
    pub duration: u64,
    /// Seed for the simulator's RNG
    pub random_seed: i64,
    /// Raid/unit setup and any other simulator-owned fields
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SimConfig {
    /// Create a config with no extra setup
    pub fn new(duration: u64, random_seed: i64) -> Self {
        Self {
            duration,
            random_seed,
            extra: serde_json::Map::new(),
        }
    }

    /// Attach a simulator-owned field (e.g. `raid`, `encounter`)
    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}
