//! Reward strategies

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::SimError;
use crate::state::SimState;

/// Scalar reward with optional decomposition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    /// Total scalar reward
    pub value: f64,
    /// Decomposed components for analysis
    #[serde(default)]
    pub components: RewardComponents,
}

impl Reward {
    fn scalar(value: f64) -> Self {
        Self {
            value,
            components: RewardComponents::new(),
        }
    }
}

/// Decomposed reward components
pub type RewardComponents = HashMap<String, f64>;

/// Trait for computing rewards from a state transition
pub trait RewardFunction: Send + Sync {
    /// Compute reward for reaching `current` from `prev`
    ///
    /// `prev` is `None` on the first step of an episode.
    fn compute(&self, prev: Option<&SimState>, current: &SimState) -> Reward;
}

/// Built-in reward strategies, selected once when an episode runner is built
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    /// Change in DPS since the last step
    DeltaDps,
    /// Damage dealt since the last step
    DeltaDamage,
    /// Final DPS, paid on the terminal step only
    #[default]
    FinalDps,
    /// Damage of the terminal step only
    FinalDamage,
    /// Current DPS every step
    AbsDps,
    /// Total damage every step
    AbsDamage,
    /// Shaped reward from runic power, diseases and ability damage
    Guided,
}

impl RewardKind {
    pub const ALL: [RewardKind; 7] = [
        RewardKind::DeltaDps,
        RewardKind::DeltaDamage,
        RewardKind::FinalDps,
        RewardKind::FinalDamage,
        RewardKind::AbsDps,
        RewardKind::AbsDamage,
        RewardKind::Guided,
    ];

    /// Configuration name of this strategy
    pub fn name(self) -> &'static str {
        match self {
            RewardKind::DeltaDps => "delta_dps",
            RewardKind::DeltaDamage => "delta_damage",
            RewardKind::FinalDps => "final_dps",
            RewardKind::FinalDamage => "final_damage",
            RewardKind::AbsDps => "abs_dps",
            RewardKind::AbsDamage => "abs_damage",
            RewardKind::Guided => "guided",
        }
    }
}

impl fmt::Display for RewardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RewardKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RewardKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| SimError::Config(format!("{} is not a valid reward type", s)))
    }
}

impl RewardFunction for RewardKind {
    fn compute(&self, prev: Option<&SimState>, current: &SimState) -> Reward {
        match self {
            RewardKind::DeltaDps => {
                Reward::scalar(current.dps - prev.map_or(0.0, |p| p.dps))
            }
            RewardKind::DeltaDamage => {
                Reward::scalar(current.total_damage - prev.map_or(0.0, |p| p.total_damage))
            }
            RewardKind::FinalDps => {
                Reward::scalar(if current.is_done { current.dps } else { 0.0 })
            }
            RewardKind::FinalDamage => Reward::scalar(if current.is_done {
                current.total_damage - prev.map_or(0.0, |p| p.total_damage)
            } else {
                0.0
            }),
            RewardKind::AbsDps => Reward::scalar(current.dps),
            RewardKind::AbsDamage => Reward::scalar(current.total_damage),
            RewardKind::Guided => guided(prev, current),
        }
    }
}

fn guided(prev: Option<&SimState>, current: &SimState) -> Reward {
    let Some(prev) = prev else {
        return Reward::default();
    };
    if current.is_done {
        return Reward::scalar(current.ability_dps);
    }

    let diseases_now = current.active_diseases() as f64;
    let runic_power = (current.runic_power - prev.runic_power).max(0.0) / 10.0;
    let disease_delta = (diseases_now - prev.active_diseases() as f64) * 10.0;
    let disease_count = diseases_now * 0.5;
    let ability_damage = (current.ability_damage - prev.ability_damage) / 200.0;

    // Summed in a fixed order so the total does not depend on map iteration
    Reward {
        value: runic_power + disease_delta + disease_count + ability_damage,
        components: RewardComponents::from([
            ("runic_power".to_string(), runic_power),
            ("disease_delta".to_string(), disease_delta),
            ("disease_count".to_string(), disease_count),
            ("ability_damage".to_string(), ability_damage),
        ]),
    }
}
