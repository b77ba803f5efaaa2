//! Simulator state schema and feature extraction
//!
//! The state body is owned by the simulator. Fields the client relies on are
//! typed; everything else is kept in `extra` so newer simulators still parse.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Result, SimError};
use crate::observation::{FeatureValue, Features};

/// Spells tracked in the observation, in feature order.
/// Keep in sync with the simulator's spell tracking.
pub const TRACKED_SPELLS: &[&str] = &[
    "Pestilence",
    "BloodStrike",
    "PlagueStrike",
    "IcyTouch",
    "Obliterate",
    "HowlingBlast",
    "FrostStrike",
    "UnbreakableArmor",
    "BloodTap",
    "BloodFury",
    "HyperspeedAcceleration",
    "HornOfWinter",
    "EmpowerRuneWeapon",
    "RaiseDead",
];

/// Debuffs tracked in the observation
pub const TRACKED_DEBUFFS: &[&str] = &["FrostFever", "BloodPlague"];

/// Buffs tracked in the observation
pub const TRACKED_BUFFS: &[&str] = &[
    "Blood Tap",
    "Bloodlust",
    "Icy Talons",
    "DMC Greatness Strength Proc",
    "Mjolnir Runestone Proc",
    "Killing Machine Proc",
    "Rime",
    "Potion of Speed",
    "Hyperspeed Acceleration",
    "Blood Fury",
];

/// Features that are already discrete and must not be rescaled
pub const DISCRETE_FEATURES: &[&str] = &[
    "isExecute35",
    "runeTypes",
    "debuffsActive",
    "buffsActive",
    "gcdAvailable",
];

/// Rune slot type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuneType {
    Blood,
    Frost,
    Unholy,
    Death,
}

impl RuneType {
    /// Categorical code used in the observation
    pub fn code(self) -> f64 {
        match self {
            RuneType::Blood => 0.0,
            RuneType::Frost => 1.0,
            RuneType::Unholy => 2.0,
            RuneType::Death => 3.0,
        }
    }
}

/// Ability entry in the state body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ability {
    pub name: String,
    pub can_cast: bool,
    #[serde(default)]
    pub cd_remaining: f64,
    #[serde(default)]
    pub gcd_cost: f64,
}

/// Buff or debuff entry in the state body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aura {
    pub name: String,
    pub is_active: bool,
    #[serde(default)]
    pub duration: f64,
}

/// Simulator state as returned by `GET_STATE`, `CAST` and `WAIT_DURATION`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimState {
    #[serde(default)]
    pub abilities: Vec<Ability>,
    #[serde(default)]
    pub debuffs: Vec<Aura>,
    #[serde(default)]
    pub buffs: Vec<Aura>,
    #[serde(default)]
    pub rune_types: Vec<RuneType>,
    #[serde(default, rename = "runeCDs")]
    pub rune_cds: Vec<f64>,
    #[serde(default)]
    pub rune_graces: Vec<f64>,
    #[serde(default)]
    pub gcd_remaining: f64,
    #[serde(default)]
    pub gcd_available: bool,
    #[serde(default)]
    pub is_execute35: bool,
    pub is_done: bool,
    #[serde(default)]
    pub current_time: f64,
    #[serde(default)]
    pub total_damage: f64,
    pub dps: f64,
    #[serde(default)]
    pub runic_power: f64,
    #[serde(default)]
    pub ability_damage: f64,
    #[serde(default, rename = "abilityDPS")]
    pub ability_dps: f64,
    #[serde(default, rename = "meleeDPS")]
    pub melee_dps: f64,
    #[serde(default, rename = "diseaseDPS")]
    pub disease_dps: f64,
    /// Fields not modelled above
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl SimState {
    /// Parse a state body returned by the simulator
    pub fn from_body(body: serde_json::Value) -> Result<Self> {
        serde_json::from_value(body)
            .map_err(|e| SimError::Protocol(format!("Invalid state body: {}", e)))
    }

    /// Look up an ability by name
    pub fn ability(&self, name: &str) -> Option<&Ability> {
        self.abilities.iter().find(|a| a.name == name)
    }

    /// Look up a debuff by name
    pub fn debuff(&self, name: &str) -> Option<&Aura> {
        self.debuffs.iter().find(|d| d.name == name)
    }

    /// Look up a buff by name
    pub fn buff(&self, name: &str) -> Option<&Aura> {
        self.buffs.iter().find(|b| b.name == name)
    }

    /// Whether the named spell can be cast right now
    pub fn can_cast(&self, spell: &str) -> bool {
        self.ability(spell).is_some_and(|a| a.can_cast)
    }

    /// Castability of every tracked spell, in feature order
    pub fn ability_mask(&self) -> Vec<bool> {
        TRACKED_SPELLS.iter().map(|s| self.can_cast(s)).collect()
    }

    /// Number of active diseases on the target
    pub fn active_diseases(&self) -> usize {
        self.debuffs
            .iter()
            .filter(|d| d.is_active && TRACKED_DEBUFFS.contains(&d.name.as_str()))
            .count()
    }

    fn tracked_abilities(&self) -> Result<Vec<&Ability>> {
        TRACKED_SPELLS
            .iter()
            .map(|spell| {
                self.ability(spell).ok_or_else(|| {
                    SimError::Protocol(format!("State is missing tracked ability {}", spell))
                })
            })
            .collect()
    }

    /// Raw (unnormalized) observation features
    ///
    /// Auras missing from the state count as inactive with no duration.
    pub fn features(&self) -> Result<Features> {
        let abilities = self.tracked_abilities()?;
        let (debuffs_active, debuff_durations) = aura_features(&self.debuffs, TRACKED_DEBUFFS);
        let (buffs_active, buff_durations) = aura_features(&self.buffs, TRACKED_BUFFS);

        let mut features = Features::new();
        // Discrete
        features.insert("isExecute35".into(), self.is_execute35.into());
        features.insert(
            "runeTypes".into(),
            FeatureValue::Vector(self.rune_types.iter().map(|r| r.code()).collect()),
        );
        features.insert("debuffsActive".into(), debuffs_active.into());
        features.insert("buffsActive".into(), buffs_active.into());
        features.insert("gcdAvailable".into(), self.gcd_available.into());
        // Continuous
        features.insert(
            "abilityCDs".into(),
            FeatureValue::Vector(abilities.iter().map(|a| a.cd_remaining).collect()),
        );
        features.insert(
            "abilityGCDs".into(),
            FeatureValue::Vector(abilities.iter().map(|a| a.gcd_cost).collect()),
        );
        features.insert("debuffDurations".into(), debuff_durations.into());
        features.insert("buffDurations".into(), buff_durations.into());
        features.insert("gcdRemaining".into(), self.gcd_remaining.into());
        features.insert("runeCDs".into(), self.rune_cds.clone().into());
        features.insert("runeGraces".into(), self.rune_graces.clone().into());
        Ok(features)
    }
}

/// Activity flags and remaining durations for the tracked auras
fn aura_features(auras: &[Aura], tracked: &[&str]) -> (Vec<f64>, Vec<f64>) {
    tracked
        .iter()
        .map(|name| match auras.iter().find(|a| a.name == *name) {
            Some(aura) => (if aura.is_active { 1.0 } else { 0.0 }, aura.duration),
            None => (0.0, 0.0),
        })
        .unzip()
}
