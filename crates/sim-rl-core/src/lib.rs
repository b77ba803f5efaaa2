//! # sim-rl-core
//!
//! Core types shared by the combat simulator client crates:
//! - Error taxonomy
//! - Simulation config and state schema
//! - Observation features and their normalization
//! - Reward strategies

pub mod config;
pub mod error;
pub mod normalization;
pub mod observation;
pub mod reward;
pub mod state;

pub use config::SimConfig;
pub use error::{Result, SimError};
pub use normalization::{FeatureScaling, NormalizationConfig, ObservationNormalizer, ScalingKind};
pub use observation::{FeatureValue, Features};
pub use reward::{Reward, RewardComponents, RewardFunction, RewardKind};
pub use state::{Ability, Aura, RuneType, SimState};
