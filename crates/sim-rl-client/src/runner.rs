//! Episode runner
//!
//! Drives a [`SimClient`] through whole episodes: each step the policy picks
//! an action from the normalized observation, the action is performed, and
//! the reward strategy scores the transition.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sim_rl_core::observation::flatten;
use sim_rl_core::{
    Features, ObservationNormalizer, Result, RewardFunction, RewardKind, ScalingKind, SimConfig,
    SimError, SimState,
};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

use crate::SimClient;

/// Spell priority used by [`RotationPolicy::default`]
pub const DEFAULT_ROTATION: &[&str] = &[
    "IcyTouch",
    "PlagueStrike",
    "Pestilence",
    "HowlingBlast",
    "Obliterate",
    "FrostStrike",
    "BloodStrike",
    "HornOfWinter",
];

/// An action the agent can take in one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentAction {
    /// Cast the named spell
    Cast(String),
    /// Advance one simulator step
    DoNothing,
    /// Advance until the global cooldown is over
    WaitGcd,
}

impl AgentAction {
    /// Whether the action can be taken in `state`
    pub fn is_legal(&self, state: &SimState) -> bool {
        match self {
            AgentAction::Cast(spell) => state.can_cast(spell),
            AgentAction::DoNothing => true,
            AgentAction::WaitGcd => state.gcd_remaining > 0.0,
        }
    }

    /// Perform the action against the simulator
    pub async fn perform(
        &self,
        client: &mut SimClient,
        state: &SimState,
    ) -> Result<serde_json::Value> {
        match self {
            AgentAction::Cast(spell) => client.cast(spell).await,
            AgentAction::DoNothing => client.do_nothing().await,
            AgentAction::WaitGcd => client.wait(state.gcd_remaining.ceil() as u64).await,
        }
    }
}

impl fmt::Display for AgentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentAction::Cast(spell) => write!(f, "CAST_{}", spell),
            AgentAction::DoNothing => f.write_str("DO_NOTHING"),
            AgentAction::WaitGcd => f.write_str("WAIT_GCD"),
        }
    }
}

/// Chooses the next action from the current state
#[async_trait]
pub trait Policy: Send {
    /// Pick an action given the raw state and its normalized observation
    async fn choose(&mut self, state: &SimState, observation: &Features) -> AgentAction;
}

/// Casts the first castable spell of a fixed priority list
#[derive(Debug, Clone)]
pub struct RotationPolicy {
    priority: Vec<String>,
}

impl RotationPolicy {
    pub fn new<I, S>(priority: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            priority: priority.into_iter().map(Into::into).collect(),
        }
    }

    /// Spells in priority order
    pub fn priority(&self) -> &[String] {
        &self.priority
    }

    /// Next action for `state`
    ///
    /// Falls back to waiting out the GCD, then to a plain step.
    pub fn next_action(&self, state: &SimState) -> AgentAction {
        if let Some(spell) = self.priority.iter().find(|s| state.can_cast(s.as_str())) {
            return AgentAction::Cast(spell.clone());
        }
        if state.gcd_remaining > 0.0 {
            AgentAction::WaitGcd
        } else {
            AgentAction::DoNothing
        }
    }
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ROTATION.iter().copied())
    }
}

#[async_trait]
impl Policy for RotationPolicy {
    async fn choose(&mut self, state: &SimState, _observation: &Features) -> AgentAction {
        self.next_action(state)
    }
}

/// What to do when the normalization config file does not exist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingConfig {
    /// Refuse to run
    #[default]
    Fail,
    /// Run unnormalized and record statistics for a new config
    Record,
}

/// Episode runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Simulated episode length in milliseconds
    pub sim_duration_ms: u64,
    /// Stop an episode after this many steps even if not done
    pub max_steps: Option<usize>,
    /// Reward strategy
    pub reward: RewardKind,
    /// Scaling applied when a new config is built
    pub scaling: ScalingKind,
    /// Normalization config file to load, or to write after recording
    pub normalization_path: Option<PathBuf>,
    /// Behavior when `normalization_path` does not exist yet
    pub missing_config: MissingConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            sim_duration_ms: 60_000,
            max_steps: None,
            reward: RewardKind::default(),
            scaling: ScalingKind::default(),
            normalization_path: None,
            missing_config: MissingConfig::default(),
        }
    }
}

impl RunnerConfig {
    /// Construct the observation normalizer this config asks for
    ///
    /// An existing config file is loaded and must be valid. A missing file
    /// is an error unless `missing_config` is [`MissingConfig::Record`].
    pub fn normalizer(&self) -> Result<ObservationNormalizer> {
        let mut normalizer = ObservationNormalizer::for_sim_state();
        let Some(path) = &self.normalization_path else {
            info!("No normalization config path set, recording only");
            return Ok(normalizer);
        };

        if path.exists() {
            normalizer.load_config(path)?;
            return Ok(normalizer);
        }
        match self.missing_config {
            MissingConfig::Fail => Err(SimError::ConfigLoad(format!(
                "Normalization config {} does not exist",
                path.display()
            ))),
            MissingConfig::Record => {
                info!(
                    "Normalization config {} not found, recording observations",
                    path.display()
                );
                Ok(normalizer)
            }
        }
    }
}

/// Outcome of one episode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub seed: i64,
    pub steps: usize,
    pub total_reward: f64,
    pub final_dps: f64,
    pub total_damage: f64,
    /// Whether the simulator reported the episode finished
    pub done: bool,
    /// How often each action was taken
    pub actions: BTreeMap<String, usize>,
}

/// Runs episodes against one simulator connection
pub struct EpisodeRunner {
    client: SimClient,
    normalizer: ObservationNormalizer,
    policy: Box<dyn Policy>,
    config: RunnerConfig,
}

impl EpisodeRunner {
    pub fn new(
        client: SimClient,
        normalizer: ObservationNormalizer,
        policy: Box<dyn Policy>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            client,
            normalizer,
            policy,
            config,
        }
    }

    pub fn client(&self) -> &SimClient {
        &self.client
    }

    pub fn normalizer(&self) -> &ObservationNormalizer {
        &self.normalizer
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Play one episode with the given seed
    ///
    /// A transport error aborts the episode and closes the client, so the
    /// next episode starts on a fresh connection.
    pub async fn run_episode(&mut self, seed: i64) -> Result<EpisodeSummary> {
        let outcome = self.play(seed).await;
        if let Err(e) = &outcome {
            if e.is_transport() {
                error!("Episode with seed {} aborted: {}", seed, e);
                self.client.close().await;
            }
        }
        outcome
    }

    /// Play `episodes` episodes with seeds `0..episodes`
    ///
    /// Episodes aborted by transport errors are skipped. Any other error
    /// stops the run, and so does a run in which every episode aborted: the
    /// last transport error is returned.
    pub async fn run(&mut self, episodes: usize) -> Result<Vec<EpisodeSummary>> {
        let mut summaries = Vec::with_capacity(episodes);
        let mut last_abort = None;
        for seed in 0..episodes as i64 {
            match self.run_episode(seed).await {
                Ok(summary) => {
                    info!(
                        "Episode {} done: steps={} reward={:.2} dps={:.1}",
                        seed, summary.steps, summary.total_reward, summary.final_dps
                    );
                    summaries.push(summary);
                }
                Err(e) if e.is_transport() => last_abort = Some(e),
                Err(e) => return Err(e),
            }
        }

        let aborted = episodes - summaries.len();
        if aborted > 0 {
            warn!("{} of {} episode(s) aborted", aborted, episodes);
        }
        match last_abort {
            Some(e) if summaries.is_empty() => Err(e),
            _ => Ok(summaries),
        }
    }

    /// Close the client and persist a freshly recorded normalization config
    pub async fn finish(&mut self) -> Result<()> {
        self.client.close().await;

        let Some(path) = &self.config.normalization_path else {
            return Ok(());
        };
        if !self.normalizer.is_recording() || self.normalizer.sample_count() == 0 {
            return Ok(());
        }
        self.normalizer.build_config(self.config.scaling)?;
        self.normalizer.save_config(path)
    }

    async fn play(&mut self, seed: i64) -> Result<EpisodeSummary> {
        let sim_config = SimConfig::new(self.config.sim_duration_ms, seed);
        let mut state = self.client.reset(sim_config).await?;
        let mut observation = self.normalizer.apply(state.features()?)?;
        debug!(
            "Episode {} started, observation has {} values",
            seed,
            flatten(&observation).len()
        );
        let mut summary = EpisodeSummary {
            seed,
            ..Default::default()
        };

        while !state.is_done && self.config.max_steps.is_none_or(|max| summary.steps < max) {
            let mut action = self.policy.choose(&state, &observation).await;
            if !action.is_legal(&state) {
                warn!("Policy chose illegal action {}, doing nothing", action);
                action = AgentAction::DoNothing;
            }

            action.perform(&mut self.client, &state).await?;
            let next = self.client.get_state().await?;
            // No previous state on the first step after a reset
            let prev = (summary.steps > 0).then_some(&state);
            let reward = self.config.reward.compute(prev, &next);

            summary.steps += 1;
            summary.total_reward += reward.value;
            *summary.actions.entry(action.to_string()).or_default() += 1;
            debug!(
                "step={} action={} reward={:.3} time={} dps={:.1}",
                summary.steps, action, reward.value, next.current_time, next.dps
            );

            observation = self.normalizer.apply(next.features()?)?;
            state = next;
        }

        summary.final_dps = state.dps;
        summary.total_damage = state.total_damage;
        summary.done = state.is_done;
        Ok(summary)
    }
}

impl fmt::Debug for EpisodeRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpisodeRunner")
            .field("client", &self.client)
            .field("config", &self.config)
            .field("recording", &self.normalizer.is_recording())
            .finish()
    }
}
