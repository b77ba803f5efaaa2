//! Combat simulator episode runner
//!
//! Connects to a running simulator (Unix socket `/tmp/sim-agent.sock` by
//! default), plays episodes with a fixed spell rotation and reports the
//! results. Observations are normalized with `normalization_config.json`;
//! pass `--record` to build that file from the episodes instead.

use anyhow::Result;
use clap::Parser;
use sim_bridge::{SimAddress, TransportOptions};
use sim_rl_client::{
    ClientOptions, DEFAULT_STEP_DURATION_MS, EpisodeRunner, MissingConfig, RotationPolicy,
    RunnerConfig, SimClient,
};
use sim_rl_core::{RewardKind, ScalingKind};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_ADDRESS: &str = "/tmp/sim-agent.sock";
const DEFAULT_NORMALIZATION_CONFIG: &str = "normalization_config.json";

#[derive(Debug, Parser)]
#[command(
    name = "sim-runner",
    about = "Play rotation-policy episodes against the combat simulator",
    version
)]
struct Args {
    /// Simulator socket path or host:port
    #[arg(long, env = "SIM_ADDRESS", default_value = DEFAULT_ADDRESS)]
    address: SimAddress,

    /// Episodes to play
    #[arg(long, default_value_t = 1)]
    episodes: usize,

    /// Simulated episode length in milliseconds
    #[arg(long = "duration", default_value_t = 60_000)]
    duration_ms: u64,

    /// Simulator step duration in milliseconds
    #[arg(long = "step", default_value_t = DEFAULT_STEP_DURATION_MS)]
    step_ms: u64,

    /// Truncate episodes after this many steps
    #[arg(long)]
    max_steps: Option<usize>,

    /// Connect and response timeout in milliseconds
    #[arg(long = "timeout", default_value_t = 1000)]
    timeout_ms: u64,

    /// delta_dps, delta_damage, final_dps, final_damage, abs_dps, abs_damage or guided
    #[arg(long, default_value = "final_dps")]
    reward: RewardKind,

    /// Normalization config file
    #[arg(long, env = "NORMALIZATION_CONFIG", default_value = DEFAULT_NORMALIZATION_CONFIG)]
    normalization: PathBuf,

    /// Run unnormalized without a config file
    #[arg(long)]
    no_normalization: bool,

    /// Record a new normalization config if none exists
    #[arg(long)]
    record: bool,

    /// minmax or standard, for recorded configs
    #[arg(long, default_value = "minmax")]
    scaling: ScalingKind,

    /// Comma-separated spell priority list
    #[arg(long, value_delimiter = ',')]
    rotation: Vec<String>,
}

impl Args {
    fn client_options(&self) -> ClientOptions {
        let timeout = Duration::from_millis(self.timeout_ms);
        ClientOptions {
            transport: TransportOptions {
                connect_timeout: timeout,
                io_timeout: timeout,
                ..Default::default()
            },
            step_duration_ms: self.step_ms,
        }
    }

    fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            sim_duration_ms: self.duration_ms,
            max_steps: self.max_steps,
            reward: self.reward,
            scaling: self.scaling,
            normalization_path: (!self.no_normalization).then(|| self.normalization.clone()),
            missing_config: if self.record {
                MissingConfig::Record
            } else {
                MissingConfig::Fail
            },
        }
    }

    fn policy(&self) -> RotationPolicy {
        let priority: Vec<&str> = self
            .rotation
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if priority.is_empty() {
            RotationPolicy::default()
        } else {
            RotationPolicy::new(priority)
        }
    }
}

/// Log filter from `RUST_LOG`, else `LOG_LEVEL`, else `info`
fn log_filter() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|level| EnvFilter::try_new(level.to_lowercase()).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(log_filter())
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let client = SimClient::new(args.address.clone(), args.client_options());
    let config = args.runner_config();
    let normalizer = config.normalizer()?;

    info!(
        "Running {} episode(s) against {} (reward={}, step={}ms)",
        args.episodes, args.address, args.reward, args.step_ms
    );
    let mut runner = EpisodeRunner::new(client, normalizer, Box::new(args.policy()), config);
    let result = runner.run(args.episodes).await;
    runner.finish().await?;
    let summaries = result?;

    for summary in &summaries {
        println!(
            "episode seed={} steps={} reward={:.2} dps={:.1} damage={:.0}",
            summary.seed, summary.steps, summary.total_reward, summary.final_dps, summary.total_damage
        );
    }
    if !summaries.is_empty() {
        let mean = summaries.iter().map(|s| s.final_dps).sum::<f64>() / summaries.len() as f64;
        println!("mean dps over {} episode(s): {:.1}", summaries.len(), mean);
    }
    Ok(())
}
