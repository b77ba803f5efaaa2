//! Simulation control client for the combat simulator
//!
//! This crate provides a client that drives a simulation session over a
//! [`SimTransport`], plus an episode runner that ties the client to
//! observation normalization and reward computation.

pub mod runner;

pub use runner::{
    AgentAction, EpisodeRunner, EpisodeSummary, MissingConfig, Policy, RotationPolicy,
    RunnerConfig,
};

use serde::{Deserialize, Serialize};
use sim_bridge::{SimAddress, SimRequest, SimTransport, TransportOptions};
use sim_rl_core::{Result, SimConfig, SimError, SimState};
use tracing::{debug, info, warn};

/// Default simulated time advanced by one step, in milliseconds
pub const DEFAULT_STEP_DURATION_MS: u64 = 50;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Connection timeouts and frame limit
    pub transport: TransportOptions,
    /// Minimum simulator tick, advanced after every cast
    pub step_duration_ms: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            transport: TransportOptions::default(),
            step_duration_ms: DEFAULT_STEP_DURATION_MS,
        }
    }
}

/// Where a client is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No connection held
    Unconnected,
    /// Connected, no simulation started yet
    Connected,
    /// A simulation session is running
    SessionActive,
}

/// Client for one simulator connection
///
/// Every call awaits its response before returning, so at most one request
/// is ever in flight.
#[derive(Debug)]
pub struct SimClient {
    transport: SimTransport,
    step_duration_ms: u64,
    session_active: bool,
    state: Option<SimState>,
}

impl SimClient {
    /// Create an unconnected client
    pub fn new(address: SimAddress, options: ClientOptions) -> Self {
        Self {
            transport: SimTransport::new(address, options.transport),
            step_duration_ms: options.step_duration_ms,
            session_active: false,
            state: None,
        }
    }

    /// Simulator address
    pub fn address(&self) -> &SimAddress {
        self.transport.address()
    }

    /// Simulated milliseconds advanced per step
    pub fn step_duration_ms(&self) -> u64 {
        self.step_duration_ms
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> SessionPhase {
        if !self.transport.is_connected() {
            SessionPhase::Unconnected
        } else if self.session_active {
            SessionPhase::SessionActive
        } else {
            SessionPhase::Connected
        }
    }

    /// State cached by the last step, if any
    pub fn cached_state(&self) -> Option<&SimState> {
        self.state.as_ref()
    }

    /// Open a connection, dropping any session on a previous one
    pub async fn connect(&mut self) -> Result<()> {
        self.end_session();
        self.transport.connect().await
    }

    /// Close the connection if open
    pub async fn disconnect(&mut self) {
        self.end_session();
        self.transport.disconnect().await;
    }

    /// Start a new simulation and return its initial state
    ///
    /// Connects first when needed. Called during an active session, the
    /// running simulation is replaced on the same connection.
    pub async fn reset(&mut self, config: SimConfig) -> Result<SimState> {
        if !self.transport.is_connected() {
            self.connect().await?;
        }
        self.end_session();

        info!(
            "Starting simulation session (duration={}ms, seed={})",
            config.duration, config.random_seed
        );
        self.request(SimRequest::StartSimSession(config)).await?;
        self.session_active = true;
        self.fetch_state().await
    }

    /// Cast a spell, then advance one step
    ///
    /// The step's response becomes the cached state. Once the cast is
    /// accepted the old cache is stale, so a failed step leaves none and the
    /// next `get_state` asks the simulator. Returns the body of the cast
    /// response.
    pub async fn cast(&mut self, spell: &str) -> Result<serde_json::Value> {
        self.ensure_session()?;
        let response = self.request(SimRequest::cast(spell)).await?;
        self.state = None;

        let body = self.request(SimRequest::wait(self.step_duration_ms)).await?;
        self.state = Some(SimState::from_body(body)?);
        Ok(response)
    }

    /// Advance simulated time by `duration_ms` and refresh the state
    pub async fn wait(&mut self, duration_ms: u64) -> Result<serde_json::Value> {
        self.ensure_session()?;
        let response = self.request(SimRequest::wait(duration_ms)).await?;
        self.fetch_state().await?;
        Ok(response)
    }

    /// Advance a single step without acting
    pub async fn do_nothing(&mut self) -> Result<serde_json::Value> {
        self.wait(self.step_duration_ms).await
    }

    /// Current state, from the cache when the last step left one
    pub async fn get_state(&mut self) -> Result<SimState> {
        self.ensure_session()?;
        if let Some(state) = &self.state {
            return Ok(state.clone());
        }
        self.fetch_state().await
    }

    /// End the session and close the connection
    pub async fn close(&mut self) {
        if self.session_active {
            info!("Closing simulation session at {}", self.transport.address());
        }
        self.disconnect().await;
    }

    async fn fetch_state(&mut self) -> Result<SimState> {
        self.state = None;
        let body = self.request(SimRequest::GetState).await?;
        let state = SimState::from_body(body)?;
        self.state = Some(state.clone());
        Ok(state)
    }

    async fn request(&mut self, request: SimRequest) -> Result<serde_json::Value> {
        match self.transport.send_request(&request).await {
            Err(e) if e.invalidates_session() => {
                if self.session_active {
                    warn!("Simulation session lost during {}: {}", request.command(), e);
                }
                self.end_session();
                Err(e)
            }
            Err(e) => {
                debug!("{} failed: {}", request.command(), e);
                Err(e)
            }
            Ok(body) => Ok(body),
        }
    }

    fn ensure_session(&self) -> Result<()> {
        match self.phase() {
            SessionPhase::SessionActive => Ok(()),
            SessionPhase::Connected => Err(SimError::NoSession),
            SessionPhase::Unconnected => Err(SimError::NotConnected),
        }
    }

    fn end_session(&mut self) {
        self.session_active = false;
        self.state = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SimClient {
        SimClient::new(
            SimAddress::Tcp("127.0.0.1:1".into()),
            ClientOptions::default(),
        )
    }

    #[test]
    fn test_new_client_is_unconnected() {
        let client = client();

        assert_eq!(client.phase(), SessionPhase::Unconnected);
        assert_eq!(client.step_duration_ms(), 50);
        assert!(client.cached_state().is_none());
    }

    #[tokio::test]
    async fn test_steps_require_connection() {
        let mut client = client();

        assert!(matches!(client.cast("Pestilence").await, Err(SimError::NotConnected)));
        assert!(matches!(client.wait(100).await, Err(SimError::NotConnected)));
        assert!(matches!(client.do_nothing().await, Err(SimError::NotConnected)));
        assert!(matches!(client.get_state().await, Err(SimError::NotConnected)));
    }

    #[tokio::test]
    async fn test_close_when_unconnected_is_noop() {
        let mut client = client();
        client.close().await;
        client.disconnect().await;

        assert_eq!(client.phase(), SessionPhase::Unconnected);
    }

    #[test]
    fn test_options_default_from_empty_json() {
        let options: ClientOptions = serde_json::from_str("{}").unwrap();

        assert_eq!(options.step_duration_ms, DEFAULT_STEP_DURATION_MS);
        assert_eq!(options.transport.io_timeout, std::time::Duration::from_secs(1));
    }
}
