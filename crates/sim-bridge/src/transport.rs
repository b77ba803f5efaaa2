//! Transport session to the simulator process
//!
//! A [`SimTransport`] owns at most one connection and runs strictly one
//! request/response exchange at a time on it. There is no background reader
//! and no pipelining: `send_request` writes one frame and awaits exactly one
//! frame back. `&mut self` on every exchange keeps two requests from ever
//! being in flight on the same session.

use crate::protocol::{SimRequest, deserialize_response, serialize_request};
use crate::framing::MAX_FRAME_LEN;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sim_rl_core::{Result, SimError};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Trait for a connected byte stream that carries frames
#[async_trait]
pub trait FrameStream: Send {
    /// Write one complete frame
    /// Frames are length-prefixed: 4-byte little-endian length + JSON payload
    async fn write_frame(&mut self, payload: &[u8]) -> Result<()>;

    /// Read one complete frame, rejecting payloads longer than `max_len`
    async fn read_frame(&mut self, max_len: usize) -> Result<Vec<u8>>;

    /// Close the stream. Errors are logged, not returned.
    async fn shutdown(&mut self);
}

/// Where the simulator listens
///
/// Parsed from `unix:<path>` or an absolute path for a Unix domain socket,
/// anything else is a TCP `host:port`. Only the address ever crosses a
/// process boundary, never a live connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SimAddress {
    /// TCP `host:port`
    Tcp(String),
    /// Unix domain socket path
    Unix(PathBuf),
}

impl FromStr for SimAddress {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(SimError::Config("Empty unix socket path".into()));
            }
            return Ok(SimAddress::Unix(PathBuf::from(path)));
        }
        if s.starts_with('/') {
            return Ok(SimAddress::Unix(PathBuf::from(s)));
        }
        match s.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(SimAddress::Tcp(s.to_string()))
            }
            _ => Err(SimError::Config(format!(
                "Invalid simulator address {:?}, expected host:port or unix:<path>",
                s
            ))),
        }
    }
}

impl TryFrom<String> for SimAddress {
    type Error = SimError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SimAddress> for String {
    fn from(address: SimAddress) -> Self {
        address.to_string()
    }
}

impl fmt::Display for SimAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimAddress::Tcp(addr) => f.write_str(addr),
            SimAddress::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Timeouts and limits for a transport session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportOptions {
    /// Deadline for establishing the connection
    pub connect_timeout: Duration,
    /// Deadline for one full request/response exchange
    pub io_timeout: Duration,
    /// Largest response payload accepted
    pub max_frame_len: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(1),
            io_timeout: Duration::from_secs(1),
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}

/// One connection to the simulator plus what is needed to reopen it
pub struct SimTransport {
    address: SimAddress,
    options: TransportOptions,
    stream: Option<Box<dyn FrameStream>>,
}

impl SimTransport {
    /// Create an unconnected transport
    pub fn new(address: SimAddress, options: TransportOptions) -> Self {
        Self {
            address,
            options,
            stream: None,
        }
    }

    /// Target address
    pub fn address(&self) -> &SimAddress {
        &self.address
    }

    /// Transport options
    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Whether a connection handle is held
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Open a connection, replacing any existing one
    pub async fn connect(&mut self) -> Result<()> {
        self.disconnect().await;

        info!("Connecting to simulator at {}", self.address);
        let timeout = self.options.connect_timeout;
        let stream: Box<dyn FrameStream> = match &self.address {
            SimAddress::Tcp(addr) => Box::new(crate::tcp::connect(addr, timeout).await?),
            #[cfg(unix)]
            SimAddress::Unix(path) => Box::new(crate::unix::connect(path, timeout).await?),
            #[cfg(not(unix))]
            SimAddress::Unix(path) => {
                return Err(SimError::Connection(format!(
                    "Unix sockets are not supported on this platform: {}",
                    path.display()
                )));
            }
        };
        self.stream = Some(stream);
        info!("Connected to simulator at {}", self.address);
        Ok(())
    }

    /// Close the connection if open. Calling it when disconnected is a no-op.
    pub async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await;
            info!("Disconnected from simulator at {}", self.address);
        }
    }

    /// Send one request and await its response body
    ///
    /// Fails with `NotConnected` when no connection is held and with
    /// `Application` when the simulator reports `Success: false`. On a
    /// timeout, framing error or I/O failure the connection is discarded
    /// and must be reopened with [`connect`](Self::connect).
    pub async fn send_request(&mut self, request: &SimRequest) -> Result<serde_json::Value> {
        let command = request.command();
        let data = serialize_request(request)?;
        let io_timeout = self.options.io_timeout;
        let max_len = self.options.max_frame_len;

        let stream = self.stream.as_mut().ok_or(SimError::NotConnected)?;

        let json_preview: String = String::from_utf8_lossy(&data).chars().take(200).collect();
        debug!("[Client→Sim] len={} json={}", data.len(), json_preview);

        let exchange = async {
            stream.write_frame(&data).await?;
            stream.read_frame(max_len).await
        };
        let result = match tokio::time::timeout(io_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(SimError::Timeout(format!(
                "No response to {} within {:?}",
                command, io_timeout
            ))),
        };

        let payload = match result {
            Ok(payload) => payload,
            Err(e) => {
                if e.invalidates_session() {
                    warn!("Discarding connection to {} after {}: {}", self.address, command, e);
                    self.stream = None;
                }
                return Err(e);
            }
        };

        let json_preview: String = String::from_utf8_lossy(&payload).chars().take(200).collect();
        debug!("[Sim→Client] len={} json={}", payload.len(), json_preview);

        deserialize_response(&payload)?.into_result(command)
    }
}

impl fmt::Debug for SimTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimTransport")
            .field("address", &self.address)
            .field("options", &self.options)
            .field("connected", &self.is_connected())
            .finish()
    }
}
