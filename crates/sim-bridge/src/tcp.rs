//! TCP transport implementation
//!
//! Used when the simulator listens on a loopback port.

use crate::framing;
use crate::transport::FrameStream;
use async_trait::async_trait;
use sim_rl_core::{Result, SimError};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

/// TCP stream carrying frames
pub struct TcpFrameStream(pub TcpStream);

/// Connect to `addr` within `connect_timeout`
pub async fn connect(addr: &str, connect_timeout: Duration) -> Result<TcpFrameStream> {
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| SimError::Timeout(format!("Connection timeout to {}", addr)))?
        .map_err(|e| SimError::Connection(format!("Failed to connect to {}: {}", addr, e)))?;

    // Disable Nagle's algorithm, every exchange is a small request/response
    stream
        .set_nodelay(true)
        .map_err(|e| SimError::Connection(format!("Failed to set TCP_NODELAY: {}", e)))?;

    Ok(TcpFrameStream(stream))
}

#[async_trait]
impl FrameStream for TcpFrameStream {
    async fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        framing::write_frame(&mut self.0, payload).await
    }

    async fn read_frame(&mut self, max_len: usize) -> Result<Vec<u8>> {
        framing::read_frame(&mut self.0, max_len).await
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.0.shutdown().await {
            debug!("TCP shutdown failed: {}", e);
        }
    }
}
