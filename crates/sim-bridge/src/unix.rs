//! Unix socket transport implementation
//!
//! Used when the simulator listens on a local domain socket
//! (e.g. `/tmp/sim-agent.sock`).

use crate::framing;
use crate::transport::FrameStream;
use async_trait::async_trait;
use sim_rl_core::{Result, SimError};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tracing::debug;

/// Unix domain socket stream carrying frames
pub struct UnixFrameStream(pub UnixStream);

/// Connect to the socket at `path` within `connect_timeout`
pub async fn connect(path: &Path, connect_timeout: Duration) -> Result<UnixFrameStream> {
    let stream = tokio::time::timeout(connect_timeout, UnixStream::connect(path))
        .await
        .map_err(|_| SimError::Timeout(format!("Connection timeout to {}", path.display())))?
        .map_err(|e| {
            SimError::Connection(format!("Failed to connect to {}: {}", path.display(), e))
        })?;
    Ok(UnixFrameStream(stream))
}

#[async_trait]
impl FrameStream for UnixFrameStream {
    async fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        framing::write_frame(&mut self.0, payload).await
    }

    async fn read_frame(&mut self, max_len: usize) -> Result<Vec<u8>> {
        framing::read_frame(&mut self.0, max_len).await
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.0.shutdown().await {
            debug!("Unix socket shutdown failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::MAX_FRAME_LEN;
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn test_frame_echo() {
        let path = std::env::temp_dir().join(format!("sim-bridge-echo-{}.sock", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let frame = framing::read_frame(&mut socket, MAX_FRAME_LEN).await.unwrap();
            framing::write_frame(&mut socket, &frame).await.unwrap();
        });

        let mut stream = connect(&path, Duration::from_secs(1)).await.unwrap();
        stream.write_frame(b"ping").await.unwrap();
        assert_eq!(stream.read_frame(MAX_FRAME_LEN).await.unwrap(), b"ping");
        stream.shutdown().await;
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_missing_socket() {
        let path = std::env::temp_dir().join("sim-bridge-no-such-socket.sock");

        let result = connect(&path, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(SimError::Connection(_))));
    }
}
