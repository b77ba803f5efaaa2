//! Length-prefixed frame codec
//!
//! Every message on the wire is a 4-byte little-endian `u32` length followed
//! by exactly that many payload bytes:
//!
//! ```text
//! +----------------+------------------+
//! | Length (4B LE) | Payload          |
//! +----------------+------------------+
//! ```

use sim_rl_core::{Result, SimError};
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default upper bound on a frame payload (64MB)
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Size of the length prefix
pub const HEADER_LEN: usize = 4;

/// Prepend the little-endian length prefix to a payload
pub fn encode(payload: &[u8]) -> Result<Vec<u8>> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        SimError::Framing(format!(
            "Payload of {} bytes does not fit a u32 length prefix",
            payload.len()
        ))
    })?;
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Read one complete frame payload
///
/// Partial reads are accumulated until the whole frame has arrived. The
/// declared length is checked against `max_len` before anything is allocated.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut len_bytes = [0u8; HEADER_LEN];
    reader
        .read_exact(&mut len_bytes)
        .await
        .map_err(|e| read_error("frame header", e))?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > max_len {
        return Err(SimError::Framing(format!(
            "Frame length {} exceeds maximum {}",
            len, max_len
        )));
    }

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| read_error("frame payload", e))?;
    Ok(payload)
}

/// Write one frame and flush it
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let frame = encode(payload)?;
    writer
        .write_all(&frame)
        .await
        .map_err(|e| SimError::Connection(format!("Write failed: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| SimError::Connection(format!("Flush failed: {}", e)))?;
    Ok(())
}

fn read_error(part: &str, err: std::io::Error) -> SimError {
    match err.kind() {
        ErrorKind::UnexpectedEof => {
            SimError::Framing(format!("Stream closed while reading {}", part))
        }
        ErrorKind::TimedOut | ErrorKind::WouldBlock => {
            SimError::Timeout(format!("Reading {}: {}", part, err))
        }
        _ => SimError::Connection(format!("Reading {} failed: {}", part, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn test_length_prefix_is_little_endian() {
        let frame = encode(b"hello").unwrap();

        assert_eq!(&frame[..4], &[5, 0, 0, 0]);
        assert_eq!(&frame[4..], b"hello");
    }

    #[tokio::test]
    async fn test_roundtrip_payload_sizes() {
        for len in [0usize, 1, 3, 4, 255, 256, 70_000] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let mut buf = Vec::new();
            write_frame(&mut buf, &payload).await.unwrap();

            let mut reader = buf.as_slice();
            let decoded = read_frame(&mut reader, MAX_FRAME_LEN).await.unwrap();
            assert_eq!(decoded, payload, "len {len}");
            assert!(reader.is_empty());
        }
    }

    #[tokio::test]
    async fn test_partial_reads_are_accumulated() {
        let payload = br#"{"Success":true,"Body":{"dps":1000}}"#;
        let frame = encode(payload).unwrap();

        // Deliver the frame one byte at a time, splitting the header too
        let mut builder = Builder::new();
        for byte in &frame {
            builder.read(std::slice::from_ref(byte));
        }
        let mut mock = builder.build();

        let decoded = read_frame(&mut mock, MAX_FRAME_LEN).await.unwrap();
        assert_eq!(decoded, payload);
    }

    #[tokio::test]
    async fn test_uneven_chunks() {
        let payload = vec![7u8; 1000];
        let frame = encode(&payload).unwrap();

        let mut mock = Builder::new()
            .read(&frame[..2])
            .read(&frame[2..7])
            .read(&frame[7..500])
            .read(&frame[500..])
            .build();

        assert_eq!(read_frame(&mut mock, MAX_FRAME_LEN).await.unwrap(), payload);
    }

    #[tokio::test]
    async fn test_sequential_frames() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"first").await.unwrap();
        write_frame(&mut buf, b"").await.unwrap();
        write_frame(&mut buf, b"third").await.unwrap();

        let mut reader = buf.as_slice();
        assert_eq!(read_frame(&mut reader, 16).await.unwrap(), b"first");
        assert_eq!(read_frame(&mut reader, 16).await.unwrap(), b"");
        assert_eq!(read_frame(&mut reader, 16).await.unwrap(), b"third");
    }

    #[tokio::test]
    async fn test_oversized_length_rejected() {
        // Header claims 4GB; only the header is available to read
        let header = u32::MAX.to_le_bytes();
        let mut reader = &header[..];

        let err = read_frame(&mut reader, MAX_FRAME_LEN).await.unwrap_err();
        assert!(matches!(err, SimError::Framing(_)), "{err}");
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[tokio::test]
    async fn test_eof_mid_payload() {
        let frame = encode(b"truncated payload").unwrap();
        let mut reader = &frame[..10];

        let err = read_frame(&mut reader, MAX_FRAME_LEN).await.unwrap_err();
        assert!(matches!(err, SimError::Framing(_)), "{err}");
    }

    #[tokio::test]
    async fn test_eof_mid_header() {
        let mut reader: &[u8] = &[1, 0];

        let err = read_frame(&mut reader, MAX_FRAME_LEN).await.unwrap_err();
        assert!(matches!(err, SimError::Framing(_)), "{err}");
    }
}
