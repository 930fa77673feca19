//! Wire framing: every message is a 4-byte big-endian length prefix
//! followed by a JSON-encoded [`crate::gossip::message::Envelope`].
//!
//! Framing is deliberately simple (no compression, no multiplexing) since
//! peer connections are one-envelope-at-a-time and messages are small.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Hard cap on a single frame's payload size, to stop a misbehaving or
/// malicious peer from claiming an enormous length prefix and exhausting
/// memory before the real message arrives.
pub const MAX_FRAME_LEN: u32 = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame length {0} exceeds the maximum of {MAX_FRAME_LEN}")]
    TooLarge(u32),
    #[error("invalid JSON envelope: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Reads one length-prefixed frame and deserializes it as `T`.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, FrameError>
where
    R: AsyncRead + Unpin,
    T: serde::de::DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    let value = serde_json::from_slice(&payload)?;
    Ok(value)
}

/// Serializes `value` as JSON and writes it as one length-prefixed frame.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let payload = serde_json::to_vec(value)?;
    if payload.len() as u64 > MAX_FRAME_LEN as u64 {
        return Err(FrameError::TooLarge(payload.len() as u32));
    }
    let len = (payload.len() as u32).to_be_bytes();
    writer.write_all(&len).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Sample {
        a: u32,
        b: String,
    }

    #[tokio::test]
    async fn frame_roundtrips_over_an_in_memory_duplex() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let msg = Sample {
            a: 7,
            b: "hello".to_string(),
        };

        write_frame(&mut client, &msg).await.unwrap();
        let received: Sample = read_frame(&mut server).await.unwrap();
        assert_eq!(received, msg);
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let huge_len = (MAX_FRAME_LEN + 1).to_be_bytes();
        client.write_all(&huge_len).await.unwrap();

        let result: Result<Sample, FrameError> = read_frame(&mut server).await;
        assert!(matches!(result, Err(FrameError::TooLarge(_))));
    }
}
