//! Length-prefixed framing over a blocking byte stream.
//!
//! # Frame Format
//!
//! Each frame consists of:
//! - 4 bytes: payload length (big-endian unsigned)
//! - N bytes: payload
//!
//! Writes are a single logical operation: the prefix and payload go out
//! together via `write_all`, which loops internally over partial writes.
//! Reads tolerate short reads from the transport: payloads of 2048 bytes or
//! more are accumulated through a chunked read loop, which is the engine's
//! only backpressure point.

use std::io::{Read, Write};

use crate::error::{ProtocolError, Result};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Chunk size for the streaming read loop.
pub const READ_CHUNK_SIZE: usize = 2048;

/// Maximum accepted payload size (16 MB). A length prefix beyond this is
/// treated as a malformed header rather than an allocation request.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Produces a length-prefixed frame for `payload`.
pub fn write_frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Frames `payload` and writes it to `writer` as one logical send.
pub fn send_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let frame = write_frame(payload)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Reads one frame from `reader` and returns its payload.
///
/// The 4 header bytes are read exactly; a stream that closes inside the
/// header or the payload yields `ConnectionClosed`. Payloads shorter than
/// [`READ_CHUNK_SIZE`] are read in one call; anything larger is accumulated
/// chunk by chunk until the declared length is reached, including lengths
/// that are exact multiples of the chunk size.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut header = [0u8; LENGTH_PREFIX_SIZE];
    reader.read_exact(&mut header).map_err(|e| {
        ProtocolError::ConnectionClosed(format!("stream closed inside length header: {}", e))
    })?;
    let length = u32::from_be_bytes(header) as usize;

    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: length,
            max: MAX_FRAME_SIZE,
        });
    }

    if length < READ_CHUNK_SIZE {
        let mut payload = vec![0u8; length];
        reader.read_exact(&mut payload).map_err(|e| {
            ProtocolError::ConnectionClosed(format!("stream closed inside payload: {}", e))
        })?;
        return Ok(payload);
    }

    let mut payload = Vec::with_capacity(length);
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    while payload.len() < length {
        let want = (length - payload.len()).min(READ_CHUNK_SIZE);
        let got = reader.read(&mut chunk[..want])?;
        if got == 0 {
            return Err(ProtocolError::ConnectionClosed(format!(
                "stream closed after {} of {} payload bytes",
                payload.len(),
                length
            )));
        }
        payload.extend_from_slice(&chunk[..got]);
    }
    Ok(payload)
}
