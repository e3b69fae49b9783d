use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame prefix: reserved (3) + command (4) + length (4) = 11 bytes.
pub const PREFIX_SIZE: usize = 11;

/// Number of leading prefix bytes that carry no meaning.
pub const RESERVED_SIZE: usize = 3;

const COMMAND_OFFSET: usize = 3;
const LENGTH_OFFSET: usize = 7;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Default size of the buffer handed to each transport read.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// One complete application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Command id. Its meaning belongs to the application.
    pub command: i32,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(command: i32, payload: impl Into<Bytes>) -> Self {
        Self {
            command,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (prefix + payload).
    pub fn wire_size(&self) -> usize {
        PREFIX_SIZE + self.payload.len()
    }

    /// Encode this frame into a standalone wire buffer.
    pub fn to_wire(&self) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        encode_frame(self.command, &self.payload, &mut dst)?;
        Ok(dst.freeze())
    }
}

/// Encode the 11-byte prefix for a payload of `payload_len` bytes.
///
/// Prefix layout:
/// ```text
/// ┌────────────────┬──────────────┬──────────────────┐
/// │ Reserved (3B)  │ Command      │ Payload length   │
/// │ 0x00 0x00 0x00 │ (4B LE, i32) │ (4B LE, i32)     │
/// └────────────────┴──────────────┴──────────────────┘
/// ```
pub fn encode_prefix(command: i32, payload_len: usize) -> Result<[u8; PREFIX_SIZE]> {
    let len = i32::try_from(payload_len).map_err(|_| FrameError::PayloadTooLarge {
        size: payload_len,
        max: i32::MAX as usize,
    })?;

    let mut prefix = [0u8; PREFIX_SIZE];
    prefix[COMMAND_OFFSET..LENGTH_OFFSET].copy_from_slice(&command.to_le_bytes());
    prefix[LENGTH_OFFSET..PREFIX_SIZE].copy_from_slice(&len.to_le_bytes());
    Ok(prefix)
}

/// Encode a whole frame (prefix + payload) into `dst`.
pub fn encode_frame(command: i32, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let prefix = encode_prefix(command, payload.len())?;
    dst.reserve(PREFIX_SIZE + payload.len());
    dst.put_slice(&prefix);
    dst.put_slice(payload);
    Ok(())
}

/// Decode `(command, payload_length)` from a complete prefix.
///
/// A negative length, or one above `max_payload`, is a protocol violation:
/// nothing after such a prefix can be trusted.
pub fn decode_prefix(prefix: &[u8; PREFIX_SIZE], max_payload: usize) -> Result<(i32, usize)> {
    let mut command = [0u8; 4];
    command.copy_from_slice(&prefix[COMMAND_OFFSET..LENGTH_OFFSET]);
    let mut length = [0u8; 4];
    length.copy_from_slice(&prefix[LENGTH_OFFSET..PREFIX_SIZE]);

    let command = i32::from_le_bytes(command);
    let length = i32::from_le_bytes(length);

    let length = usize::try_from(length).map_err(|_| FrameError::NegativeLength(length))?;
    if length > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: length,
            max: max_payload,
        });
    }

    Ok((command, length))
}

/// Configuration for framing over a stream.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes, enforced on decode and encode. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Size of the buffer passed to each transport read. Default: 1 KiB.
    pub read_buffer_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
