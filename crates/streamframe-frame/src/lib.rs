//! Prefixed message framing over arbitrarily fragmented byte streams.
//!
//! Every message is framed with an 11-byte prefix:
//! - 3 reserved bytes (written as zero, never interpreted)
//! - a 4-byte little-endian signed command id
//! - a 4-byte little-endian signed payload length
//!
//! [`ReceiveFramer`] turns chunks of any size into complete frames,
//! [`FrameReader`] drives it from a blocking stream, and [`FrameWriter`]
//! flushes whole frames through short writes.

pub mod codec;
pub mod error;
pub mod framer;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

pub use codec::{
    decode_prefix, encode_frame, encode_prefix, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD,
    DEFAULT_READ_BUFFER_SIZE, PREFIX_SIZE,
};
pub use error::{FrameError, Result};
pub use framer::{Phase, ReceiveFramer};
pub use reader::FrameReader;
pub use writer::FrameWriter;

#[cfg(feature = "async")]
pub use async_codec::FrameCodec;
