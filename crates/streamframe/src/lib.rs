//! Prefix-framed duplex messaging over byte streams.
//!
//! Every message travels as an 11-byte prefix (3 reserved bytes, an `i32`
//! command and an `i32` payload length, both little-endian) followed by the
//! payload. Reads are reassembled into whole frames regardless of how the
//! stream fragments them, and concurrent sends never interleave on the wire.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte-stream abstraction and TCP endpoints
//! - [`frame`]: prefix codec, receive state machine, blocking reader/writer
//! - [`conn`]: duplex connections with subscriber callbacks (behind `conn` feature)

/// Re-export transport types.
pub mod transport {
    pub use streamframe_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use streamframe_frame::*;
}

/// Re-export connection types (requires `conn` feature).
#[cfg(feature = "conn")]
pub mod conn {
    pub use streamframe_conn::*;
}
