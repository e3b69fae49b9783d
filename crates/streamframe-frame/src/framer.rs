//! Receive-side state machine.
//!
//! A [`ReceiveFramer`] owns the per-connection receive state: an accumulator
//! holding the bytes collected so far for the in-progress prefix or payload,
//! and the current [`Phase`]. Each call to [`ReceiveFramer::feed`] consumes
//! exactly one transport read and emits every frame it completes, in order.
//!
//! ```text
//!            11 prefix bytes collected
//! AwaitingPrefix ───────────────────────► AwaitingPayload { command, length }
//!       ▲                                          │
//!       └──────────── `length` bytes collected ────┘  (frame emitted)
//! ```

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{decode_prefix, Frame, DEFAULT_MAX_PAYLOAD, PREFIX_SIZE};
use crate::error::Result;

/// The framer's stage for the connection's in-progress frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Collecting the 11-byte prefix. The accumulator holds at most 11 bytes.
    AwaitingPrefix,
    /// Prefix decoded; collecting `length` payload bytes for `command`.
    AwaitingPayload { command: i32, length: usize },
}

/// Reassembles frames from chunks of any size.
///
/// After `feed` returns an error the stream position is lost and the framer
/// must not be fed again; the owning connection is expected to close.
#[derive(Debug)]
pub struct ReceiveFramer {
    accumulator: BytesMut,
    phase: Phase,
    max_payload_size: usize,
}

impl ReceiveFramer {
    /// Create a framer with the default payload cap.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    /// Create a framer rejecting payloads above `max_payload_size` bytes.
    pub fn with_max_payload(max_payload_size: usize) -> Self {
        Self {
            accumulator: BytesMut::with_capacity(PREFIX_SIZE),
            phase: Phase::AwaitingPrefix,
            max_payload_size,
        }
    }

    /// Process one transport read.
    ///
    /// Every byte of `chunk` is consumed before returning. `emit` is called
    /// once per completed frame, in wire order; a single chunk may complete
    /// several frames, or none. Returns the number of frames emitted.
    pub fn feed<F>(&mut self, chunk: &[u8], mut emit: F) -> Result<usize>
    where
        F: FnMut(Frame),
    {
        let mut offset = 0usize;
        let mut emitted = 0usize;

        loop {
            match self.phase {
                Phase::AwaitingPrefix => {
                    if offset == chunk.len() {
                        break;
                    }

                    let take = (PREFIX_SIZE - self.accumulator.len()).min(chunk.len() - offset);
                    self.accumulator
                        .extend_from_slice(&chunk[offset..offset + take]);
                    offset += take;

                    if self.accumulator.len() < PREFIX_SIZE {
                        break;
                    }

                    let mut prefix = [0u8; PREFIX_SIZE];
                    prefix.copy_from_slice(&self.accumulator);
                    self.accumulator.clear();

                    let (command, length) = match decode_prefix(&prefix, self.max_payload_size) {
                        Ok(decoded) => decoded,
                        Err(err) => {
                            self.phase = Phase::AwaitingPrefix;
                            return Err(err);
                        }
                    };

                    trace!(command, length, "prefix decoded");
                    // Only reserve what has actually arrived; the rest grows on demand.
                    self.accumulator.reserve(length.min(chunk.len() - offset));
                    self.phase = Phase::AwaitingPayload { command, length };
                }
                Phase::AwaitingPayload { command, length } => {
                    let need = length - self.accumulator.len();
                    let remaining = chunk.len() - offset;

                    if remaining < need {
                        self.accumulator.extend_from_slice(&chunk[offset..]);
                        break;
                    }

                    self.accumulator
                        .extend_from_slice(&chunk[offset..offset + need]);
                    offset += need;

                    let payload = self.accumulator.split().freeze();
                    self.phase = Phase::AwaitingPrefix;
                    emitted += 1;
                    emit(Frame { command, payload });
                }
            }
        }

        Ok(emitted)
    }

    /// Process one transport read and collect the completed frames.
    pub fn feed_collect(&mut self, chunk: &[u8]) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        self.feed(chunk, |frame| frames.push(frame))?;
        Ok(frames)
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Bytes held for the in-progress prefix or payload.
    pub fn buffered(&self) -> usize {
        self.accumulator.len()
    }

    /// True when positioned exactly on a frame boundary.
    pub fn is_idle(&self) -> bool {
        self.phase == Phase::AwaitingPrefix && self.accumulator.is_empty()
    }

    /// Maximum accepted payload size.
    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    /// Update maximum payload size for subsequent prefixes.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.max_payload_size = max_payload_size;
    }

    /// Drop any partial frame and return to the frame boundary.
    pub fn reset(&mut self) {
        self.accumulator.clear();
        self.phase = Phase::AwaitingPrefix;
    }
}

impl Default for ReceiveFramer {
    fn default() -> Self {
        Self::new()
    }
}
