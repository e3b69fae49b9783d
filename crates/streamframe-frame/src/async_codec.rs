use std::collections::VecDeque;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{encode_frame, Frame, DEFAULT_MAX_PAYLOAD};
use crate::error::{FrameError, Result};
use crate::framer::ReceiveFramer;

/// `tokio_util::codec` adapter over [`ReceiveFramer`].
///
/// Use with `FramedRead`/`FramedWrite`/`Framed` to get a `Stream` of frames
/// and a `Sink` accepting them. Every byte handed to `decode` goes through the
/// framer immediately; frames it completes are queued and returned one per
/// call.
#[derive(Debug)]
pub struct FrameCodec {
    framer: ReceiveFramer,
    ready: VecDeque<Frame>,
    max_payload_size: usize,
}

impl FrameCodec {
    /// Create a codec with the default payload cap.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    /// Create a codec with an explicit payload cap (both directions).
    pub fn with_max_payload(max_payload_size: usize) -> Self {
        Self {
            framer: ReceiveFramer::with_max_payload(max_payload_size),
            ready: VecDeque::new(),
            max_payload_size,
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if !src.is_empty() {
            let chunk = src.split();
            let ready = &mut self.ready;
            self.framer.feed(&chunk, |frame| ready.push_back(frame))?;
        }
        Ok(self.ready.pop_front())
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if self.framer.is_idle() {
            Ok(None)
        } else {
            Err(FrameError::ConnectionClosed)
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        if frame.payload.len() > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: frame.payload.len(),
                max: self.max_payload_size,
            });
        }
        encode_frame(frame.command, &frame.payload, dst)
    }
}
