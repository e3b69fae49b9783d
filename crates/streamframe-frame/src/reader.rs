use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use streamframe_transport::Transport;
use tracing::trace;

use crate::codec::{Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::framer::ReceiveFramer;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames.
/// Each read's bytes are fully processed by the framer before the next read
/// is issued, so frames that arrived together are handed out one by one
/// without touching the stream again.
///
/// The reader is also an [`Iterator`] over the lazy, unbounded sequence of
/// frames. Iteration ends cleanly when the peer closes on a frame boundary.
pub struct FrameReader<T> {
    inner: T,
    framer: ReceiveFramer,
    ready: VecDeque<Frame>,
    chunk: Vec<u8>,
    config: FrameConfig,
    finished: bool,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            framer: ReceiveFramer::with_max_payload(config.max_payload_size),
            ready: VecDeque::new(),
            chunk: vec![0u8; config.read_buffer_size.max(1)],
            config,
            finished: false,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached,
    /// whether or not a frame was in progress.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(frame);
            }

            let read = match self.inner.read(&mut self.chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if !self.framer.is_idle() {
                    trace!(
                        buffered = self.framer.buffered(),
                        "stream ended inside a frame"
                    );
                }
                return Err(FrameError::ConnectionClosed);
            }

            let ready = &mut self.ready;
            self.framer
                .feed(&self.chunk[..read], |frame| ready.push_back(frame))?;
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum payload size for subsequent frame decoding.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
        self.framer.set_max_payload_size(max_payload_size);
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl<T: Transport> FrameReader<T> {
    /// Create a frame reader for a transport and apply read timeout from config.
    pub fn with_config_transport(inner: T, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

impl<T: Read> Iterator for FrameReader<T> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_frame() {
            Ok(frame) => Some(Ok(frame)),
            Err(FrameError::ConnectionClosed) if self.framer.is_idle() => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

pub(crate) fn transport_to_frame_error(err: streamframe_transport::TransportError) -> FrameError {
    match err {
        streamframe_transport::TransportError::Io(io)
        | streamframe_transport::TransportError::Accept(io) => FrameError::Io(io),
        streamframe_transport::TransportError::Bind { source, .. }
        | streamframe_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
    }
}
