use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use streamframe_transport::Transport;
use tracing::trace;

use crate::codec::{encode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete frames to any `Write` stream.
///
/// A write that the stream only partially accepts is continued from the new
/// offset until the whole message is out; a message is never left half
/// written on success.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send(frame.command, frame.payload.as_ref())
    }

    /// Encode and send a payload under a command id.
    pub fn send(&mut self, command: i32, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }

        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        let result = encode_frame(command, payload, &mut buf)
            .and_then(|()| self.write_message(&buf).map(|_| ()));
        self.buf = buf;
        result
    }

    /// Write an already encoded message in full, then flush.
    ///
    /// Only `Interrupted` is retried. An expired socket write timeout shows up
    /// as `WouldBlock` or `TimedOut` and is returned as [`FrameError::Io`].
    /// Returns the number of write calls it took.
    pub fn write_message(&mut self, message: &[u8]) -> Result<usize> {
        let mut offset = 0usize;
        let mut writes = 0usize;
        while offset < message.len() {
            match self.inner.write(&message[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => {
                    writes += 1;
                    offset += n;
                    if offset < message.len() {
                        trace!(written = offset, total = message.len(), "partial write");
                    }
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()?;
        Ok(writes)
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
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

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum payload size for subsequent frame encoding.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl<T: Transport> FrameWriter<T> {
    /// Create a frame writer for a transport and apply write timeout from config.
    pub fn with_config_transport(inner: T, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}
