use std::io::Write;
use std::sync::Mutex;

use streamframe_frame::{FrameWriter, Result};

use crate::notify::lock;

/// Serializes whole-message writes onto one stream.
///
/// The mutex is the send token: whoever holds it owns the stream until its
/// message is completely flushed, including every short-write continuation.
/// The guard is released on every path, error paths included.
pub struct SendSerializer<W> {
    token: Mutex<FrameWriter<W>>,
}

impl<W: Write> SendSerializer<W> {
    /// Wrap the writing half of a connection.
    pub fn new(writer: FrameWriter<W>) -> Self {
        Self {
            token: Mutex::new(writer),
        }
    }

    /// Write `message` in full while holding the token.
    ///
    /// Blocks the calling thread while another message is in flight.
    /// `cancelled` is checked once the token is held; when it reports true
    /// nothing is written and `Ok(None)` is returned. Otherwise returns the
    /// number of write calls the message took.
    pub fn send<F>(&self, message: &[u8], cancelled: F) -> Result<Option<usize>>
    where
        F: FnOnce() -> bool,
    {
        let mut writer = lock(&self.token);
        if cancelled() {
            return Ok(None);
        }
        writer.write_message(message).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::testing::MockTransport;

    #[test]
    fn partial_writes_are_continued_then_token_released() {
        let transport = MockTransport::new();
        transport.plan_writes(&[3, 5]);
        let serializer = SendSerializer::new(FrameWriter::new(transport.clone()));
        let message: Vec<u8> = (0u8..20).collect();

        let writes = serializer.send(&message, || false).unwrap();

        assert_eq!(writes, Some(3));
        assert_eq!(transport.write_calls(), vec![20, 17, 12]);
        assert_eq!(transport.written(), message);

        // The token is free again: the next message goes straight out.
        serializer.send(b"next", || false).unwrap();
        assert_eq!(transport.write_calls(), vec![20, 17, 12, 4]);
    }

    #[test]
    fn concurrent_messages_never_interleave() {
        let transport = MockTransport::new();
        transport.set_max_write(7);
        let serializer = Arc::new(SendSerializer::new(FrameWriter::new(transport.clone())));
        let a = vec![b'a'; 4096];
        let b = vec![b'b'; 4096];

        let handles: Vec<_> = [a.clone(), b.clone()]
            .into_iter()
            .map(|message| {
                let serializer = Arc::clone(&serializer);
                thread::spawn(move || serializer.send(&message, || false).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let written = transport.written();
        let ab = [a.as_slice(), b.as_slice()].concat();
        let ba = [b.as_slice(), a.as_slice()].concat();
        assert!(written == ab || written == ba, "bytes were interleaved");
    }

    #[test]
    fn cancelled_send_writes_nothing() {
        let transport = MockTransport::new();
        let serializer = SendSerializer::new(FrameWriter::new(transport.clone()));

        assert_eq!(serializer.send(b"dropped", || true).unwrap(), None);
        assert!(transport.written().is_empty());
    }

    #[test]
    fn write_error_releases_token() {
        let transport = MockTransport::new();
        transport.fail_next_write(std::io::ErrorKind::BrokenPipe);
        let serializer = SendSerializer::new(FrameWriter::new(transport.clone()));

        assert!(serializer.send(b"first", || false).is_err());
        assert_eq!(serializer.send(b"second", || false).unwrap(), Some(1));
        assert_eq!(transport.written(), b"second");
    }
}
