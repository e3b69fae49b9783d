use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use streamframe_frame::{encode_frame, Frame, FrameError, FrameWriter, ReceiveFramer};
use streamframe_transport::{ByteStream, Transport};
use tracing::{debug, trace, warn};

use crate::config::ConnectionConfig;
use crate::error::{ConnError, DisconnectReason, Result};
use crate::notify::{lock, Subscribers};
use crate::sender::SendSerializer;
use crate::stats::{ConnectionStats, Counters};

/// Unique connection identifier.
pub type ConnectionId = u64;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A framed duplex connection over one transport.
///
/// - [`Connection::start`] spawns the receive thread, which delivers every
///   complete frame to the message subscriber in wire order.
/// - [`Connection::send`] may be called from any number of threads; each
///   message is flushed completely before the next one starts.
/// - The disconnect subscriber runs at most once, whichever path (receive or
///   send) notices the failure first.
///
/// Handles are cheap to clone and all refer to the same connection.
pub struct Connection<T: Transport = ByteStream> {
    shared: Arc<Shared<T>>,
}

struct Shared<T: Transport> {
    id: ConnectionId,
    peer: String,
    config: ConnectionConfig,
    reader: Mutex<Option<T>>,
    control: Mutex<Option<T>>,
    sender: SendSerializer<T>,
    receiver: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    reason: Mutex<Option<String>>,
    subscribers: Subscribers,
    counters: Counters,
}

impl<T: Transport> Clone for Connection<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Transport> Connection<T> {
    /// Wrap an already connected transport with default configuration.
    pub fn new(transport: T) -> Result<Self> {
        Self::with_config(transport, ConnectionConfig::default())
    }

    /// Wrap an already connected transport.
    ///
    /// Read and write timeouts from `config.frame` are applied to the
    /// transport; nothing is read until [`Connection::start`].
    pub fn with_config(transport: T, config: ConnectionConfig) -> Result<Self> {
        let reader = transport.try_clone()?;
        let control = transport.try_clone()?;
        reader.set_read_timeout(config.frame.read_timeout)?;

        let writer = FrameWriter::with_config_transport(transport, config.frame.clone())?;
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let peer = control.peer_addr();
        debug!(id, %peer, "connection opened");

        Ok(Self {
            shared: Arc::new(Shared {
                id,
                peer,
                config,
                reader: Mutex::new(Some(reader)),
                control: Mutex::new(Some(control)),
                sender: SendSerializer::new(writer),
                receiver: Mutex::new(None),
                closed: AtomicBool::new(false),
                reason: Mutex::new(None),
                subscribers: Subscribers::new(),
                counters: Counters::default(),
            }),
        })
    }

    /// Connection identifier, unique within the process.
    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    /// Remote address, for diagnostics.
    pub fn peer_addr(&self) -> &str {
        &self.shared.peer
    }

    /// Connection configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    /// True once the connection was closed or lost.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Why the connection went down, if it was lost rather than closed.
    pub fn disconnect_reason(&self) -> Option<String> {
        lock(&self.shared.reason).clone()
    }

    /// Traffic counters.
    pub fn stats(&self) -> ConnectionStats {
        self.shared.counters.snapshot()
    }

    /// Subscribe to complete frames. Register before [`Connection::start`];
    /// frames that arrive while nobody is subscribed are dropped.
    pub fn on_message<F>(&self, callback: F)
    where
        F: Fn(Frame) + Send + Sync + 'static,
    {
        self.shared.subscribers.set_message(callback);
    }

    /// Subscribe to the disconnect event.
    pub fn on_disconnected<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.subscribers.set_disconnected(callback);
    }

    /// Begin consuming the transport on a dedicated receive thread.
    ///
    /// A no-op on a closed connection. Fails with
    /// [`ConnError::AlreadyStarted`] when called twice.
    pub fn start(&self) -> Result<()> {
        if self.shared.is_closed() {
            return Ok(());
        }
        let reader = lock(&self.shared.reader)
            .take()
            .ok_or(ConnError::AlreadyStarted)?;

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(self.shared.config.reader_thread_name.clone())
            .spawn(move || receive_loop(shared, reader))
            .map_err(ConnError::Spawn)?;

        *lock(&self.shared.receiver) = Some(handle);
        debug!(id = self.shared.id, "receiving started");
        Ok(())
    }

    /// Send an already encoded message.
    ///
    /// Blocks the calling thread until the message is fully flushed (and,
    /// before that, while another send holds the stream). Failures are not
    /// returned: they close the connection and reach the disconnect
    /// subscriber. On a closed connection this is a no-op.
    pub fn send(&self, message: &[u8]) {
        let shared = &self.shared;
        if shared.is_closed() {
            trace!(id = shared.id, "send on closed connection ignored");
            return;
        }

        match shared.sender.send(message, || shared.is_closed()) {
            Ok(Some(writes)) => {
                shared.counters.record_sent(message.len());
                trace!(id = shared.id, len = message.len(), writes, "message flushed");
            }
            Ok(None) => trace!(id = shared.id, "connection closed while waiting to send"),
            Err(err) => shared.fail(DisconnectReason::WriteFailed(err)),
        }
    }

    /// Encode and send one frame.
    ///
    /// Only encoding problems are returned (a payload over the configured
    /// cap); transport failures behave as in [`Connection::send`].
    pub fn send_frame(&self, command: i32, payload: &[u8]) -> std::result::Result<(), FrameError> {
        let max = self.shared.config.frame.max_payload_size;
        if payload.len() > max {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max,
            });
        }

        let mut message = bytes::BytesMut::new();
        encode_frame(command, payload, &mut message)?;
        self.send(&message);
        Ok(())
    }

    /// Send an already encoded message from a new thread.
    ///
    /// The caller never waits on the network or on other senders.
    /// Messages sent this way leave in token acquisition order, not call order.
    pub fn send_detached(&self, message: impl Into<Bytes>) -> Result<JoinHandle<()>> {
        let message = message.into();
        let connection = self.clone();
        thread::Builder::new()
            .name(format!("streamframe-send-{}", self.shared.id))
            .spawn(move || connection.send(&message))
            .map_err(ConnError::Spawn)
    }

    /// Close the connection. Idempotent.
    ///
    /// Shuts the transport down, which also stops the receive thread. An
    /// explicit close does not notify the disconnect subscriber.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(id = self.shared.id, "closing connection");
        self.shared.shutdown_transport();
        self.shared.subscribers.clear();
    }

    /// Wait for the receive thread to finish.
    ///
    /// Returns immediately when receiving never started, or when called from
    /// the receive thread itself (for example inside a message callback).
    pub fn join(&self) {
        let handle = {
            let mut receiver = lock(&self.shared.receiver);
            let on_receiver = receiver
                .as_ref()
                .is_some_and(|handle| handle.thread().id() == thread::current().id());
            if on_receiver {
                return;
            }
            receiver.take()
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!(id = self.shared.id, "receive thread panicked");
            }
        }
    }
}

impl<T: Transport> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.shared.id)
            .field("peer", &self.shared.peer)
            .field("closed", &self.shared.is_closed())
            .finish()
    }
}

impl<T: Transport> Shared<T> {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close because of a failure and notify the subscriber, exactly once.
    fn fail(&self, reason: DisconnectReason) {
        if self.closed.swap(true, Ordering::AcqRel) {
            trace!(id = self.id, %reason, "failure after close ignored");
            return;
        }

        warn!(id = self.id, peer = %self.peer, %reason, "connection lost");
        *lock(&self.reason) = Some(reason.to_string());
        self.shutdown_transport();
        self.subscribers.notify_disconnected();
        self.subscribers.clear();
    }

    fn shutdown_transport(&self) {
        if let Some(control) = lock(&self.control).take() {
            if let Err(err) = control.shutdown() {
                debug!(id = self.id, error = %err, "transport shutdown failed");
            }
        }
    }
}

/// Receive thread body: one read outstanding at a time, every byte of a read
/// processed before the next read is issued.
fn receive_loop<T: Transport>(shared: Arc<Shared<T>>, mut reader: T) {
    let mut framer = ReceiveFramer::with_max_payload(shared.config.frame.max_payload_size);
    let mut buffer = vec![0u8; shared.config.frame.read_buffer_size.max(1)];

    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => {
                shared.fail(DisconnectReason::PeerClosed);
                break;
            }
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                shared.fail(DisconnectReason::ReadFailed(err));
                break;
            }
        };
        shared.counters.record_read(read);

        let delivered = framer.feed(&buffer[..read], |frame| {
            if shared.is_closed() {
                return;
            }
            shared.counters.record_frame();
            shared.subscribers.notify_message(frame);
        });

        if let Err(err) = delivered {
            shared.fail(DisconnectReason::Protocol(err));
            break;
        }
    }

    trace!(id = shared.id, "receive loop finished");
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    use bytes::BytesMut;
    use streamframe_frame::encode_prefix;

    use super::*;
    use crate::testing::MockTransport;

    fn wire(frames: &[Frame]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for frame in frames {
            encode_frame(frame.command, &frame.payload, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    fn count_disconnects<T: Transport>(connection: &Connection<T>) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        connection.on_disconnected(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    fn collect_frames<T: Transport>(connection: &Connection<T>) -> Arc<Mutex<Vec<Frame>>> {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&frames);
        connection.on_message(move |frame| sink.lock().unwrap().push(frame));
        frames
    }

    #[test]
    fn delivers_frames_in_order_across_fragmented_reads() {
        let transport = MockTransport::new();
        let connection = Connection::new(transport.clone()).unwrap();
        let frames = collect_frames(&connection);
        let disconnects = count_disconnects(&connection);

        let sent = vec![
            Frame::new(1, "alpha"),
            Frame::new(2, ""),
            Frame::new(3, "gamma"),
        ];
        let bytes = wire(&sent);
        for chunk in bytes.chunks(2) {
            transport.push_read(chunk);
        }
        transport.push_eof();

        connection.start().unwrap();
        connection.join();

        assert_eq!(*frames.lock().unwrap(), sent);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(
            connection.disconnect_reason().as_deref(),
            Some("peer closed the stream")
        );
        assert_eq!(connection.stats().frames_received, 3);
        assert_eq!(connection.stats().bytes_received, bytes.len() as u64);
    }

    #[test]
    fn one_read_with_many_frames_notifies_each() {
        let transport = MockTransport::new();
        let config = ConnectionConfig::default().with_read_buffer_size(4096);
        let connection = Connection::with_config(transport.clone(), config).unwrap();
        let frames = collect_frames(&connection);

        let batch: Vec<Frame> = (0..10)
            .map(|i| Frame::new(i, vec![i as u8; i as usize]))
            .collect();
        transport.push_read(&wire(&batch));
        transport.push_eof();

        connection.start().unwrap();
        connection.join();

        let commands: Vec<i32> = frames.lock().unwrap().iter().map(|f| f.command).collect();
        assert_eq!(commands, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn read_error_disconnects_once() {
        let transport = MockTransport::new();
        let connection = Connection::new(transport.clone()).unwrap();
        let disconnects = count_disconnects(&connection);

        transport.push_read_error(ErrorKind::ConnectionReset);
        connection.start().unwrap();
        connection.join();

        assert!(connection.is_closed());
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(transport.shutdown_count(), 1);
    }

    #[test]
    fn read_error_then_write_error_notifies_once() {
        let transport = MockTransport::new();
        let connection = Connection::new(transport.clone()).unwrap();
        let disconnects = count_disconnects(&connection);

        transport.push_read_error(ErrorKind::ConnectionReset);
        connection.start().unwrap();
        connection.join();

        transport.fail_next_write(ErrorKind::BrokenPipe);
        connection.send(b"late");

        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn write_error_then_read_error_notifies_once() {
        let transport = MockTransport::new();
        let connection = Connection::new(transport.clone()).unwrap();
        let disconnects = count_disconnects(&connection);
        connection.start().unwrap();

        transport.fail_next_write(ErrorKind::BrokenPipe);
        connection.send(b"doomed");
        transport.push_read_error(ErrorKind::ConnectionReset);
        connection.join();

        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert!(connection
            .disconnect_reason()
            .unwrap()
            .starts_with("write failed"));
    }

    #[test]
    fn expired_write_timeout_disconnects_once() {
        let transport = MockTransport::new();
        let connection = Connection::new(transport.clone()).unwrap();
        let disconnects = count_disconnects(&connection);

        transport.fail_next_write(ErrorKind::WouldBlock);
        connection.send(b"stalled");
        connection.send(b"after");

        assert!(connection.is_closed());
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(transport.write_calls(), vec![7]);
        assert!(connection
            .disconnect_reason()
            .unwrap()
            .starts_with("write failed"));
    }

    #[test]
    fn protocol_violation_disconnects() {
        let transport = MockTransport::new();
        let config = ConnectionConfig::default().with_max_payload_size(8);
        let connection = Connection::with_config(transport.clone(), config).unwrap();
        let frames = collect_frames(&connection);
        let disconnects = count_disconnects(&connection);

        let mut bytes = wire(&[Frame::new(1, "fine")]);
        bytes.extend_from_slice(&encode_prefix(2, 9).unwrap());
        transport.push_read(&bytes);

        connection.start().unwrap();
        connection.join();

        assert_eq!(frames.lock().unwrap().len(), 1);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert!(connection
            .disconnect_reason()
            .unwrap()
            .starts_with("protocol violation"));
    }

    #[test]
    fn negative_length_disconnects() {
        let transport = MockTransport::new();
        let connection = Connection::new(transport.clone()).unwrap();
        let disconnects = count_disconnects(&connection);

        let mut prefix = encode_prefix(1, 0).unwrap();
        prefix[7..11].copy_from_slice(&(-1i32).to_le_bytes());
        transport.push_read(&prefix);

        connection.start().unwrap();
        connection.join();

        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn send_frame_writes_prefix_and_payload() {
        let transport = MockTransport::new();
        let connection = Connection::new(transport.clone()).unwrap();

        connection.send_frame(10, b"alarm").unwrap();

        let frames = ReceiveFramer::new().feed_collect(&transport.written()).unwrap();
        assert_eq!(frames, vec![Frame::new(10, b"alarm".to_vec())]);
        assert_eq!(connection.stats().messages_sent, 1);
    }

    #[test]
    fn send_frame_rejects_oversized_payload() {
        let transport = MockTransport::new();
        let config = ConnectionConfig::default().with_max_payload_size(2);
        let connection = Connection::with_config(transport.clone(), config).unwrap();

        let err = connection.send_frame(1, b"abc").unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 3, max: 2 }));
        assert!(transport.written().is_empty());
        assert!(!connection.is_closed());
    }

    #[test]
    fn partial_writes_complete_before_next_message() {
        let transport = MockTransport::new();
        transport.plan_writes(&[3, 5]);
        let connection = Connection::new(transport.clone()).unwrap();
        let message: Vec<u8> = (100u8..120).collect();

        connection.send(&message);
        connection.send(b"tail");

        assert_eq!(transport.write_calls(), vec![20, 17, 12, 4]);
        let mut expected = message.clone();
        expected.extend_from_slice(b"tail");
        assert_eq!(transport.written(), expected);
    }

    #[test]
    fn concurrent_sends_are_not_interleaved() {
        let transport = MockTransport::new();
        transport.set_max_write(5);
        let connection = Connection::new(transport.clone()).unwrap();
        let a = wire(&[Frame::new(1, vec![b'a'; 2000])]);
        let b = wire(&[Frame::new(2, vec![b'b'; 2000])]);

        let first = connection.send_detached(a.clone()).unwrap();
        let second = connection.send_detached(b.clone()).unwrap();
        first.join().unwrap();
        second.join().unwrap();

        let written = transport.written();
        let ab = [a.as_slice(), b.as_slice()].concat();
        let ba = [b.as_slice(), a.as_slice()].concat();
        assert!(written == ab || written == ba, "bytes were interleaved");
        assert_eq!(connection.stats().messages_sent, 2);
    }

    #[test]
    fn close_is_idempotent_and_silent() {
        let transport = MockTransport::new();
        let connection = Connection::new(transport.clone()).unwrap();
        let disconnects = count_disconnects(&connection);
        connection.start().unwrap();

        connection.close();
        connection.close();
        connection.join();

        assert!(connection.is_closed());
        assert_eq!(transport.shutdown_count(), 1);
        assert_eq!(disconnects.load(Ordering::SeqCst), 0);
        assert!(connection.disconnect_reason().is_none());
    }

    #[test]
    fn operations_after_close_are_no_ops() {
        let transport = MockTransport::new();
        let connection = Connection::new(transport.clone()).unwrap();
        connection.close();

        connection.send(b"ignored");
        connection.send_frame(1, b"ignored").unwrap();
        connection.start().unwrap();

        assert!(transport.write_calls().is_empty());
    }

    #[test]
    fn start_twice_is_rejected() {
        let transport = MockTransport::new();
        let connection = Connection::new(transport.clone()).unwrap();
        connection.start().unwrap();

        assert!(matches!(connection.start(), Err(ConnError::AlreadyStarted)));

        connection.close();
        connection.join();
    }

    #[test]
    fn handler_can_reply_on_same_connection() {
        let transport = MockTransport::new();
        let connection = Connection::new(transport.clone()).unwrap();
        let (done_tx, done_rx) = mpsc::channel();

        let replier = connection.clone();
        connection.on_message(move |frame| {
            replier.send_frame(frame.command + 1, &frame.payload).unwrap();
            let _ = done_tx.send(());
        });

        transport.push_read(&wire(&[Frame::new(41, "ping")]));
        connection.start().unwrap();
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let replies = ReceiveFramer::new().feed_collect(&transport.written()).unwrap();
        assert_eq!(replies, vec![Frame::new(42, b"ping".to_vec())]);

        connection.close();
        connection.join();
    }
}
