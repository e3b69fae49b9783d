//! Tokio flavor of [`Connection`](crate::Connection).
//!
//! Same contract, different plumbing: the receive loop is a task, the send
//! token is a `tokio::sync::Mutex` (waiters acquire it in FIFO order), and
//! closing cancels the receive task instead of shutting a socket down.

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use streamframe_frame::{encode_frame, Frame, FrameError, ReceiveFramer};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::ConnectionConfig;
use crate::error::{ConnError, DisconnectReason, Result};
use crate::notify::{lock, Subscribers};
use crate::stats::{ConnectionStats, Counters};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A framed duplex connection driven by the tokio runtime.
pub struct AsyncConnection {
    shared: Arc<Shared>,
}

struct Shared {
    id: u64,
    peer: String,
    config: ConnectionConfig,
    reader: Mutex<Option<BoxedReader>>,
    writer: tokio::sync::Mutex<Option<BoxedWriter>>,
    receiver: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    cancel: CancellationToken,
    reason: Mutex<Option<String>>,
    subscribers: Subscribers,
    counters: Counters,
}

impl Clone for AsyncConnection {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl AsyncConnection {
    /// Wrap a connected TCP stream.
    pub fn from_tcp(stream: TcpStream, config: ConnectionConfig) -> Self {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "<unknown>".to_string());
        let (reader, writer) = stream.into_split();
        Self::from_parts(Box::new(reader), Box::new(writer), peer, config)
    }

    /// Wrap any duplex async stream.
    pub fn new<S>(stream: S, peer: impl Into<String>, config: ConnectionConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::from_parts(Box::new(reader), Box::new(writer), peer.into(), config)
    }

    fn from_parts(
        reader: BoxedReader,
        writer: BoxedWriter,
        peer: String,
        config: ConnectionConfig,
    ) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        debug!(id, %peer, "async connection opened");
        Self {
            shared: Arc::new(Shared {
                id,
                peer,
                config,
                reader: Mutex::new(Some(reader)),
                writer: tokio::sync::Mutex::new(Some(writer)),
                receiver: Mutex::new(None),
                closed: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                reason: Mutex::new(None),
                subscribers: Subscribers::new(),
                counters: Counters::default(),
            }),
        }
    }

    /// Connection identifier, unique within the process.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Remote address, for diagnostics.
    pub fn peer_addr(&self) -> &str {
        &self.shared.peer
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

    /// Subscribe to complete frames.
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

    /// Spawn the receive task. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        if self.shared.is_closed() {
            return Ok(());
        }
        let reader = lock(&self.shared.reader)
            .take()
            .ok_or(ConnError::AlreadyStarted)?;

        let handle = tokio::spawn(receive_loop(Arc::clone(&self.shared), reader));
        *lock(&self.shared.receiver) = Some(handle);
        Ok(())
    }

    /// Send an already encoded message.
    ///
    /// Resolves once the message is fully flushed. Concurrent sends queue
    /// for the token and go out one at a time, whole.
    ///
    /// Dropping the future while it waits for the token is harmless. Dropping
    /// it once it holds the token may leave a partial frame on the wire, so
    /// the connection is torn down and reported lost with
    /// [`DisconnectReason::SendCancelled`].
    pub async fn send(&self, message: &[u8]) {
        let shared = &self.shared;
        if shared.is_closed() {
            return;
        }

        let mut token = shared.writer.lock().await;
        if shared.is_closed() {
            token.take();
            return;
        }
        InFlight {
            shared,
            token,
            finished: false,
        }
        .write(message)
        .await;
    }

    /// Encode and send one frame.
    pub async fn send_frame(
        &self,
        command: i32,
        payload: &[u8],
    ) -> std::result::Result<(), FrameError> {
        let max = self.shared.config.frame.max_payload_size;
        if payload.len() > max {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max,
            });
        }

        let mut message = BytesMut::new();
        encode_frame(command, payload, &mut message)?;
        self.send(&message).await;
        Ok(())
    }

    /// Send from a new task; the caller does not wait.
    pub fn send_detached(&self, message: impl Into<Bytes>) -> JoinHandle<()> {
        let message = message.into();
        let connection = self.clone();
        tokio::spawn(async move { connection.send(&message).await })
    }

    /// Close the connection. Idempotent and silent.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(id = self.shared.id, "closing async connection");
        self.shared.release();
        self.shared.subscribers.clear();
    }

    /// Wait for the receive task to finish.
    pub async fn join(&self) {
        let handle = lock(&self.shared.receiver).take();
        if let Some(handle) = handle {
            if handle.await.is_err() {
                warn!(id = self.shared.id, "receive task panicked");
            }
        }
    }
}

impl std::fmt::Debug for AsyncConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncConnection")
            .field("id", &self.shared.id)
            .field("peer", &self.shared.peer)
            .field("closed", &self.shared.is_closed())
            .finish()
    }
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn fail(&self, reason: DisconnectReason) {
        if self.closed.swap(true, Ordering::AcqRel) {
            trace!(id = self.id, %reason, "failure after close ignored");
            return;
        }

        warn!(id = self.id, peer = %self.peer, %reason, "connection lost");
        *lock(&self.reason) = Some(reason.to_string());
        self.release();
        self.subscribers.notify_disconnected();
        self.subscribers.clear();
    }

    /// Stop the receive task and drop the write half unless a send holds it;
    /// a send that acquires the token after this sees the closed flag and
    /// drops it instead.
    fn release(&self) {
        self.cancel.cancel();
        lock(&self.reader).take();
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
    }
}

/// The send token while a message is on the wire.
///
/// Dropped before `finished` is set, the send future was cancelled mid-message
/// and the connection goes down.
struct InFlight<'a> {
    shared: &'a Shared,
    token: tokio::sync::MutexGuard<'a, Option<BoxedWriter>>,
    finished: bool,
}

impl InFlight<'_> {
    async fn write(mut self, message: &[u8]) {
        let Some(writer) = self.token.as_mut() else {
            self.finished = true;
            return;
        };
        let result = write_message(writer, message, self.shared.config.frame.write_timeout).await;
        self.finished = true;

        match result {
            Ok(()) => self.shared.counters.record_sent(message.len()),
            Err(err) => {
                self.token.take();
                self.shared
                    .fail(DisconnectReason::WriteFailed(FrameError::Io(err)));
            }
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.token.take();
        self.shared.fail(DisconnectReason::SendCancelled);
    }
}

async fn write_message(
    writer: &mut BoxedWriter,
    message: &[u8],
    timeout: Option<Duration>,
) -> std::io::Result<()> {
    let write = async {
        writer.write_all(message).await?;
        writer.flush().await
    };
    match timeout {
        Some(limit) => tokio::time::timeout(limit, write)
            .await
            .map_err(|_| std::io::Error::from(ErrorKind::TimedOut))?,
        None => write.await,
    }
}

async fn receive_loop(shared: Arc<Shared>, mut reader: BoxedReader) {
    let mut framer = ReceiveFramer::with_max_payload(shared.config.frame.max_payload_size);
    let mut buffer = vec![0u8; shared.config.frame.read_buffer_size.max(1)];
    let read_timeout = shared.config.frame.read_timeout;

    loop {
        let read = tokio::select! {
            _ = shared.cancel.cancelled() => break,
            result = read_chunk(&mut reader, &mut buffer, read_timeout) => result,
        };

        let read = match read {
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

    trace!(id = shared.id, "receive task finished");
}

async fn read_chunk(
    reader: &mut BoxedReader,
    buffer: &mut [u8],
    timeout: Option<Duration>,
) -> std::io::Result<usize> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, reader.read(buffer))
            .await
            .map_err(|_| std::io::Error::from(ErrorKind::TimedOut))?,
        None => reader.read(buffer).await,
    }
}
