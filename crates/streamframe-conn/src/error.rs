use streamframe_frame::FrameError;

/// Errors returned by connection setup and control operations.
///
/// Failures on an established stream are never returned from `send`; they
/// surface once, through the disconnect notification.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] streamframe_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// `start` was called on a connection that is already receiving.
    #[error("connection already started")]
    AlreadyStarted,

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConnError>;

/// Why a connection went down.
#[derive(Debug, thiserror::Error)]
pub enum DisconnectReason {
    /// A read returned zero bytes.
    #[error("peer closed the stream")]
    PeerClosed,

    /// A read failed.
    #[error("read failed: {0}")]
    ReadFailed(#[source] std::io::Error),

    /// A write failed or the stream stopped accepting bytes.
    #[error("write failed: {0}")]
    WriteFailed(#[source] FrameError),

    /// An async send was dropped after part of its message was written.
    #[error("send cancelled mid-message")]
    SendCancelled,

    /// The peer sent a prefix that cannot be trusted.
    #[error("protocol violation: {0}")]
    Protocol(#[source] FrameError),
}
