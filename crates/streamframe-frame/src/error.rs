/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The prefix declares a negative payload length.
    #[error("negative payload length ({0})")]
    NegativeLength(i32),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// True for errors caused by a peer sending an untrustworthy prefix.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            FrameError::NegativeLength(_) | FrameError::PayloadTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
