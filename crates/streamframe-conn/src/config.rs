use std::time::Duration;

use streamframe_frame::FrameConfig;

/// Default name for receive threads.
pub const DEFAULT_READER_THREAD_NAME: &str = "streamframe-reader";

/// Configuration for a framed connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Framing limits and transport timeouts.
    pub frame: FrameConfig,
    /// Name given to the receive thread.
    pub reader_thread_name: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            reader_thread_name: DEFAULT_READER_THREAD_NAME.to_string(),
        }
    }
}

impl ConnectionConfig {
    /// Cap accepted and sent payloads at `max` bytes.
    pub fn with_max_payload_size(mut self, max: usize) -> Self {
        self.frame.max_payload_size = max;
        self
    }

    /// Size of the buffer handed to each transport read.
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.frame.read_buffer_size = size;
        self
    }

    /// Transport read timeout. An expired timeout disconnects the connection.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.frame.read_timeout = timeout;
        self
    }

    /// Transport write timeout. An expired timeout disconnects the connection.
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.frame.write_timeout = timeout;
        self
    }
}
