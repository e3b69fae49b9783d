use std::fmt;
use std::io;

use streamframe_conn::ConnError;
use streamframe_frame::FrameError;
use streamframe_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::AddrInUse => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } | FrameError::NegativeLength(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn conn_error(context: &str, err: ConnError) -> CliError {
    match err {
        ConnError::Transport(err) => transport_error(context, err),
        ConnError::Frame(err) => frame_error(context, err),
        ConnError::Spawn(source) => io_error(context, source),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refused_connect_maps_to_transport_code() {
        let err = TransportError::Connect {
            addr: "127.0.0.1:1".to_string(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(conn_error("connect failed", err.into()).code, TRANSPORT_ERROR);
    }

    #[test]
    fn oversized_payload_is_data_invalid() {
        let err = FrameError::PayloadTooLarge { size: 9, max: 4 };
        let cli = frame_error("send failed", err);
        assert_eq!(cli.code, DATA_INVALID);
        assert!(cli.message.starts_with("send failed: "));
    }

    #[test]
    fn timeouts_map_to_timeout_code() {
        let err = FrameError::Io(io::Error::from(io::ErrorKind::TimedOut));
        assert_eq!(frame_error("receive failed", err).code, TIMEOUT);
    }

    #[test]
    fn already_started_is_internal() {
        assert_eq!(conn_error("start", ConnError::AlreadyStarted).code, INTERNAL);
    }
}
