use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// A connected duplex byte stream.
///
/// The framing layers run one reader and one writer on separate threads, so
/// a transport must be able to hand out additional handles to the same
/// connection ([`Transport::try_clone`]) and to shut the connection down from
/// any of them ([`Transport::shutdown`]). A shutdown must wake a reader
/// blocked on another handle, which then observes end-of-stream.
pub trait Transport: Read + Write + Send + 'static {
    /// Open another handle to the same underlying connection.
    fn try_clone(&self) -> Result<Self>
    where
        Self: Sized;

    /// Shut down both directions of the connection.
    ///
    /// Shutting down an already shut down transport is not an error.
    fn shutdown(&self) -> Result<()>;

    /// Remote address, for diagnostics only.
    fn peer_addr(&self) -> String;

    /// Set read timeout on the underlying stream.
    fn set_read_timeout(&self, _timeout: Option<Duration>) -> Result<()> {
        Ok(())
    }

    /// Set write timeout on the underlying stream.
    fn set_write_timeout(&self, _timeout: Option<Duration>) -> Result<()> {
        Ok(())
    }
}

/// A connected stream socket, TCP or Unix.
pub struct ByteStream {
    inner: ByteStreamInner,
}

enum ByteStreamInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl ByteStream {
    /// Wrap an already connected (or accepted) TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: ByteStreamInner::Tcp(stream),
        }
    }

    /// Wrap an already connected Unix stream socket.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: ByteStreamInner::Unix(stream),
        }
    }

    /// Create a connected pair of in-process streams.
    #[cfg(unix)]
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = std::os::unix::net::UnixStream::pair()?;
        Ok((Self::from_unix(left), Self::from_unix(right)))
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            ByteStreamInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            ByteStreamInner::Unix(_) => "unix-stream",
        }
    }

    /// Disable Nagle's algorithm on TCP streams. No-op for Unix sockets.
    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        match &self.inner {
            ByteStreamInner::Tcp(stream) => stream.set_nodelay(nodelay).map_err(Into::into),
            #[cfg(unix)]
            ByteStreamInner::Unix(_) => Ok(()),
        }
    }
}

impl From<TcpStream> for ByteStream {
    fn from(stream: TcpStream) -> Self {
        Self::from_tcp(stream)
    }
}

#[cfg(unix)]
impl From<std::os::unix::net::UnixStream> for ByteStream {
    fn from(stream: std::os::unix::net::UnixStream) -> Self {
        Self::from_unix(stream)
    }
}

impl Read for ByteStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            ByteStreamInner::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            ByteStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for ByteStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            ByteStreamInner::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            ByteStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            ByteStreamInner::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            ByteStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl Transport for ByteStream {
    fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            ByteStreamInner::Tcp(stream) => ByteStreamInner::Tcp(stream.try_clone()?),
            #[cfg(unix)]
            ByteStreamInner::Unix(stream) => ByteStreamInner::Unix(stream.try_clone()?),
        };
        Ok(Self { inner })
    }

    fn shutdown(&self) -> Result<()> {
        let result = match &self.inner {
            ByteStreamInner::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            ByteStreamInner::Unix(stream) => stream.shutdown(Shutdown::Both),
        };
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn peer_addr(&self) -> String {
        match &self.inner {
            ByteStreamInner::Tcp(stream) => stream
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "<unknown>".to_string()),
            #[cfg(unix)]
            ByteStreamInner::Unix(stream) => stream
                .peer_addr()
                .ok()
                .and_then(|addr| addr.as_pathname().map(|p| p.display().to_string()))
                .unwrap_or_else(|| "<unnamed>".to_string()),
        }
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            ByteStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            ByteStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            ByteStreamInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            ByteStreamInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
        }
    }
}

impl std::fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteStream")
            .field("type", &self.transport_name())
            .field("peer", &self.peer_addr())
            .finish()
    }
}
