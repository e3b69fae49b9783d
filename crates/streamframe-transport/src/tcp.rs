use std::fmt::Display;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::ByteStream;

/// TCP transport endpoint.
///
/// Provides bind/accept on the server side and [`TcpEndpoint::connect`] on
/// the client side. Every stream handed out is already connected and has
/// Nagle's algorithm disabled, since frames are written as whole units.
pub struct TcpEndpoint {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpEndpoint {
    /// Bind and listen on a TCP address such as `127.0.0.1:7000`.
    ///
    /// Port `0` picks an ephemeral port; see [`TcpEndpoint::local_addr`].
    pub fn bind<A: ToSocketAddrs + Display>(addr: A) -> Result<Self> {
        let listener = TcpListener::bind(&addr).map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;
        let local_addr = listener.local_addr().map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;

        info!(%local_addr, "listening on tcp");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<ByteStream> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, "accepted connection");
        let stream = ByteStream::from_tcp(stream);
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// Connect to a listening TCP endpoint (blocking).
    pub fn connect<A: ToSocketAddrs + Display>(addr: A) -> Result<ByteStream> {
        let stream = TcpStream::connect(&addr).map_err(|e| TransportError::Connect {
            addr: addr.to_string(),
            source: e,
        })?;
        debug!(%addr, "connected over tcp");
        let stream = ByteStream::from_tcp(stream);
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// The address this endpoint is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}
