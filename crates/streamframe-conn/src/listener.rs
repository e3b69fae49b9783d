use std::fmt::Display;
use std::net::{SocketAddr, ToSocketAddrs};

use streamframe_transport::{ByteStream, TcpEndpoint};
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::error::Result;

/// Listens for and accepts framed connections over TCP.
pub struct ConnectionListener {
    endpoint: TcpEndpoint,
    config: ConnectionConfig,
}

impl ConnectionListener {
    /// Bind to a TCP address. Port `0` picks an ephemeral port.
    pub fn bind<A: ToSocketAddrs + Display>(addr: A) -> Result<Self> {
        Ok(Self {
            endpoint: TcpEndpoint::bind(addr)?,
            config: ConnectionConfig::default(),
        })
    }

    /// Configuration applied to every accepted connection.
    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Accept the next connection (blocking).
    ///
    /// The connection is returned unstarted so the caller can subscribe
    /// before any frame is read.
    pub fn accept(&self) -> Result<Connection<ByteStream>> {
        let stream = self.endpoint.accept()?;
        let connection = Connection::with_config(stream, self.config.clone())?;
        debug!(id = connection.id(), peer = connection.peer_addr(), "connection accepted");
        Ok(connection)
    }

    /// Bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }
}

impl Iterator for ConnectionListener {
    type Item = Result<Connection<ByteStream>>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.accept())
    }
}
