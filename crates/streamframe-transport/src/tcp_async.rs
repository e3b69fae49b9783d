use std::fmt::Display;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Async TCP endpoint backed by tokio.
pub struct AsyncTcpEndpoint {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl AsyncTcpEndpoint {
    /// Bind and listen on a TCP address.
    pub async fn bind<A: ToSocketAddrs + Display>(addr: A) -> Result<Self> {
        let label = addr.to_string();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::Bind {
                addr: label.clone(),
                source: e,
            })?;
        let local_addr = listener.local_addr().map_err(|e| TransportError::Bind {
            addr: label,
            source: e,
        })?;

        info!(%local_addr, "listening on tcp (async)");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept the next incoming connection.
    pub async fn accept(&self) -> Result<TcpStream> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;
        debug!(%peer, "accepted connection (async)");
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// Connect to a listening TCP endpoint.
    pub async fn connect<A: ToSocketAddrs + Display>(addr: A) -> Result<TcpStream> {
        let label = addr.to_string();
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::Connect {
                addr: label.clone(),
                source: e,
            })?;
        debug!(addr = %label, "connected over tcp (async)");
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// The address this endpoint is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
