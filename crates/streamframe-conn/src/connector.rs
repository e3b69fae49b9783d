use std::fmt::Display;
use std::net::ToSocketAddrs;

use streamframe_transport::{ByteStream, TcpEndpoint};

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::error::Result;

/// Connect to a listening endpoint over TCP.
///
/// The returned connection is not receiving yet: subscribe, then call
/// [`Connection::start`].
pub fn connect<A: ToSocketAddrs + Display>(addr: A) -> Result<Connection<ByteStream>> {
    connect_with_config(addr, ConnectionConfig::default())
}

/// Connect with explicit configuration.
pub fn connect_with_config<A: ToSocketAddrs + Display>(
    addr: A,
    config: ConnectionConfig,
) -> Result<Connection<ByteStream>> {
    let stream = TcpEndpoint::connect(addr)?;
    Connection::with_config(stream, config)
}
