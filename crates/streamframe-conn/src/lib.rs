//! Duplex framed connections.
//!
//! A [`Connection`] owns one connected transport and runs the two halves of
//! the framing engine over it:
//! - receive: a dedicated thread reads chunks, feeds them through a
//!   [`ReceiveFramer`](streamframe_frame::ReceiveFramer), and hands every
//!   complete frame to the message subscriber in wire order
//! - send: callers on any thread take turns holding the send token, so each
//!   message reaches the wire whole, even across short writes
//!
//! Losing the stream (EOF, an I/O error, or a prefix that cannot be trusted)
//! closes the connection and fires the disconnect subscriber exactly once.
//! An explicit [`Connection::close`] is silent.
//!
//! With the `async` feature, [`AsyncConnection`] offers the same contract on
//! the tokio runtime.

pub mod config;
pub mod connection;
pub mod connector;
pub mod error;
pub mod listener;
pub mod notify;
pub mod sender;
pub mod stats;

#[cfg(feature = "async")]
pub mod async_conn;

#[cfg(test)]
mod testing;

pub use config::{ConnectionConfig, DEFAULT_READER_THREAD_NAME};
pub use connection::{Connection, ConnectionId};
pub use connector::{connect, connect_with_config};
pub use error::{ConnError, DisconnectReason, Result};
pub use listener::ConnectionListener;
pub use notify::Subscribers;
pub use sender::SendSerializer;
pub use stats::ConnectionStats;

#[cfg(feature = "async")]
pub use async_conn::AsyncConnection;
