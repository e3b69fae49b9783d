//! Duplex byte-stream transport abstraction.
//!
//! The framing layers above only need a connected stream they can read from,
//! write to, close and describe. This crate provides:
//! - the [`Transport`] trait those layers are generic over
//! - [`ByteStream`], a concrete stream over TCP or Unix stream sockets
//! - [`TcpEndpoint`], bind/accept/connect helpers for TCP
//!
//! Connection setup ends here: everything returned is already connected.

pub mod error;
pub mod tcp;
pub mod traits;

#[cfg(feature = "async")]
pub mod tcp_async;

pub use error::{Result, TransportError};
pub use tcp::TcpEndpoint;
pub use traits::{ByteStream, Transport};

#[cfg(feature = "async")]
pub use tcp_async::AsyncTcpEndpoint;
