//! Transport layer for Quarry.
//!
//! Provides the [`Connection`] trait, an abstraction over a bidirectional
//! stream of length-prefixed frames, and [`TcpConnection`], the framed TCP
//! implementation used to talk to game servers.
//!
//! A frame is a varint length followed by that many bytes. Once the peer
//! enables compression, every frame body starts with a second varint (the
//! uncompressed data length, `0` meaning "not compressed").
//!
//! # Feature Flags
//!
//! - `tcp` (default): framed TCP transport via `tokio::net`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "tcp")]
mod tcp;
pub mod varint;

pub use error::TransportError;
#[cfg(feature = "tcp")]
pub use tcp::{MAX_FRAME_LEN, TcpConnection};

use std::fmt;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A single connection that exchanges whole frames.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one frame body to the remote peer.
    async fn send(&self, frame: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next frame body from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
