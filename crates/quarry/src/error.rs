//! Unified error type for Quarry.

use quarry_mining::MiningError;
use quarry_negotiate::{ConnectError, NegotiationError, StoreError};
use quarry_protocol::ProtocolError;
use quarry_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum QuarryError {
    /// A transport-level error (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, malformed packet).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Negotiation ran out of candidates or lost its state files.
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    /// Logging in at the negotiated version failed.
    #[error("join failed: {0}")]
    Join(#[from] ConnectError),

    /// A mining invariant was violated.
    #[error(transparent)]
    Mining(#[from] MiningError),

    /// The status ping got no usable answer.
    #[error("status ping failed: {0}")]
    Ping(String),

    /// Installing the log subscriber failed.
    #[error("logging setup failed: {0}")]
    Logging(String),
}

impl From<StoreError> for QuarryError {
    fn from(err: StoreError) -> Self {
        Self::Negotiation(NegotiationError::Store(err))
    }
}
