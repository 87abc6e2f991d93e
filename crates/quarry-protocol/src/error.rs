//! Error types for the protocol layer.
//!
//! Each crate in Quarry defines its own error enum. A `ProtocolError`
//! always means the bytes were readable from the socket but did not form
//! the packet we expected.

/// Errors that can occur while encoding or decoding packets.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The packet ended before a field could be read.
    #[error("packet truncated: needed {needed} bytes, {remaining} left")]
    Truncated { needed: usize, remaining: usize },

    /// A varint ran past five bytes.
    #[error("varint too long")]
    VarIntTooLong,

    /// A length prefix was negative or larger than the protocol allows.
    #[error("invalid length {len} (max {max})")]
    InvalidLength { len: i64, max: usize },

    /// A string field was not valid UTF-8.
    #[error("invalid utf-8 in string field")]
    InvalidString(#[from] std::string::FromUtf8Error),

    /// An NBT payload used an unknown tag type or nested too deeply.
    #[error("invalid nbt: {0}")]
    InvalidNbt(String),

    /// A JSON payload (status response, text component) failed to parse.
    ///
    /// The inner `serde_json::Error` is kept so callers can see which
    /// field broke.
    #[error("json decode failed: {0}")]
    Json(#[from] serde_json::Error),

    /// The packet was well-formed but violates protocol rules.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
