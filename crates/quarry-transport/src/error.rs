/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The TCP connection could not be established.
    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The connect attempt did not finish in time.
    #[error("connect to {0} timed out")]
    ConnectTimeout(String),

    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// A frame length prefix exceeded the protocol maximum.
    #[error("frame of {0} bytes exceeds maximum")]
    FrameTooLarge(usize),

    /// A frame header could not be parsed.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
}
