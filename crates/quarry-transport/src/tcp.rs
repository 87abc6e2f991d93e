//! Framed TCP transport built on `tokio::net`.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

use crate::varint::{MAX_VARINT_LEN, VarIntRead, read_varint, write_varint};
use crate::{Connection, ConnectionId, TransportError};

/// Largest frame a three-byte length prefix can describe.
pub const MAX_FRAME_LEN: usize = 2_097_151;

const COMPRESSION_DISABLED: i32 = -1;

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A framed TCP connection to a game server.
///
/// Read and write halves sit behind separate locks so a task blocked in
/// [`recv`](Connection::recv) never delays a concurrent
/// [`send`](Connection::send).
///
/// Compressed inbound frames cannot be inflated and are skipped. Outbound
/// frames always use the uncompressed form, which servers accept for
/// packets below their threshold.
pub struct TcpConnection {
    id: ConnectionId,
    peer: SocketAddr,
    reader: Mutex<BufReader<OwnedReadHalf>>,
    writer: Mutex<OwnedWriteHalf>,
    compression: AtomicI32,
}

impl TcpConnection {
    /// Opens a connection to `addr`, giving up after `timeout`.
    pub async fn connect(
        addr: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let stream =
            match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(source)) => {
                    return Err(TransportError::ConnectFailed {
                        addr: addr.to_string(),
                        source,
                    });
                }
                Err(_) => {
                    return Err(TransportError::ConnectTimeout(addr.to_string()));
                }
            };
        Self::from_stream(stream)
    }

    /// Wraps an already connected stream.
    pub fn from_stream(stream: TcpStream) -> Result<Self, TransportError> {
        let peer = stream.peer_addr().map_err(TransportError::ReceiveFailed)?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "could not set TCP_NODELAY");
        }
        let (read_half, write_half) = stream.into_split();
        let id = ConnectionId::new(
            NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        );
        tracing::debug!(%id, %peer, "tcp connection established");

        Ok(Self {
            id,
            peer,
            reader: Mutex::new(BufReader::new(read_half)),
            writer: Mutex::new(write_half),
            compression: AtomicI32::new(COMPRESSION_DISABLED),
        })
    }

    /// Address of the remote peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Switches framing to the compressed layout. A negative threshold
    /// turns it back off.
    pub fn set_compression(&self, threshold: i32) {
        let value = if threshold < 0 { COMPRESSION_DISABLED } else { threshold };
        self.compression.store(value, Ordering::Release);
        tracing::debug!(id = %self.id, threshold, "compression threshold set");
    }

    /// The active compression threshold, if compression is enabled.
    pub fn compression_threshold(&self) -> Option<i32> {
        match self.compression.load(Ordering::Acquire) {
            COMPRESSION_DISABLED => None,
            t => Some(t),
        }
    }

    async fn read_frame(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut reader = self.reader.lock().await;
        let Some(len) = read_length(&mut *reader).await? else {
            return Ok(None);
        };
        if len > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge(len));
        }
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await.map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                TransportError::ConnectionClosed("eof inside frame".into())
            } else {
                TransportError::ReceiveFailed(e)
            }
        })?;
        Ok(Some(buf))
    }
}

/// Reads a frame length prefix. `None` means the peer closed the stream
/// cleanly between frames.
async fn read_length<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<usize>, TransportError> {
    let mut header = [0u8; MAX_VARINT_LEN];
    for i in 0..MAX_VARINT_LEN {
        let byte = match reader.read_u8().await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof && i == 0 => {
                return Ok(None);
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(TransportError::ConnectionClosed(
                    "eof inside frame header".into(),
                ));
            }
            Err(e) => return Err(TransportError::ReceiveFailed(e)),
        };
        header[i] = byte;
        if byte & 0x80 == 0 {
            return match read_varint(&header[..=i]) {
                VarIntRead::Complete(len, _) if len >= 0 => Ok(Some(len as usize)),
                _ => Err(TransportError::MalformedFrame(
                    "negative frame length".into(),
                )),
            };
        }
    }
    Err(TransportError::MalformedFrame(
        "frame length prefix too long".into(),
    ))
}

impl Connection for TcpConnection {
    type Error = TransportError;

    async fn send(&self, frame: &[u8]) -> Result<(), Self::Error> {
        let mut body = Vec::with_capacity(frame.len() + 1);
        if self.compression_threshold().is_some() {
            write_varint(&mut body, 0);
        }
        body.extend_from_slice(frame);
        if body.len() > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge(body.len()));
        }

        let mut out = Vec::with_capacity(body.len() + MAX_VARINT_LEN);
        write_varint(&mut out, body.len() as i32);
        out.extend_from_slice(&body);

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&out)
            .await
            .map_err(TransportError::SendFailed)?;
        writer.flush().await.map_err(TransportError::SendFailed)
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        loop {
            let Some(frame) = self.read_frame().await? else {
                return Ok(None);
            };
            if self.compression_threshold().is_none() {
                return Ok(Some(frame));
            }
            match read_varint(&frame) {
                VarIntRead::Complete(0, used) => {
                    return Ok(Some(frame[used..].to_vec()));
                }
                VarIntRead::Complete(data_len, _) => {
                    tracing::debug!(
                        id = %self.id,
                        data_len,
                        "skipping compressed frame"
                    );
                    continue;
                }
                _ => {
                    return Err(TransportError::MalformedFrame(
                        "bad data length in compressed frame".into(),
                    ));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        let mut writer = self.writer.lock().await;
        match writer.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(TransportError::SendFailed(e)),
        }
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
