//! Live TCP client: status ping, login, and the play-state reader.
//!
//! Three entry points share one login routine:
//!
//! - [`fetch_status`] / [`TcpPinger`]: handshake with the status intent,
//!   read the JSON document, measure round-trip latency;
//! - [`TcpConnector`]: log in at a candidate version and hang up, which is
//!   all a negotiation trial needs;
//! - [`GameClient::join`]: log in, then keep reading in a background task
//!   that answers keep-alives and turns play packets into [`GameEvent`]s.
//!
//! ```text
//!   handshake(Login) ─→ login start ─→ [compression / plugin / cookie]* ─→ success
//!        └─→ ack ─→ configuration (keep-alive, known packs, ...) ─→ finish ─→ play
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use quarry_mining::{ActionSink, SendFailure};
use quarry_negotiate::{ConnectError, Connector, PingError, Pinger};
use quarry_protocol::codec::{
    self, ActionStamp, ConfigPacket, LoginPacket, PlayPacket, StatusPacket,
};
use quarry_protocol::{
    Endpoint, GameEvent, HandshakeIntent, OutboundAction, PlayerPose, ServerStatus,
};
use quarry_transport::{Connection, TcpConnection, TransportError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::QuarryError;

/// Buffered game events before the reader waits for the session loop.
pub const EVENT_CHANNEL_SIZE: usize = 64;

/// Offline-mode servers derive the player UUID from the name; this one is
/// ignored.
const OFFLINE_UUID: u128 = 0;

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Status ping
// ---------------------------------------------------------------------------

/// Asks `endpoint` for its status document.
///
/// The handshake carries `version`; servers answer status requests for
/// any version. Latency is the round trip of the ping that follows the
/// document. A server that closes before the pong still yields a status,
/// just without latency.
pub async fn fetch_status(
    endpoint: &Endpoint,
    version: i32,
    connect_timeout: Duration,
) -> Result<ServerStatus, QuarryError> {
    let conn = TcpConnection::connect(&endpoint.to_string(), connect_timeout).await?;

    conn.send(&codec::handshake(
        version,
        &endpoint.host,
        endpoint.port,
        HandshakeIntent::Status,
    ))
    .await?;
    conn.send(&codec::status_request()).await?;

    let mut status = loop {
        let Some(frame) = conn.recv().await? else {
            return Err(QuarryError::Ping("closed before the status response".into()));
        };
        match codec::decode_status(&frame)? {
            StatusPacket::Response(json) => break ServerStatus::from_json(&json)?,
            other => tracing::debug!(?other, "ignoring packet before status response"),
        }
    };

    let payload = unix_millis();
    let sent = Instant::now();
    conn.send(&codec::status_ping(payload)).await?;
    match conn.recv().await {
        Ok(Some(frame)) => match codec::decode_status(&frame) {
            Ok(StatusPacket::Pong(echo)) if echo == payload => {
                status.latency = Some(sent.elapsed());
            }
            Ok(other) => tracing::debug!(?other, "unexpected answer to status ping"),
            Err(e) => tracing::debug!(error = %e, "undecodable pong"),
        },
        Ok(None) => tracing::debug!("server closed before pong"),
        Err(e) => tracing::debug!(error = %e, "pong not received"),
    }

    if let Err(e) = conn.close().await {
        tracing::debug!(error = %e, "close after status ping failed");
    }
    Ok(status)
}

/// [`Pinger`] over TCP, used by negotiation to read the server version.
#[derive(Debug, Clone)]
pub struct TcpPinger {
    connect_timeout: Duration,
}

impl TcpPinger {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Pinger for TcpPinger {
    async fn ping(&self, endpoint: &Endpoint) -> Result<ServerStatus, PingError> {
        fetch_status(endpoint, quarry_protocol::PROTOCOL_VERSION, self.connect_timeout)
            .await
            .map_err(|e| PingError::Unreachable(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

fn transport_failure(err: TransportError) -> ConnectError {
    match err {
        TransportError::ConnectTimeout(_) => ConnectError::Timeout,
        other => ConnectError::ConnectionError(other.to_string()),
    }
}

/// Sorts a login disconnect into "wrong version" or "refused".
pub fn classify_disconnect(reason: String) -> ConnectError {
    let lower = reason.to_lowercase();
    if lower.contains("outdated") || lower.contains("incompatible") {
        ConnectError::IncompatibleVersion(reason)
    } else {
        ConnectError::Rejected(reason)
    }
}

async fn send_login(conn: &TcpConnection, frame: &[u8]) -> Result<(), ConnectError> {
    conn.send(frame).await.map_err(transport_failure)
}

/// Runs the login exchange on an open connection.
///
/// Returns once login success has been acknowledged; the connection is
/// then in the configuration state.
async fn login(
    conn: &TcpConnection,
    endpoint: &Endpoint,
    version: i32,
    username: &str,
) -> Result<(), ConnectError> {
    send_login(
        conn,
        &codec::handshake(version, &endpoint.host, endpoint.port, HandshakeIntent::Login),
    )
    .await?;
    send_login(conn, &codec::login_start(username, OFFLINE_UUID)).await?;

    loop {
        let frame = match conn.recv().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                return Err(ConnectError::ConnectionError(
                    "server closed the connection during login".into(),
                ));
            }
            Err(e) => return Err(transport_failure(e)),
        };

        let packet =
            codec::decode_login(&frame).map_err(|e| ConnectError::Protocol(e.to_string()))?;
        match packet {
            LoginPacket::SetCompression(threshold) => conn.set_compression(threshold),
            LoginPacket::Success { uuid, username } => {
                send_login(conn, &codec::login_acknowledged()).await?;
                tracing::info!(%username, uuid = %format!("{uuid:032x}"), version, "logged in");
                return Ok(());
            }
            LoginPacket::Disconnect { reason } => return Err(classify_disconnect(reason)),
            LoginPacket::EncryptionRequest => {
                return Err(ConnectError::Rejected(
                    "server requires online-mode authentication".into(),
                ));
            }
            LoginPacket::PluginRequest {
                message_id,
                channel,
            } => {
                tracing::debug!(message_id, %channel, "declining login plugin request");
                send_login(conn, &codec::login_plugin_response(message_id)).await?;
            }
            LoginPacket::CookieRequest { key } => {
                send_login(conn, &codec::login_cookie_response(&key)).await?;
            }
            LoginPacket::Other(id) => {
                tracing::debug!(packet_id = id, "ignoring login packet");
            }
        }
    }
}

async fn open_and_login(
    endpoint: &Endpoint,
    version: i32,
    username: &str,
    connect_timeout: Duration,
) -> Result<TcpConnection, ConnectError> {
    let conn = TcpConnection::connect(&endpoint.to_string(), connect_timeout)
        .await
        .map_err(transport_failure)?;
    login(&conn, endpoint, version, username).await?;
    Ok(conn)
}

/// [`Connector`] over TCP. A trial succeeds once the server accepts the
/// login; the connection is closed right after.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    username: String,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(username: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            username: username.into(),
            connect_timeout,
        }
    }
}

impl Connector for TcpConnector {
    async fn connect_and_join(&self, endpoint: &Endpoint, version: i32) -> Result<(), ConnectError> {
        let conn = open_and_login(endpoint, version, &self.username, self.connect_timeout).await?;
        if let Err(e) = conn.close().await {
            tracing::debug!(error = %e, "close after trial login failed");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// GameClient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Configuration,
    Play,
}

/// A logged-in connection.
///
/// Outbound actions go through [`ActionSink`]. Inbound packets are read
/// by a background task and delivered on the event channel returned by
/// [`join`](Self::join). The channel ends with exactly one
/// [`GameEvent::Disconnected`] unless the receiver is dropped first.
pub struct GameClient {
    conn: Arc<TcpConnection>,
    sequence: AtomicI32,
    reader: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl GameClient {
    /// Connects, logs in at `version`, and starts the reader task.
    pub async fn join(
        endpoint: &Endpoint,
        version: i32,
        username: &str,
        connect_timeout: Duration,
    ) -> Result<(Self, mpsc::Receiver<GameEvent>), QuarryError> {
        let conn = Arc::new(open_and_login(endpoint, version, username, connect_timeout).await?);
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let reader = tokio::spawn(read_loop(Arc::clone(&conn), tx));
        tracing::info!(server = %endpoint, version, "joined, configuring");

        Ok((
            Self {
                conn,
                sequence: AtomicI32::new(0),
                reader: std::sync::Mutex::new(Some(reader)),
            },
            rx,
        ))
    }

    /// Closes the socket and stops the reader task.
    pub async fn close(&self) {
        if let Err(e) = self.conn.close().await {
            tracing::debug!(error = %e, "close failed");
        }
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(reader) = reader {
            reader.abort();
        }
    }
}

impl ActionSink for GameClient {
    async fn send(&self, action: OutboundAction) -> Result<(), SendFailure> {
        let kind = action.kind();
        let stamp = ActionStamp {
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
            timestamp_ms: unix_millis(),
            salt: rand::random(),
        };
        let frame = codec::encode_action(&action, stamp).map_err(|e| SendFailure {
            action: kind,
            reason: e.to_string(),
        })?;
        self.conn.send(&frame).await.map_err(|e| SendFailure {
            action: kind,
            reason: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Reader task
// ---------------------------------------------------------------------------

async fn read_loop(conn: Arc<TcpConnection>, events: mpsc::Sender<GameEvent>) {
    let mut phase = Phase::Configuration;
    let mut pose = PlayerPose::default();

    let reason = loop {
        let frame = match conn.recv().await {
            Ok(Some(frame)) => frame,
            Ok(None) => break "connection closed by server".to_string(),
            Err(e) => break e.to_string(),
        };

        let handled = match phase {
            Phase::Configuration => handle_configuration(&conn, &frame, &mut phase).await,
            Phase::Play => handle_play(&conn, &frame, &mut pose).await,
        };

        match handled {
            Ok(Some(event)) => {
                let last = matches!(event, GameEvent::Disconnected { .. });
                if events.send(event).await.is_err() || last {
                    return;
                }
            }
            Ok(None) => {}
            Err(QuarryError::Transport(e)) => break e.to_string(),
            Err(e) => tracing::debug!(?phase, error = %e, "skipping packet"),
        }
    };

    tracing::info!(%reason, "connection lost");
    let _ = events.send(GameEvent::Disconnected { reason }).await;
}

async fn handle_configuration(
    conn: &TcpConnection,
    frame: &[u8],
    phase: &mut Phase,
) -> Result<Option<GameEvent>, QuarryError> {
    match codec::decode_configuration(frame)? {
        ConfigPacket::KeepAlive(id) => conn.send(&codec::config_keep_alive(id)).await?,
        ConfigPacket::Ping(id) => conn.send(&codec::config_pong(id)).await?,
        ConfigPacket::KnownPacks => conn.send(&codec::config_known_packs_none()).await?,
        ConfigPacket::CookieRequest { key } => {
            conn.send(&codec::config_cookie_response(&key)).await?;
        }
        ConfigPacket::Finish => {
            conn.send(&codec::config_ack_finish()).await?;
            *phase = Phase::Play;
            tracing::debug!("configuration finished");
        }
        ConfigPacket::Disconnect { reason } => {
            return Ok(Some(GameEvent::Disconnected { reason }));
        }
        ConfigPacket::Other(id) => tracing::trace!(packet_id = id, "ignoring configuration packet"),
    }
    Ok(None)
}

async fn handle_play(
    conn: &TcpConnection,
    frame: &[u8],
    pose: &mut PlayerPose,
) -> Result<Option<GameEvent>, QuarryError> {
    let event = match codec::decode_play(frame)? {
        PlayPacket::KeepAlive(id) => {
            conn.send(&codec::play_keep_alive(id)).await?;
            return Ok(None);
        }
        PlayPacket::Ping(id) => {
            conn.send(&codec::play_pong(id)).await?;
            return Ok(None);
        }
        PlayPacket::Login { entity_id } => GameEvent::Joined { entity_id },
        PlayPacket::SyncPosition {
            pose: teleport,
            flags,
            teleport_id,
        } => {
            *pose = flags.apply(pose, &teleport);
            GameEvent::Teleport {
                pose: *pose,
                teleport_id,
            }
        }
        PlayPacket::SetHealth {
            health,
            food,
            saturation,
        } => GameEvent::Health {
            health,
            food,
            saturation,
        },
        PlayPacket::CombatDeath { message } => GameEvent::Death { message },
        PlayPacket::Disconnect { reason } => GameEvent::Disconnected { reason },
        PlayPacket::Chat(text) => GameEvent::Chat(text),
        PlayPacket::Other(_) => return Ok(None),
    };
    Ok(Some(event))
}
