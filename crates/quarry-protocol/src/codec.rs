//! Packet encoders and decoders for protocol 767 (game version 1.21.1).
//!
//! The protocol is stateful: the same packet id means different things in
//! the status, login, configuration and play states. Decoders are split
//! per state and return only the packets the client reacts to. Everything
//! else comes back as `Other(id)` so the caller can log it and move on.
//!
//! Only the handshake carries the protocol number, so a client built from
//! these tables can still *attempt* any version. Whether the server
//! accepts the layouts that follow is what negotiation finds out.

use crate::text;
use crate::wire::{PacketReader, PacketWriter};
use crate::{
    HandshakeIntent, OutboundAction, PlayerPose, ProtocolError, RelativeFlags,
};

/// Protocol number of the packet layouts in this module.
pub const PROTOCOL_VERSION: i32 = 767;

/// Game version name matching [`PROTOCOL_VERSION`].
pub const GAME_VERSION: &str = "1.21.1";

/// Longest chat message the server accepts.
pub const MAX_CHAT_LEN: usize = 256;

const MAX_USERNAME_LEN: usize = 16;
const MAX_IDENTIFIER_LEN: usize = 32_767;
const MESSAGE_SIGNATURE_LEN: usize = 256;

/// Packet ids the client sends.
pub mod serverbound {
    pub const HANDSHAKE: i32 = 0x00;

    pub const STATUS_REQUEST: i32 = 0x00;
    pub const STATUS_PING: i32 = 0x01;

    pub const LOGIN_START: i32 = 0x00;
    pub const LOGIN_PLUGIN_RESPONSE: i32 = 0x02;
    pub const LOGIN_ACKNOWLEDGED: i32 = 0x03;
    pub const LOGIN_COOKIE_RESPONSE: i32 = 0x04;

    pub const CONFIG_COOKIE_RESPONSE: i32 = 0x01;
    pub const CONFIG_ACK_FINISH: i32 = 0x03;
    pub const CONFIG_KEEP_ALIVE: i32 = 0x04;
    pub const CONFIG_PONG: i32 = 0x05;
    pub const CONFIG_KNOWN_PACKS: i32 = 0x07;

    pub const PLAY_CONFIRM_TELEPORT: i32 = 0x00;
    pub const PLAY_CHAT: i32 = 0x06;
    pub const PLAY_CLIENT_STATUS: i32 = 0x09;
    pub const PLAY_KEEP_ALIVE: i32 = 0x18;
    pub const PLAY_PLAYER_ACTION: i32 = 0x24;
    pub const PLAY_PONG: i32 = 0x27;
    pub const PLAY_SWING_ARM: i32 = 0x36;
}

/// Packet ids the server sends.
pub mod clientbound {
    pub const STATUS_RESPONSE: i32 = 0x00;
    pub const STATUS_PONG: i32 = 0x01;

    pub const LOGIN_DISCONNECT: i32 = 0x00;
    pub const LOGIN_ENCRYPTION_REQUEST: i32 = 0x01;
    pub const LOGIN_SUCCESS: i32 = 0x02;
    pub const LOGIN_SET_COMPRESSION: i32 = 0x03;
    pub const LOGIN_PLUGIN_REQUEST: i32 = 0x04;
    pub const LOGIN_COOKIE_REQUEST: i32 = 0x05;

    pub const CONFIG_COOKIE_REQUEST: i32 = 0x00;
    pub const CONFIG_DISCONNECT: i32 = 0x02;
    pub const CONFIG_FINISH: i32 = 0x03;
    pub const CONFIG_KEEP_ALIVE: i32 = 0x04;
    pub const CONFIG_PING: i32 = 0x05;
    pub const CONFIG_KNOWN_PACKS: i32 = 0x0E;

    pub const PLAY_DISCONNECT: i32 = 0x1D;
    pub const PLAY_DISGUISED_CHAT: i32 = 0x1E;
    pub const PLAY_KEEP_ALIVE: i32 = 0x26;
    pub const PLAY_LOGIN: i32 = 0x2B;
    pub const PLAY_PING: i32 = 0x35;
    pub const PLAY_PLAYER_CHAT: i32 = 0x39;
    pub const PLAY_COMBAT_DEATH: i32 = 0x3C;
    pub const PLAY_SYNC_POSITION: i32 = 0x40;
    pub const PLAY_SET_HEALTH: i32 = 0x5D;
    pub const PLAY_SYSTEM_CHAT: i32 = 0x6C;
}

// ---------------------------------------------------------------------------
// Handshake and status
// ---------------------------------------------------------------------------

/// The first packet of every connection.
pub fn handshake(
    protocol_version: i32,
    host: &str,
    port: u16,
    intent: HandshakeIntent,
) -> Vec<u8> {
    PacketWriter::new(serverbound::HANDSHAKE)
        .varint(protocol_version)
        .string(host)
        .u16(port)
        .varint(intent.wire_id())
        .finish()
}

pub fn status_request() -> Vec<u8> {
    PacketWriter::new(serverbound::STATUS_REQUEST).finish()
}

pub fn status_ping(payload: i64) -> Vec<u8> {
    PacketWriter::new(serverbound::STATUS_PING).i64(payload).finish()
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatusPacket {
    /// Raw JSON status document.
    Response(String),
    Pong(i64),
    Other(i32),
}

pub fn decode_status(frame: &[u8]) -> Result<StatusPacket, ProtocolError> {
    let mut r = PacketReader::new(frame);
    let id = r.read_varint()?;
    Ok(match id {
        clientbound::STATUS_RESPONSE => StatusPacket::Response(r.read_string(MAX_IDENTIFIER_LEN)?),
        clientbound::STATUS_PONG => StatusPacket::Pong(r.read_i64()?),
        other => StatusPacket::Other(other),
    })
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

pub fn login_start(username: &str, uuid: u128) -> Vec<u8> {
    PacketWriter::new(serverbound::LOGIN_START)
        .string(username)
        .uuid(uuid)
        .finish()
}

pub fn login_acknowledged() -> Vec<u8> {
    PacketWriter::new(serverbound::LOGIN_ACKNOWLEDGED).finish()
}

/// Declines a login plugin request: we understand no custom channels.
pub fn login_plugin_response(message_id: i32) -> Vec<u8> {
    PacketWriter::new(serverbound::LOGIN_PLUGIN_RESPONSE)
        .varint(message_id)
        .bool(false)
        .finish()
}

/// Answers a cookie request with "no cookie stored".
pub fn login_cookie_response(key: &str) -> Vec<u8> {
    PacketWriter::new(serverbound::LOGIN_COOKIE_RESPONSE)
        .string(key)
        .bool(false)
        .finish()
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoginPacket {
    /// Kicked during login. The reason is already flattened.
    Disconnect { reason: String },
    /// The server runs in online mode.
    EncryptionRequest,
    Success { uuid: u128, username: String },
    SetCompression(i32),
    PluginRequest { message_id: i32, channel: String },
    CookieRequest { key: String },
    Other(i32),
}

pub fn decode_login(frame: &[u8]) -> Result<LoginPacket, ProtocolError> {
    let mut r = PacketReader::new(frame);
    let id = r.read_varint()?;
    Ok(match id {
        clientbound::LOGIN_DISCONNECT => {
            let raw = r.read_string(MAX_IDENTIFIER_LEN)?;
            let reason = match text::parse_json(&raw) {
                Ok(component) => text::flatten(&component),
                Err(_) => raw,
            };
            LoginPacket::Disconnect { reason }
        }
        clientbound::LOGIN_ENCRYPTION_REQUEST => LoginPacket::EncryptionRequest,
        clientbound::LOGIN_SUCCESS => LoginPacket::Success {
            uuid: r.read_uuid()?,
            username: r.read_string(MAX_USERNAME_LEN)?,
        },
        clientbound::LOGIN_SET_COMPRESSION => LoginPacket::SetCompression(r.read_varint()?),
        clientbound::LOGIN_PLUGIN_REQUEST => LoginPacket::PluginRequest {
            message_id: r.read_varint()?,
            channel: r.read_string(MAX_IDENTIFIER_LEN)?,
        },
        clientbound::LOGIN_COOKIE_REQUEST => LoginPacket::CookieRequest {
            key: r.read_string(MAX_IDENTIFIER_LEN)?,
        },
        other => LoginPacket::Other(other),
    })
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub fn config_ack_finish() -> Vec<u8> {
    PacketWriter::new(serverbound::CONFIG_ACK_FINISH).finish()
}

pub fn config_keep_alive(id: i64) -> Vec<u8> {
    PacketWriter::new(serverbound::CONFIG_KEEP_ALIVE).i64(id).finish()
}

pub fn config_pong(id: i32) -> Vec<u8> {
    PacketWriter::new(serverbound::CONFIG_PONG).i32(id).finish()
}

/// Tells the server we know none of its data packs, so it sends full
/// registries.
pub fn config_known_packs_none() -> Vec<u8> {
    PacketWriter::new(serverbound::CONFIG_KNOWN_PACKS).varint(0).finish()
}

pub fn config_cookie_response(key: &str) -> Vec<u8> {
    PacketWriter::new(serverbound::CONFIG_COOKIE_RESPONSE)
        .string(key)
        .bool(false)
        .finish()
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigPacket {
    CookieRequest { key: String },
    Disconnect { reason: String },
    Finish,
    KeepAlive(i64),
    Ping(i32),
    KnownPacks,
    Other(i32),
}

pub fn decode_configuration(frame: &[u8]) -> Result<ConfigPacket, ProtocolError> {
    let mut r = PacketReader::new(frame);
    let id = r.read_varint()?;
    Ok(match id {
        clientbound::CONFIG_COOKIE_REQUEST => ConfigPacket::CookieRequest {
            key: r.read_string(MAX_IDENTIFIER_LEN)?,
        },
        clientbound::CONFIG_DISCONNECT => ConfigPacket::Disconnect {
            reason: text::flatten(&text::read_nbt(&mut r)?),
        },
        clientbound::CONFIG_FINISH => ConfigPacket::Finish,
        clientbound::CONFIG_KEEP_ALIVE => ConfigPacket::KeepAlive(r.read_i64()?),
        clientbound::CONFIG_PING => ConfigPacket::Ping(r.read_i32()?),
        clientbound::CONFIG_KNOWN_PACKS => ConfigPacket::KnownPacks,
        other => ConfigPacket::Other(other),
    })
}

// ---------------------------------------------------------------------------
// Play
// ---------------------------------------------------------------------------

pub fn play_keep_alive(id: i64) -> Vec<u8> {
    PacketWriter::new(serverbound::PLAY_KEEP_ALIVE).i64(id).finish()
}

pub fn play_pong(id: i32) -> Vec<u8> {
    PacketWriter::new(serverbound::PLAY_PONG).i32(id).finish()
}

/// Per-send values that [`encode_action`] cannot derive from the action.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionStamp {
    /// Block-change sequence number for dig packets.
    pub sequence: i32,
    /// Chat timestamp in milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    /// Chat salt.
    pub salt: i64,
}

/// Encodes an [`OutboundAction`] as a play-state packet.
pub fn encode_action(
    action: &OutboundAction,
    stamp: ActionStamp,
) -> Result<Vec<u8>, ProtocolError> {
    let body = match action {
        OutboundAction::Chat(message) => {
            if message.chars().count() > MAX_CHAT_LEN {
                return Err(ProtocolError::InvalidMessage(format!(
                    "chat message longer than {MAX_CHAT_LEN} characters"
                )));
            }
            PacketWriter::new(serverbound::PLAY_CHAT)
                .string(message)
                .i64(stamp.timestamp_ms)
                .i64(stamp.salt)
                .bool(false) // unsigned
                .varint(0) // acknowledged message count
                .bytes(&[0, 0, 0]) // 20-bit acknowledgement bitset
                .finish()
        }
        OutboundAction::SwingArm => PacketWriter::new(serverbound::PLAY_SWING_ARM)
            .varint(0) // main hand
            .finish(),
        OutboundAction::Dig { status, pos, face } => {
            PacketWriter::new(serverbound::PLAY_PLAYER_ACTION)
                .varint(status.wire_id())
                .position(*pos)
                .u8(face.wire_id())
                .varint(stamp.sequence)
                .finish()
        }
        OutboundAction::ConfirmTeleport(id) => {
            PacketWriter::new(serverbound::PLAY_CONFIRM_TELEPORT)
                .varint(*id)
                .finish()
        }
        OutboundAction::Respawn => PacketWriter::new(serverbound::PLAY_CLIENT_STATUS)
            .varint(0) // perform respawn
            .finish(),
    };
    Ok(body)
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayPacket {
    Login { entity_id: i32 },
    KeepAlive(i64),
    Ping(i32),
    /// Teleport as sent. Resolve `flags` against the previous pose.
    SyncPosition {
        pose: PlayerPose,
        flags: RelativeFlags,
        teleport_id: i32,
    },
    SetHealth {
        health: f32,
        food: i32,
        saturation: f32,
    },
    CombatDeath { message: String },
    Disconnect { reason: String },
    Chat(String),
    Other(i32),
}

pub fn decode_play(frame: &[u8]) -> Result<PlayPacket, ProtocolError> {
    let mut r = PacketReader::new(frame);
    let id = r.read_varint()?;
    Ok(match id {
        clientbound::PLAY_LOGIN => PlayPacket::Login {
            entity_id: r.read_i32()?,
        },
        clientbound::PLAY_KEEP_ALIVE => PlayPacket::KeepAlive(r.read_i64()?),
        clientbound::PLAY_PING => PlayPacket::Ping(r.read_i32()?),
        clientbound::PLAY_SYNC_POSITION => {
            let pose = PlayerPose {
                x: r.read_f64()?,
                y: r.read_f64()?,
                z: r.read_f64()?,
                yaw: r.read_f32()?,
                pitch: r.read_f32()?,
            };
            PlayPacket::SyncPosition {
                pose,
                flags: RelativeFlags(r.read_u8()?),
                teleport_id: r.read_varint()?,
            }
        }
        clientbound::PLAY_SET_HEALTH => PlayPacket::SetHealth {
            health: r.read_f32()?,
            food: r.read_varint()?,
            saturation: r.read_f32()?,
        },
        clientbound::PLAY_COMBAT_DEATH => {
            let _player_id = r.read_varint()?;
            PlayPacket::CombatDeath {
                message: text::flatten(&text::read_nbt(&mut r)?),
            }
        }
        clientbound::PLAY_DISCONNECT => PlayPacket::Disconnect {
            reason: text::flatten(&text::read_nbt(&mut r)?),
        },
        clientbound::PLAY_PLAYER_CHAT => {
            let _sender = r.read_uuid()?;
            let _index = r.read_varint()?;
            if r.read_bool()? {
                r.read_bytes(MESSAGE_SIGNATURE_LEN)?;
            }
            PlayPacket::Chat(r.read_string(MAX_CHAT_LEN)?)
        }
        clientbound::PLAY_DISGUISED_CHAT => {
            PlayPacket::Chat(text::flatten(&text::read_nbt(&mut r)?))
        }
        clientbound::PLAY_SYSTEM_CHAT => {
            let content = text::flatten(&text::read_nbt(&mut r)?);
            let overlay = r.read_bool()?;
            if overlay {
                // Action bar text, not chat.
                PlayPacket::Other(id)
            } else {
                PlayPacket::Chat(content)
            }
        }
        other => PlayPacket::Other(other),
    })
}
