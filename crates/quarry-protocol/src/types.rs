//! Domain types shared by every layer above the codec.
//!
//! These are the values the rest of Quarry reasons about: where the
//! player stands, which block it is digging, what it wants to send, and
//! what the server told it. None of them know about packet ids. The
//! [`codec`](crate::codec) module maps them to and from bytes.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::text;

// ---------------------------------------------------------------------------
// BlockPos
// ---------------------------------------------------------------------------

/// Integer block coordinates in the world.
///
/// On the wire a position is a single `i64` with three bit-fields:
///
/// ```text
///  63            38 37            12 11      0
/// +----------------+----------------+---------+
/// |   x (26 bits)  |   z (26 bits)  | y (12)  |
/// +----------------+----------------+---------+
/// ```
///
/// Each axis is masked to its width before packing, so out-of-range
/// values wrap instead of corrupting the neighbouring field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The block that contains the given world coordinates.
    ///
    /// Uses `floor`, not truncation: `-0.5` lies in block `-1`.
    pub fn containing(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: x.floor() as i32,
            y: y.floor() as i32,
            z: z.floor() as i32,
        }
    }

    /// Returns this position shifted by the given offsets.
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x.wrapping_add(dx),
            y: self.y.wrapping_add(dy),
            z: self.z.wrapping_add(dz),
        }
    }

    /// Packs the position as `x << 38 | z << 12 | y`.
    pub fn pack(self) -> i64 {
        ((self.x as i64 & 0x3FF_FFFF) << 38)
            | ((self.z as i64 & 0x3FF_FFFF) << 12)
            | (self.y as i64 & 0xFFF)
    }

    /// Inverse of [`pack`](Self::pack). Sign-extends each field.
    pub fn unpack(packed: i64) -> Self {
        Self {
            x: (packed >> 38) as i32,
            y: ((packed << 52) >> 52) as i32,
            z: ((packed << 26) >> 38) as i32,
        }
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// PlayerPose
// ---------------------------------------------------------------------------

/// Last known position and orientation of our player.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerPose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
}

impl PlayerPose {
    /// The block the player's feet are in.
    pub fn block(&self) -> BlockPos {
        BlockPos::containing(self.x, self.y, self.z)
    }
}

/// Which fields of a teleport are offsets from the current pose rather
/// than absolute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelativeFlags(pub u8);

impl RelativeFlags {
    pub const X: u8 = 0x01;
    pub const Y: u8 = 0x02;
    pub const Z: u8 = 0x04;
    pub const YAW: u8 = 0x08;
    pub const PITCH: u8 = 0x10;

    pub fn contains(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    /// Resolves a teleport against the previous pose.
    pub fn apply(self, previous: &PlayerPose, teleport: &PlayerPose) -> PlayerPose {
        let pick64 = |bit, prev: f64, new: f64| if self.contains(bit) { prev + new } else { new };
        let pick32 = |bit, prev: f32, new: f32| if self.contains(bit) { prev + new } else { new };
        PlayerPose {
            x: pick64(Self::X, previous.x, teleport.x),
            y: pick64(Self::Y, previous.y, teleport.y),
            z: pick64(Self::Z, previous.z, teleport.z),
            yaw: pick32(Self::YAW, previous.yaw, teleport.yaw),
            pitch: pick32(Self::PITCH, previous.pitch, teleport.pitch),
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound actions
// ---------------------------------------------------------------------------

/// Phase of a dig sent with [`OutboundAction::Dig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigStatus {
    Started,
    Cancelled,
    Finished,
}

impl DigStatus {
    pub fn wire_id(self) -> i32 {
        match self {
            Self::Started => 0,
            Self::Cancelled => 1,
            Self::Finished => 2,
        }
    }
}

/// Face of the block being dug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockFace {
    Down,
    #[default]
    Up,
    North,
    South,
    West,
    East,
}

impl BlockFace {
    pub fn wire_id(self) -> u8 {
        match self {
            Self::Down => 0,
            Self::Up => 1,
            Self::North => 2,
            Self::South => 3,
            Self::West => 4,
            Self::East => 5,
        }
    }
}

/// Something the bot wants the server to see.
///
/// This is what the mining loop and the command handlers produce. The
/// live client turns it into a play-state packet.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundAction {
    /// A public chat message.
    Chat(String),
    /// Main-hand swing animation.
    SwingArm,
    /// Start, cancel or finish digging a block.
    Dig {
        status: DigStatus,
        pos: BlockPos,
        face: BlockFace,
    },
    /// Acknowledge a server teleport by id.
    ConfirmTeleport(i32),
    /// Ask to respawn after death.
    Respawn,
}

impl OutboundAction {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Chat(_) => "chat",
            Self::SwingArm => "swing",
            Self::Dig { .. } => "dig",
            Self::ConfirmTeleport(_) => "confirm_teleport",
            Self::Respawn => "respawn",
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound events
// ---------------------------------------------------------------------------

/// Something the server told us during play, reduced to what the bot
/// reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// We are in the world.
    Joined { entity_id: i32 },
    /// A chat line, already flattened to plain text.
    Chat(String),
    /// The server moved us. `pose` is already resolved to absolute values.
    Teleport { pose: PlayerPose, teleport_id: i32 },
    /// Health, food and saturation update.
    Health {
        health: f32,
        food: i32,
        saturation: f32,
    },
    /// We died.
    Death { message: String },
    /// The server closed the session (or the socket dropped).
    Disconnected { reason: String },
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// A server address as typed by the user: `host` or `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Port used when the address has none.
    pub const DEFAULT_PORT: u16 = 25565;

    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::str::FromStr for Endpoint {
    type Err = crate::ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => {
                let port = port.parse().map_err(|_| {
                    crate::ProtocolError::InvalidMessage(format!("invalid port in {s:?}"))
                })?;
                (host, port)
            }
            _ => (s, Self::DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(crate::ProtocolError::InvalidMessage(format!(
                "missing host in {s:?}"
            )));
        }
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// What the client wants to do after the handshake packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeIntent {
    Status,
    Login,
}

impl HandshakeIntent {
    pub fn wire_id(self) -> i32 {
        match self {
            Self::Status => 1,
            Self::Login => 2,
        }
    }
}

// ---------------------------------------------------------------------------
// Server status
// ---------------------------------------------------------------------------

/// The JSON document a server returns to a status request.
///
/// Unknown fields (`enforcesSecureChat`, `forgeData`, ...) are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub version: StatusVersion,
    #[serde(default)]
    pub players: Option<StatusPlayers>,
    #[serde(default)]
    pub description: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    /// Round-trip time of the status ping, if one was measured.
    #[serde(skip)]
    pub latency: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusVersion {
    pub name: String,
    pub protocol: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPlayers {
    pub max: i64,
    pub online: i64,
    #[serde(default)]
    pub sample: Vec<PlayerSample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSample {
    pub name: String,
    pub id: String,
}

impl ServerStatus {
    /// Parses a status response body.
    pub fn from_json(json: &str) -> Result<Self, crate::ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Message of the day as plain text.
    pub fn motd(&self) -> String {
        text::flatten(&self.description).trim().to_string()
    }

    /// Guesses the mod loader from the version name and MOTD.
    pub fn mod_loader(&self) -> ModLoader {
        ModLoader::detect(&self.version.name, &self.motd())
    }
}

/// Server flavour as guessed from its status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModLoader {
    Fabric,
    Forge,
    Unknown,
}

impl ModLoader {
    /// Fabric wins over Forge when both names appear.
    pub fn detect(version_name: &str, motd: &str) -> Self {
        let version = version_name.to_lowercase();
        let motd = motd.to_lowercase();
        if version.contains("fabric") || motd.contains("fabric") {
            Self::Fabric
        } else if version.contains("forge") || motd.contains("forge") || motd.contains("fml") {
            Self::Forge
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for ModLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fabric => write!(f, "fabric"),
            Self::Forge => write!(f, "forge"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}
