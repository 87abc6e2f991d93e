//! Wire protocol for Quarry.
//!
//! This crate defines the "language" the bot speaks to a game server:
//!
//! - **Types** ([`BlockPos`], [`OutboundAction`], [`GameEvent`],
//!   [`ServerStatus`], ...): what the rest of the bot reasons about.
//! - **Codec** ([`codec`]): per-state packet encoders and decoders.
//! - **Wire** ([`wire`]): big-endian fields, varints and strings.
//! - **Text** ([`text`]): JSON and NBT text components, flattened to
//!   plain strings.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer sits between transport (frames) and the client
//! (sessions, commands). It does not own a socket; it only knows how bytes
//! map to packets.
//!
//! ```text
//! Transport (frames) -> Protocol (packets) -> Client (events, actions)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

pub mod codec;
mod error;
pub mod text;
mod types;
pub mod wire;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{GAME_VERSION, PROTOCOL_VERSION};
pub use error::ProtocolError;
pub use types::{
    BlockFace, BlockPos, DigStatus, Endpoint, GameEvent, HandshakeIntent, ModLoader,
    OutboundAction, PlayerPose, PlayerSample, RelativeFlags, ServerStatus,
    StatusPlayers, StatusVersion,
};
