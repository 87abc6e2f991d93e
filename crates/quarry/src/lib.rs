//! # Quarry
//!
//! A scripted Minecraft client that finds a protocol version the server
//! accepts, joins, and runs a tick-driven mining routine controlled from
//! chat.
//!
//! ## Architecture
//!
//! ```text
//!   quarry-bot (CLI)
//!        │
//!        ▼
//!   Bot ──negotiate──→ NegotiationController ──→ TcpPinger / TcpConnector
//!    │                        │                        │
//!    │                        └── FileStore (.quarry/) │
//!    ▼                                                 ▼
//!   GameClient::join ──events──→ SessionController ──→ CommandDispatcher
//!        ▲                              │                     │
//!        └────────── ActionSink ────────┴── MiningStateMachine┘
//! ```
//!
//! The layers below live in their own crates:
//!
//! - `quarry-transport`: length-prefixed frames over TCP;
//! - `quarry-protocol`: packet encoding and decoding for protocol 767;
//! - `quarry-tick`: the fixed-period session clock;
//! - `quarry-negotiate`: version candidates, trials, persistence;
//! - `quarry-mining`: the mining session and its state machine.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use quarry::prelude::*;
//!
//! # async fn demo() -> Result<(), QuarryError> {
//! let bot = Bot::new(BotConfig::default());
//! let end = bot.run(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! println!("session ended: {end}");
//! # Ok(())
//! # }
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod bot;
pub mod client;
pub mod commands;
mod config;
mod error;
mod logging;
pub mod session;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use bot::{Bot, LiveController, status_line};
pub use client::{GameClient, TcpConnector, TcpPinger, classify_disconnect, fetch_status};
pub use commands::{Command, CommandDispatcher, classify};
pub use config::{BotConfig, MAX_USERNAME_LEN};
pub use error::QuarryError;
pub use logging::{DEFAULT_FILTER, init_tracing};
pub use session::{SessionController, SessionEnd, ShutdownSignal};

/// Everything the binary and most embedders need.
pub mod prelude {
    pub use crate::{Bot, BotConfig, QuarryError, SessionEnd, status_line};
    pub use quarry_mining::{MiningConfig, MiningState};
    pub use quarry_negotiate::{NegotiationConfig, NegotiationError, NegotiationOutcome};
    pub use quarry_protocol::{Endpoint, ServerStatus};
}
