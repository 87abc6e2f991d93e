//! Protocol-version negotiation for Quarry.
//!
//! A Minecraft server only accepts clients that speak its exact protocol
//! number. This crate finds that number for a given server and remembers
//! it:
//!
//! 1. **Record**: if an earlier run confirmed a version, use it
//!    ([`NegotiationStore`], [`NegotiationRecord`])
//! 2. **Probe**: ask the server which version it reports ([`VersionProbe`])
//! 3. **Trials**: try candidates in order until one logs in
//!    ([`HandshakeTrialRunner`]), appending each outcome to a ledger
//! 4. **Verdict**: persist the winner, or restore state and report
//!    [`NegotiationError::Exhausted`]
//!
//! # How it fits in the stack
//!
//! ```text
//! quarry (above)             ← live TCP Pinger/Connector, runs negotiation before play
//!     ↕
//! Negotiation (this crate)   ← candidate ordering, trials, persistence
//!     ↕
//! Protocol Layer (below)     ← Endpoint, ServerStatus, PROTOCOL_VERSION
//! ```

mod candidates;
mod config;
mod controller;
mod error;
mod record;
mod store;
mod trial;

pub use candidates::{VersionProbe, build_candidates};
pub use config::NegotiationConfig;
pub use controller::{NegotiationController, NegotiationOutcome, NegotiationState, OutcomeSource};
pub use error::{NegotiationError, StoreError};
pub use record::{AttemptEntry, NegotiationRecord};
pub use store::{FileStore, MemoryStore, NegotiationStore};
pub use trial::{
    ActiveVersion, ConnectError, Connector, HandshakeTrialRunner, PingError, Pinger, TrialOutcome,
};
