//! Tick-driven mining for Quarry.
//!
//! A mining activation swings the arm, digs the block in front of the
//! player and wears down a simulated tool until it breaks or a stop is
//! requested. Ticks come from a [`quarry_tick::SessionClock`]; side effects
//! go to an [`ActionSink`].
//!
//! # Key types
//!
//! - [`MiningStateMachine`]: activations, tick tasks, stop and shutdown
//! - [`MiningSession`]: the per-activation state and per-tick decisions
//! - [`TickPlan`]: one tick's side effects, decided under the lock
//! - [`MiningState`]: lifecycle state machine
//! - [`MiningConfig`]: cadence and wear settings
//! - [`ActionSink`]: the trait the live client implements

mod config;
mod error;
mod machine;
mod session;
mod sink;

pub use config::{MiningConfig, MiningState};
pub use error::{MiningError, SendFailure};
pub use machine::{MiningSnapshot, MiningStateMachine, target_block};
pub use session::{MAX_DURABILITY, MiningSession, RunnerId, TickPlan};
pub use sink::{ActionSink, send_logged};
