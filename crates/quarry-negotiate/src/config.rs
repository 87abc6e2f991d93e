//! Negotiation settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a negotiation run.
///
/// The defaults match a 1.21-era server. Operators widen the window or
/// replace the candidate list from the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationConfig {
    /// Fallback candidates, tried after the reported version and its
    /// window, in this order.
    pub default_candidates: Vec<i32>,

    /// How far either side of the reported version to look.
    pub window_radius: u32,

    /// Upper bound for a whole trial (connect, login, configuration).
    /// Expiry classifies the trial as `Unknown`.
    pub trial_timeout: Duration,

    /// Upper bound for opening the TCP connection. Expiry classifies the
    /// trial as `ConnectionError`.
    pub connect_timeout: Duration,

    /// Where the record and the ledger live.
    pub state_dir: PathBuf,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            default_candidates: vec![767, 768, 766, 769, 770, 771, 765],
            window_radius: 2,
            trial_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            state_dir: PathBuf::from(".quarry"),
        }
    }
}

impl NegotiationConfig {
    /// Drops non-positive candidates and keeps the connect timeout inside
    /// the trial window.
    pub fn validated(mut self) -> Self {
        self.default_candidates.retain(|v| *v > 0);
        if self.connect_timeout > self.trial_timeout {
            tracing::warn!(
                connect_ms = self.connect_timeout.as_millis() as u64,
                trial_ms = self.trial_timeout.as_millis() as u64,
                "connect timeout exceeds trial timeout, clamping"
            );
            self.connect_timeout = self.trial_timeout;
        }
        self
    }
}
