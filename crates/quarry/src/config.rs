//! Bot configuration.

use std::time::Duration;

use quarry_mining::MiningConfig;
use quarry_negotiate::NegotiationConfig;
use quarry_protocol::Endpoint;
use serde::{Deserialize, Serialize};

/// Longest username the server accepts.
pub const MAX_USERNAME_LEN: usize = 16;

/// Everything the bot needs to connect and play.
///
/// Built by the CLI from flags and `QUARRY_*` environment variables.
/// Sub-configs keep their own defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Server to join.
    pub endpoint: Endpoint,

    /// Offline-mode username.
    pub username: String,

    /// Wait after joining before auto-starting mining, so chunks arrive.
    pub world_load_delay: Duration,

    /// Pause after the farewell chat before the connection is closed.
    pub farewell_grace: Duration,

    /// Start mining once after the first join without waiting for `!mine`.
    pub auto_mine: bool,

    pub negotiation: NegotiationConfig,
    pub mining: MiningConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::new("localhost", Endpoint::DEFAULT_PORT),
            username: "MINER".to_string(),
            world_load_delay: Duration::from_secs(2),
            farewell_grace: Duration::from_secs(1),
            auto_mine: true,
            negotiation: NegotiationConfig::default(),
            mining: MiningConfig::default(),
        }
    }
}

impl BotConfig {
    /// Fix out-of-range values so the config is safe to use.
    ///
    /// - an empty username falls back to the default;
    /// - usernames are cut to [`MAX_USERNAME_LEN`] characters;
    /// - sub-configs are validated.
    pub fn validated(mut self) -> Self {
        let trimmed = self.username.trim();
        if trimmed.is_empty() {
            tracing::warn!("empty username, using default");
            self.username = Self::default().username;
        } else if trimmed.chars().count() > MAX_USERNAME_LEN {
            let cut: String = trimmed.chars().take(MAX_USERNAME_LEN).collect();
            tracing::warn!(requested = trimmed, using = %cut, "username too long, truncating");
            self.username = cut;
        } else {
            self.username = trimmed.to_string();
        }
        self.negotiation = self.negotiation.validated();
        self.mining = self.mining.validated();
        self
    }
}
