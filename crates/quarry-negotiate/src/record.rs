//! What negotiation writes down.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::TrialOutcome;

/// A confirmed protocol version for a server.
///
/// Only written after a trial succeeds. While it exists, non-forced runs
/// return it without touching the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationRecord {
    pub protocol_version: i32,
    /// Seconds since the Unix epoch.
    pub discovered_at: u64,
    /// Server the version was confirmed against. Informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

impl NegotiationRecord {
    /// A record stamped with the current time.
    pub fn new(protocol_version: i32, server: Option<String>) -> Self {
        let discovered_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self {
            protocol_version,
            discovered_at,
            server,
        }
    }
}

/// One line of the attempt ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptEntry {
    pub candidate: i32,
    pub outcome: TrialOutcome,
}
