//! Error types for the mining layer.

/// Errors that can occur during mining.
#[derive(Debug, thiserror::Error)]
pub enum MiningError {
    /// Session fields outside their legal range. Only reachable through a
    /// locking bug; callers treat it as fatal.
    #[error("mining session state corrupted: {0}")]
    StateCorruption(String),
}

/// An outbound action could not be written.
///
/// Never fatal to the mining loop: the tick that produced it logs and
/// carries on.
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to send {action}: {reason}")]
pub struct SendFailure {
    /// Short label of the action, e.g. `"dig"`.
    pub action: &'static str,
    pub reason: String,
}
