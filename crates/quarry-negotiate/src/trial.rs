//! One candidate, one connection attempt.
//!
//! Quarry doesn't open sockets in this crate. It defines two traits for
//! the network primitives negotiation needs:
//!
//! - [`Pinger`]: the status ping that reports the server's version;
//! - [`Connector`]: connect and log in at a given protocol number.
//!
//! The live client implements both over TCP. Tests implement them with
//! scripted answers, so every negotiation path runs without a server.
//!
//! # Why the version is a parameter
//!
//! Which protocol number the client speaks is a runtime value held in
//! [`ActiveVersion`]. A trial sets it, connects with it, and classifies
//! what happened. Nothing is rebuilt or patched between trials.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use quarry_protocol::{Endpoint, PROTOCOL_VERSION, ServerStatus};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

/// Why a status ping produced nothing.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PingError {
    #[error("server unreachable: {0}")]
    Unreachable(String),
}

/// Sends a status ping and returns the parsed answer.
///
/// # Trait bounds
///
/// - `Send + Sync + 'static` so a pinger can live inside a controller that
///   moves between tasks.
/// - The returned future is `Send` so callers may `tokio::spawn` it.
pub trait Pinger: Send + Sync + 'static {
    fn ping(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<ServerStatus, PingError>> + Send;
}

/// How a connect-and-join attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    /// The server said our protocol version is wrong.
    #[error("incompatible version: {0}")]
    IncompatibleVersion(String),

    /// The TCP connection could not be established or was reset.
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// The TCP connection was not established in time.
    #[error("connect timed out")]
    Timeout,

    /// The server refused us for a reason unrelated to the version
    /// (whitelist, ban, full, online mode).
    #[error("rejected: {0}")]
    Rejected(String),

    /// The server answered with something we could not interpret.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Connects to `endpoint` speaking protocol `version` and logs in.
///
/// Returns `Ok(())` once the server has accepted the login.
pub trait Connector: Send + Sync + 'static {
    fn connect_and_join(
        &self,
        endpoint: &Endpoint,
        version: i32,
    ) -> impl Future<Output = Result<(), ConnectError>> + Send;
}

// ---------------------------------------------------------------------------
// ActiveVersion
// ---------------------------------------------------------------------------

/// The protocol number the client currently speaks.
///
/// Cloning shares the value: every clone sees every `set`.
#[derive(Debug, Clone)]
pub struct ActiveVersion(Arc<AtomicI32>);

impl ActiveVersion {
    pub fn new(version: i32) -> Self {
        Self(Arc::new(AtomicI32::new(version)))
    }

    pub fn get(&self) -> i32 {
        self.0.load(Ordering::Acquire)
    }

    /// Sets the version and returns the previous one.
    pub fn set(&self, version: i32) -> i32 {
        self.0.swap(version, Ordering::AcqRel)
    }
}

impl Default for ActiveVersion {
    fn default() -> Self {
        Self::new(PROTOCOL_VERSION)
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Classified result of one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialOutcome {
    /// The server accepted the login.
    Success,
    /// The server rejected our version.
    IncompatibleClient,
    /// No usable connection.
    ConnectionError,
    /// Anything else within the trial window. Not fatal, but worth a look:
    /// it may be a response we fail to classify.
    Unknown,
}

impl TrialOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl std::fmt::Display for TrialOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "Success"),
            Self::IncompatibleClient => write!(f, "IncompatibleClient"),
            Self::ConnectionError => write!(f, "ConnectionError"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

// ---------------------------------------------------------------------------
// HandshakeTrialRunner
// ---------------------------------------------------------------------------

/// Runs one candidate at a time against a server.
///
/// Not reentrant: `attempt` takes `&mut self`, and it mutates the shared
/// [`ActiveVersion`] for the duration of the attempt.
pub struct HandshakeTrialRunner<C: Connector> {
    connector: C,
    endpoint: Endpoint,
    active: ActiveVersion,
    trial_timeout: Duration,
}

impl<C: Connector> HandshakeTrialRunner<C> {
    pub fn new(
        connector: C,
        endpoint: Endpoint,
        active: ActiveVersion,
        trial_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            endpoint,
            active,
            trial_timeout,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Applies `candidate`, connects, and classifies the result.
    ///
    /// Never fails: every expected failure is a [`TrialOutcome`]. The
    /// active version is left at `candidate`; restoring it is up to the
    /// caller.
    pub async fn attempt(&mut self, candidate: i32) -> TrialOutcome {
        let previous = self.active.set(candidate);
        tracing::debug!(candidate, previous, "active protocol version applied");

        let result = tokio::time::timeout(
            self.trial_timeout,
            self.connector.connect_and_join(&self.endpoint, candidate),
        )
        .await;

        let (outcome, detail) = match result {
            Ok(Ok(())) => (TrialOutcome::Success, None),
            Ok(Err(ConnectError::IncompatibleVersion(reason))) => {
                (TrialOutcome::IncompatibleClient, Some(reason))
            }
            Ok(Err(e @ (ConnectError::ConnectionError(_) | ConnectError::Timeout))) => {
                (TrialOutcome::ConnectionError, Some(e.to_string()))
            }
            Ok(Err(e @ (ConnectError::Rejected(_) | ConnectError::Protocol(_)))) => {
                (TrialOutcome::Unknown, Some(e.to_string()))
            }
            Err(_) => (
                TrialOutcome::Unknown,
                Some(format!(
                    "no classifiable response within {}s",
                    self.trial_timeout.as_secs_f64()
                )),
            ),
        };

        let detail = detail.unwrap_or_default();
        match outcome {
            TrialOutcome::Success => {
                tracing::info!(candidate, %outcome, "trial classified");
            }
            TrialOutcome::Unknown => {
                tracing::warn!(
                    candidate,
                    %outcome,
                    %detail,
                    "trial outcome could not be classified, moving on"
                );
            }
            _ => {
                tracing::info!(candidate, %outcome, %detail, "trial classified");
            }
        }
        outcome
    }
}
