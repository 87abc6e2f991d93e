//! The negotiation run: persisted record, probe, trials, verdict.
//!
//! ```text
//!   Idle ──→ CheckPersisted ──(record, not forced)──→ ShortCircuit ──→ Confirmed
//!                  │
//!                  └──(no record / forced)──→ Probing ──→ TrialRunning ─┬─→ Confirmed
//!                                                  ↑            │         │
//!                                                  └──(failed)──┘         └─→ Exhausted
//! ```
//!
//! Every classified trial is appended to the ledger before the next one
//! starts, so a crash mid-run loses at most the trial in flight. A later
//! non-forced run skips the candidates the ledger marks as failed.

use std::collections::HashSet;

use quarry_protocol::{Endpoint, PROTOCOL_VERSION};

use crate::candidates::{VersionProbe, build_candidates};
use crate::trial::{ActiveVersion, Connector, HandshakeTrialRunner, Pinger};
use crate::{
    AttemptEntry, NegotiationConfig, NegotiationError, NegotiationRecord, NegotiationStore,
    StoreError, TrialOutcome,
};

// ---------------------------------------------------------------------------
// State and outcome
// ---------------------------------------------------------------------------

/// Where a negotiation run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    CheckPersisted,
    /// A record exists and the run was not forced.
    ShortCircuit,
    Probing,
    TrialRunning { candidate: i32 },
    Confirmed { version: i32 },
    Exhausted,
}

impl std::fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::CheckPersisted => write!(f, "CheckPersisted"),
            Self::ShortCircuit => write!(f, "ShortCircuit"),
            Self::Probing => write!(f, "Probing"),
            Self::TrialRunning { candidate } => write!(f, "TrialRunning({candidate})"),
            Self::Confirmed { version } => write!(f, "Confirmed({version})"),
            Self::Exhausted => write!(f, "Exhausted"),
        }
    }
}

/// Where a confirmed version came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeSource {
    /// Read from the record; no trial ran.
    Persisted,
    /// Confirmed by a trial in this run.
    Discovered,
}

/// A successful negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiationOutcome {
    pub version: i32,
    pub source: OutcomeSource,
    /// Trials performed by this run. Zero when short-circuited.
    pub trials: usize,
}

// ---------------------------------------------------------------------------
// NegotiationController
// ---------------------------------------------------------------------------

/// Finds a protocol version the server accepts and remembers it.
///
/// Only one run may be active at a time: `run` and `clean` take
/// `&mut self`.
pub struct NegotiationController<P: Pinger, C: Connector, S: NegotiationStore> {
    probe: VersionProbe<P>,
    runner: HandshakeTrialRunner<C>,
    store: S,
    active: ActiveVersion,
    config: NegotiationConfig,
    state: NegotiationState,
}

impl<P: Pinger, C: Connector, S: NegotiationStore> NegotiationController<P, C, S> {
    pub fn new(
        pinger: P,
        connector: C,
        store: S,
        endpoint: Endpoint,
        active: ActiveVersion,
        config: NegotiationConfig,
    ) -> Self {
        let config = config.validated();
        let runner = HandshakeTrialRunner::new(
            connector,
            endpoint,
            active.clone(),
            config.trial_timeout,
        );
        Self {
            probe: VersionProbe::new(pinger),
            runner,
            store,
            active,
            config,
            state: NegotiationState::Idle,
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn active_version(&self) -> &ActiveVersion {
        &self.active
    }

    fn transition(&mut self, next: NegotiationState) {
        tracing::debug!(from = %self.state, to = %next, "negotiation state transition");
        self.state = next;
    }

    /// Runs negotiation.
    ///
    /// Without `force`, an existing record is returned as is and no trial
    /// runs. With `force`, the record is ignored, the ledger is cleared and
    /// every candidate is tried again.
    ///
    /// On success the active version is the confirmed one and a record has
    /// been written. On exhaustion the active version is what it was before
    /// the run and no record has been written.
    pub async fn run(&mut self, force: bool) -> Result<NegotiationOutcome, NegotiationError> {
        self.transition(NegotiationState::CheckPersisted);
        let server = self.runner.endpoint().to_string();

        if force {
            tracing::info!(%server, "forced negotiation, clearing attempt ledger");
            self.store.clear_ledger()?;
        } else if let Some(record) = self.store.load_record()? {
            return Ok(self.short_circuit(record, &server));
        }

        self.transition(NegotiationState::Probing);
        let endpoint = self.runner.endpoint().clone();
        let reported = self.probe.reported_version(&endpoint).await;
        let candidates = build_candidates(
            reported,
            &self.config.default_candidates,
            self.config.window_radius,
        );

        let ruled_out: HashSet<i32> = self
            .store
            .load_ledger()?
            .into_iter()
            .filter(|entry| !entry.outcome.is_success())
            .map(|entry| entry.candidate)
            .collect();
        if !ruled_out.is_empty() {
            tracing::info!(
                skipped = ruled_out.len(),
                "resuming from attempt ledger, skipping failed candidates"
            );
        }

        tracing::info!(%server, ?reported, ?candidates, "negotiation started");

        let original = self.active.get();
        let mut trials = 0;

        for &candidate in &candidates {
            if ruled_out.contains(&candidate) {
                tracing::debug!(candidate, "already failed in an earlier run, skipping");
                continue;
            }

            self.transition(NegotiationState::TrialRunning { candidate });
            let outcome = self.runner.attempt(candidate).await;
            trials += 1;
            let appended = self.store.append_attempt(&AttemptEntry { candidate, outcome });
            self.restore_on_error(original, appended)?;

            if outcome == TrialOutcome::Success {
                let saved = self
                    .store
                    .save_record(&NegotiationRecord::new(candidate, Some(server.clone())));
                self.restore_on_error(original, saved)?;
                self.transition(NegotiationState::Confirmed { version: candidate });
                tracing::info!(%server, version = candidate, trials, "protocol version confirmed");
                return Ok(NegotiationOutcome {
                    version: candidate,
                    source: OutcomeSource::Discovered,
                    trials,
                });
            }
        }

        // Nothing worked: put the active version back and start fresh next time.
        self.active.set(original);
        self.store.clear_ledger()?;
        self.transition(NegotiationState::Exhausted);
        tracing::error!(%server, ?reported, trials, "no candidate protocol version accepted");

        Err(NegotiationError::Exhausted {
            server,
            reported,
            tried: candidates,
        })
    }

    /// Puts the active version back to `original` if a state write failed.
    fn restore_on_error(
        &self,
        original: i32,
        result: Result<(), StoreError>,
    ) -> Result<(), NegotiationError> {
        result.map_err(|e| {
            self.active.set(original);
            tracing::error!(
                error = %e,
                version = original,
                "negotiation state write failed, active version restored"
            );
            NegotiationError::Store(e)
        })
    }

    fn short_circuit(&mut self, record: NegotiationRecord, server: &str) -> NegotiationOutcome {
        self.transition(NegotiationState::ShortCircuit);

        if let Some(recorded) = record.server.as_deref().filter(|r| *r != server) {
            tracing::warn!(
                recorded,
                server,
                "stored protocol version was confirmed against a different server, \
                 run `negotiate --force` if the connection fails"
            );
        }

        self.active.set(record.protocol_version);
        self.transition(NegotiationState::Confirmed {
            version: record.protocol_version,
        });
        tracing::info!(
            version = record.protocol_version,
            discovered_at = record.discovered_at,
            "using stored protocol version"
        );
        NegotiationOutcome {
            version: record.protocol_version,
            source: OutcomeSource::Persisted,
            trials: 0,
        }
    }

    /// Forgets everything negotiation has learned.
    ///
    /// Deletes the record and the ledger and puts the active version back to
    /// the built-in default.
    pub fn clean(&mut self) -> Result<(), NegotiationError> {
        self.store.delete_record()?;
        self.store.clear_ledger()?;
        let previous = self.active.set(PROTOCOL_VERSION);
        self.transition(NegotiationState::Idle);
        tracing::info!(previous, default = PROTOCOL_VERSION, "negotiation state cleaned");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use crate::trial::{ConnectError, PingError};
    use quarry_protocol::ServerStatus;

    struct SilentPinger;

    impl Pinger for SilentPinger {
        async fn ping(&self, _endpoint: &Endpoint) -> Result<ServerStatus, PingError> {
            Err(PingError::Unreachable("no route".into()))
        }
    }

    struct AcceptOnly(i32);

    impl Connector for AcceptOnly {
        async fn connect_and_join(&self, _endpoint: &Endpoint, version: i32) -> Result<(), ConnectError> {
            if version == self.0 {
                Ok(())
            } else {
                Err(ConnectError::IncompatibleVersion("Outdated client!".into()))
            }
        }
    }

    fn controller(accept: i32) -> NegotiationController<SilentPinger, AcceptOnly, MemoryStore> {
        NegotiationController::new(
            SilentPinger,
            AcceptOnly(accept),
            MemoryStore::new(),
            Endpoint::new("localhost", 25565),
            ActiveVersion::default(),
            NegotiationConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_run_walks_defaults_until_accepted() {
        let mut c = controller(769);
        let outcome = c.run(false).await.unwrap();
        assert_eq!(outcome.version, 769);
        assert_eq!(outcome.source, OutcomeSource::Discovered);
        // 767, 768, 766, 769
        assert_eq!(outcome.trials, 4);
        assert_eq!(c.state(), NegotiationState::Confirmed { version: 769 });
        assert_eq!(c.active_version().get(), 769);
    }

    #[tokio::test]
    async fn test_clean_resets_to_idle_and_default_version() {
        let mut c = controller(770);
        c.run(false).await.unwrap();
        c.clean().unwrap();
        assert_eq!(c.state(), NegotiationState::Idle);
        assert_eq!(c.active_version().get(), PROTOCOL_VERSION);
        assert!(c.store().load_record().unwrap().is_none());
        assert!(c.store().load_ledger().unwrap().is_empty());
    }

    #[test]
    fn test_negotiation_state_display() {
        assert_eq!(
            NegotiationState::TrialRunning { candidate: 767 }.to_string(),
            "TrialRunning(767)"
        );
        assert_eq!(NegotiationState::Exhausted.to_string(), "Exhausted");
    }
}
