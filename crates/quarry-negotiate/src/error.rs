//! Error types for the negotiation layer.
//!
//! Individual candidate failures are not errors: they are classified as a
//! [`TrialOutcome`](crate::TrialOutcome), written to the ledger and
//! absorbed. Only running out of candidates, or losing the state files,
//! reaches the caller.

use std::fmt::Write as _;

/// Errors from the persisted negotiation state.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing a state file failed.
    #[error("state file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A state file exists but does not parse.
    #[error("state file is corrupt: {0}")]
    Serialization(String),
}

/// Errors that end a negotiation run.
#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    /// Every candidate failed. Any patched configuration has already been
    /// restored and no record was written.
    #[error("no protocol version accepted by {server} (tried {tried:?})")]
    Exhausted {
        server: String,
        /// What the status ping reported, if it answered.
        reported: Option<i32>,
        /// Every candidate that has failed, including ones skipped because
        /// an earlier interrupted run had already ruled them out.
        tried: Vec<i32>,
    },

    /// The record or ledger could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl NegotiationError {
    /// Human-readable next steps for the operator.
    pub fn remediation(&self) -> String {
        match self {
            Self::Exhausted {
                server,
                reported,
                tried,
            } => {
                let mut out = String::new();
                let _ = writeln!(out, "Negotiation with {server} failed: no candidate protocol version was accepted.");
                let list = tried
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                let _ = writeln!(out, "  Tried: {list}");
                match reported {
                    Some(v) => {
                        let _ = writeln!(out, "  The server reports protocol {v}.");
                        let _ = writeln!(
                            out,
                            "  Retry with a wider window, e.g. `negotiate --force --window 5`,"
                        );
                        let _ = writeln!(
                            out,
                            "  or name versions explicitly, e.g. `negotiate --force --candidates {v}`."
                        );
                    }
                    None => {
                        let _ = writeln!(out, "  The server did not answer a status ping.");
                        let _ = writeln!(
                            out,
                            "  Check the address, then retry with `negotiate --force --candidates <n,...>`."
                        );
                    }
                }
                out
            }
            Self::Store(e) => {
                format!("Negotiation state could not be used: {e}\n  Run `negotiate --clean` to reset it.\n")
            }
        }
    }
}
