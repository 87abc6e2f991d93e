//! The `ActionSink` trait: where mining side effects go.
//!
//! The state machine never touches a socket. Everything it wants the
//! server to see (swings, digs, chat) is handed to an [`ActionSink`]. The
//! live client implements it by encoding and writing a packet; tests
//! implement it by recording the actions.

use std::future::Future;
use std::sync::Arc;

use quarry_protocol::OutboundAction;

use crate::SendFailure;

/// Fire-and-forget delivery of outbound actions.
///
/// # Trait bounds
///
/// - `Send + Sync + 'static` because the sink is shared between the tick
///   task and command tasks.
/// - The returned future is `Send` so it can be awaited inside a spawned
///   task.
pub trait ActionSink: Send + Sync + 'static {
    /// Delivers one action. A failure is reported, but the caller decides
    /// whether it matters.
    fn send(&self, action: OutboundAction) -> impl Future<Output = Result<(), SendFailure>> + Send;
}

impl<T: ActionSink> ActionSink for Arc<T> {
    fn send(&self, action: OutboundAction) -> impl Future<Output = Result<(), SendFailure>> + Send {
        (**self).send(action)
    }
}

/// Sends `action` and logs a failure at `warn`.
///
/// Returns `true` if the action went out.
pub async fn send_logged<A: ActionSink>(sink: &A, action: OutboundAction) -> bool {
    let kind = action.kind();
    match sink.send(action).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(action = kind, error = %e, "outbound action not sent, continuing");
            false
        }
    }
}
