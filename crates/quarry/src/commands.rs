//! Chat commands and the tasks that carry them out.
//!
//! Any chat line containing one of the command words triggers it. Words
//! are split on whitespace and matched whole after lowercasing, so
//! `"hey !MINE please"` mines but `"!mine,"` does nothing.
//!
//! Commands run as tasks on a [`JoinSet`] owned by the
//! [`CommandDispatcher`], so the event loop never waits on them (the stop
//! command sleeps through its farewell grace period).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use quarry_mining::{ActionSink, MiningStateMachine, send_logged};
use quarry_protocol::OutboundAction;
use tokio::task::{JoinError, JoinSet};

use crate::session::{SessionEnd, ShutdownSignal};

/// Chat sent before disconnecting on `!stop`.
pub const FAREWELL_MESSAGE: &str = "Goodbye!";

/// Chat sent on `!me`.
pub const FOLLOW_MESSAGE: &str = "Moving to you!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Stop mining, say goodbye and leave.
    Stop,
    /// Start mining, or restart with fresh durability.
    Mine,
    /// Acknowledge a follow request. Movement is not implemented.
    Me,
}

impl Command {
    pub fn word(self) -> &'static str {
        match self {
            Self::Stop => "!stop",
            Self::Mine => "!mine",
            Self::Me => "!me",
        }
    }

    fn from_word(word: &str) -> Option<Self> {
        match word {
            "!stop" => Some(Self::Stop),
            "!mine" => Some(Self::Mine),
            "!me" => Some(Self::Me),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.word())
    }
}

/// First command word in `text`, if any.
pub fn classify(text: &str) -> Option<Command> {
    text.to_lowercase()
        .split_whitespace()
        .find_map(Command::from_word)
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// What a command task needs. Cloned into each task.
pub(crate) struct CommandContext<A: ActionSink> {
    pub(crate) machine: Arc<MiningStateMachine<A>>,
    pub(crate) sink: Arc<A>,
    pub(crate) shutdown: ShutdownSignal,
    pub(crate) farewell_grace: Duration,
}

impl<A: ActionSink> Clone for CommandContext<A> {
    fn clone(&self) -> Self {
        Self {
            machine: Arc::clone(&self.machine),
            sink: Arc::clone(&self.sink),
            shutdown: self.shutdown.clone(),
            farewell_grace: self.farewell_grace,
        }
    }
}

impl<A: ActionSink> CommandContext<A> {
    async fn execute(self, command: Command) {
        match command {
            Command::Stop => {
                tracing::info!("stop command received");
                self.machine.request_stop().await;
                send_logged(
                    self.sink.as_ref(),
                    OutboundAction::Chat(FAREWELL_MESSAGE.to_string()),
                )
                .await;
                tokio::time::sleep(self.farewell_grace).await;
                self.shutdown.trigger(SessionEnd::Stopped);
            }
            Command::Mine => {
                self.machine.activate().await;
            }
            Command::Me => {
                send_logged(
                    self.sink.as_ref(),
                    OutboundAction::Chat(FOLLOW_MESSAGE.to_string()),
                )
                .await;
                tracing::info!("follow requested; needs player tracking and pathfinding, not moving");
            }
        }
    }
}

/// Runs commands off the event loop and keeps track of them.
pub struct CommandDispatcher<A: ActionSink> {
    ctx: CommandContext<A>,
    tasks: JoinSet<()>,
}

impl<A: ActionSink> CommandDispatcher<A> {
    pub(crate) fn new(ctx: CommandContext<A>) -> Self {
        Self {
            ctx,
            tasks: JoinSet::new(),
        }
    }

    /// Starts `command` in its own task.
    pub fn dispatch(&mut self, command: Command) {
        tracing::debug!(%command, "dispatching");
        let ctx = self.ctx.clone();
        self.tasks.spawn(ctx.execute(command));
        self.reap();
    }

    /// Classifies a chat line and dispatches its command, if any.
    pub fn handle_chat(&mut self, text: &str) -> Option<Command> {
        let command = classify(text)?;
        self.dispatch(command);
        Some(command)
    }

    /// Activates mining after `delay`, unless the session shuts down first.
    pub fn activate_after(&mut self, delay: Duration) {
        let ctx = self.ctx.clone();
        self.tasks.spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {
                    ctx.machine.activate().await;
                }
                _ = ctx.shutdown.wait() => {
                    tracing::debug!("shutdown before automatic mining start");
                }
            }
        });
        self.reap();
    }

    /// Tasks started and not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            log_join_error(result);
        }
    }

    /// Waits for every command task to finish.
    pub async fn drain(&mut self) {
        while let Some(result) = self.tasks.join_next().await {
            log_join_error(result);
        }
    }

    /// Cancels every command task and waits for them to exit.
    ///
    /// A command that was dispatched but never got to run is dropped, so
    /// a late `!mine` cannot restart mining once the session is over.
    pub async fn shutdown(&mut self) {
        let pending = self.tasks.len();
        if pending > 0 {
            tracing::debug!(pending, "cancelling command tasks");
        }
        self.tasks.abort_all();
        self.drain().await;
    }
}

fn log_join_error(result: Result<(), JoinError>) {
    match result {
        Err(e) if !e.is_cancelled() => tracing::error!(error = %e, "command task failed"),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_exact_words() {
        assert_eq!(classify("!stop"), Some(Command::Stop));
        assert_eq!(classify("!mine"), Some(Command::Mine));
        assert_eq!(classify("!me"), Some(Command::Me));
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        assert_eq!(classify("hey bot !MINE now"), Some(Command::Mine));
        assert_eq!(classify("<Steve> !Stop"), Some(Command::Stop));
    }

    #[test]
    fn test_classify_partial_words_do_not_match() {
        assert_eq!(classify("!mine,"), None);
        assert_eq!(classify("!mines"), None);
        assert_eq!(classify("mine"), None);
        assert_eq!(classify("!meow"), None);
        assert_eq!(classify(""), None);
    }

    #[test]
    fn test_classify_first_command_wins() {
        assert_eq!(classify("!me then !stop"), Some(Command::Me));
        assert_eq!(classify("!stop !mine"), Some(Command::Stop));
    }

    #[test]
    fn test_classify_word_inside_sentence() {
        assert_eq!(classify("hey !mine please"), Some(Command::Mine));
        assert_eq!(classify("my diamond is mineral"), None);
    }

    #[test]
    fn test_command_display_is_word() {
        assert_eq!(Command::Stop.to_string(), "!stop");
    }
}
