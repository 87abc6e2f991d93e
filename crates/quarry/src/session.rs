//! Play-session event loop.
//!
//! The [`SessionController`] owns the receiving end of the game event
//! channel and reacts to each event in order:
//!
//! ```text
//!   Joined ───────→ auto-mine once, after the world-load delay
//!   Chat ─────────→ classify → CommandDispatcher
//!   Teleport ─────→ publish pose → confirm teleport
//!   Health ───────→ log
//!   Death ────────→ respawn
//!   Disconnected ─→ end (ConnectionLost)
//! ```
//!
//! The loop also ends on the [`ShutdownSignal`] (set by `!stop`) or the
//! interrupt future (SIGINT/SIGTERM). Either way mining is stopped and
//! every command task is awaited before [`run`](SessionController::run)
//! returns.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use quarry_mining::{ActionSink, MiningStateMachine, send_logged};
use quarry_protocol::{GameEvent, OutboundAction, PlayerPose};
use tokio::sync::{mpsc, watch};

use crate::BotConfig;
use crate::commands::{CommandContext, CommandDispatcher};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// A player sent `!stop`.
    Stopped,
    /// The process received SIGINT or SIGTERM.
    Interrupted,
    /// The server disconnected us or the socket dropped.
    ConnectionLost,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped by command"),
            Self::Interrupted => write!(f, "interrupted"),
            Self::ConnectionLost => write!(f, "connection lost"),
        }
    }
}

// ---------------------------------------------------------------------------
// ShutdownSignal
// ---------------------------------------------------------------------------

/// One-shot, first-writer-wins shutdown flag that tasks can await.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<Option<SessionEnd>>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Records `end` unless a reason is already set. Returns whether this
    /// call set it.
    pub fn trigger(&self, end: SessionEnd) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(end);
            true
        })
    }

    pub fn reason(&self) -> Option<SessionEnd> {
        *self.tx.borrow()
    }

    /// Resolves once a reason is set.
    pub async fn wait(&self) -> SessionEnd {
        let mut rx = self.tx.subscribe();
        rx.wait_for(|end| end.is_some())
            .await
            .ok()
            .and_then(|end| *end)
            .unwrap_or(SessionEnd::Interrupted)
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// SessionController
// ---------------------------------------------------------------------------

enum Step {
    End(SessionEnd),
    Interrupt,
    Event(Option<GameEvent>),
}

/// Drives one play session from join to disconnect.
pub struct SessionController<A: ActionSink> {
    sink: Arc<A>,
    machine: Arc<MiningStateMachine<A>>,
    dispatcher: CommandDispatcher<A>,
    events: mpsc::Receiver<GameEvent>,
    pose: watch::Sender<PlayerPose>,
    shutdown: ShutdownSignal,
    config: BotConfig,
    auto_started: bool,
}

impl<A: ActionSink> SessionController<A> {
    pub fn new(sink: Arc<A>, events: mpsc::Receiver<GameEvent>, config: BotConfig) -> Self {
        let (pose, pose_rx) = watch::channel(PlayerPose::default());
        let machine = Arc::new(MiningStateMachine::new(
            Arc::clone(&sink),
            config.mining.clone(),
            pose_rx,
        ));
        let shutdown = ShutdownSignal::new();
        let dispatcher = CommandDispatcher::new(CommandContext {
            machine: Arc::clone(&machine),
            sink: Arc::clone(&sink),
            shutdown: shutdown.clone(),
            farewell_grace: config.farewell_grace,
        });

        Self {
            sink,
            machine,
            dispatcher,
            events,
            pose,
            shutdown,
            config,
            auto_started: false,
        }
    }

    pub fn machine(&self) -> &Arc<MiningStateMachine<A>> {
        &self.machine
    }

    /// A handle that ends the session when triggered.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Processes events until the session ends, then shuts down in order:
    /// mining first, then command tasks.
    pub async fn run(mut self, interrupt: impl Future<Output = ()>) -> SessionEnd {
        tokio::pin!(interrupt);
        let shutdown = self.shutdown.clone();

        let end = loop {
            let step = tokio::select! {
                biased;
                end = shutdown.wait() => Step::End(end),
                () = &mut interrupt => Step::Interrupt,
                event = self.events.recv() => Step::Event(event),
            };

            match step {
                Step::End(end) => break end,
                Step::Interrupt => {
                    tracing::info!("interrupt received, shutting down");
                    self.shutdown.trigger(SessionEnd::Interrupted);
                    break self.shutdown.reason().unwrap_or(SessionEnd::Interrupted);
                }
                Step::Event(Some(event)) => self.handle_event(event).await,
                Step::Event(None) => {
                    tracing::warn!("event stream ended");
                    self.shutdown.trigger(SessionEnd::ConnectionLost);
                }
            }
        };

        // Commands first: a queued `!mine` must not outlive the machine.
        self.dispatcher.shutdown().await;
        self.machine.shutdown().await;
        tracing::info!(%end, "session ended");
        end
    }

    async fn handle_event(&mut self, event: GameEvent) {
        match event {
            GameEvent::Joined { entity_id } => {
                tracing::info!(entity_id, "joined the world");
                if self.config.auto_mine && !self.auto_started {
                    self.auto_started = true;
                    self.dispatcher.activate_after(self.config.world_load_delay);
                }
            }
            GameEvent::Chat(text) => {
                tracing::info!(%text, "chat");
                if let Some(command) = self.dispatcher.handle_chat(&text) {
                    tracing::info!(%command, "command received");
                }
            }
            GameEvent::Teleport { pose, teleport_id } => {
                tracing::debug!(
                    x = pose.x,
                    y = pose.y,
                    z = pose.z,
                    teleport_id,
                    "position synced"
                );
                self.pose.send_replace(pose);
                send_logged(self.sink.as_ref(), OutboundAction::ConfirmTeleport(teleport_id)).await;
            }
            GameEvent::Health {
                health,
                food,
                saturation,
            } => {
                tracing::info!(health, food, saturation, "health update");
            }
            GameEvent::Death { message } => {
                tracing::warn!(%message, "died, respawning");
                send_logged(self.sink.as_ref(), OutboundAction::Respawn).await;
            }
            GameEvent::Disconnected { reason } => {
                tracing::warn!(%reason, "disconnected");
                self.shutdown.trigger(SessionEnd::ConnectionLost);
            }
        }
    }
}
