//! Mining state machine: owns the session and drives it from the clock.
//!
//! Each activation that needs one gets a tick task: a Tokio task that
//! waits on its own [`SessionClock`], locks the session, asks it for a
//! [`TickPlan`], drops the lock and only then talks to the sink. No lock
//! is ever held across a send.
//!
//! ```text
//!   activate() ──lock──→ MiningSession::activate ──(new runner?)──→ spawn tick task
//!                                                                        │
//!   tick task: wait_for_tick ──lock──→ begin_tick ──unlock──→ execute plan ──┘
//!
//!   request_stop() ──lock──→ set stop flag, stop every clock ──unlock
//! ```

use std::sync::Arc;

use quarry_protocol::{BlockFace, BlockPos, DigStatus, OutboundAction, PlayerPose};
use quarry_tick::{ClockHandle, SessionClock, TickConfig};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::session::{RunnerId, TickPlan};
use crate::sink::send_logged;
use crate::{ActionSink, MiningConfig, MiningSession, MiningState};

/// The block mined for a given pose: one block along +Z from the feet.
///
/// Facing is ignored.
pub fn target_block(pose: &PlayerPose) -> BlockPos {
    pose.block().offset(0, 0, 1)
}

/// A copy of the session fields, for status output and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiningSnapshot {
    pub state: MiningState,
    pub tick_count: u64,
    pub durability: u8,
    pub target: Option<BlockPos>,
    pub activations: u64,
    pub stop_requested: bool,
}

struct TickTask {
    id: RunnerId,
    clock: ClockHandle,
    handle: JoinHandle<()>,
}

/// Runs mining activations against an [`ActionSink`].
///
/// Shared by reference (usually in an `Arc`) between the event loop and
/// command tasks. All methods take `&self`.
pub struct MiningStateMachine<A: ActionSink> {
    session: Arc<Mutex<MiningSession>>,
    sink: Arc<A>,
    config: Arc<MiningConfig>,
    pose: watch::Receiver<PlayerPose>,
    /// Tick tasks not yet reaped. Locked only for short pushes and drains.
    tasks: std::sync::Mutex<Vec<TickTask>>,
}

impl<A: ActionSink> MiningStateMachine<A> {
    /// `pose` is the latest player pose, published by the event loop.
    pub fn new(sink: Arc<A>, config: MiningConfig, pose: watch::Receiver<PlayerPose>) -> Self {
        Self {
            session: Arc::new(Mutex::new(MiningSession::new())),
            sink,
            config: Arc::new(config.validated()),
            pose,
            tasks: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &MiningConfig {
        &self.config
    }

    fn tasks(&self) -> std::sync::MutexGuard<'_, Vec<TickTask>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Starts a fresh activation, or resets the running one in place.
    ///
    /// Durability goes back to full, the tick count to zero, and the
    /// target is recomputed from the latest pose. Returns the target.
    pub async fn activate(&self) -> BlockPos {
        let pose = *self.pose.borrow();
        let target = target_block(&pose);

        {
            let mut session = self.session.lock().await;
            if let Some(id) = session.activate(target) {
                self.spawn_tick_task(id);
            }
            tracing::info!(
                %target,
                activation = session.activations(),
                "mining activated"
            );
        }

        send_logged(
            self.sink.as_ref(),
            OutboundAction::Chat(self.config.start_message.clone()),
        )
        .await;
        target
    }

    fn spawn_tick_task(&self, id: RunnerId) {
        let clock = SessionClock::new(TickConfig::with_period(self.config.tick_period));
        let clock_handle = clock.handle();
        let handle = tokio::spawn(run_ticks(
            id,
            clock,
            Arc::clone(&self.session),
            Arc::clone(&self.sink),
            Arc::clone(&self.config),
        ));

        let mut tasks = self.tasks();
        tasks.retain(|t| !t.handle.is_finished());
        tasks.push(TickTask {
            id,
            clock: clock_handle,
            handle,
        });
    }

    /// Sets the stop flag and stops every tick clock.
    ///
    /// A tick that begins after this returns performs no side effect. A
    /// tick whose plan was already taken may still finish sending it.
    ///
    /// Clocks are stopped while the session lock is held, so only tasks
    /// registered before the flag was set are affected. An `activate`
    /// that follows gets a clock of its own.
    pub async fn request_stop(&self) {
        let mut session = self.session.lock().await;
        session.request_stop();
        for task in self.tasks().iter() {
            task.clock.stop();
        }
        drop(session);
        tracing::info!("mining stop requested");
    }

    /// Stops mining and waits for every tick task to exit.
    pub async fn shutdown(&self) {
        self.request_stop().await;
        let tasks: Vec<TickTask> = self.tasks().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.handle.await {
                tracing::error!(runner = task.id, error = %e, "mining tick task failed");
            }
        }
    }

    /// Current session fields.
    pub async fn snapshot(&self) -> MiningSnapshot {
        let session = self.session.lock().await;
        MiningSnapshot {
            state: session.state(),
            tick_count: session.tick_count(),
            durability: session.durability(),
            target: session.target(),
            activations: session.activations(),
            stop_requested: session.stop_requested(),
        }
    }

    pub async fn state(&self) -> MiningState {
        self.session.lock().await.state()
    }
}

// ---------------------------------------------------------------------------
// Tick task
// ---------------------------------------------------------------------------

async fn run_ticks<A: ActionSink>(
    id: RunnerId,
    mut clock: SessionClock,
    session: Arc<Mutex<MiningSession>>,
    sink: Arc<A>,
    config: Arc<MiningConfig>,
) {
    tracing::debug!(runner = id, "mining tick task started");

    while clock.wait_for_tick().await.is_some() {
        let plan = session.lock().await.begin_tick(id, &config);
        let Some(plan) = plan else {
            break;
        };

        execute_plan(sink.as_ref(), &config, &plan).await;
        clock.record_tick_end();

        if plan.is_last() {
            break;
        }
    }

    session.lock().await.detach(id);
    tracing::debug!(runner = id, ticks = clock.tick_count(), "mining tick task finished");
}

async fn execute_plan<A: ActionSink>(sink: &A, config: &MiningConfig, plan: &TickPlan) {
    if plan.swing {
        send_logged(sink, OutboundAction::SwingArm).await;
    }

    if let Some(pos) = plan.finish_dig {
        send_logged(
            sink,
            OutboundAction::Dig {
                status: DigStatus::Finished,
                pos,
                face: BlockFace::default(),
            },
        )
        .await;
    }

    if let Some(durability) = plan.durability {
        tracing::info!(tick = plan.tick, durability, "tool durability decreased");
    }

    if let Some(pos) = plan.start_dig {
        tracing::debug!(tick = plan.tick, %pos, "digging");
        send_logged(
            sink,
            OutboundAction::Dig {
                status: DigStatus::Started,
                pos,
                face: BlockFace::default(),
            },
        )
        .await;
    }

    if plan.broke {
        tracing::info!(tick = plan.tick, "tool broke, mining finished");
        send_logged(sink, OutboundAction::Chat(config.break_message.clone())).await;
    }
}
