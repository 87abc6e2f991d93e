//! The mining session: the state every tick reads and writes.
//!
//! `MiningSession` is plain data plus the per-tick decision function. It
//! does no I/O and knows nothing about locks; [`MiningStateMachine`]
//! keeps it behind a single mutex and calls [`begin_tick`] with the lock
//! held. The side effects come back as a [`TickPlan`] that the caller
//! executes after releasing the lock.
//!
//! [`MiningStateMachine`]: crate::MiningStateMachine
//! [`begin_tick`]: MiningSession::begin_tick

use quarry_protocol::BlockPos;

use crate::{MiningConfig, MiningError, MiningState};

/// Full durability, in percent.
pub const MAX_DURABILITY: u8 = 100;

/// Identifies the tick task attached to a session.
///
/// Each new tick task gets a fresh id. A task whose id is no longer the
/// attached one gets no further ticks, so a replaced task can never act on
/// the new activation.
pub type RunnerId = u64;

// ---------------------------------------------------------------------------
// TickPlan
// ---------------------------------------------------------------------------

/// Side effects of one tick, in the order they must be performed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TickPlan {
    /// Tick number within the activation, starting at 1.
    pub tick: u64,
    /// Swing the arm.
    pub swing: bool,
    /// Finish a dig started `dig_hold_ticks` ago.
    pub finish_dig: Option<BlockPos>,
    /// Start digging this block.
    pub start_dig: Option<BlockPos>,
    /// Durability after this tick, if it changed.
    pub durability: Option<u8>,
    /// Send the break notice. Set on exactly one tick per activation.
    pub broke: bool,
}

impl TickPlan {
    /// The task should not wait for another tick after this one.
    pub fn is_last(&self) -> bool {
        self.broke
    }
}

// ---------------------------------------------------------------------------
// MiningSession
// ---------------------------------------------------------------------------

/// Mutable state of the current mining activation.
#[derive(Debug, Clone)]
pub struct MiningSession {
    state: MiningState,
    tick_count: u64,
    durability: u8,
    /// Inventory is not tracked, so this stays `None`.
    mining_item_slot: Option<u8>,
    stop_requested: bool,
    target: Option<BlockPos>,
    /// Tick at which the held dig finishes, and where.
    pending_finish: Option<(u64, BlockPos)>,
    runner: Option<RunnerId>,
    next_runner: RunnerId,
    activations: u64,
}

impl Default for MiningSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MiningSession {
    pub fn new() -> Self {
        Self {
            state: MiningState::Idle,
            tick_count: 0,
            durability: MAX_DURABILITY,
            mining_item_slot: None,
            stop_requested: false,
            target: None,
            pending_finish: None,
            runner: None,
            next_runner: 1,
            activations: 0,
        }
    }

    pub fn state(&self) -> MiningState {
        self.state
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn durability(&self) -> u8 {
        self.durability
    }

    pub fn mining_item_slot(&self) -> Option<u8> {
        self.mining_item_slot
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    pub fn target(&self) -> Option<BlockPos> {
        self.target
    }

    /// Number of times the session has been activated.
    pub fn activations(&self) -> u64 {
        self.activations
    }

    /// The tick task currently attached, if any.
    pub fn runner(&self) -> Option<RunnerId> {
        self.runner
    }

    fn transition(&mut self, next: MiningState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal mining transition {} -> {next}",
            self.state
        );
        tracing::debug!(from = %self.state, to = %next, "mining state transition");
        self.state = next;
    }

    /// Resets the session for a new activation aimed at `target`.
    ///
    /// Returns the id of a tick task to spawn, or `None` if the attached
    /// task keeps running and simply picks up the fresh state. A task is
    /// needed when none is attached, or when a stop has been requested
    /// (the attached task's clock is then stopped or about to be).
    pub fn activate(&mut self, target: BlockPos) -> Option<RunnerId> {
        let needs_runner = self.runner.is_none() || self.stop_requested;

        self.transition(MiningState::Activating);
        self.tick_count = 0;
        self.durability = MAX_DURABILITY;
        self.mining_item_slot = None;
        self.stop_requested = false;
        self.target = Some(target);
        self.pending_finish = None;
        self.activations += 1;

        if needs_runner {
            let id = self.next_runner;
            self.next_runner += 1;
            self.runner = Some(id);
            Some(id)
        } else {
            None
        }
    }

    /// Sets the stop flag. The next tick observes it.
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    /// Releases `runner` if it is still the attached task.
    ///
    /// Called by a tick task on its way out. A stopped activation is
    /// marked `Stopped` here if no tick observed the flag first.
    pub fn detach(&mut self, runner: RunnerId) {
        if self.runner != Some(runner) {
            return;
        }
        self.runner = None;
        if self.stop_requested && self.state.is_active() {
            self.transition(MiningState::Stopped);
        }
    }

    /// Decides everything that happens on one tick.
    ///
    /// Returns `None` when `runner` should stop consuming ticks: it is no
    /// longer the attached task, the stop flag is set, or the activation
    /// is over. Otherwise the returned plan lists this tick's side effects.
    ///
    /// Order within a tick: stop check, swing, due finish-dig, durability
    /// deduction, then start-dig or the break notice.
    pub fn begin_tick(&mut self, runner: RunnerId, config: &MiningConfig) -> Option<TickPlan> {
        if self.runner != Some(runner) {
            return None;
        }

        if self.stop_requested {
            if self.state.is_active() {
                self.transition(MiningState::Stopped);
            }
            self.runner = None;
            return None;
        }

        match self.state.next() {
            Some(next) if next != self.state => self.transition(next),
            Some(_) => {}
            None => {
                self.runner = None;
                return None;
            }
        }

        let previous_tick = self.tick_count;
        self.tick_count += 1;
        let tick = self.tick_count;
        let mut plan = TickPlan {
            tick,
            swing: tick % config.animation_interval == 0,
            ..Default::default()
        };

        if let Some((due, pos)) = self.pending_finish {
            if due <= tick {
                plan.finish_dig = Some(pos);
                self.pending_finish = None;
            }
        }

        if tick % config.durability_interval == 0 {
            self.durability = self.durability.saturating_sub(config.durability_step);
            plan.durability = Some(self.durability);

            if self.durability > 0 {
                if let Some(target) = self.target {
                    plan.start_dig = Some(target);
                    self.pending_finish = Some((tick + config.dig_hold_ticks, target));
                }
            } else {
                plan.broke = true;
                self.pending_finish = None;
                self.transition(MiningState::Exhausted);
                self.runner = None;
            }
        }

        if let Err(e) = self.check_invariants(previous_tick) {
            panic!("{e}");
        }
        Some(plan)
    }

    /// Verifies the ranges the locking discipline guarantees.
    pub fn check_invariants(&self, previous_tick: u64) -> Result<(), MiningError> {
        if self.durability > MAX_DURABILITY {
            return Err(MiningError::StateCorruption(format!(
                "durability {} outside 0..={MAX_DURABILITY}",
                self.durability
            )));
        }
        if self.tick_count < previous_tick {
            return Err(MiningError::StateCorruption(format!(
                "tick count went backwards: {previous_tick} -> {}",
                self.tick_count
            )));
        }
        Ok(())
    }
}
