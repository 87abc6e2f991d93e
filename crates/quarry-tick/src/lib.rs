//! Fixed-period session clock for Quarry.
//!
//! A [`SessionClock`] emits numbered ticks at a fixed period (50 ms, the
//! game's nominal step) with budget monitoring and overrun handling. It is
//! a push clock: it does not wait for the consumer to finish a tick before
//! scheduling the next one, but it never hands out tick N+1 before tick N.
//!
//! # Cancellation
//!
//! Every clock has a [`ClockHandle`]. Once [`ClockHandle::stop`] returns,
//! no further tick is delivered: a pending [`SessionClock::wait_for_tick`]
//! resolves to `None`, and so does every later call.
//!
//! ```ignore
//! let mut clock = SessionClock::new(TickConfig::default());
//! let handle = clock.handle();
//! tokio::spawn(async move {
//!     while let Some(tick) = clock.wait_for_tick().await {
//!         run_tick(tick);
//!         clock.record_tick_end();
//!     }
//! });
//! // later, from any task
//! handle.stop();
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when the consumer falls behind the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickPolicy {
    /// Skip the missed tick(s) and schedule the next one from now.
    #[default]
    Skip,
    /// Keep the original cadence. The next tick fires at its originally
    /// scheduled time, possibly immediately.
    Drop,
}

/// Full configuration for the session clock.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Time between ticks. Default: 50 ms.
    pub period: Duration,
    /// Overrun handling policy.
    pub policy: TickPolicy,
    /// Budget warning threshold (0.0 to 1.0). Default: 0.80.
    /// A tracing warning is emitted when a tick's work takes more than
    /// this fraction of the period.
    pub budget_warn_threshold: f64,
    /// Budget critical threshold (0.0 to 1.0). Default: 1.0.
    pub budget_critical_threshold: f64,
    /// Enable per-tick timing metrics.
    pub metrics_enabled: bool,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            period: Self::DEFAULT_PERIOD,
            policy: TickPolicy::default(),
            budget_warn_threshold: 0.80,
            budget_critical_threshold: 1.0,
            metrics_enabled: true,
        }
    }
}

impl TickConfig {
    /// The game's nominal step: 20 ticks per second.
    pub const DEFAULT_PERIOD: Duration = Duration::from_millis(50);

    /// Config for a specific period with default settings.
    pub fn with_period(period: Duration) -> Self {
        Self {
            period,
            ..Default::default()
        }
    }

    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`SessionClock::new`]. Rules:
    /// - a zero `period` falls back to [`Self::DEFAULT_PERIOD`];
    /// - thresholds are clamped to `0.0..=1.0`;
    /// - `budget_warn_threshold` is forced to at most `budget_critical_threshold`.
    pub fn validated(mut self) -> Self {
        if self.period.is_zero() {
            warn!("tick period is zero, using default");
            self.period = Self::DEFAULT_PERIOD;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self.budget_critical_threshold = self.budget_critical_threshold.clamp(0.0, 1.0);
        if self.budget_warn_threshold > self.budget_critical_threshold {
            self.budget_warn_threshold = self.budget_critical_threshold;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Tick info (returned to caller each tick)
// ---------------------------------------------------------------------------

/// Information about a delivered tick.
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// Fixed delta time for this tick (always the configured period).
    pub dt: Duration,
    /// `true` if this tick fired late.
    pub overrun: bool,
    /// How many periods were skipped due to overrun (0 in normal operation).
    pub ticks_skipped: u64,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Runtime metrics for the clock.
///
/// Timing values refer to the consumer's work as reported via
/// [`SessionClock::record_tick_end`].
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    /// Total ticks delivered.
    pub total_ticks: u64,
    /// Total overruns detected.
    pub total_overruns: u64,
    /// Total periods skipped.
    pub total_skipped: u64,
    /// Exponential moving average of tick work time (alpha = 0.1).
    pub avg_tick_time: Duration,
    /// Maximum tick work time observed.
    pub max_tick_time: Duration,
    /// Last budget utilization (>1.0 means the work overran the period).
    pub budget_utilization: f64,
}

// ---------------------------------------------------------------------------
// ClockHandle
// ---------------------------------------------------------------------------

/// Cloneable stop switch for a [`SessionClock`].
#[derive(Debug, Clone)]
pub struct ClockHandle {
    stop_tx: Arc<watch::Sender<bool>>,
}

impl ClockHandle {
    /// Stops the clock. Idempotent.
    ///
    /// When this returns, the clock will not deliver another tick.
    pub fn stop(&self) {
        let was_stopped = self.stop_tx.send_replace(true);
        if !was_stopped {
            debug!("session clock stopped");
        }
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }
}

// ---------------------------------------------------------------------------
// SessionClock
// ---------------------------------------------------------------------------

/// Fixed-period tick source. One per mining activation.
pub struct SessionClock {
    config: TickConfig,
    tick_count: u64,
    /// When the next tick should fire (Tokio instant for `sleep_until`).
    next_tick: TokioInstant,
    /// Wall-clock instant when the last tick was delivered.
    /// Set by `wait_for_tick`, consumed by `record_tick_end`.
    tick_start: Option<Instant>,
    handle: ClockHandle,
    stop_rx: watch::Receiver<bool>,
    metrics: TickMetrics,
}

impl SessionClock {
    /// Creates a clock whose first tick is one period from now.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let (stop_tx, stop_rx) = watch::channel(false);

        debug!(
            period_ms = config.period.as_secs_f64() * 1000.0,
            policy = ?config.policy,
            "session clock created"
        );

        Self {
            next_tick: TokioInstant::now() + config.period,
            config,
            tick_count: 0,
            tick_start: None,
            handle: ClockHandle {
                stop_tx: Arc::new(stop_tx),
            },
            stop_rx,
            metrics: TickMetrics::default(),
        }
    }

    /// Clock with the given period and default settings.
    pub fn with_period(period: Duration) -> Self {
        Self::new(TickConfig::with_period(period))
    }

    /// A handle that can stop this clock from another task.
    pub fn handle(&self) -> ClockHandle {
        self.handle.clone()
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// Waits until the next tick is due.
    ///
    /// Returns `None` once the clock has been stopped, including when the
    /// stop happens while this call is waiting.
    pub async fn wait_for_tick(&mut self) -> Option<TickInfo> {
        if self.is_stopped() {
            return None;
        }

        let next = self.next_tick;
        tokio::select! {
            biased;
            _ = self.stop_rx.wait_for(|stopped| *stopped) => return None,
            _ = time::sleep_until(next) => {}
        }

        // A stop that raced with the timer wins.
        if self.is_stopped() {
            return None;
        }

        let period = self.config.period;
        let now = TokioInstant::now();
        self.tick_count += 1;
        self.tick_start = Some(Instant::now());

        let late_by = now.saturating_duration_since(next);
        let overrun = late_by > period / 10;
        let mut ticks_skipped = 0u64;

        self.next_tick = match self.config.policy {
            TickPolicy::Skip => {
                if overrun {
                    ticks_skipped = (late_by.as_nanos() / period.as_nanos()) as u64;
                    if ticks_skipped > 0 {
                        warn!(
                            tick = self.tick_count,
                            skipped = ticks_skipped,
                            late_ms = late_by.as_secs_f64() * 1000.0,
                            "tick overrun, skipping ahead"
                        );
                    }
                }
                now + period
            }
            TickPolicy::Drop => {
                if overrun {
                    warn!(
                        tick = self.tick_count,
                        late_ms = late_by.as_secs_f64() * 1000.0,
                        "tick overrun, keeping original schedule"
                    );
                }
                next + period
            }
        };

        if overrun {
            self.metrics.total_overruns += 1;
        }
        self.metrics.total_skipped += ticks_skipped;
        self.metrics.total_ticks += 1;

        trace!(tick = self.tick_count, overrun, "tick fired");

        Some(TickInfo {
            tick: self.tick_count,
            dt: period,
            overrun,
            ticks_skipped,
        })
    }

    /// Record that the work for the current tick has finished.
    ///
    /// Enables budget warnings and timing metrics. Without it those stay
    /// silent.
    pub fn record_tick_end(&mut self) {
        let Some(start) = self.tick_start.take() else {
            return;
        };
        let elapsed = start.elapsed();
        let budget = self.config.period;
        let utilization = elapsed.as_secs_f64() / budget.as_secs_f64();
        self.metrics.budget_utilization = utilization;

        if utilization >= self.config.budget_critical_threshold {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                budget_ms = budget.as_secs_f64() * 1000.0,
                "tick exceeded budget"
            );
        } else if utilization >= self.config.budget_warn_threshold {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                budget_ms = budget.as_secs_f64() * 1000.0,
                "tick approaching budget limit"
            );
        }

        if self.config.metrics_enabled {
            if elapsed > self.metrics.max_tick_time {
                self.metrics.max_tick_time = elapsed;
            }
            let alpha = 0.1;
            let prev = self.metrics.avg_tick_time.as_secs_f64();
            let curr = elapsed.as_secs_f64();
            self.metrics.avg_tick_time =
                Duration::from_secs_f64(prev * (1.0 - alpha) + curr * alpha);
        }
    }

    /// Ticks delivered so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn period(&self) -> Duration {
        self.config.period
    }

    /// Snapshot of current metrics.
    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }
}
