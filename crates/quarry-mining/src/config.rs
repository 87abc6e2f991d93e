//! Mining configuration and state machine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// MiningConfig
// ---------------------------------------------------------------------------

/// Cadence and wear settings for a mining activation.
///
/// All intervals are counted in ticks of the session clock. With the
/// default 50 ms tick, the arm swings twice a second and the tool loses
/// durability every two seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningConfig {
    /// Period of the session clock driving the loop.
    pub tick_period: Duration,

    /// Swing the arm every this many ticks.
    pub animation_interval: u64,

    /// Deduct durability (and dig) every this many ticks. Must be a
    /// multiple of `animation_interval`.
    pub durability_interval: u64,

    /// Durability lost per deduction, in percentage points.
    pub durability_step: u8,

    /// Ticks between start-dig and finish-dig.
    pub dig_hold_ticks: u64,

    /// Chat line sent when an activation starts.
    pub start_message: String,

    /// Chat line sent once when the tool breaks.
    pub break_message: String,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(50),
            animation_interval: 10,
            durability_interval: 40,
            durability_step: 5,
            dig_hold_ticks: 10,
            start_message: "Starting mining simulation!".to_string(),
            break_message: "IT BROKEEEEE".to_string(),
        }
    }
}

impl MiningConfig {
    /// Fix out-of-range values so the config is safe to use.
    ///
    /// Rules:
    /// - zero intervals fall back to the defaults;
    /// - `durability_interval` is rounded up to a multiple of
    ///   `animation_interval`;
    /// - a zero `durability_step` becomes 1, otherwise the tool never breaks.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        if self.tick_period.is_zero() {
            tracing::warn!("mining tick period is zero, using default");
            self.tick_period = defaults.tick_period;
        }
        if self.animation_interval == 0 {
            self.animation_interval = defaults.animation_interval;
        }
        if self.durability_interval == 0 {
            self.durability_interval = defaults.durability_interval;
        }
        let rem = self.durability_interval % self.animation_interval;
        if rem != 0 {
            let fixed = self.durability_interval + (self.animation_interval - rem);
            tracing::warn!(
                requested = self.durability_interval,
                using = fixed,
                "durability interval is not a multiple of the animation interval"
            );
            self.durability_interval = fixed;
        }
        if self.durability_step == 0 {
            self.durability_step = 1;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// MiningState
// ---------------------------------------------------------------------------

/// The lifecycle state of a mining session.
///
/// ```text
///   Idle ──→ Activating ──→ Running ──┬──→ Exhausted ──┐
///                ↑             │      └──→ Stopped ────┤
///                │             └─(!mine)─┐             │
///                └───────────────────────┴──(!mine)────┘
/// ```
///
/// - **Idle**: never activated.
/// - **Activating**: freshly reset; the next tick moves it to Running.
/// - **Running**: consuming ticks.
/// - **Exhausted**: durability reached zero. The break notice has been
///   sent and ticks are no longer consumed.
/// - **Stopped**: the stop flag was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MiningState {
    #[default]
    Idle,
    Activating,
    Running,
    Exhausted,
    Stopped,
}

impl MiningState {
    /// Returns `true` while ticks should be consumed.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Activating | Self::Running)
    }

    /// Returns `true` for the end states of an activation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exhausted | Self::Stopped)
    }

    /// The state the next tick moves to when nothing special happens.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Activating => Some(Self::Running),
            Self::Running => Some(Self::Running),
            Self::Idle | Self::Exhausted | Self::Stopped => None,
        }
    }

    /// Returns `true` if moving to `target` is a legal transition.
    pub fn can_transition_to(self, target: Self) -> bool {
        match (self, target) {
            // Every state may be (re)activated.
            (_, Self::Activating) => true,
            (Self::Activating, Self::Running) => true,
            (Self::Activating | Self::Running, Self::Exhausted | Self::Stopped) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for MiningState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Activating => write!(f, "Activating"),
            Self::Running => write!(f, "Running"),
            Self::Exhausted => write!(f, "Exhausted"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}
