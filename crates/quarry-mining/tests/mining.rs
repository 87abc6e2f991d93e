//! Integration tests for the mining state machine using a recording sink.
//!
//! Clock-driven tests run with paused Tokio time: a 50 ms tick period and
//! `sleep` are exact, so tick N has been processed at `N * 50ms`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use quarry_mining::{
    ActionSink, MAX_DURABILITY, MiningConfig, MiningState, MiningStateMachine, SendFailure,
};
use quarry_protocol::{BlockPos, DigStatus, OutboundAction, PlayerPose};
use rand::Rng;
use tokio::sync::watch;

// =========================================================================
// Recording sink
// =========================================================================

#[derive(Default)]
struct RecordingSink {
    actions: Mutex<Vec<OutboundAction>>,
    fail: bool,
}

impl RecordingSink {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn actions(&self) -> Vec<OutboundAction> {
        self.actions.lock().unwrap().clone()
    }

    fn count(&self, pred: impl Fn(&OutboundAction) -> bool) -> usize {
        self.actions.lock().unwrap().iter().filter(|a| pred(a)).count()
    }

    fn chats(&self, text: &str) -> usize {
        self.count(|a| matches!(a, OutboundAction::Chat(t) if t == text))
    }
}

impl ActionSink for RecordingSink {
    async fn send(&self, action: OutboundAction) -> Result<(), SendFailure> {
        if self.fail {
            return Err(SendFailure {
                action: action.kind(),
                reason: "broken pipe".into(),
            });
        }
        self.actions.lock().unwrap().push(action);
        Ok(())
    }
}

fn is_dig(status: DigStatus) -> impl Fn(&OutboundAction) -> bool {
    move |a| matches!(a, OutboundAction::Dig { status: s, .. } if *s == status)
}

fn machine(
    sink: Arc<RecordingSink>,
    pose: PlayerPose,
) -> (MiningStateMachine<RecordingSink>, watch::Sender<PlayerPose>) {
    let (tx, rx) = watch::channel(pose);
    (MiningStateMachine::new(sink, MiningConfig::default(), rx), tx)
}

fn pose(x: f64, y: f64, z: f64) -> PlayerPose {
    PlayerPose {
        x,
        y,
        z,
        ..Default::default()
    }
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// =========================================================================
// Activation and the durability trace
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_activate_announces_and_targets_block_ahead() {
    let sink = Arc::new(RecordingSink::default());
    let (m, _pose_tx) = machine(sink.clone(), pose(0.5, 70.0, 12.9));

    let target = m.activate().await;

    assert_eq!(target, BlockPos::new(0, 70, 13));
    assert_eq!(sink.chats("Starting mining simulation!"), 1);
    let snap = m.snapshot().await;
    assert_eq!(snap.state, MiningState::Activating);
    assert_eq!(snap.durability, MAX_DURABILITY);
    assert_eq!(snap.target, Some(target));
}

#[tokio::test(start_paused = true)]
async fn test_activate_uses_latest_published_pose() {
    let sink = Arc::new(RecordingSink::default());
    let (m, pose_tx) = machine(sink, PlayerPose::default());

    pose_tx.send_replace(pose(-1.5, 64.0, -0.2));

    assert_eq!(m.activate().await, BlockPos::new(-2, 64, 0));
}

#[tokio::test(start_paused = true)]
async fn test_tick_loop_durability_trace_breaks_exactly_once() {
    let sink = Arc::new(RecordingSink::default());
    let (m, _pose_tx) = machine(sink.clone(), pose(0.0, 64.0, 0.0));
    m.activate().await;

    sleep_ms(2_010).await;
    let snap = m.snapshot().await;
    assert_eq!(snap.tick_count, 40);
    assert_eq!(snap.durability, 95);
    assert_eq!(snap.state, MiningState::Running);

    sleep_ms(2_000).await;
    assert_eq!(m.snapshot().await.durability, 90);

    // Tick 800 is the 20th durability interval.
    sleep_ms(36_000).await;
    let snap = m.snapshot().await;
    assert_eq!(snap.durability, 0);
    assert_eq!(snap.state, MiningState::Exhausted);
    assert_eq!(sink.chats("IT BROKEEEEE"), 1);
    assert_eq!(sink.count(is_dig(DigStatus::Started)), 19);
    assert_eq!(sink.count(is_dig(DigStatus::Finished)), 19);
    assert_eq!(sink.count(|a| *a == OutboundAction::SwingArm), 80);

    // No more ticks are consumed.
    let before = sink.actions().len();
    sleep_ms(5_000).await;
    assert_eq!(sink.actions().len(), before);
    assert_eq!(m.snapshot().await.tick_count, 800);
}

#[tokio::test(start_paused = true)]
async fn test_tick_loop_side_effects_in_tick_order() {
    let sink = Arc::new(RecordingSink::default());
    let (m, _pose_tx) = machine(sink.clone(), pose(3.0, 64.0, 3.0));
    m.activate().await;

    sleep_ms(2_510).await;

    let target = BlockPos::new(3, 64, 4);
    let actions = sink.actions();
    // chat, 3 swings, swing@40, start@40, swing@50, finish@50
    assert_eq!(actions.len(), 8);
    assert_eq!(actions[4], OutboundAction::SwingArm);
    assert!(matches!(
        actions[5],
        OutboundAction::Dig { status: DigStatus::Started, pos, .. } if pos == target
    ));
    assert_eq!(actions[6], OutboundAction::SwingArm);
    assert!(matches!(
        actions[7],
        OutboundAction::Dig { status: DigStatus::Finished, pos, .. } if pos == target
    ));
}

// =========================================================================
// Stop
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_request_stop_halts_side_effects() {
    let sink = Arc::new(RecordingSink::default());
    let (m, _pose_tx) = machine(sink.clone(), PlayerPose::default());
    m.activate().await;
    sleep_ms(510).await;

    m.request_stop().await;
    let after_stop = sink.actions().len();
    sleep_ms(3_000).await;

    assert_eq!(sink.actions().len(), after_stop);
    let snap = m.snapshot().await;
    assert_eq!(snap.state, MiningState::Stopped);
    assert_eq!(snap.tick_count, 10);
    assert!(snap.stop_requested);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_tick_tasks() {
    let sink = Arc::new(RecordingSink::default());
    let (m, _pose_tx) = machine(sink, PlayerPose::default());
    m.activate().await;
    sleep_ms(120).await;

    m.shutdown().await;

    assert_eq!(m.state().await, MiningState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_activate_after_stop_starts_fresh_runner() {
    let sink = Arc::new(RecordingSink::default());
    let (m, _pose_tx) = machine(sink, PlayerPose::default());
    m.activate().await;
    sleep_ms(300).await;
    m.request_stop().await;

    m.activate().await;
    sleep_ms(2_010).await;

    let snap = m.snapshot().await;
    assert_eq!(snap.state, MiningState::Running);
    assert_eq!(snap.tick_count, 40);
    assert_eq!(snap.durability, 95);
    assert!(!snap.stop_requested);
}

// =========================================================================
// Reset and reactivation
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_activate_while_running_resets_in_place() {
    let sink = Arc::new(RecordingSink::default());
    let (m, _pose_tx) = machine(sink.clone(), PlayerPose::default());
    m.activate().await;
    sleep_ms(2_010).await;
    assert_eq!(m.snapshot().await.durability, 95);

    m.activate().await;
    let snap = m.snapshot().await;
    assert_eq!(snap.tick_count, 0);
    assert_eq!(snap.durability, MAX_DURABILITY);
    assert_eq!(snap.activations, 2);

    // One tick task, not two: 40 ticks in the next two seconds.
    sleep_ms(2_000).await;
    let snap = m.snapshot().await;
    assert_eq!(snap.tick_count, 40);
    assert_eq!(snap.durability, 95);
}

#[tokio::test(start_paused = true)]
async fn test_activate_after_exhaustion_runs_again() {
    let sink = Arc::new(RecordingSink::default());
    let (m, _pose_tx) = machine(sink.clone(), PlayerPose::default());
    m.activate().await;
    sleep_ms(40_010).await;
    assert_eq!(m.state().await, MiningState::Exhausted);

    m.activate().await;
    sleep_ms(2_010).await;

    let snap = m.snapshot().await;
    assert_eq!(snap.state, MiningState::Running);
    assert_eq!(snap.durability, 95);
    assert_eq!(sink.chats("IT BROKEEEEE"), 1);
    assert_eq!(sink.chats("Starting mining simulation!"), 2);
}

// =========================================================================
// Send failures
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_send_failures_do_not_stop_the_loop() {
    let sink = Arc::new(RecordingSink::failing());
    let (m, _pose_tx) = machine(sink, PlayerPose::default());
    m.activate().await;

    sleep_ms(4_010).await;

    let snap = m.snapshot().await;
    assert_eq!(snap.state, MiningState::Running);
    assert_eq!(snap.durability, 90);
}

// =========================================================================
// Concurrency
// =========================================================================

/// Activations race the tick task on a multi-threaded runtime. Whatever
/// the interleaving, the session stays in range.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_activations_keep_session_in_range() {
    let sink = Arc::new(RecordingSink::default());
    let (tx, rx) = watch::channel(PlayerPose::default());
    let tx = Arc::new(tx);
    let config = MiningConfig {
        tick_period: Duration::from_millis(1),
        animation_interval: 1,
        durability_interval: 2,
        durability_step: 7,
        dig_hold_ticks: 1,
        ..Default::default()
    };
    let m = Arc::new(MiningStateMachine::new(sink.clone(), config, rx));

    let mut workers = Vec::new();
    for worker in 0..8 {
        let m = Arc::clone(&m);
        let tx = Arc::clone(&tx);
        workers.push(tokio::spawn(async move {
            for i in 0..25 {
                let (delay, action) = {
                    let mut rng = rand::rng();
                    (rng.random_range(0..3u64), rng.random_range(0..10u8))
                };
                tokio::time::sleep(Duration::from_millis(delay)).await;
                match action {
                    0 => m.request_stop().await,
                    1 => {
                        tx.send_replace(pose(worker as f64, 64.0, i as f64));
                    }
                    _ => {
                        m.activate().await;
                    }
                }
                let snap = m.snapshot().await;
                assert!(snap.durability <= MAX_DURABILITY);
                if snap.durability == 0 {
                    assert_eq!(snap.state, MiningState::Exhausted);
                }
            }
        }));
    }
    for w in workers {
        w.await.unwrap();
    }

    m.shutdown().await;
    let snap = m.snapshot().await;
    assert!(snap.durability <= MAX_DURABILITY);
    assert!(!snap.state.is_active());
}

/// A stop and an activation race. When the activation lands last, its
/// tick task must keep running.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_activate_racing_stop_is_never_lost() {
    let sink = Arc::new(RecordingSink::default());
    let (_tx, rx) = watch::channel(PlayerPose::default());
    let config = MiningConfig {
        tick_period: Duration::from_millis(1),
        ..Default::default()
    };
    let m = Arc::new(MiningStateMachine::new(sink, config, rx));

    for _ in 0..20 {
        m.activate().await;

        let stopper = {
            let m = Arc::clone(&m);
            tokio::spawn(async move { m.request_stop().await })
        };
        let starter = {
            let m = Arc::clone(&m);
            tokio::spawn(async move {
                m.activate().await;
            })
        };
        stopper.await.unwrap();
        starter.await.unwrap();

        let before = m.snapshot().await;
        if before.stop_requested {
            continue;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        let after = m.snapshot().await;
        assert!(
            after.tick_count > before.tick_count,
            "activation lost: {before:?} -> {after:?}"
        );
        assert!(after.state.is_active());
    }

    m.shutdown().await;
    assert!(!m.state().await.is_active());
}
