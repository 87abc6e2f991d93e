//! Integration tests for the session loop: events in, actions out.
//!
//! The controller runs next to a test script in the same task
//! (`tokio::join!`), with paused time so delays are exact.

use std::future::pending;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quarry::{BotConfig, SessionController, SessionEnd};
use quarry_mining::{ActionSink, MiningState, SendFailure};
use quarry_protocol::{BlockPos, GameEvent, OutboundAction, PlayerPose};
use tokio::sync::mpsc;
use tokio::time::Instant;

// =========================================================================
// Recording sink
// =========================================================================

#[derive(Default)]
struct RecordingSink {
    actions: Mutex<Vec<OutboundAction>>,
}

impl RecordingSink {
    fn count(&self, pred: impl Fn(&OutboundAction) -> bool) -> usize {
        self.actions.lock().unwrap().iter().filter(|a| pred(a)).count()
    }

    fn chats(&self, text: &str) -> usize {
        self.count(|a| matches!(a, OutboundAction::Chat(t) if t == text))
    }
}

impl ActionSink for RecordingSink {
    async fn send(&self, action: OutboundAction) -> Result<(), SendFailure> {
        self.actions.lock().unwrap().push(action);
        Ok(())
    }
}

const START: &str = "Starting mining simulation!";

fn setup(
    config: BotConfig,
) -> (
    SessionController<RecordingSink>,
    Arc<RecordingSink>,
    mpsc::Sender<GameEvent>,
) {
    let sink = Arc::new(RecordingSink::default());
    let (tx, rx) = mpsc::channel(16);
    (SessionController::new(sink.clone(), rx, config), sink, tx)
}

fn chat(text: &str) -> GameEvent {
    GameEvent::Chat(text.to_string())
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// =========================================================================
// Join and auto-mining
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_joined_auto_mines_after_world_load_delay() {
    let (controller, sink, tx) = setup(BotConfig::default());

    let script = async {
        tx.send(GameEvent::Joined { entity_id: 1 }).await.unwrap();
        sleep_ms(1_900).await;
        assert_eq!(sink.chats(START), 0);
        sleep_ms(200).await;
        assert_eq!(sink.chats(START), 1);
        tx.send(chat("<Steve> !stop")).await.unwrap();
    };

    let (end, ()) = tokio::join!(controller.run(pending()), script);
    assert_eq!(end, SessionEnd::Stopped);
    assert_eq!(sink.chats("Goodbye!"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_joined_twice_auto_mines_once() {
    let (controller, sink, tx) = setup(BotConfig::default());

    let script = async {
        tx.send(GameEvent::Joined { entity_id: 1 }).await.unwrap();
        sleep_ms(500).await;
        tx.send(GameEvent::Joined { entity_id: 1 }).await.unwrap();
        sleep_ms(3_000).await;
        drop(tx);
    };

    let (end, ()) = tokio::join!(controller.run(pending()), script);
    assert_eq!(end, SessionEnd::ConnectionLost);
    assert_eq!(sink.chats(START), 1);
}

#[tokio::test(start_paused = true)]
async fn test_auto_mine_disabled_waits_for_command() {
    let config = BotConfig {
        auto_mine: false,
        ..Default::default()
    };
    let (controller, sink, tx) = setup(config);

    let script = async {
        tx.send(GameEvent::Joined { entity_id: 1 }).await.unwrap();
        sleep_ms(3_000).await;
        assert_eq!(sink.chats(START), 0);
        tx.send(chat("!mine")).await.unwrap();
        sleep_ms(10).await;
        assert_eq!(sink.chats(START), 1);
        drop(tx);
    };

    let (end, ()) = tokio::join!(controller.run(pending()), script);
    assert_eq!(end, SessionEnd::ConnectionLost);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_before_delay_skips_auto_mine() {
    let (controller, sink, tx) = setup(BotConfig::default());

    let script = async {
        tx.send(GameEvent::Joined { entity_id: 1 }).await.unwrap();
        sleep_ms(100).await;
        tx.send(GameEvent::Disconnected {
            reason: "kicked".into(),
        })
        .await
        .unwrap();
    };

    let (end, ()) = tokio::join!(controller.run(pending()), script);
    assert_eq!(end, SessionEnd::ConnectionLost);
    sleep_ms(5_000).await;
    assert_eq!(sink.chats(START), 0);
}

// =========================================================================
// Pose, death, chat commands
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_teleport_confirms_and_updates_mining_target() {
    let config = BotConfig {
        auto_mine: false,
        ..Default::default()
    };
    let (controller, sink, tx) = setup(config);
    let machine = Arc::clone(controller.machine());

    let script = async {
        let pose = PlayerPose {
            x: 5.5,
            y: 64.0,
            z: 5.5,
            ..Default::default()
        };
        tx.send(GameEvent::Teleport {
            pose,
            teleport_id: 7,
        })
        .await
        .unwrap();
        tx.send(chat("!mine")).await.unwrap();
        sleep_ms(10).await;

        assert_eq!(
            sink.count(|a| *a == OutboundAction::ConfirmTeleport(7)),
            1
        );
        assert_eq!(machine.snapshot().await.target, Some(BlockPos::new(5, 64, 6)));
        drop(tx);
    };

    let (end, ()) = tokio::join!(controller.run(pending()), script);
    assert_eq!(end, SessionEnd::ConnectionLost);
}

#[tokio::test(start_paused = true)]
async fn test_death_requests_respawn() {
    let (controller, sink, tx) = setup(BotConfig::default());

    let script = async {
        tx.send(GameEvent::Death {
            message: "MINER fell from a high place".into(),
        })
        .await
        .unwrap();
        sleep_ms(10).await;
        drop(tx);
    };

    tokio::join!(controller.run(pending()), script);
    assert_eq!(sink.count(|a| *a == OutboundAction::Respawn), 1);
}

#[tokio::test(start_paused = true)]
async fn test_me_command_acknowledges_and_keeps_running() {
    let config = BotConfig {
        auto_mine: false,
        ..Default::default()
    };
    let (controller, sink, tx) = setup(config);

    let script = async {
        tx.send(chat("bot, !me please")).await.unwrap();
        tx.send(GameEvent::Health {
            health: 20.0,
            food: 20,
            saturation: 5.0,
        })
        .await
        .unwrap();
        sleep_ms(10).await;
        assert_eq!(sink.chats("Moving to you!"), 1);
        drop(tx);
    };

    let (end, ()) = tokio::join!(controller.run(pending()), script);
    assert_eq!(end, SessionEnd::ConnectionLost);
}

#[tokio::test(start_paused = true)]
async fn test_chat_without_command_word_does_nothing() {
    let config = BotConfig {
        auto_mine: false,
        ..Default::default()
    };
    let (controller, sink, tx) = setup(config);

    let script = async {
        tx.send(chat("mine please, !mine,")).await.unwrap();
        sleep_ms(100).await;
        drop(tx);
    };

    tokio::join!(controller.run(pending()), script);
    assert_eq!(sink.count(|_| true), 0);
}

// =========================================================================
// Ending the session
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_stop_waits_farewell_grace_and_stops_mining() {
    let config = BotConfig {
        auto_mine: false,
        ..Default::default()
    };
    let (controller, sink, tx) = setup(config);
    let machine = Arc::clone(controller.machine());
    let stopped_at = Arc::new(Mutex::new(None));

    let script = async {
        tx.send(chat("!mine")).await.unwrap();
        sleep_ms(500).await;
        *stopped_at.lock().unwrap() = Some(Instant::now());
        tx.send(chat("!STOP")).await.unwrap();
    };

    let (end, ()) = tokio::join!(controller.run(pending()), script);
    let elapsed = stopped_at.lock().unwrap().unwrap().elapsed();

    assert_eq!(end, SessionEnd::Stopped);
    assert!(elapsed >= Duration::from_secs(1));
    assert_eq!(sink.chats("Goodbye!"), 1);
    assert_eq!(machine.state().await, MiningState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_ends_session_and_stops_mining() {
    let config = BotConfig {
        auto_mine: false,
        ..Default::default()
    };
    let (controller, sink, tx) = setup(config);
    let machine = Arc::clone(controller.machine());

    let script = async {
        tx.send(chat("!mine")).await.unwrap();
        sleep_ms(1_000).await;
        tx.send(GameEvent::Disconnected {
            reason: "Server closed".into(),
        })
        .await
        .unwrap();
    };

    let (end, ()) = tokio::join!(controller.run(pending()), script);
    assert_eq!(end, SessionEnd::ConnectionLost);
    assert_eq!(machine.state().await, MiningState::Stopped);

    let swings = sink.count(|a| *a == OutboundAction::SwingArm);
    sleep_ms(2_000).await;
    assert_eq!(sink.count(|a| *a == OutboundAction::SwingArm), swings);
}

#[tokio::test(start_paused = true)]
async fn test_mine_queued_before_disconnect_leaves_no_tick_task() {
    let config = BotConfig {
        auto_mine: false,
        ..Default::default()
    };
    let (controller, sink, tx) = setup(config);
    let machine = Arc::clone(controller.machine());

    tx.send(chat("!mine")).await.unwrap();
    tx.send(GameEvent::Disconnected {
        reason: "Server closed".into(),
    })
    .await
    .unwrap();

    let end = controller.run(pending()).await;
    assert_eq!(end, SessionEnd::ConnectionLost);

    let swings = sink.count(|a| *a == OutboundAction::SwingArm);
    sleep_ms(2_000).await;
    assert_eq!(sink.count(|a| *a == OutboundAction::SwingArm), swings);
    assert!(!machine.state().await.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_ends_session() {
    let (controller, _sink, _tx) = setup(BotConfig::default());
    let machine = Arc::clone(controller.machine());

    let end = controller.run(sleep_ms(2_500)).await;

    assert_eq!(end, SessionEnd::Interrupted);
    assert!(!machine.state().await.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_signal_ends_session() {
    let (controller, _sink, _tx) = setup(BotConfig::default());
    let signal = controller.shutdown_signal();

    let script = async {
        sleep_ms(100).await;
        assert!(signal.trigger(SessionEnd::Stopped));
        assert!(!signal.trigger(SessionEnd::Interrupted));
    };

    let (end, ()) = tokio::join!(controller.run(pending()), script);
    assert_eq!(end, SessionEnd::Stopped);
}
