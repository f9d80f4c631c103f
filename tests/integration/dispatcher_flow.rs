//! End-to-end flows through the dispatcher with a test-driven recogniser.

use crate::helpers::{
    ChannelRecognizer, RecordingSynthesizer, drain_events, next_command, register, wait_for,
    wait_listening,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::Instant;
use warcry::config::LearningConfig;
use warcry::engine::EngineRegistry;
use warcry::learning::LearningStore;
use warcry::learning::kv::MemoryKeyValueStore;
use warcry::pipeline::confirmation::{ConfirmationOutcome, RejectionReason};
use warcry::{DispatcherHandle, GameCommand, RuntimeEvent, VoiceConfig, VoiceDispatcher};

fn spawn(recognizer: Arc<ChannelRecognizer>) -> DispatcherHandle {
    let mut registry = EngineRegistry::new();
    register(&mut registry, "test", recognizer);
    let mut config = VoiceConfig::default();
    config.recognition.engine = "test".into();
    let learning = LearningStore::load(
        Box::new(MemoryKeyValueStore::new()),
        &LearningConfig::default(),
    );
    VoiceDispatcher::new(config, registry, learning)
        .spawn()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn paraphrase_dispatches_immediately() {
    let recognizer = Arc::new(ChannelRecognizer::default());
    let handle = spawn(recognizer.clone());
    let mut rx = handle.subscribe();
    assert!(handle.start().await);
    wait_listening(&mut rx).await;

    recognizer.say("敵をやっつけて", 0.9);
    assert_eq!(next_command(&mut rx).await, GameCommand::Attack);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn compound_utterance_dispatches_in_order_one_second_apart() {
    let recognizer = Arc::new(ChannelRecognizer::default());
    let handle = spawn(recognizer.clone());
    let mut rx = handle.subscribe();
    handle.start().await;
    wait_listening(&mut rx).await;

    recognizer.say("攻撃してから防御", 0.9);
    let queued = wait_for(&mut rx, |e| matches!(e, RuntimeEvent::CommandQueue(_))).await;
    assert_eq!(
        queued,
        RuntimeEvent::CommandQueue(vec![GameCommand::Attack, GameCommand::Defend])
    );

    assert_eq!(next_command(&mut rx).await, GameCommand::Attack);
    let t0 = Instant::now();
    assert_eq!(next_command(&mut rx).await, GameCommand::Defend);
    assert_eq!(Instant::now() - t0, Duration::from_millis(1000));
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn low_confidence_confirmed_with_hai() {
    let recognizer = Arc::new(ChannelRecognizer::default());
    let handle = spawn(recognizer.clone());
    let mut rx = handle.subscribe();
    handle.start().await;
    wait_listening(&mut rx).await;

    recognizer.say("attack", 0.55);
    let request = wait_for(&mut rx, |e| {
        matches!(e, RuntimeEvent::ConfirmationRequest { .. })
    })
    .await;
    assert_eq!(
        request,
        RuntimeEvent::ConfirmationRequest {
            original_text: "attack".into(),
            interpreted_command: GameCommand::Attack,
            confidence: 0.55,
        }
    );
    assert!(
        !drain_events(&mut rx)
            .iter()
            .any(|e| matches!(e, RuntimeEvent::Command { .. }))
    );

    recognizer.say("はい", 0.9);
    assert_eq!(next_command(&mut rx).await, GameCommand::Attack);
    assert!(handle.status().await.unwrap().pending_confirmation.is_none());
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn low_confidence_declined_with_iie() {
    let recognizer = Arc::new(ChannelRecognizer::default());
    let handle = spawn(recognizer.clone());
    let mut rx = handle.subscribe();
    handle.start().await;
    wait_listening(&mut rx).await;

    recognizer.say("attack", 0.55);
    wait_for(&mut rx, |e| {
        matches!(e, RuntimeEvent::ConfirmationRequest { .. })
    })
    .await;
    recognizer.say("いいえ", 0.9);

    let resolved = wait_for(&mut rx, |e| {
        matches!(e, RuntimeEvent::ConfirmationResolved(_))
    })
    .await;
    assert!(matches!(
        resolved,
        RuntimeEvent::ConfirmationResolved(ConfirmationOutcome::Rejected {
            reason: RejectionReason::Declined,
            ..
        })
    ));

    // Nothing runs afterwards, not even when the old deadline passes.
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert!(
        !drain_events(&mut rx)
            .iter()
            .any(|e| matches!(e, RuntimeEvent::Command { .. }))
    );
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unanswered_confirmation_times_out_after_ten_seconds() {
    let recognizer = Arc::new(ChannelRecognizer::default());
    let handle = spawn(recognizer.clone());
    let mut rx = handle.subscribe();
    handle.start().await;
    wait_listening(&mut rx).await;

    recognizer.say("retreat", 0.7);
    wait_for(&mut rx, |e| {
        matches!(e, RuntimeEvent::ConfirmationRequest { .. })
    })
    .await;
    let asked = Instant::now();

    let resolved = wait_for(&mut rx, |e| {
        matches!(e, RuntimeEvent::ConfirmationResolved(_))
    })
    .await;
    assert_eq!(Instant::now() - asked, Duration::from_secs(10));
    assert!(matches!(
        resolved,
        RuntimeEvent::ConfirmationResolved(ConfirmationOutcome::Rejected {
            reason: RejectionReason::TimedOut,
            ..
        })
    ));
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unrecognized_speech_offers_suggestions() {
    let recognizer = Arc::new(ChannelRecognizer::default());
    let handle = spawn(recognizer.clone());
    let mut rx = handle.subscribe();
    handle.start().await;
    wait_listening(&mut rx).await;

    recognizer.say("statos", 0.9);
    let event = wait_for(&mut rx, |e| matches!(e, RuntimeEvent::Unrecognized { .. })).await;
    let RuntimeEvent::Unrecognized { text, suggestions } = event else {
        unreachable!()
    };
    assert_eq!(text, "statos");
    assert_eq!(suggestions[0].command, GameCommand::Status);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn prompts_are_spoken_with_capture_suppressed() {
    let recognizer = Arc::new(ChannelRecognizer::default());
    let mut registry = EngineRegistry::new();
    register(&mut registry, "test", recognizer.clone());
    let mut config = VoiceConfig::default();
    config.recognition.engine = "test".into();
    let learning = LearningStore::load(
        Box::new(MemoryKeyValueStore::new()),
        &LearningConfig::default(),
    );

    let dispatcher = VoiceDispatcher::new(config, registry, learning);
    let suppress = dispatcher.suppress_capture();
    let synth = Arc::new(RecordingSynthesizer::new(suppress.clone()));
    let handle = dispatcher.with_synthesizer(synth.clone()).spawn().unwrap();
    let mut rx = handle.subscribe();
    handle.start().await;
    wait_listening(&mut rx).await;

    recognizer.say("attack", 0.4);
    wait_for(&mut rx, |e| matches!(e, RuntimeEvent::Prompt(_))).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(synth.spoken.lock().unwrap().len(), 1);
    assert!(synth.suppressed_while_speaking.load(Ordering::SeqCst));
    assert!(!suppress.load(Ordering::SeqCst));
    handle.shutdown().await;
}
