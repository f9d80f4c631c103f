//! Switching recognition engines at runtime.

use crate::helpers::{ChannelRecognizer, next_command, register, wait_listening};
use std::sync::Arc;
use warcry::config::LearningConfig;
use warcry::engine::EngineRegistry;
use warcry::learning::LearningStore;
use warcry::learning::kv::MemoryKeyValueStore;
use warcry::{GameCommand, VoiceConfig, VoiceDispatcher, VoiceError};

#[tokio::test(start_paused = true)]
async fn switching_while_listening_moves_to_new_engine() {
    let first = Arc::new(ChannelRecognizer::default());
    let second = Arc::new(ChannelRecognizer::default());
    let mut registry = EngineRegistry::new();
    register(&mut registry, "first", first.clone());
    register(&mut registry, "second", second.clone());

    let mut config = VoiceConfig::default();
    config.recognition.engine = "first".into();
    let learning = LearningStore::load(
        Box::new(MemoryKeyValueStore::new()),
        &LearningConfig::default(),
    );
    let handle = VoiceDispatcher::new(config, registry, learning)
        .spawn()
        .unwrap();
    let mut rx = handle.subscribe();

    assert!(handle.start().await);
    wait_listening(&mut rx).await;
    first.say("attack", 0.9);
    assert_eq!(next_command(&mut rx).await, GameCommand::Attack);

    handle.switch_engine("second").await.unwrap();
    wait_listening(&mut rx).await;
    second.say("防御", 0.9);
    assert_eq!(next_command(&mut rx).await, GameCommand::Defend);

    let status = handle.status().await.unwrap();
    assert_eq!(status.engine, "second");
    assert!(status.listening);

    let engines = handle.available_engines().await.unwrap();
    let current: Vec<&str> = engines
        .iter()
        .filter(|e| e.is_current)
        .map(|e| e.id.as_str())
        .collect();
    assert_eq!(current, vec!["second"]);

    assert!(matches!(
        handle.switch_engine("nope").await,
        Err(VoiceError::UnknownEngine(_))
    ));
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn switching_while_stopped_does_not_start_listening() {
    let first = Arc::new(ChannelRecognizer::default());
    let second = Arc::new(ChannelRecognizer::default());
    let mut registry = EngineRegistry::new();
    register(&mut registry, "first", first);
    register(&mut registry, "second", second);

    let mut config = VoiceConfig::default();
    config.recognition.engine = "first".into();
    let learning = LearningStore::load(
        Box::new(MemoryKeyValueStore::new()),
        &LearningConfig::default(),
    );
    let handle = VoiceDispatcher::new(config, registry, learning)
        .spawn()
        .unwrap();

    handle.switch_engine("second").await.unwrap();
    let status = handle.status().await.unwrap();
    assert_eq!(status.engine, "second");
    assert!(!status.listening);
    handle.shutdown().await;
}
