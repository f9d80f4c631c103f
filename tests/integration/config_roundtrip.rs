//! Settings loaded from TOML reach the running pipeline.

use crate::helpers::{ChannelRecognizer, next_command, register, wait_for, wait_listening};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use warcry::engine::EngineRegistry;
use warcry::learning::LearningStore;
use warcry::learning::kv::MemoryKeyValueStore;
use warcry::{GameCommand, RuntimeEvent, VoiceConfig, VoiceDispatcher};

const PARTIAL_CONFIG: &str = r#"
[recognition]
engine = "test"

[sequencer]
inter_command_delay_ms = 250

[confirmation]
threshold = 0.9
high_stakes = []
"#;

fn load_partial() -> VoiceConfig {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, PARTIAL_CONFIG).unwrap();
    VoiceConfig::from_file(&path).unwrap()
}

#[test]
fn partial_file_keeps_defaults_for_missing_fields() {
    let config = load_partial();
    assert_eq!(config.recognition.engine, "test");
    assert_eq!(config.recognition.language, "ja-JP");
    assert_eq!(config.sequencer.inter_command_delay_ms, 250);
    assert!(config.confirmation.high_stakes.is_empty());
    assert_eq!(config.confirmation.timeout_ms, 10_000);
    assert_eq!(config.learning.promotion_threshold, 3);
}

#[test]
fn saved_file_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    let mut config = load_partial();
    config.offline.command = vec!["whisper-cli".into(), "{wav}".into()];
    config.save_to_file(&path).unwrap();

    let loaded = VoiceConfig::from_file(&path).unwrap();
    assert_eq!(loaded.offline.command, config.offline.command);
    assert_eq!(loaded.sequencer.inter_command_delay_ms, 250);
}

#[test]
fn malformed_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[sequencer]\ninter_command_delay_ms = \"soon\"\n").unwrap();
    assert!(matches!(
        VoiceConfig::from_file(&path),
        Err(warcry::VoiceError::Config(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn loaded_settings_drive_the_dispatcher() {
    let config = load_partial();
    let recognizer = Arc::new(ChannelRecognizer::default());
    let mut registry = EngineRegistry::new();
    register(&mut registry, "test", recognizer.clone());
    let learning = LearningStore::load(Box::new(MemoryKeyValueStore::new()), &config.learning);
    let handle = VoiceDispatcher::new(config, registry, learning)
        .spawn()
        .unwrap();
    let mut rx = handle.subscribe();
    handle.start().await;
    wait_listening(&mut rx).await;

    // Shorter spacing from the file.
    recognizer.say("retreat then status", 0.95);
    assert_eq!(next_command(&mut rx).await, GameCommand::Retreat);
    let t0 = Instant::now();
    assert_eq!(next_command(&mut rx).await, GameCommand::Status);
    assert_eq!(Instant::now() - t0, Duration::from_millis(250));

    // Raised threshold: 0.85 now needs confirmation.
    recognizer.say("defend", 0.85);
    wait_for(&mut rx, |e| {
        matches!(e, RuntimeEvent::ConfirmationRequest { .. })
    })
    .await;
    handle.shutdown().await;
}
