//! Learned phrases survive a restart through the file-backed store.

use crate::helpers::{ChannelRecognizer, next_command, register, wait_for, wait_listening};
use std::sync::Arc;
use warcry::config::LearningConfig;
use warcry::engine::EngineRegistry;
use warcry::learning::LearningStore;
use warcry::learning::kv::{FileKeyValueStore, KeyValueStore};
use warcry::{GameCommand, RuntimeEvent, VoiceConfig, VoiceDispatcher};

fn learning_config(dir: &std::path::Path) -> LearningConfig {
    LearningConfig {
        store_dir: Some(dir.to_path_buf()),
        ..LearningConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn confirmed_phrase_is_promoted_and_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let learning_cfg = learning_config(dir.path());

    let recognizer = Arc::new(ChannelRecognizer::default());
    let mut registry = EngineRegistry::new();
    register(&mut registry, "test", recognizer.clone());
    let mut config = VoiceConfig::default();
    config.recognition.engine = "test".into();
    config.learning = learning_cfg.clone();

    let store = LearningStore::load(
        Box::new(FileKeyValueStore::new(learning_cfg.resolved_store_dir())),
        &learning_cfg,
    );
    let handle = VoiceDispatcher::new(config, registry, store)
        .spawn()
        .unwrap();
    let mut rx = handle.subscribe();
    handle.start().await;
    wait_listening(&mut rx).await;

    for _ in 0..3 {
        recognizer.say("kougeki kaishi", 0.5);
        wait_for(&mut rx, |e| {
            matches!(e, RuntimeEvent::ConfirmationRequest { .. })
        })
        .await;
        recognizer.say("はい", 0.9);
        assert_eq!(next_command(&mut rx).await, GameCommand::Attack);
    }

    let learned = wait_for(&mut rx, |e| matches!(e, RuntimeEvent::UserLearning { .. })).await;
    assert_eq!(
        learned,
        RuntimeEvent::UserLearning {
            new_pattern: "kougeki kaishi".into(),
            command: GameCommand::Attack,
            confidence: 1.0,
        }
    );
    assert_eq!(handle.status().await.unwrap().learned_patterns, 1);
    handle.shutdown().await;

    let reloaded = LearningStore::load(
        Box::new(FileKeyValueStore::new(dir.path())),
        &learning_cfg,
    );
    assert_eq!(
        reloaded.learned_patterns().get("kougeki kaishi"),
        Some(&GameCommand::Attack)
    );
    assert_eq!(reloaded.occurrences("kougeki kaishi", GameCommand::Attack), 3);
}

#[test]
fn record_format_is_readable_json() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = learning_config(dir.path());
    let mut store = LearningStore::load(Box::new(FileKeyValueStore::new(dir.path())), &cfg);
    for _ in 0..3 {
        store.record_success("Hold Fast", GameCommand::Defend);
    }

    let raw = FileKeyValueStore::new(dir.path())
        .get(&cfg.storage_key)
        .unwrap()
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(
        json["learnedPatterns"],
        serde_json::json!([["hold fast", "defend"]])
    );
    assert_eq!(
        json["candidatePatterns"],
        serde_json::json!([["defend", ["hold fast"]]])
    );
}
