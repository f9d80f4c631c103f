//! Shared helpers for integration tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use warcry::engine::streaming::{RecognizerSignal, StreamingEngine, StreamingRecognizer};
use warcry::engine::{EngineError, EngineRegistry, RecognitionSettings};
use warcry::feedback::{SpeechSynthesizer, Utterance};
use warcry::{GameCommand, RuntimeEvent};

/// Recogniser driven by the test: each `say` becomes a final transcript on
/// the open session.
#[derive(Default)]
pub(crate) struct ChannelRecognizer {
    session: Mutex<Option<mpsc::UnboundedSender<RecognizerSignal>>>,
}

impl ChannelRecognizer {
    pub(crate) fn say(&self, text: &str, confidence: f32) {
        let session = self.session.lock().unwrap();
        let tx = session.as_ref().expect("no open recognition session");
        tx.send(RecognizerSignal::Transcript {
            text: text.to_owned(),
            confidence,
            is_final: true,
        })
        .unwrap();
    }
}

#[async_trait]
impl StreamingRecognizer for ChannelRecognizer {
    fn is_available(&self) -> bool {
        true
    }

    async fn begin(
        &self,
        _settings: &RecognitionSettings,
        signals: mpsc::UnboundedSender<RecognizerSignal>,
    ) -> Result<(), EngineError> {
        *self.session.lock().unwrap() = Some(signals);
        Ok(())
    }

    async fn end(&self) {
        self.session.lock().unwrap().take();
    }
}

/// Register `recognizer` as a streaming engine under `id`.
pub(crate) fn register(
    registry: &mut EngineRegistry,
    id: &'static str,
    recognizer: Arc<ChannelRecognizer>,
) {
    registry.register(id, id, move |ctx| {
        Box::new(StreamingEngine::new(
            id,
            id,
            recognizer.clone(),
            ctx.events,
            ctx.settings,
        ))
    });
}

/// Synthesizer that records what it spoke and whether capture was
/// suppressed while speaking.
pub(crate) struct RecordingSynthesizer {
    pub(crate) spoken: Mutex<Vec<String>>,
    pub(crate) suppressed_while_speaking: AtomicBool,
    suppress: Arc<AtomicBool>,
}

impl RecordingSynthesizer {
    pub(crate) fn new(suppress: Arc<AtomicBool>) -> Self {
        Self {
            spoken: Mutex::new(Vec::new()),
            suppressed_while_speaking: AtomicBool::new(true),
            suppress,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for RecordingSynthesizer {
    async fn speak(&self, utterance: Utterance) -> warcry::Result<()> {
        if !self.suppress.load(Ordering::SeqCst) {
            self.suppressed_while_speaking.store(false, Ordering::SeqCst);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.spoken.lock().unwrap().push(utterance.text);
        Ok(())
    }
}

/// Wait (in virtual time) for the first event matching `pred`.
pub(crate) async fn wait_for<F>(rx: &mut broadcast::Receiver<RuntimeEvent>, pred: F) -> RuntimeEvent
where
    F: Fn(&RuntimeEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            let event = rx.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event did not arrive")
}

/// Wait for the next dispatched command.
pub(crate) async fn next_command(rx: &mut broadcast::Receiver<RuntimeEvent>) -> GameCommand {
    match wait_for(rx, |e| matches!(e, RuntimeEvent::Command { .. })).await {
        RuntimeEvent::Command { command, .. } => command,
        _ => unreachable!(),
    }
}

/// Wait until the engine reports it is listening.
pub(crate) async fn wait_listening(rx: &mut broadcast::Receiver<RuntimeEvent>) {
    wait_for(rx, |e| {
        *e == RuntimeEvent::Status(warcry::engine::ListeningState::Listening)
    })
    .await;
}

/// Drain all pending events from the broadcast receiver into a Vec.
pub(crate) fn drain_events(rx: &mut broadcast::Receiver<RuntimeEvent>) -> Vec<RuntimeEvent> {
    let mut events = Vec::new();
    while let Ok(evt) = rx.try_recv() {
        events.push(evt);
    }
    events
}
