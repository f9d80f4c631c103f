//! Low-latency engine over a recogniser that finalises utterances itself.
//!
//! A supervisor task forwards recogniser signals as [`EngineEvent`]s. When
//! the recogniser session ends while the engine should still be listening it
//! is restarted after a short delay; transient errors restart indefinitely,
//! fatal errors stop the engine and surface the error.

use crate::engine::{
    EngineError, EngineEvent, EngineEventSender, ListeningState, RecognitionEngine,
    RecognitionErrorCode, RecognitionSettings,
};
use crate::error::{Result, VoiceError};
use crate::pipeline::messages::TranscriptEvent;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Signals produced by a recogniser session.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerSignal {
    Transcript {
        text: String,
        confidence: f32,
        is_final: bool,
    },
    Error {
        code: RecognitionErrorCode,
        message: String,
    },
    /// The session finished (silence, service timeout, explicit end).
    Ended,
}

/// Platform speech recogniser capability.
#[async_trait]
pub trait StreamingRecognizer: Send + Sync + 'static {
    /// Whether the capability exists on this platform.
    fn is_available(&self) -> bool;

    /// Open a recognition session that reports on `signals` until it ends.
    async fn begin(
        &self,
        settings: &RecognitionSettings,
        signals: mpsc::UnboundedSender<RecognizerSignal>,
    ) -> std::result::Result<(), EngineError>;

    /// Close the current session, if any.
    async fn end(&self);
}

struct Supervisor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// [`RecognitionEngine`] over a [`StreamingRecognizer`].
pub struct StreamingEngine {
    id: String,
    name: String,
    recognizer: Arc<dyn StreamingRecognizer>,
    events: EngineEventSender,
    settings: RecognitionSettings,
    restart_delay: Duration,
    initialized: bool,
    should_listen: Arc<AtomicBool>,
    supervisor: Option<Supervisor>,
}

impl StreamingEngine {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        recognizer: Arc<dyn StreamingRecognizer>,
        events: EngineEventSender,
        settings: RecognitionSettings,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            recognizer,
            events,
            settings,
            restart_delay: Duration::from_millis(500),
            initialized: false,
            should_listen: Arc::new(AtomicBool::new(false)),
            supervisor: None,
        }
    }

    /// Override the restart delay (default 500ms).
    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    fn supervisor_running(&self) -> bool {
        self.supervisor
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }
}

#[async_trait]
impl RecognitionEngine for StreamingEngine {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&mut self) -> Result<()> {
        if !self.recognizer.is_available() {
            return Err(VoiceError::EngineUnavailable(format!(
                "{} is not supported on this platform",
                self.name
            )));
        }
        self.initialized = true;
        info!("engine {} initialised", self.id);
        Ok(())
    }

    async fn start(&mut self) -> bool {
        if !self.initialized {
            warn!("engine {} started before init", self.id);
            return false;
        }
        if self.supervisor_running() {
            return true;
        }

        self.should_listen.store(true, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(supervise(
            Arc::clone(&self.recognizer),
            self.settings.clone(),
            self.events.clone(),
            Arc::clone(&self.should_listen),
            self.restart_delay,
            cancel.clone(),
        ));
        self.supervisor = Some(Supervisor { cancel, handle });
        true
    }

    async fn stop(&mut self) {
        self.should_listen.store(false, Ordering::SeqCst);
        let Some(supervisor) = self.supervisor.take() else {
            return;
        };
        let was_running = !supervisor.handle.is_finished();
        supervisor.cancel.cancel();
        self.recognizer.end().await;
        let _ = supervisor.handle.await;
        if was_running {
            let _ = self
                .events
                .send(EngineEvent::Status(ListeningState::Stopped));
        }
        info!("engine {} stopped", self.id);
    }

    fn update_config(&mut self, settings: RecognitionSettings) {
        self.settings = settings;
    }

    fn is_listening(&self) -> bool {
        self.should_listen.load(Ordering::SeqCst) && self.supervisor_running()
    }
}

async fn supervise(
    recognizer: Arc<dyn StreamingRecognizer>,
    settings: RecognitionSettings,
    events: EngineEventSender,
    should_listen: Arc<AtomicBool>,
    restart_delay: Duration,
    cancel: CancellationToken,
) {
    loop {
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();
        match recognizer.begin(&settings, signal_tx).await {
            Ok(()) => {
                let _ = events.send(EngineEvent::Status(ListeningState::Listening));
                loop {
                    let signal = tokio::select! {
                        () = cancel.cancelled() => return,
                        signal = signal_rx.recv() => signal,
                    };
                    match signal {
                        Some(RecognizerSignal::Transcript {
                            text,
                            confidence,
                            is_final,
                        }) => {
                            let _ = events.send(EngineEvent::Result(TranscriptEvent::new(
                                text, confidence, is_final,
                            )));
                        }
                        Some(RecognizerSignal::Error { code, message }) => {
                            let error = EngineError::new(code, message);
                            if !error.should_auto_restart {
                                should_listen.store(false, Ordering::SeqCst);
                            }
                            warn!("recogniser error {}: {}", error.code, error.message);
                            let _ = events.send(EngineEvent::Error(error));
                            recognizer.end().await;
                            break;
                        }
                        Some(RecognizerSignal::Ended) | None => break,
                    }
                }
            }
            Err(error) => {
                if !error.should_auto_restart {
                    should_listen.store(false, Ordering::SeqCst);
                }
                warn!("recogniser failed to start: {}", error.message);
                let _ = events.send(EngineEvent::Error(error));
            }
        }

        if !should_listen.load(Ordering::SeqCst) {
            let _ = events.send(EngineEvent::Status(ListeningState::Stopped));
            return;
        }

        debug!("restarting recogniser in {}ms", restart_delay.as_millis());
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(restart_delay) => {}
        }
    }
}
