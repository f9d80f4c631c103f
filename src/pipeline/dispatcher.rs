//! The voice dispatcher: one task owning the engine and interpretation state.
//!
//! Control requests arrive through a [`DispatcherHandle`], engine events on a
//! per-engine channel, and timers (confirmation expiry, queued commands) are
//! deadlines polled in the same `select!`. Everything the dispatcher decides
//! is published as a [`RuntimeEvent`] broadcast.

use crate::config::VoiceConfig;
use crate::engine::{
    EngineContext, EngineEvent, EngineInfo, EngineRegistry, RecognitionEngine,
    RecognitionErrorCode, RecognitionSettings,
};
use crate::error::{Result, VoiceError};
use crate::feedback::{SpeechSynthesizer, Utterance};
use crate::learning::LearningStore;
use crate::pipeline::confirmation::PendingConfirmation;
use crate::pipeline::messages::TranscriptEvent;
use crate::pipeline::voice::VoicePipeline;
use crate::runtime::RuntimeEvent;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Channel buffer sizes.
const CONTROL_CHANNEL_SIZE: usize = 16;
const EVENT_CHANNEL_SIZE: usize = 256;

/// Snapshot of the dispatcher's state.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherStatus {
    /// Selected engine id.
    pub engine: String,
    pub listening: bool,
    pub pending_confirmation: Option<PendingConfirmation>,
    pub queued_commands: usize,
    pub learned_patterns: usize,
    /// Recent transcripts, oldest first.
    pub history: Vec<TranscriptEvent>,
}

enum ControlRequest {
    Start(oneshot::Sender<bool>),
    Stop(oneshot::Sender<()>),
    SwitchEngine {
        id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    UpdateSettings {
        settings: RecognitionSettings,
        reply: oneshot::Sender<()>,
    },
    Status(oneshot::Sender<DispatcherStatus>),
    AvailableEngines(oneshot::Sender<Vec<EngineInfo>>),
}

/// Builder for the dispatcher task.
pub struct VoiceDispatcher {
    config: VoiceConfig,
    registry: EngineRegistry,
    learning: LearningStore,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    suppress_capture: Arc<AtomicBool>,
}

impl VoiceDispatcher {
    pub fn new(config: VoiceConfig, registry: EngineRegistry, learning: LearningStore) -> Self {
        Self {
            config,
            registry,
            learning,
            synthesizer: None,
            suppress_capture: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Speak prompts through `synthesizer` (when enabled in the config).
    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Flag raised while prompts are being spoken.
    #[must_use]
    pub fn suppress_capture(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.suppress_capture)
    }

    /// Start the dispatcher task.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::UnknownEngine`] if the configured engine is not
    /// registered, or an error if the pipeline cannot be built.
    pub fn spawn(self) -> Result<DispatcherHandle> {
        let engine_id = self.config.recognition.engine.clone();
        if !self.registry.contains(&engine_id) {
            return Err(VoiceError::UnknownEngine(engine_id));
        }

        let pipeline = VoicePipeline::new(&self.config, self.learning)?;
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_SIZE);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let cancel = CancellationToken::new();

        let speech_tx = match self.synthesizer {
            Some(synth) if self.config.feedback.speak_prompts => {
                let (tx, rx) = mpsc::unbounded_channel();
                tokio::spawn(run_speech_worker(
                    synth,
                    rx,
                    Arc::clone(&self.suppress_capture),
                    cancel.clone(),
                ));
                Some(tx)
            }
            _ => None,
        };

        let task = DispatcherTask {
            settings: RecognitionSettings::from(&self.config.recognition),
            config: self.config,
            registry: self.registry,
            pipeline,
            engine_id,
            engine: None,
            engine_rx: None,
            listening: false,
            events: events.clone(),
            speech_tx,
            suppress_capture: self.suppress_capture,
        };
        let join = tokio::spawn(task.run(control_rx, cancel.clone()));
        info!("voice dispatcher started");

        Ok(DispatcherHandle {
            control: control_tx,
            events,
            cancel,
            join,
        })
    }
}

/// Client side of a running dispatcher.
pub struct DispatcherHandle {
    control: mpsc::Sender<ControlRequest>,
    events: broadcast::Sender<RuntimeEvent>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Receive every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.events.subscribe()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> ControlRequest) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.control
            .send(make(tx))
            .await
            .map_err(|_| VoiceError::Channel("dispatcher has shut down".into()))?;
        rx.await
            .map_err(|_| VoiceError::Channel("dispatcher dropped the request".into()))
    }

    /// Start listening with the selected engine, initialising it on first use.
    ///
    /// Returns `false` when the engine could not be initialised or started;
    /// the reason is published as [`RuntimeEvent::Error`].
    pub async fn start(&self) -> bool {
        self.request(ControlRequest::Start).await.unwrap_or(false)
    }

    /// Stop listening. Cancels a pending confirmation and drops queued commands.
    pub async fn stop(&self) {
        if let Err(e) = self.request(ControlRequest::Stop).await {
            debug!("stop ignored: {e}");
        }
    }

    /// Swap the active engine, restarting it if the old one was listening.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::UnknownEngine`] for an unregistered id, or the
    /// new engine's init error (the previous engine stays active).
    pub async fn switch_engine(&self, id: &str) -> Result<()> {
        let id = id.to_owned();
        self.request(|reply| ControlRequest::SwitchEngine { id, reply })
            .await?
    }

    /// Replace the recogniser settings. The active engine picks them up on
    /// its next start; engines created later start with them.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Channel`] if the dispatcher has shut down.
    pub async fn update_settings(&self, settings: RecognitionSettings) -> Result<()> {
        self.request(|reply| ControlRequest::UpdateSettings { settings, reply })
            .await
    }

    /// # Errors
    ///
    /// Returns [`VoiceError::Channel`] if the dispatcher has shut down.
    pub async fn status(&self) -> Result<DispatcherStatus> {
        self.request(ControlRequest::Status).await
    }

    /// # Errors
    ///
    /// Returns [`VoiceError::Channel`] if the dispatcher has shut down.
    pub async fn available_engines(&self) -> Result<Vec<EngineInfo>> {
        self.request(ControlRequest::AvailableEngines).await
    }

    /// Stop the engine and end the dispatcher task.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            error!("dispatcher task failed: {e}");
        }
    }
}

struct DispatcherTask {
    config: VoiceConfig,
    settings: RecognitionSettings,
    registry: EngineRegistry,
    pipeline: VoicePipeline,
    engine_id: String,
    engine: Option<Box<dyn RecognitionEngine>>,
    engine_rx: Option<mpsc::UnboundedReceiver<EngineEvent>>,
    /// Set by start, cleared by stop. Transcripts are ignored while clear.
    listening: bool,
    events: broadcast::Sender<RuntimeEvent>,
    speech_tx: Option<mpsc::UnboundedSender<Utterance>>,
    suppress_capture: Arc<AtomicBool>,
}

impl DispatcherTask {
    async fn run(mut self, mut control: mpsc::Receiver<ControlRequest>, cancel: CancellationToken) {
        loop {
            let deadline = self.pipeline.next_deadline();
            tokio::select! {
                () = cancel.cancelled() => break,
                request = control.recv() => match request {
                    Some(request) => self.handle_control(request).await,
                    None => break,
                },
                Some(event) = next_engine_event(self.engine_rx.as_mut()) => {
                    self.handle_engine_event(event);
                }
                () = sleep_until(deadline) => {
                    let events = self.pipeline.poll(Instant::now());
                    self.publish(events);
                }
            }
        }

        self.pipeline.halt();
        if let Some(engine) = self.engine.as_mut() {
            engine.stop().await;
        }
        info!("voice dispatcher stopped");
    }

    async fn handle_control(&mut self, request: ControlRequest) {
        match request {
            ControlRequest::Start(reply) => {
                let started = self.start().await;
                let _ = reply.send(started);
            }
            ControlRequest::Stop(reply) => {
                self.stop().await;
                let _ = reply.send(());
            }
            ControlRequest::SwitchEngine { id, reply } => {
                let result = self.switch_engine(id).await;
                let _ = reply.send(result);
            }
            ControlRequest::UpdateSettings { settings, reply } => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.update_config(settings.clone());
                }
                self.settings = settings;
                let _ = reply.send(());
            }
            ControlRequest::Status(reply) => {
                let _ = reply.send(self.status());
            }
            ControlRequest::AvailableEngines(reply) => {
                let _ = reply.send(self.registry.available(Some(&self.engine_id)));
            }
        }
    }

    fn report_init_failure(&self, id: &str, error: &VoiceError) {
        warn!("engine {id} failed to initialise: {error}");
        self.publish(vec![RuntimeEvent::Error {
            message: error.to_string(),
            code: RecognitionErrorCode::for_error(error).as_str().to_owned(),
            should_restart: false,
        }]);
    }

    async fn start(&mut self) -> bool {
        if self.engine.is_none() {
            let built = build_engine(
                &self.registry,
                &self.engine_id,
                &self.settings,
                &self.suppress_capture,
            )
            .await;
            match built {
                Ok((engine, rx)) => {
                    self.engine = Some(engine);
                    self.engine_rx = Some(rx);
                }
                Err(e) => {
                    self.report_init_failure(&self.engine_id, &e);
                    return false;
                }
            }
        }
        self.listening = match self.engine.as_mut() {
            Some(engine) => engine.start().await,
            None => false,
        };
        self.listening
    }

    async fn stop(&mut self) {
        self.listening = false;
        self.pipeline.halt();
        if let Some(engine) = self.engine.as_mut() {
            engine.stop().await;
        }
        // Results the engine queued before it stopped must not reach the
        // pipeline after a later start.
        let mut pending = Vec::new();
        if let Some(rx) = self.engine_rx.as_mut() {
            while let Ok(event) = rx.try_recv() {
                pending.push(event);
            }
        }
        for event in pending {
            self.handle_engine_event(event);
        }
    }

    async fn switch_engine(&mut self, id: String) -> Result<()> {
        if !self.registry.contains(&id) {
            return Err(VoiceError::UnknownEngine(id));
        }
        if id == self.engine_id && self.engine.is_some() {
            return Ok(());
        }

        let built =
            build_engine(&self.registry, &id, &self.settings, &self.suppress_capture).await;
        let (engine, rx) = match built {
            Ok(built) => built,
            Err(e) => {
                self.report_init_failure(&id, &e);
                return Err(e);
            }
        };

        let was_listening = self.engine.as_ref().is_some_and(|e| e.is_listening());
        if let Some(mut old) = self.engine.take() {
            old.stop().await;
        }
        info!("switched engine {} -> {id}", self.engine_id);
        self.engine_id = id;
        self.engine = Some(engine);
        // Events still queued from the old engine are dropped with its receiver.
        self.engine_rx = Some(rx);
        self.listening = false;

        if was_listening {
            // The old engine's Stopped status was dropped with its channel.
            self.listening = match self.engine.as_mut() {
                Some(engine) => engine.start().await,
                None => false,
            };
            if !self.listening {
                warn!("engine {} failed to start after switch", self.engine_id);
            }
        }
        Ok(())
    }

    fn status(&self) -> DispatcherStatus {
        DispatcherStatus {
            engine: self.engine_id.clone(),
            listening: self.engine.as_ref().is_some_and(|e| e.is_listening()),
            pending_confirmation: self.pipeline.pending_confirmation().cloned(),
            queued_commands: self.pipeline.queued_commands(),
            learned_patterns: self.pipeline.learning().learned_patterns().len(),
            history: self.pipeline.history().snapshot(),
        }
    }

    fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Result(transcript) if !self.listening => {
                debug!("dropping transcript after stop: {}", transcript.text);
            }
            EngineEvent::Result(transcript) => {
                debug!(
                    "transcript ({:.2}, final={}): {}",
                    transcript.confidence, transcript.is_final, transcript.text
                );
                let events = self.pipeline.handle_transcript(&transcript, Instant::now());
                self.publish(events);
            }
            EngineEvent::Status(state) => {
                self.publish(vec![RuntimeEvent::Status(state)]);
            }
            EngineEvent::Error(e) => {
                self.publish(vec![RuntimeEvent::Error {
                    message: e.message,
                    code: e.code.as_str().to_owned(),
                    should_restart: e.should_auto_restart,
                }]);
            }
        }
    }

    fn publish(&self, events: Vec<RuntimeEvent>) {
        for event in events {
            if let RuntimeEvent::Prompt(ref text) = event
                && let Some(ref tx) = self.speech_tx
            {
                let _ = tx.send(Utterance::new(text.clone(), &self.config.feedback));
            }
            // No subscribers is not an error.
            let _ = self.events.send(event);
        }
    }
}

/// Create and initialise an engine without touching the active one.
async fn build_engine(
    registry: &EngineRegistry,
    id: &str,
    settings: &RecognitionSettings,
    suppress_capture: &Arc<AtomicBool>,
) -> Result<(Box<dyn RecognitionEngine>, mpsc::UnboundedReceiver<EngineEvent>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let context = EngineContext {
        events: tx,
        settings: settings.clone(),
        suppress_capture: Arc::clone(suppress_capture),
    };
    let mut engine = registry.create(id, context)?;
    engine.init().await?;
    Ok((engine, rx))
}

async fn next_engine_event(
    rx: Option<&mut mpsc::UnboundedReceiver<EngineEvent>>,
) -> Option<EngineEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Speak prompts one at a time, raising the suppression flag while busy so
/// capture does not transcribe the prompt itself.
async fn run_speech_worker(
    synthesizer: Arc<dyn SpeechSynthesizer>,
    mut rx: mpsc::UnboundedReceiver<Utterance>,
    suppress: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    loop {
        let utterance = tokio::select! {
            () = cancel.cancelled() => break,
            utterance = rx.recv() => match utterance {
                Some(u) => u,
                None => break,
            },
        };
        suppress.store(true, Ordering::SeqCst);
        if let Err(e) = synthesizer.speak(utterance).await {
            warn!("prompt playback failed: {e}");
        }
        if rx.is_empty() {
            suppress.store(false, Ordering::SeqCst);
        }
    }
    suppress.store(false, Ordering::SeqCst);
}
