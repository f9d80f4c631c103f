//! Offline engine: microphone audio → VAD → one transcription per utterance.
//!
//! Three tasks run while listening: capture, segmentation, and a single
//! transcription worker fed through a FIFO channel, so the transcriber is
//! never invoked concurrently. An in-flight transcription is not cancelled by
//! `stop()`; its result is dropped because the listening flag is checked
//! before it is reported.

use crate::config::VadConfig;
use crate::engine::{
    EngineError, EngineEvent, EngineEventSender, ListeningState, RecognitionEngine,
    RecognitionErrorCode, RecognitionSettings,
};
use crate::error::{Result, VoiceError};
use crate::pipeline::messages::{AudioChunk, SpeechSegment, TranscriptEvent};
use crate::vad::VoiceActivitySegmenter;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Channel buffer size for raw audio chunks.
const AUDIO_CHANNEL_SIZE: usize = 64;

/// Microphone permission as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    /// The platform will ask the user on first capture.
    Prompt,
    /// The platform offers no way to query.
    Unknown,
}

/// Raw PCM capture capability.
#[async_trait]
pub trait AudioSource: Send + Sync + 'static {
    /// Whether a capture device exists.
    fn is_available(&self) -> bool;

    /// Current microphone permission.
    fn permission(&self) -> PermissionState {
        PermissionState::Unknown
    }

    /// Capture mono chunks into `tx` until `cancel` fires.
    async fn run(&self, tx: mpsc::Sender<AudioChunk>, cancel: CancellationToken) -> Result<()>;
}

/// Text produced for one utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub confidence: f32,
}

/// Batch speech-to-text capability.
#[async_trait]
pub trait Transcriber: Send + Sync + 'static {
    /// Load whatever the transcriber needs before the first utterance.
    async fn prepare(&self) -> Result<()> {
        Ok(())
    }

    /// Transcribe one complete utterance.
    async fn transcribe(&self, segment: &SpeechSegment) -> Result<Transcript>;
}

/// [`RecognitionEngine`] that segments and transcribes captured audio.
pub struct BatchEngine {
    id: String,
    name: String,
    source: Arc<dyn AudioSource>,
    transcriber: Arc<dyn Transcriber>,
    events: EngineEventSender,
    vad_config: VadConfig,
    suppress_capture: Arc<AtomicBool>,
    initialized: bool,
    listening: Arc<AtomicBool>,
    cancel: Option<CancellationToken>,
}

impl BatchEngine {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        source: Arc<dyn AudioSource>,
        transcriber: Arc<dyn Transcriber>,
        events: EngineEventSender,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            source,
            transcriber,
            events,
            vad_config: VadConfig::default(),
            suppress_capture: Arc::new(AtomicBool::new(false)),
            initialized: false,
            listening: Arc::new(AtomicBool::new(false)),
            cancel: None,
        }
    }

    pub fn with_vad_config(mut self, config: VadConfig) -> Self {
        self.vad_config = config;
        self
    }

    /// Share the dispatcher's capture-suppression signal.
    pub fn with_suppression(mut self, flag: Arc<AtomicBool>) -> Self {
        self.suppress_capture = flag;
        self
    }
}

#[async_trait]
impl RecognitionEngine for BatchEngine {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&mut self) -> Result<()> {
        if !self.source.is_available() {
            return Err(VoiceError::EngineUnavailable(
                "no audio input device".to_owned(),
            ));
        }
        if self.source.permission() == PermissionState::Denied {
            return Err(VoiceError::PermissionDenied(
                "microphone access denied".to_owned(),
            ));
        }
        self.transcriber.prepare().await?;
        self.initialized = true;
        info!("engine {} initialised", self.id);
        Ok(())
    }

    async fn start(&mut self) -> bool {
        if !self.initialized {
            warn!("engine {} started before init", self.id);
            return false;
        }
        if self.listening.load(Ordering::SeqCst) {
            return true;
        }

        let cancel = CancellationToken::new();
        self.listening.store(true, Ordering::SeqCst);

        let (chunk_tx, chunk_rx) = mpsc::channel::<AudioChunk>(AUDIO_CHANNEL_SIZE);
        let (segment_tx, segment_rx) = mpsc::unbounded_channel::<SpeechSegment>();

        {
            let source = Arc::clone(&self.source);
            let events = self.events.clone();
            let listening = Arc::clone(&self.listening);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = source.run(chunk_tx, cancel.clone()).await {
                    error!("audio capture failed: {e}");
                    let was_listening = listening.swap(false, Ordering::SeqCst);
                    cancel.cancel();
                    let code = RecognitionErrorCode::for_error(&e);
                    let _ = events.send(EngineEvent::Error(EngineError::new(code, e.to_string())));
                    if was_listening {
                        let _ = events.send(EngineEvent::Status(ListeningState::Stopped));
                    }
                }
            });
        }

        let segmenter = VoiceActivitySegmenter::new(&self.vad_config)
            .with_suppression(Arc::clone(&self.suppress_capture));
        tokio::spawn(run_segmenter(segmenter, chunk_rx, segment_tx, cancel.clone()));

        tokio::spawn(run_transcription_worker(
            Arc::clone(&self.transcriber),
            segment_rx,
            self.events.clone(),
            Arc::clone(&self.listening),
            cancel.clone(),
        ));

        self.cancel = Some(cancel);
        let _ = self
            .events
            .send(EngineEvent::Status(ListeningState::Listening));
        true
    }

    async fn stop(&mut self) {
        let was_listening = self.listening.swap(false, Ordering::SeqCst);
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if was_listening {
            let _ = self
                .events
                .send(EngineEvent::Status(ListeningState::Stopped));
            info!("engine {} stopped", self.id);
        }
    }

    fn update_config(&mut self, _settings: RecognitionSettings) {
        // Offline transcription has no per-session recogniser settings.
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }
}

async fn run_segmenter(
    mut segmenter: VoiceActivitySegmenter,
    mut rx: mpsc::Receiver<AudioChunk>,
    tx: mpsc::UnboundedSender<SpeechSegment>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            chunk = rx.recv() => {
                let Some(chunk) = chunk else { break };
                if let Some(segment) = segmenter.process_chunk(&chunk) {
                    debug!("utterance detected: {}ms", segment.duration_ms());
                    if tx.send(segment).is_err() {
                        break;
                    }
                }
            }
        }
    }
    segmenter.reset();
}

async fn run_transcription_worker(
    transcriber: Arc<dyn Transcriber>,
    mut rx: mpsc::UnboundedReceiver<SpeechSegment>,
    events: EngineEventSender,
    listening: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    loop {
        let segment = tokio::select! {
            () = cancel.cancelled() => break,
            segment = rx.recv() => match segment {
                Some(segment) => segment,
                None => break,
            },
        };

        let result = transcriber.transcribe(&segment).await;
        if !listening.load(Ordering::SeqCst) {
            debug!("dropping transcription that finished after stop");
            break;
        }

        match result {
            Ok(transcript) if transcript.text.trim().is_empty() => {
                debug!("empty transcription ignored");
            }
            Ok(transcript) => {
                let _ = events.send(EngineEvent::Result(TranscriptEvent::final_result(
                    transcript.text,
                    transcript.confidence,
                )));
            }
            Err(e) => {
                warn!("transcription failed: {e}");
                // The worker keeps running; the error is not restartable.
                let error = EngineError::new(RecognitionErrorCode::Transcription, e.to_string());
                let _ = events.send(EngineEvent::Error(error));
            }
        }
    }
}
