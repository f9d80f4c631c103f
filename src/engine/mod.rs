//! Speech recognition engines.
//!
//! Every backend implements [`RecognitionEngine`] and reports through an
//! [`EngineEvent`] channel handed to it at construction. Two families exist:
//!
//! - [`streaming::StreamingEngine`]: low latency, wraps a recogniser that
//!   finalises utterances itself (platform speech service, typed console input).
//! - [`batch::BatchEngine`]: offline, segments microphone audio with VAD and
//!   transcribes one utterance at a time.
//!
//! Engines are created on demand through an [`EngineRegistry`] keyed by id.

pub mod batch;
pub mod command_transcriber;
pub mod console;
pub mod streaming;

use crate::error::{Result, VoiceError};
use crate::pipeline::messages::TranscriptEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::mpsc;

/// Whether an engine is currently capturing speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListeningState {
    Listening,
    Stopped,
}

/// Recogniser error codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecognitionErrorCode {
    /// Silence timed out before any speech.
    NoSpeech,
    /// Network hiccup reaching the recognition service.
    Network,
    /// Recognition was interrupted.
    Aborted,
    /// The user refused microphone access.
    NotAllowed,
    /// The platform refused the recognition service.
    ServiceNotAllowed,
    /// The capture device failed or went away.
    AudioCapture,
    /// The capability is missing on this platform.
    Unavailable,
    /// Offline transcription of one utterance failed.
    Transcription,
    /// Anything the recogniser reports that is not listed above.
    Other(String),
}

impl RecognitionErrorCode {
    /// Parse a recogniser-reported code such as `"no-speech"`.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "no-speech" => Self::NoSpeech,
            "network" => Self::Network,
            "aborted" => Self::Aborted,
            "not-allowed" => Self::NotAllowed,
            "service-not-allowed" => Self::ServiceNotAllowed,
            "audio-capture" => Self::AudioCapture,
            "unavailable" => Self::Unavailable,
            "transcription" => Self::Transcription,
            other => Self::Other(other.to_owned()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::NoSpeech => "no-speech",
            Self::Network => "network",
            Self::Aborted => "aborted",
            Self::NotAllowed => "not-allowed",
            Self::ServiceNotAllowed => "service-not-allowed",
            Self::AudioCapture => "audio-capture",
            Self::Unavailable => "unavailable",
            Self::Transcription => "transcription",
            Self::Other(code) => code,
        }
    }

    /// Transient errors restart the recogniser; fatal ones need the user.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NoSpeech | Self::Network | Self::Aborted)
    }

    /// Code reported for an engine that failed to initialise.
    #[must_use]
    pub fn for_error(error: &VoiceError) -> Self {
        match error {
            VoiceError::PermissionDenied(_) => Self::NotAllowed,
            VoiceError::Audio(_) => Self::AudioCapture,
            VoiceError::Transcription(_) => Self::Transcription,
            _ => Self::Unavailable,
        }
    }
}

impl fmt::Display for RecognitionErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error surfaced by an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub message: String,
    pub code: RecognitionErrorCode,
    /// Whether the engine is restarting on its own.
    pub should_auto_restart: bool,
}

impl EngineError {
    pub fn new(code: RecognitionErrorCode, message: impl Into<String>) -> Self {
        let should_auto_restart = code.is_transient();
        Self {
            message: message.into(),
            code,
            should_auto_restart,
        }
    }
}

/// Events emitted by an engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Result(TranscriptEvent),
    Status(ListeningState),
    Error(EngineError),
}

/// Channel an engine reports on.
pub type EngineEventSender = mpsc::UnboundedSender<EngineEvent>;

/// Settings forwarded to the recogniser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionSettings {
    pub language: String,
    pub continuous: bool,
    pub interim_results: bool,
    pub max_alternatives: u32,
}

impl From<&crate::config::RecognitionConfig> for RecognitionSettings {
    fn from(config: &crate::config::RecognitionConfig) -> Self {
        Self {
            language: config.language.clone(),
            continuous: config.continuous,
            interim_results: config.interim_results,
            max_alternatives: config.max_alternatives,
        }
    }
}

/// Uniform interface over speech-to-text backends.
#[async_trait]
pub trait RecognitionEngine: Send {
    /// Registry identifier.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Check the platform capability and prepare resources.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::EngineUnavailable`] when the capability is missing,
    /// or [`VoiceError::PermissionDenied`] when access was refused.
    async fn init(&mut self) -> Result<()>;

    /// Begin listening. Returns `false` if the engine never initialised.
    async fn start(&mut self) -> bool;

    /// Stop listening. Results still in flight are dropped.
    async fn stop(&mut self);

    /// Replace recogniser settings; applied on the next start.
    fn update_config(&mut self, settings: RecognitionSettings);

    /// Whether the engine currently intends to listen.
    fn is_listening(&self) -> bool;
}

/// What a factory receives when the dispatcher instantiates an engine.
#[derive(Clone)]
pub struct EngineContext {
    pub events: EngineEventSender,
    pub settings: RecognitionSettings,
    /// Raised while feedback speech plays; engines that capture audio must
    /// ignore input while it is set.
    pub suppress_capture: Arc<AtomicBool>,
}

type EngineFactory = Box<dyn Fn(EngineContext) -> Box<dyn RecognitionEngine> + Send + Sync>;

struct RegisteredEngine {
    id: String,
    name: String,
    factory: EngineFactory,
}

/// Engine listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineInfo {
    pub id: String,
    pub name: String,
    pub is_current: bool,
}

/// Engine factories keyed by identifier, in registration order.
#[derive(Default)]
pub struct EngineRegistry {
    engines: Vec<RegisteredEngine>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a factory under `id`.
    pub fn register<F>(&mut self, id: impl Into<String>, name: impl Into<String>, factory: F)
    where
        F: Fn(EngineContext) -> Box<dyn RecognitionEngine> + Send + Sync + 'static,
    {
        let id = id.into();
        let entry = RegisteredEngine {
            id: id.clone(),
            name: name.into(),
            factory: Box::new(factory),
        };
        if let Some(existing) = self.engines.iter_mut().find(|e| e.id == id) {
            *existing = entry;
        } else {
            self.engines.push(entry);
        }
    }

    /// Instantiate the engine registered under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::UnknownEngine`] when nothing is registered under `id`.
    pub fn create(&self, id: &str, context: EngineContext) -> Result<Box<dyn RecognitionEngine>> {
        self.engines
            .iter()
            .find(|e| e.id == id)
            .map(|e| (e.factory)(context))
            .ok_or_else(|| VoiceError::UnknownEngine(id.to_owned()))
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.engines.iter().any(|e| e.id == id)
    }

    /// Registered engines, flagging `current`.
    #[must_use]
    pub fn available(&self, current: Option<&str>) -> Vec<EngineInfo> {
        self.engines
            .iter()
            .map(|e| EngineInfo {
                id: e.id.clone(),
                name: e.name.clone(),
                is_current: current == Some(e.id.as_str()),
            })
            .collect()
    }
}
