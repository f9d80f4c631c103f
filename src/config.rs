//! Configuration types for the voice command pipeline.

use crate::command::GameCommand;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the voice pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Recognition engine selection and settings.
    pub recognition: RecognitionConfig,
    /// Microphone capture settings (offline engine).
    pub audio: AudioConfig,
    /// Voice activity segmentation settings (offline engine).
    pub vad: VadConfig,
    /// Pattern matcher settings.
    pub matcher: MatcherConfig,
    /// Confirmation thresholds and timeout.
    pub confirmation: ConfirmationConfig,
    /// Multi-command playback settings.
    pub sequencer: SequencerConfig,
    /// Adaptive phrase learning settings.
    pub learning: LearningConfig,
    /// External offline transcriber settings.
    pub offline: OfflineConfig,
    /// Spoken feedback settings.
    pub feedback: FeedbackConfig,
}

/// Recognition engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Identifier of the engine selected at startup.
    pub engine: String,
    /// BCP-47 recognition language.
    pub language: String,
    /// Keep the recogniser running between utterances.
    pub continuous: bool,
    /// Deliver non-final results while the user is still speaking.
    pub interim_results: bool,
    /// Maximum alternatives requested from the recogniser.
    pub max_alternatives: u32,
    /// Delay before restarting a streaming recogniser that ended.
    pub restart_delay_ms: u64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            engine: "console".to_owned(),
            language: "ja-JP".to_owned(),
            continuous: true,
            interim_results: false,
            max_alternatives: 1,
            restart_delay_ms: 500,
        }
    }
}

/// Microphone capture configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name (None = system default).
    pub input_device: Option<String>,
}

/// Voice activity segmentation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// RMS energy threshold for speech detection.
    ///
    /// Typical values for f32 samples in \[-1, 1\]:
    ///   - 0.005: very sensitive
    ///   - 0.01:  normal sensitivity (default)
    ///   - 0.02:  noisy environments
    pub threshold: f32,
    /// Silence duration in ms that ends an utterance.
    pub silence_timeout_ms: u32,
    /// Utterances with less voiced audio than this are discarded.
    pub min_speech_ms: u32,
    /// Sample rate handed to the transcriber.
    pub target_sample_rate: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.01,
            silence_timeout_ms: 800,
            min_speech_ms: 200,
            target_sample_rate: 16_000,
        }
    }
}

/// Pattern matcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Maximum number of suggestions offered for unrecognised input.
    pub max_suggestions: usize,
    /// Minimum character-overlap similarity for a suggestion.
    pub min_similarity: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            max_suggestions: 3,
            min_similarity: 0.5,
        }
    }
}

/// Confirmation coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// Confidence below which any single command needs confirmation.
    pub threshold: f32,
    /// Stricter threshold applied to high-stakes commands.
    pub high_stakes_threshold: f32,
    /// Commands that use the stricter threshold.
    pub high_stakes: Vec<GameCommand>,
    /// Threshold applied to long transcripts.
    pub long_utterance_threshold: f32,
    /// Transcripts with more whitespace tokens than this count as long.
    pub long_utterance_tokens: usize,
    /// Time allowed for a yes/no answer.
    pub timeout_ms: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            high_stakes_threshold: 0.8,
            high_stakes: vec![GameCommand::Retreat],
            long_utterance_threshold: 0.75,
            long_utterance_tokens: 3,
            timeout_ms: 10_000,
        }
    }
}

/// Command sequencer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Gap between consecutive dispatches of a multi-command utterance.
    pub inter_command_delay_ms: u64,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            inter_command_delay_ms: 1000,
        }
    }
}

/// Learning store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Occurrences of a phrase needed before it becomes a learned pattern.
    pub promotion_threshold: u32,
    /// Key the learning record is stored under.
    pub storage_key: String,
    /// Directory backing the key-value store (None = app data dir).
    pub store_dir: Option<PathBuf>,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            promotion_threshold: 3,
            storage_key: "warcry.voice.learning".to_owned(),
            store_dir: None,
        }
    }
}

impl LearningConfig {
    /// Directory backing the key-value store.
    #[must_use]
    pub fn resolved_store_dir(&self) -> PathBuf {
        self.store_dir
            .clone()
            .unwrap_or_else(|| crate::warcry_dirs::data_dir().join("store"))
    }
}

/// External offline transcriber configuration.
///
/// The command receives the utterance as a 16-bit mono WAV file; each
/// `{wav}` inside an argument is replaced by its path. The trimmed stdout is
/// the transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// Program and arguments (empty = offline engine not registered).
    pub command: Vec<String>,
    /// Confidence reported for offline transcripts.
    pub assumed_confidence: f32,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            assumed_confidence: 0.85,
        }
    }
}

/// Spoken feedback configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Speak prompts (confirmation, retry, help) through the synthesizer.
    pub speak_prompts: bool,
    /// Speech rate multiplier.
    pub rate: f32,
    /// Pitch multiplier.
    pub pitch: f32,
    /// Volume in \[0, 1\].
    pub volume: f32,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            speak_prompts: true,
            rate: 1.1,
            pitch: 1.0,
            volume: 0.8,
        }
    }
}

impl VoiceConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::VoiceError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::VoiceError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/warcry/config.toml`.
    pub fn default_config_path() -> PathBuf {
        crate::warcry_dirs::config_dir().join("config.toml")
    }
}
