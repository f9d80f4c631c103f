//! Message types passed between pipeline stages.

use crate::command::GameCommand;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// A chunk of raw audio samples from the microphone.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Mono f32 samples at `sample_rate`.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Timestamp when this chunk was captured.
    pub captured_at: Instant,
}

/// A complete utterance detected by voice activity segmentation, ready for
/// transcription.
#[derive(Debug, Clone)]
pub struct SpeechSegment {
    /// Concatenated audio samples for the entire utterance.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// When the utterance started.
    pub started_at: Instant,
}

impl SpeechSegment {
    /// Duration of the segment in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as u64 * 1000) / u64::from(self.sample_rate)
    }
}

/// A transcript produced by a recognition engine for a single utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    /// Recognised text.
    pub text: String,
    /// Recogniser confidence in `0.0..=1.0`.
    pub confidence: f32,
    /// Whether this is the final result for the utterance.
    pub is_final: bool,
    /// When the engine produced the result.
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEvent {
    /// Build a transcript stamped with the current time.
    ///
    /// Confidence is clamped into `0.0..=1.0`; NaN becomes `0.0`.
    pub fn new(text: impl Into<String>, confidence: f32, is_final: bool) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            text: text.into(),
            confidence,
            is_final,
            timestamp: Utc::now(),
        }
    }

    /// Shorthand for a final transcript.
    pub fn final_result(text: impl Into<String>, confidence: f32) -> Self {
        Self::new(text, confidence, true)
    }
}

/// Which matcher stage produced a [`MatchResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    /// A user-learned phrase.
    Learned,
    /// A two-command sequencing phrase.
    Compound,
    /// The static synonym table.
    Keyword,
    /// A paraphrase regular expression.
    Paraphrase,
    /// Nothing matched.
    None,
}

/// Commands derived from one transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Ordered, deduplicated commands. Empty when nothing matched.
    pub commands: Vec<GameCommand>,
    /// The transcript text that was matched.
    pub text: String,
    /// Confidence of the originating transcript.
    pub confidence: f32,
    /// Stage that produced the commands.
    pub source: MatchSource,
}

impl MatchResult {
    /// Whether no command was recognised.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Whether the utterance carried more than one command.
    #[must_use]
    pub fn is_compound(&self) -> bool {
        self.commands.len() > 1
    }

    /// The command when exactly one was recognised.
    #[must_use]
    pub fn single(&self) -> Option<GameCommand> {
        match self.commands.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }
}
