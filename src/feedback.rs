//! Spoken feedback for confirmation and recovery prompts.

use crate::command::GameCommand;
use crate::config::FeedbackConfig;
use crate::error::Result;
use crate::matcher::suggest::{HELP_HINT, Suggestion};
use async_trait::async_trait;
use tracing::info;

/// One piece of text to speak.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Utterance {
    pub fn new(text: impl Into<String>, config: &FeedbackConfig) -> Self {
        Self {
            text: text.into(),
            rate: config.rate,
            pitch: config.pitch,
            volume: config.volume.clamp(0.0, 1.0),
        }
    }
}

/// Text-to-speech capability.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync + 'static {
    /// Speak `utterance`, resolving once playback has finished.
    async fn speak(&self, utterance: Utterance) -> Result<()>;
}

/// Synthesizer that logs prompts instead of speaking them.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSynthesizer;

#[async_trait]
impl SpeechSynthesizer for ConsoleSynthesizer {
    async fn speak(&self, utterance: Utterance) -> Result<()> {
        info!(target: "warcry::speech", "{}", utterance.text);
        Ok(())
    }
}

/// Question asked when a command needs confirmation.
#[must_use]
pub fn confirm_prompt(command: GameCommand) -> String {
    format!("Did you mean \"{command}\"? Say yes or no.")
}

/// Asked after the user requests a retry.
pub const RETRY_PROMPT: &str = "Please repeat the command.";

/// Spoken when a confirmation expires.
pub const TIMEOUT_PROMPT: &str = "Confirmation timed out. Command cancelled.";

/// Spoken when the user declines.
pub const CANCELLED_PROMPT: &str = "Cancelled.";

/// Asked again when a reply was neither an answer nor a command.
#[must_use]
pub fn reprompt(command: GameCommand) -> String {
    format!("Sorry, was that \"{command}\"? Please answer yes or no.")
}

/// Prompt for a transcript that matched nothing.
#[must_use]
pub fn unrecognized_prompt(suggestions: &[Suggestion]) -> String {
    if suggestions.is_empty() {
        return format!("Command not recognised. {HELP_HINT}");
    }
    let names: Vec<&str> = suggestions.iter().map(|s| s.command.as_str()).collect();
    format!("Command not recognised. Did you mean: {}?", names.join(", "))
}
