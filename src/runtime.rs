//! Runtime events emitted by the dispatcher for the game and observability.
//!
//! Events are broadcast; slow subscribers lag and lose the oldest events
//! rather than blocking the dispatcher.

use crate::command::GameCommand;
use crate::engine::ListeningState;
use crate::matcher::suggest::Suggestion;
use crate::pipeline::confirmation::ConfirmationOutcome;
use crate::pipeline::messages::TranscriptEvent;

/// Events describing what the voice pipeline is doing.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    /// A command to execute in the game.
    Command {
        command: GameCommand,
        /// Transcript the command came from.
        original_text: String,
    },
    /// The active engine started or stopped listening.
    Status(ListeningState),
    /// A recognition error, surfaced unmodified from the engine.
    Error {
        message: String,
        code: String,
        /// Whether the engine is restarting on its own.
        should_restart: bool,
    },
    /// A multi-command utterance was queued, in dispatch order.
    CommandQueue(Vec<GameCommand>),
    /// A phrase was promoted to a learned pattern.
    UserLearning {
        new_pattern: String,
        command: GameCommand,
        confidence: f32,
    },
    /// An uncertain command is waiting for a yes/no answer.
    ConfirmationRequest {
        original_text: String,
        interpreted_command: GameCommand,
        confidence: f32,
    },
    /// Every final or interim transcript the engine produced.
    Transcript(TranscriptEvent),
    /// A pending confirmation reached a terminal outcome.
    ConfirmationResolved(ConfirmationOutcome),
    /// A final transcript matched no command.
    Unrecognized {
        text: String,
        suggestions: Vec<Suggestion>,
    },
    /// Feedback text for the player (also spoken when enabled).
    Prompt(String),
}
