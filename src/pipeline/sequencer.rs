//! Time-spaced dispatch of multi-command utterances.
//!
//! The sequencer is a passive queue: the dispatcher asks it for the next due
//! time, sleeps until then, and drains whatever is due. Tokens from one
//! utterance are appended contiguously and spaced by the configured delay
//! relative to the previously queued token. Dispatch is unconditional; a
//! token does not wait for the game to act on the one before it.

use crate::command::GameCommand;
use crate::config::SequencerConfig;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// A command released by the sequencer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub command: GameCommand,
    pub original_text: String,
}

#[derive(Debug)]
struct QueuedCommand {
    due: Instant,
    dispatch: Dispatch,
}

/// Append-only queue of spaced command dispatches.
#[derive(Debug)]
pub struct CommandSequencer {
    queue: VecDeque<QueuedCommand>,
    spacing: Duration,
}

impl CommandSequencer {
    pub fn new(config: &SequencerConfig) -> Self {
        Self {
            queue: VecDeque::new(),
            spacing: Duration::from_millis(config.inter_command_delay_ms),
        }
    }

    /// Queue `commands` from one utterance.
    ///
    /// The first token is due immediately when the queue is empty, otherwise
    /// one spacing after the last queued token.
    pub fn enqueue(&mut self, commands: &[GameCommand], original_text: &str, now: Instant) {
        let mut due = match self.queue.back() {
            Some(last) => (last.due + self.spacing).max(now),
            None => now,
        };
        for &command in commands {
            self.queue.push_back(QueuedCommand {
                due,
                dispatch: Dispatch {
                    command,
                    original_text: original_text.to_owned(),
                },
            });
            due += self.spacing;
        }
        debug!("queued {} commands, {} pending", commands.len(), self.queue.len());
    }

    /// Remove and return every command due at or before `now`, in order.
    pub fn drain_due(&mut self, now: Instant) -> Vec<Dispatch> {
        let mut due = Vec::new();
        while self.queue.front().is_some_and(|q| q.due <= now) {
            if let Some(q) = self.queue.pop_front() {
                due.push(q.dispatch);
            }
        }
        due
    }

    /// When the next queued command becomes due.
    #[must_use]
    pub fn next_due(&self) -> Option<Instant> {
        self.queue.front().map(|q| q.due)
    }

    /// Drop all queued commands without dispatching them.
    pub fn flush(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        if dropped > 0 {
            debug!("flushed {dropped} queued commands");
        }
        dropped
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
