//! Yes/no confirmation for uncertain single-command matches.
//!
//! At most one confirmation is pending. The coordinator is synchronous; the
//! dispatcher polls [`ConfirmationCoordinator::poll_timeout`] at the
//! [`ConfirmationCoordinator::deadline`]. A new request discards any pending
//! one without resolving it.

use crate::command::GameCommand;
use crate::config::ConfirmationConfig;
use crate::error::{Result, VoiceError};
use crate::pipeline::messages::{MatchResult, MatchSource};
use regex::{Regex, RegexBuilder};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

const YES_PATTERN: &str = r"^(?:(?:yes|yeah|yep|yup|sure|correct|confirm|affirmative|ok|okay)\b|はい|うん|ええ|そう|お願い|了解|オーケー)";
const NO_PATTERN: &str =
    r"^(?:(?:no|nope|nah|cancel|wrong|negative)\b|いいえ|いや|違う|ちがう|キャンセル|だめ|ダメ)";
const RETRY_PATTERN: &str = r"^(?:(?:again|repeat|retry|one more time|say again|try again)\b|もう一度|もう一回|やり直し|繰り返し)";

/// Why a confirmation ended without executing the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// The user said no.
    Declined,
    /// The user asked to say the command again.
    RetryRequested,
    /// No usable answer before the deadline.
    TimedOut,
}

/// Terminal outcome of a confirmation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmationOutcome {
    Confirmed {
        command: GameCommand,
        original_text: String,
    },
    Rejected {
        command: GameCommand,
        original_text: String,
        reason: RejectionReason,
    },
    /// The reply was itself a command, executed in place of the original.
    Replaced {
        previous: GameCommand,
        original_text: String,
        replacement: MatchResult,
    },
}

/// The confirmation currently awaiting an answer.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingConfirmation {
    pub command: GameCommand,
    pub original_text: String,
    pub confidence: f32,
    pub created_at: Instant,
    pub deadline: Instant,
}

/// How a reply was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Yes,
    No,
    Retry,
    Other,
}

/// Result of feeding a reply to the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseHandling {
    Resolved(ConfirmationOutcome),
    /// The reply was not understood; the deadline was extended.
    StillPending(PendingConfirmation),
}

/// Decides when to confirm and tracks the pending confirmation.
pub struct ConfirmationCoordinator {
    threshold: f32,
    high_stakes_threshold: f32,
    high_stakes: Vec<GameCommand>,
    long_utterance_threshold: f32,
    long_utterance_tokens: usize,
    timeout: Duration,
    yes: Regex,
    no: Regex,
    retry: Regex,
    pending: Option<PendingConfirmation>,
}

fn rejection(pending: PendingConfirmation, reason: RejectionReason) -> ConfirmationOutcome {
    ConfirmationOutcome::Rejected {
        command: pending.command,
        original_text: pending.original_text,
        reason,
    }
}

fn reply_regex(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| VoiceError::Config(format!("invalid reply pattern: {e}")))
}

impl ConfirmationCoordinator {
    /// # Errors
    ///
    /// Returns [`VoiceError::Config`] if a reply pattern fails to compile.
    pub fn new(config: &ConfirmationConfig) -> Result<Self> {
        Ok(Self {
            threshold: config.threshold,
            high_stakes_threshold: config.high_stakes_threshold,
            high_stakes: config.high_stakes.clone(),
            long_utterance_threshold: config.long_utterance_threshold,
            long_utterance_tokens: config.long_utterance_tokens,
            timeout: Duration::from_millis(config.timeout_ms),
            yes: reply_regex(YES_PATTERN)?,
            no: reply_regex(NO_PATTERN)?,
            retry: reply_regex(RETRY_PATTERN)?,
            pending: None,
        })
    }

    /// Whether `result` must be confirmed before it runs.
    ///
    /// Only single-command matches are ever confirmed, and learned phrases
    /// are trusted at any confidence. All thresholds are exclusive: a
    /// confidence equal to the threshold runs directly.
    #[must_use]
    pub fn requires_confirmation(&self, result: &MatchResult) -> bool {
        let Some(command) = result.single() else {
            return false;
        };
        if result.source == MatchSource::Learned {
            return false;
        }
        let confidence = result.confidence;

        if self.high_stakes.contains(&command) && confidence < self.high_stakes_threshold {
            return true;
        }
        if confidence < self.threshold {
            return true;
        }
        let tokens = result.text.split_whitespace().count();
        tokens > self.long_utterance_tokens && confidence < self.long_utterance_threshold
    }

    /// Start a confirmation, returning the one it displaced.
    pub fn request(
        &mut self,
        command: GameCommand,
        original_text: &str,
        confidence: f32,
        now: Instant,
    ) -> Option<PendingConfirmation> {
        let pending = PendingConfirmation {
            command,
            original_text: original_text.to_owned(),
            confidence,
            created_at: now,
            deadline: now + self.timeout,
        };
        info!("confirming {command} for \"{original_text}\" ({confidence:.2})");
        let displaced = self.pending.replace(pending);
        if let Some(ref old) = displaced {
            debug!("discarding unresolved confirmation for {}", old.command);
        }
        displaced
    }

    /// Classify a reply. Checked in the order yes, no, retry.
    #[must_use]
    pub fn classify(&self, text: &str) -> ReplyKind {
        let text = text.trim();
        if self.yes.is_match(text) {
            ReplyKind::Yes
        } else if self.no.is_match(text) {
            ReplyKind::No
        } else if self.retry.is_match(text) {
            ReplyKind::Retry
        } else {
            ReplyKind::Other
        }
    }

    /// Feed a final transcript to the pending confirmation.
    ///
    /// `reparse` is consulted only when the reply is not a yes/no/retry
    /// answer. Returns `None` when nothing is pending.
    pub fn respond<F>(&mut self, text: &str, reparse: F, now: Instant) -> Option<ResponseHandling>
    where
        F: FnOnce(&str) -> MatchResult,
    {
        let kind = self.classify(text);
        let pending = self.pending.take()?;

        let outcome = match kind {
            ReplyKind::Yes => ConfirmationOutcome::Confirmed {
                command: pending.command,
                original_text: pending.original_text,
            },
            ReplyKind::No => rejection(pending, RejectionReason::Declined),
            ReplyKind::Retry => rejection(pending, RejectionReason::RetryRequested),
            ReplyKind::Other => {
                let replacement = reparse(text);
                if replacement.is_empty() {
                    let mut pending = pending;
                    pending.deadline = now + self.timeout;
                    debug!("unclear confirmation reply \"{text}\"; still pending");
                    self.pending = Some(pending.clone());
                    return Some(ResponseHandling::StillPending(pending));
                }
                ConfirmationOutcome::Replaced {
                    previous: pending.command,
                    original_text: pending.original_text,
                    replacement,
                }
            }
        };

        info!("confirmation resolved: {outcome:?}");
        Some(ResponseHandling::Resolved(outcome))
    }

    /// Expire the pending confirmation if its deadline has passed.
    pub fn poll_timeout(&mut self, now: Instant) -> Option<ConfirmationOutcome> {
        if self.pending.as_ref()?.deadline > now {
            return None;
        }
        let pending = self.pending.take()?;
        info!("confirmation for {} timed out", pending.command);
        Some(rejection(pending, RejectionReason::TimedOut))
    }

    /// Drop the pending confirmation without resolving it.
    pub fn cancel(&mut self) -> Option<PendingConfirmation> {
        self.pending.take()
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    #[must_use]
    pub fn pending(&self) -> Option<&PendingConfirmation> {
        self.pending.as_ref()
    }
}
