//! Transcript → game command interpretation.
//!
//! [`VoicePipeline`] ties the matcher, confirmation coordinator, sequencer
//! and learning store together. It is synchronous and time is passed in, so
//! every decision can be driven deterministically from tests; the dispatcher
//! owns it and supplies real time.

use crate::command::GameCommand;
use crate::config::VoiceConfig;
use crate::error::Result;
use crate::feedback;
use crate::learning::{LearningStore, LearningUpdate};
use crate::matcher::PatternMatcher;
use crate::pipeline::confirmation::{
    ConfirmationCoordinator, ConfirmationOutcome, PendingConfirmation, RejectionReason,
    ResponseHandling,
};
use crate::pipeline::history::ContextHistory;
use crate::pipeline::messages::{MatchResult, TranscriptEvent};
use crate::pipeline::sequencer::CommandSequencer;
use crate::runtime::RuntimeEvent;
use tokio::time::Instant;
use tracing::{debug, info};

/// Confidence reported for phrases the user explicitly confirmed.
const CONFIRMED_CONFIDENCE: f32 = 1.0;

/// Interpretation state for one listening session.
pub struct VoicePipeline {
    matcher: PatternMatcher,
    confirmation: ConfirmationCoordinator,
    sequencer: CommandSequencer,
    learning: LearningStore,
    history: ContextHistory,
}

impl VoicePipeline {
    /// # Errors
    ///
    /// Returns an error if the matcher or reply patterns fail to compile.
    pub fn new(config: &VoiceConfig, learning: LearningStore) -> Result<Self> {
        Ok(Self {
            matcher: PatternMatcher::new(&config.matcher)?,
            confirmation: ConfirmationCoordinator::new(&config.confirmation)?,
            sequencer: CommandSequencer::new(&config.sequencer),
            learning,
            history: ContextHistory::default(),
        })
    }

    /// Interpret one transcript from the engine.
    ///
    /// Interim transcripts are recorded and reported but never acted on. A
    /// pending confirmation consumes the next final transcript before any
    /// command matching happens.
    pub fn handle_transcript(&mut self, event: &TranscriptEvent, now: Instant) -> Vec<RuntimeEvent> {
        self.history.push(event.clone());
        let mut out = vec![RuntimeEvent::Transcript(event.clone())];

        let text = event.text.trim();
        if !event.is_final || text.is_empty() {
            return out;
        }

        if self.confirmation.pending().is_some() {
            self.handle_reply(text, now, &mut out);
            return out;
        }

        let result = self
            .matcher
            .match_text(text, event.confidence, self.learning.learned_patterns());
        self.handle_match(result, now, &mut out);
        out
    }

    fn handle_match(&mut self, result: MatchResult, now: Instant, out: &mut Vec<RuntimeEvent>) {
        if result.is_empty() {
            let suggestions = self.matcher.suggest(&result.text);
            info!("no command in \"{}\"", result.text);
            out.push(RuntimeEvent::Prompt(feedback::unrecognized_prompt(
                &suggestions,
            )));
            out.push(RuntimeEvent::Unrecognized {
                text: result.text,
                suggestions,
            });
            return;
        }

        if self.confirmation.requires_confirmation(&result)
            && let Some(command) = result.single()
        {
            self.confirmation
                .request(command, &result.text, result.confidence, now);
            out.push(RuntimeEvent::ConfirmationRequest {
                original_text: result.text.clone(),
                interpreted_command: command,
                confidence: result.confidence,
            });
            out.push(RuntimeEvent::Prompt(feedback::confirm_prompt(command)));
            return;
        }

        self.execute(&result.commands, &result.text, now, out);
    }

    fn handle_reply(&mut self, text: &str, now: Instant, out: &mut Vec<RuntimeEvent>) {
        let matcher = &self.matcher;
        let learned = self.learning.learned_patterns();
        let handling = self.confirmation.respond(
            text,
            |reply| matcher.match_text(reply, CONFIRMED_CONFIDENCE, learned),
            now,
        );

        match handling {
            None => {}
            Some(ResponseHandling::StillPending(pending)) => {
                out.push(RuntimeEvent::Prompt(feedback::reprompt(pending.command)));
            }
            Some(ResponseHandling::Resolved(outcome)) => {
                out.push(RuntimeEvent::ConfirmationResolved(outcome.clone()));
                self.apply_outcome(outcome, now, out);
            }
        }
    }

    fn apply_outcome(&mut self, outcome: ConfirmationOutcome, now: Instant, out: &mut Vec<RuntimeEvent>) {
        match outcome {
            ConfirmationOutcome::Confirmed {
                command,
                original_text,
            } => {
                out.push(RuntimeEvent::Command {
                    command,
                    original_text: original_text.clone(),
                });
                let update = self.learning.record_success(&original_text, command);
                push_learning(update, out);
            }
            ConfirmationOutcome::Rejected { reason, .. } => {
                let prompt = match reason {
                    RejectionReason::Declined => feedback::CANCELLED_PROMPT,
                    RejectionReason::RetryRequested => feedback::RETRY_PROMPT,
                    RejectionReason::TimedOut => feedback::TIMEOUT_PROMPT,
                };
                out.push(RuntimeEvent::Prompt(prompt.to_owned()));
            }
            ConfirmationOutcome::Replaced {
                previous,
                original_text,
                replacement,
            } => {
                if let Some(command) = replacement.single() {
                    out.push(RuntimeEvent::Command {
                        command,
                        original_text: replacement.text.clone(),
                    });
                    let update = self.learning.record_correction(
                        &original_text,
                        previous,
                        &replacement.text,
                        command,
                    );
                    push_learning(update, out);
                } else {
                    self.execute(&replacement.commands, &replacement.text, now, out);
                }
            }
        }
    }

    /// Dispatch one command now, or queue several with spacing.
    fn execute(
        &mut self,
        commands: &[GameCommand],
        original_text: &str,
        now: Instant,
        out: &mut Vec<RuntimeEvent>,
    ) {
        match commands {
            [] => {}
            [command] => out.push(RuntimeEvent::Command {
                command: *command,
                original_text: original_text.to_owned(),
            }),
            _ => {
                out.push(RuntimeEvent::CommandQueue(commands.to_vec()));
                self.sequencer.enqueue(commands, original_text, now);
                self.drain_sequencer(now, out);
            }
        }
    }

    fn drain_sequencer(&mut self, now: Instant, out: &mut Vec<RuntimeEvent>) {
        for dispatch in self.sequencer.drain_due(now) {
            out.push(RuntimeEvent::Command {
                command: dispatch.command,
                original_text: dispatch.original_text,
            });
        }
    }

    /// Fire whatever timers are due: confirmation expiry and queued commands.
    pub fn poll(&mut self, now: Instant) -> Vec<RuntimeEvent> {
        let mut out = Vec::new();
        if let Some(outcome) = self.confirmation.poll_timeout(now) {
            out.push(RuntimeEvent::ConfirmationResolved(outcome.clone()));
            self.apply_outcome(outcome, now, &mut out);
        }
        self.drain_sequencer(now, &mut out);
        out
    }

    /// Earliest time [`poll`](Self::poll) has work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.confirmation.deadline(), self.sequencer.next_due()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Drop the pending confirmation and all queued commands.
    pub fn halt(&mut self) {
        if let Some(pending) = self.confirmation.cancel() {
            debug!("cancelled confirmation for {}", pending.command);
        }
        self.sequencer.flush();
    }

    #[must_use]
    pub fn pending_confirmation(&self) -> Option<&PendingConfirmation> {
        self.confirmation.pending()
    }

    #[must_use]
    pub fn queued_commands(&self) -> usize {
        self.sequencer.len()
    }

    #[must_use]
    pub fn history(&self) -> &ContextHistory {
        &self.history
    }

    #[must_use]
    pub fn learning(&self) -> &LearningStore {
        &self.learning
    }
}

fn push_learning(update: Option<LearningUpdate>, out: &mut Vec<RuntimeEvent>) {
    if let Some(update) = update
        && update.promoted
    {
        out.push(RuntimeEvent::UserLearning {
            new_pattern: update.phrase,
            command: update.command,
            confidence: CONFIRMED_CONFIDENCE,
        });
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::LearningConfig;
    use crate::learning::kv::MemoryKeyValueStore;
    use std::time::Duration;
    use GameCommand::{Attack, Defend, Retreat};

    fn pipeline() -> (VoicePipeline, MemoryKeyValueStore) {
        let kv = MemoryKeyValueStore::new();
        let learning = LearningStore::load(Box::new(kv.clone()), &LearningConfig::default());
        (
            VoicePipeline::new(&VoiceConfig::default(), learning).unwrap(),
            kv,
        )
    }

    fn say(p: &mut VoicePipeline, text: &str, confidence: f32, now: Instant) -> Vec<RuntimeEvent> {
        p.handle_transcript(&TranscriptEvent::final_result(text, confidence), now)
    }

    fn commands(events: &[RuntimeEvent]) -> Vec<GameCommand> {
        events
            .iter()
            .filter_map(|e| match e {
                RuntimeEvent::Command { command, .. } => Some(*command),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn paraphrase_dispatches_attack() {
        let (mut p, _) = pipeline();
        let events = say(&mut p, "敵をやっつけて", 0.9, Instant::now());
        assert_eq!(commands(&events), vec![Attack]);
        assert!(matches!(events[0], RuntimeEvent::Transcript(_)));
    }

    #[test]
    fn compound_utterance_is_spaced_by_one_second() {
        let (mut p, _) = pipeline();
        let now = Instant::now();
        let events = say(&mut p, "攻撃してから防御", 0.9, now);

        assert!(events.contains(&RuntimeEvent::CommandQueue(vec![Attack, Defend])));
        assert_eq!(commands(&events), vec![Attack]);
        assert_eq!(p.next_deadline(), Some(now + Duration::from_millis(1000)));

        assert!(commands(&p.poll(now + Duration::from_millis(999))).is_empty());
        assert_eq!(
            commands(&p.poll(now + Duration::from_millis(1000))),
            vec![Defend]
        );
        assert_eq!(p.next_deadline(), None);
    }

    #[test]
    fn low_confidence_then_yes_dispatches_and_learns() {
        let (mut p, _) = pipeline();
        let now = Instant::now();
        let events = say(&mut p, "attack", 0.55, now);
        assert!(commands(&events).is_empty());
        assert!(events.contains(&RuntimeEvent::ConfirmationRequest {
            original_text: "attack".into(),
            interpreted_command: Attack,
            confidence: 0.55,
        }));

        let events = say(&mut p, "はい", 0.9, now + Duration::from_secs(2));
        assert_eq!(commands(&events), vec![Attack]);
        assert!(p.pending_confirmation().is_none());
        assert_eq!(p.learning().occurrences("attack", Attack), 1);
    }

    #[test]
    fn low_confidence_then_no_does_nothing() {
        let (mut p, _) = pipeline();
        let now = Instant::now();
        say(&mut p, "attack", 0.55, now);
        let events = say(&mut p, "いいえ", 0.9, now);

        assert!(commands(&events).is_empty());
        assert!(events.iter().any(|e| matches!(
            e,
            RuntimeEvent::ConfirmationResolved(ConfirmationOutcome::Rejected {
                reason: RejectionReason::Declined,
                ..
            })
        )));
        assert_eq!(p.learning().candidate_count(), 0);
    }

    #[test]
    fn repeated_confirmation_promotes_phrase() {
        let (mut p, _) = pipeline();
        let now = Instant::now();
        let mut promoted = Vec::new();
        for _ in 0..3 {
            say(&mut p, "go for it attack", 0.5, now);
            let events = say(&mut p, "yes", 1.0, now);
            promoted.extend(events.into_iter().filter(|e| {
                matches!(e, RuntimeEvent::UserLearning { .. })
            }));
        }
        assert_eq!(
            promoted,
            vec![RuntimeEvent::UserLearning {
                new_pattern: "go for it attack".into(),
                command: Attack,
                confidence: 1.0,
            }]
        );

        // The learned phrase now wins outright, even at low confidence.
        let events = say(&mut p, "Go for it attack", 0.9, now);
        assert_eq!(commands(&events), vec![Attack]);
        let events = say(&mut p, "go for it attack", 0.5, now);
        assert_eq!(commands(&events), vec![Attack]);
        assert!(p.pending_confirmation().is_none());
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, RuntimeEvent::ConfirmationRequest { .. }))
        );
    }

    #[test]
    fn command_reply_replaces_and_records_correction() {
        let (mut p, _) = pipeline();
        let now = Instant::now();
        say(&mut p, "retreat", 0.7, now);
        assert_eq!(p.pending_confirmation().unwrap().command, Retreat);

        let events = say(&mut p, "defend", 0.9, now);
        assert_eq!(commands(&events), vec![Defend]);
        assert_eq!(p.learning().occurrences("defend", Defend), 1);
    }

    #[test]
    fn unclear_reply_reprompts() {
        let (mut p, _) = pipeline();
        let now = Instant::now();
        say(&mut p, "attack", 0.5, now);
        let events = say(&mut p, "hmm", 0.9, now);
        assert!(commands(&events).is_empty());
        assert!(events.iter().any(|e| matches!(e, RuntimeEvent::Prompt(_))));
        assert!(p.pending_confirmation().is_some());
    }

    #[test]
    fn confirmation_times_out_once() {
        let (mut p, _) = pipeline();
        let now = Instant::now();
        say(&mut p, "attack", 0.5, now);
        let deadline = p.next_deadline().unwrap();
        assert_eq!(deadline, now + Duration::from_secs(10));

        let events = p.poll(deadline);
        assert!(events.iter().any(|e| matches!(
            e,
            RuntimeEvent::ConfirmationResolved(ConfirmationOutcome::Rejected {
                reason: RejectionReason::TimedOut,
                ..
            })
        )));
        assert!(p.poll(deadline + Duration::from_secs(5)).is_empty());
        assert_eq!(p.next_deadline(), None);
    }

    #[test]
    fn unrecognized_text_offers_suggestions() {
        let (mut p, _) = pipeline();
        let events = say(&mut p, "atack", 0.9, Instant::now());
        let suggestions = events
            .iter()
            .find_map(|e| match e {
                RuntimeEvent::Unrecognized { suggestions, .. } => Some(suggestions.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(suggestions[0].command, Attack);
    }

    #[test]
    fn interim_results_are_reported_but_not_matched() {
        let (mut p, _) = pipeline();
        let events = p.handle_transcript(&TranscriptEvent::new("attack", 0.9, false), Instant::now());
        assert_eq!(events.len(), 1);
        assert_eq!(p.history().len(), 1);
    }

    #[test]
    fn halt_drops_pending_work() {
        let (mut p, _) = pipeline();
        let now = Instant::now();
        say(&mut p, "攻撃してから防御", 0.9, now);
        assert_eq!(p.queued_commands(), 1);
        p.halt();
        assert_eq!(p.queued_commands(), 0);
        assert!(p.poll(now + Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn learned_phrase_is_persisted() {
        let (mut p, kv) = pipeline();
        let now = Instant::now();
        say(&mut p, "attack", 0.5, now);
        say(&mut p, "yes", 1.0, now);

        let reloaded = LearningStore::load(Box::new(kv), &LearningConfig::default());
        assert_eq!(reloaded.occurrences("attack", Attack), 1);
    }
}
