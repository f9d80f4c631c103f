//! Per-user adaptive phrase learning.
//!
//! Every phrase the user confirms (or substitutes in a correction) is counted
//! under its command. Once a phrase has been recorded `promotion_threshold`
//! times for the same command it becomes a *learned pattern*: the matcher
//! resolves any transcript containing it straight to that command.
//!
//! The store is the only writer of both maps. State is loaded once from the
//! key-value store at construction and written through after every change.

pub mod kv;

use crate::command::GameCommand;
use crate::config::LearningConfig;
use crate::error::Result;
use kv::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Persisted layout. Tuples serialise as JSON arrays:
/// `{"candidatePatterns": [["attack", ["go go"]]], "learnedPatterns": [["go go", "attack"]], ...}`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LearningRecord {
    #[serde(default)]
    candidate_patterns: Vec<(GameCommand, Vec<String>)>,
    #[serde(default)]
    learned_patterns: Vec<(String, GameCommand)>,
    /// Per-phrase counts. Records written without it load with a count of 1.
    #[serde(default)]
    occurrences: Vec<(GameCommand, String, u32)>,
}

/// Outcome of recording a successful phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearningUpdate {
    /// Normalised phrase.
    pub phrase: String,
    pub command: GameCommand,
    /// Times this phrase has now been recorded for `command`.
    pub occurrences: u32,
    /// Whether this call promoted the phrase to a learned pattern.
    pub promoted: bool,
}

/// Owner of candidate phrase sets and learned patterns.
pub struct LearningStore {
    store: Box<dyn KeyValueStore>,
    key: String,
    promotion_threshold: u32,
    candidates: BTreeMap<GameCommand, BTreeMap<String, u32>>,
    learned: BTreeMap<String, GameCommand>,
}

/// Trim and lowercase a transcript into a phrase key.
#[must_use]
pub fn normalize_phrase(text: &str) -> String {
    text.trim().to_lowercase()
}

impl LearningStore {
    /// Load learning state from `store`.
    ///
    /// A missing record is a cold start. A record that fails to decode is
    /// logged and ignored so a corrupt entry never blocks voice control.
    pub fn load(store: Box<dyn KeyValueStore>, config: &LearningConfig) -> Self {
        let mut this = Self {
            store,
            key: config.storage_key.clone(),
            promotion_threshold: config.promotion_threshold.max(1),
            candidates: BTreeMap::new(),
            learned: BTreeMap::new(),
        };

        match this.store.get(&this.key) {
            Ok(Some(raw)) => match serde_json::from_str::<LearningRecord>(&raw) {
                Ok(record) => this.apply_record(record),
                Err(e) => warn!("ignoring unreadable learning record: {e}"),
            },
            Ok(None) => debug!("no learning record under {}; starting empty", this.key),
            Err(e) => warn!("failed to read learning record: {e}"),
        }

        info!(
            "learning store loaded: {} learned patterns, {} candidate phrases",
            this.learned.len(),
            this.candidate_count()
        );
        this
    }

    fn apply_record(&mut self, record: LearningRecord) {
        for (command, phrases) in record.candidate_patterns {
            let set = self.candidates.entry(command).or_default();
            for phrase in phrases {
                set.entry(normalize_phrase(&phrase)).or_insert(1);
            }
        }
        for (command, phrase, count) in record.occurrences {
            if let Some(n) = self
                .candidates
                .get_mut(&command)
                .and_then(|set| set.get_mut(&normalize_phrase(&phrase)))
            {
                *n = count.max(1);
            }
        }
        for (phrase, command) in record.learned_patterns {
            self.learned.insert(normalize_phrase(&phrase), command);
        }
    }

    fn to_record(&self) -> LearningRecord {
        LearningRecord {
            candidate_patterns: self
                .candidates
                .iter()
                .map(|(command, set)| (*command, set.keys().cloned().collect()))
                .collect(),
            learned_patterns: self
                .learned
                .iter()
                .map(|(phrase, command)| (phrase.clone(), *command))
                .collect(),
            occurrences: self
                .candidates
                .iter()
                .flat_map(|(command, set)| {
                    set.iter()
                        .map(move |(phrase, count)| (*command, phrase.clone(), *count))
                })
                .collect(),
        }
    }

    /// Write the full state through to the key-value store.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the store write fails.
    pub fn persist(&mut self) -> Result<()> {
        let json = serde_json::to_string(&self.to_record())?;
        self.store.set(&self.key, &json)
    }

    fn persist_or_warn(&mut self) {
        if let Err(e) = self.persist() {
            warn!("failed to persist learning state: {e}");
        }
    }

    /// Count a successful use of `text` for `command`, promoting it once it
    /// reaches the threshold.
    ///
    /// Returns `None` for blank input. Learned patterns are never reassigned:
    /// a phrase already learned for another command stays with it.
    pub fn record_success(&mut self, text: &str, command: GameCommand) -> Option<LearningUpdate> {
        let phrase = normalize_phrase(text);
        if phrase.is_empty() {
            return None;
        }

        let count = {
            let n = self
                .candidates
                .entry(command)
                .or_default()
                .entry(phrase.clone())
                .or_insert(0);
            *n = n.saturating_add(1);
            *n
        };

        let mut promoted = false;
        if count >= self.promotion_threshold {
            match self.learned.get(&phrase) {
                None => {
                    self.learned.insert(phrase.clone(), command);
                    promoted = true;
                    info!("learned phrase \"{phrase}\" -> {command}");
                }
                Some(existing) if *existing != command => {
                    warn!("phrase \"{phrase}\" already learned as {existing}; not reassigning to {command}");
                }
                Some(_) => {}
            }
        }

        self.persist_or_warn();
        Some(LearningUpdate {
            phrase,
            command,
            occurrences: count,
            promoted,
        })
    }

    /// Replace a misheard phrase with the one the user actually meant.
    ///
    /// `old_text` is dropped from `old_command`'s candidates (absence is fine),
    /// then `new_text` is recorded as a success for `new_command`.
    pub fn record_correction(
        &mut self,
        old_text: &str,
        old_command: GameCommand,
        new_text: &str,
        new_command: GameCommand,
    ) -> Option<LearningUpdate> {
        let old_phrase = normalize_phrase(old_text);
        let removed = self
            .candidates
            .get_mut(&old_command)
            .is_some_and(|set| set.remove(&old_phrase).is_some());
        if removed {
            debug!("removed \"{old_phrase}\" from {old_command} candidates");
        }
        self.record_success(new_text, new_command)
    }

    /// Remove a phrase from learned patterns and every candidate set.
    ///
    /// Returns whether anything was removed.
    pub fn forget(&mut self, text: &str) -> bool {
        let phrase = normalize_phrase(text);
        let mut removed = self.learned.remove(&phrase).is_some();
        for set in self.candidates.values_mut() {
            removed |= set.remove(&phrase).is_some();
        }
        if removed {
            self.persist_or_warn();
        }
        removed
    }

    /// Learned phrase → command map read by the matcher.
    #[must_use]
    pub fn learned_patterns(&self) -> &BTreeMap<String, GameCommand> {
        &self.learned
    }

    /// Candidate phrases recorded for `command`.
    #[must_use]
    pub fn candidates_for(&self, command: GameCommand) -> BTreeSet<String> {
        self.candidates
            .get(&command)
            .map(|set| set.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Times `text` has been recorded for `command`.
    #[must_use]
    pub fn occurrences(&self, text: &str, command: GameCommand) -> u32 {
        self.candidates
            .get(&command)
            .and_then(|set| set.get(&normalize_phrase(text)))
            .copied()
            .unwrap_or(0)
    }

    /// Total number of candidate phrases across all commands.
    #[must_use]
    pub fn candidate_count(&self) -> usize {
        self.candidates.values().map(BTreeMap::len).sum()
    }
}
