//! Transcript → command matching.
//!
//! Resolution order, first success wins:
//!
//! 1. **Learned phrase**: a user-learned phrase contained in the transcript
//!    returns its command alone.
//! 2. **Compound phrase**: "攻撃してから防御" / "attack then defend" returns
//!    both commands in spoken order. Only tried when exactly two distinct
//!    commands are mentioned; the earliest spoken pair wins.
//! 3. **Keyword table**: every command whose synonym appears, in table order.
//! 4. **Paraphrase**: regular expressions per command, tried only when no
//!    keyword matched; the first matching command wins.

pub mod suggest;
pub(crate) mod tables;

use crate::command::GameCommand;
use crate::config::MatcherConfig;
use crate::error::{Result, VoiceError};
use crate::pipeline::messages::{MatchResult, MatchSource};
use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;
use suggest::Suggestion;
use tables::{KEYWORD_TABLE, PARAPHRASE_TABLE, SEQUENCE_CONNECTORS, keywords_for};
use tracing::debug;

/// A two-command sequencing expression.
struct CompoundPattern {
    first: GameCommand,
    second: GameCommand,
    regex: Regex,
}

/// Maps transcripts to command tokens.
pub struct PatternMatcher {
    compounds: Vec<CompoundPattern>,
    paraphrases: Vec<(GameCommand, Vec<Regex>)>,
    max_suggestions: usize,
    min_similarity: f32,
}

fn compile(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| VoiceError::Config(format!("invalid pattern {pattern:?}: {e}")))
}

fn alternation(words: &[&str]) -> String {
    words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|")
}

/// Like [`alternation`], but ASCII words only match on word boundaries so
/// "then" does not fire inside "strengthen".
fn word_alternation(words: &[&str]) -> String {
    words
        .iter()
        .map(|w| {
            if w.is_ascii() {
                format!(r"\b{}\b", regex::escape(w))
            } else {
                regex::escape(w)
            }
        })
        .collect::<Vec<_>>()
        .join("|")
}

impl PatternMatcher {
    /// Compile the vocabulary tables.
    ///
    /// # Errors
    ///
    /// Returns a config error if a table expression fails to compile.
    pub fn new(config: &MatcherConfig) -> Result<Self> {
        let connectors = word_alternation(SEQUENCE_CONNECTORS);
        let mut compounds = Vec::new();
        for first in GameCommand::ALL {
            for second in GameCommand::ALL {
                if first == second {
                    continue;
                }
                let pattern = format!(
                    "(?:{}).*?(?:{connectors}).*?(?:{})",
                    alternation(keywords_for(first)),
                    alternation(keywords_for(second)),
                );
                compounds.push(CompoundPattern {
                    first,
                    second,
                    regex: compile(&pattern)?,
                });
            }
        }

        let mut paraphrases = Vec::with_capacity(PARAPHRASE_TABLE.len());
        for (command, patterns) in PARAPHRASE_TABLE {
            let compiled = patterns
                .iter()
                .map(|p| compile(p))
                .collect::<Result<Vec<_>>>()?;
            paraphrases.push((*command, compiled));
        }

        Ok(Self {
            compounds,
            paraphrases,
            max_suggestions: config.max_suggestions,
            min_similarity: config.min_similarity,
        })
    }

    /// Match a transcript against learned phrases and the static tables.
    pub fn match_text(
        &self,
        text: &str,
        confidence: f32,
        learned: &BTreeMap<String, GameCommand>,
    ) -> MatchResult {
        let (commands, source) = self.resolve(text, learned);
        debug!(%text, ?commands, ?source, "matched transcript");
        MatchResult {
            commands,
            text: text.to_owned(),
            confidence,
            source,
        }
    }

    fn resolve(
        &self,
        text: &str,
        learned: &BTreeMap<String, GameCommand>,
    ) -> (Vec<GameCommand>, MatchSource) {
        let lower = text.trim().to_lowercase();
        if lower.is_empty() {
            return (Vec::new(), MatchSource::None);
        }

        if let Some(command) = learned_match(&lower, learned) {
            return (vec![command], MatchSource::Learned);
        }

        let keyword_hits: Vec<GameCommand> = KEYWORD_TABLE
            .iter()
            .filter(|(_, words)| words.iter().any(|w| lower.contains(&w.to_lowercase())))
            .map(|(command, _)| *command)
            .collect();

        // Longer chains fall through so no mentioned command is dropped.
        if keyword_hits.len() == 2
            && let Some(pair) = self.spoken_pair(&lower)
        {
            return (pair, MatchSource::Compound);
        }

        if !keyword_hits.is_empty() {
            return (keyword_hits, MatchSource::Keyword);
        }

        if let Some(command) = self
            .paraphrases
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|p| p.is_match(&lower)))
            .map(|(command, _)| *command)
        {
            return (vec![command], MatchSource::Paraphrase);
        }

        (Vec::new(), MatchSource::None)
    }

    /// The compound pattern matching earliest in `lower`, shortest first.
    fn spoken_pair(&self, lower: &str) -> Option<Vec<GameCommand>> {
        self.compounds
            .iter()
            .filter_map(|c| c.regex.find(lower).map(|m| ((m.start(), m.end()), c)))
            .min_by_key(|(span, _)| *span)
            .map(|(_, c)| vec![c.first, c.second])
    }

    /// Suggestions for a transcript that matched nothing.
    pub fn suggest(&self, text: &str) -> Vec<Suggestion> {
        suggest::suggest_commands(text, self.max_suggestions, self.min_similarity)
    }
}

/// Longest learned phrase contained in `lower`; ties resolve lexicographically.
fn learned_match(lower: &str, learned: &BTreeMap<String, GameCommand>) -> Option<GameCommand> {
    learned
        .iter()
        .filter(|(phrase, _)| !phrase.is_empty() && lower.contains(phrase.as_str()))
        .max_by(|(a, _), (b, _)| a.chars().count().cmp(&b.chars().count()).then(b.cmp(a)))
        .map(|(_, command)| *command)
}
