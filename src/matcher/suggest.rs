//! "Did you mean" suggestions for transcripts that matched no command.

use crate::command::GameCommand;
use crate::matcher::tables::KEYWORD_TABLE;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A command the user may have meant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub command: GameCommand,
    /// The vocabulary word that scored best.
    pub keyword: String,
    /// Character-overlap similarity in `0.0..=1.0`.
    pub score: f32,
}

/// Character-overlap similarity between two strings.
///
/// Size of the character multiset intersection divided by the longer length.
/// Case-insensitive. Empty input scores `0.0`.
#[must_use]
pub fn char_overlap(a: &str, b: &str) -> f32 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let len_a = a.chars().count();
    let len_b = b.chars().count();
    let longest = len_a.max(len_b);
    if len_a == 0 || len_b == 0 {
        return 0.0;
    }

    let mut counts: HashMap<char, usize> = HashMap::new();
    for c in a.chars() {
        *counts.entry(c).or_default() += 1;
    }
    let mut common = 0usize;
    for c in b.chars() {
        if let Some(n) = counts.get_mut(&c)
            && *n > 0
        {
            *n -= 1;
            common += 1;
        }
    }
    common as f32 / longest as f32
}

/// Rank commands by how closely the transcript resembles their vocabulary.
///
/// Both the whole transcript and each of its words are scored against every
/// keyword; a command's score is its best keyword. At most `limit` distinct
/// commands clearing `min_score` are returned, best first.
pub fn suggest_commands(text: &str, limit: usize, min_score: f32) -> Vec<Suggestion> {
    let trimmed = text.trim();
    if trimmed.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut probes: Vec<&str> = vec![trimmed];
    probes.extend(trimmed.split_whitespace());

    let mut best: Vec<Suggestion> = Vec::new();
    for (command, words) in KEYWORD_TABLE {
        let mut top: Option<Suggestion> = None;
        for word in *words {
            let score = probes
                .iter()
                .map(|p| char_overlap(p, word))
                .fold(0.0f32, f32::max);
            if top.as_ref().is_none_or(|t| score > t.score) {
                top = Some(Suggestion {
                    command: *command,
                    keyword: (*word).to_owned(),
                    score,
                });
            }
        }
        if let Some(top) = top
            && top.score >= min_score
        {
            best.push(top);
        }
    }

    // Stable sort keeps table order among equal scores.
    best.sort_by(|a, b| b.score.total_cmp(&a.score));
    best.truncate(limit);
    best
}

/// Generic hint used when no suggestion clears the similarity bar.
pub const HELP_HINT: &str =
    "Try \"attack\", \"defend\", \"retreat\" or \"status\" (攻撃・防御・撤退・状態).";

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn overlap_of_identical_strings_is_one() {
        assert!((char_overlap("attack", "ATTACK") - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn overlap_counts_repeated_characters_once_each() {
        // "atack" shares a,t,a,c,k with "attack": 5 of 6.
        let score = char_overlap("atack", "attack");
        assert!((score - 5.0 / 6.0).abs() < 1e-6);
    }

    #[test]
    fn overlap_with_empty_is_zero() {
        assert!(char_overlap("", "attack").abs() < f32::EPSILON);
    }

    #[test]
    fn misspelling_suggests_intended_command_first() {
        let suggestions = suggest_commands("please atack now", 3, 0.5);
        assert!(!suggestions.is_empty());
        assert_eq!(suggestions[0].command, GameCommand::Attack);
        assert_eq!(suggestions[0].keyword, "attack");
    }

    #[test]
    fn suggestions_are_capped_and_distinct() {
        let suggestions = suggest_commands("eat", 3, 0.0);
        assert!(suggestions.len() <= 3);
        let mut commands: Vec<_> = suggestions.iter().map(|s| s.command).collect();
        commands.dedup();
        assert_eq!(commands.len(), suggestions.len());
    }

    #[test]
    fn gibberish_clears_no_bar() {
        assert!(suggest_commands("zzzzqqqq", 3, 0.5).is_empty());
    }
}
