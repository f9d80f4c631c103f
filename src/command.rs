//! Game command tokens produced by the voice pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A discrete game action recognised from speech.
///
/// Variants are listed in table order: keyword matches that yield several
/// commands report them in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameCommand {
    /// Send units against the current wave.
    Attack,
    /// Hold position and raise shields.
    Defend,
    /// Pull units back toward the base.
    Retreat,
    /// Report base health and wave progress.
    Status,
}

impl GameCommand {
    /// Every command, in table order.
    pub const ALL: [GameCommand; 4] = [
        GameCommand::Attack,
        GameCommand::Defend,
        GameCommand::Retreat,
        GameCommand::Status,
    ];

    /// Stable lowercase identifier used in persisted records and events.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Attack => "attack",
            Self::Defend => "defend",
            Self::Retreat => "retreat",
            Self::Status => "status",
        }
    }
}

impl fmt::Display for GameCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a [`GameCommand`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command: {0}")]
pub struct UnknownCommand(pub String);

impl FromStr for GameCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        GameCommand::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or(UnknownCommand(s.to_owned()))
    }
}
