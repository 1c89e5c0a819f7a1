//! Conversational turn model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// The interviewed human.
    Participant,
    /// The automated interviewer.
    Counterpart,
}

impl Speaker {
    /// Storage name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Participant => "participant",
            Self::Counterpart => "counterpart",
        }
    }

    /// Parse a storage name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "participant" => Some(Self::Participant),
            "counterpart" => Some(Self::Counterpart),
            _ => None,
        }
    }
}

/// One message in the interview transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    /// Per-session position, starting at 1, gap-free.
    pub sequence: u64,
    /// Author.
    pub speaker: Speaker,
    /// Message text.
    pub content: String,
    /// Commit time.
    pub created_at: DateTime<Utc>,
}
