//! Append-only conversational record for one session.
//!
//! Sequence numbers start at 1 and are assigned here, never by callers.
//! Snapshots share storage copy-on-write and can be iterated any number
//! of times.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::turn::{Speaker, Turn};

/// Ordered transcript of one session.
#[derive(Debug, Clone, Default)]
pub struct TranscriptLog {
    turns: Arc<Vec<Turn>>,
}

impl TranscriptLog {
    /// Empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted turns, which must already be ordered `1..=n`.
    #[must_use]
    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self {
            turns: Arc::new(turns),
        }
    }

    /// Sequence number the next append will receive.
    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.turns.last().map_or(1, |turn| turn.sequence + 1)
    }

    /// Append a turn and return its sequence number.
    pub fn append(&mut self, speaker: Speaker, content: String, at: DateTime<Utc>) -> u64 {
        let sequence = self.next_sequence();
        Arc::make_mut(&mut self.turns).push(Turn {
            sequence,
            speaker,
            content,
            created_at: at,
        });
        sequence
    }

    /// The most recently appended turn.
    #[must_use]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Number of turns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the transcript is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Point-in-time view containing exactly the turns appended so far.
    #[must_use]
    pub fn snapshot(&self) -> TranscriptSnapshot {
        TranscriptSnapshot {
            turns: Arc::clone(&self.turns),
        }
    }
}

/// Immutable, restartable view of a transcript.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct TranscriptSnapshot {
    turns: Arc<Vec<Turn>>,
}

impl TranscriptSnapshot {
    /// Iterate turns in sequence order.
    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.turns.iter()
    }

    /// The last `n` turns, oldest first.
    #[must_use]
    pub fn tail(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// Number of turns in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Count of turns by one speaker.
    #[must_use]
    pub fn count_by(&self, speaker: Speaker) -> usize {
        self.turns.iter().filter(|t| t.speaker == speaker).count()
    }
}

impl<'a> IntoIterator for &'a TranscriptSnapshot {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
