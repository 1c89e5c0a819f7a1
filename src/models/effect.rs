//! Outbound effects delivered to the participant-facing channel.

use serde::{Deserialize, Serialize};

use super::session::{CloseTrigger, TerminationReason};
use super::turn::Turn;

/// Effect produced by a committed session step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEffect {
    /// A turn was committed to the transcript.
    TurnAppended {
        /// The committed turn.
        turn: Turn,
    },
    /// The session was closed by the risk threshold.
    Terminated {
        /// Reason code.
        reason: TerminationReason,
        /// Score that crossed the threshold.
        risk_score: u32,
    },
    /// The session completed normally.
    Completed {
        /// Stop request or deadline.
        trigger: CloseTrigger,
    },
    /// A pending reply was discarded because the session closed.
    SessionClosed,
}

impl SessionEffect {
    /// SSE event name.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::TurnAppended { .. } => "turn_appended",
            Self::Terminated { .. } => "terminated",
            Self::Completed { .. } => "completed",
            Self::SessionClosed => "session_closed",
        }
    }
}
