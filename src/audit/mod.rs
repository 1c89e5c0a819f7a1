//! Structured audit trail of session lifecycle and integrity events.
//!
//! Provides the [`AuditLogger`] trait and the records it accepts. The
//! primary implementation, [`JsonlAuditWriter`], appends one JSON object
//! per line to a file per calendar day.

pub mod writer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event type classification for audit log entries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Interview moved to in progress.
    SessionStart,
    /// In-progress interview re-attached after a restart.
    SessionRecovered,
    /// Violation accepted into the risk ledger.
    ViolationRecorded,
    /// Interview closed by the risk threshold.
    SessionTerminate,
    /// Interview closed by stop request or deadline.
    SessionComplete,
    /// Generated reply dropped because the interview closed first.
    ReplyDiscarded,
}

/// A structured record of one session event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEntry {
    /// ISO 8601 timestamp with timezone.
    pub timestamp: DateTime<Utc>,
    /// Associated session identifier.
    pub session_id: Option<String>,
    /// Event classification.
    pub event_type: AuditEventType,
    /// Violation kind (for `violation_recorded` events).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation_kind: Option<String>,
    /// Violation weight (for `violation_recorded` events).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    /// Risk score after the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<u32>,
    /// Termination reason or close trigger.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditEntry {
    /// Construct a minimal audit entry for the given event type.
    #[must_use]
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id: None,
            event_type,
            violation_kind: None,
            weight: None,
            risk_score: None,
            reason: None,
        }
    }

    /// Set the session identifier for this entry.
    #[must_use]
    pub fn with_session(mut self, session_id: String) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Set the violation kind and weight for this entry.
    #[must_use]
    pub fn with_violation(mut self, kind: String, weight: u32) -> Self {
        self.violation_kind = Some(kind);
        self.weight = Some(weight);
        self
    }

    /// Set the risk score for this entry.
    #[must_use]
    pub fn with_risk_score(mut self, risk_score: u32) -> Self {
        self.risk_score = Some(risk_score);
        self
    }

    /// Set the reason code for this entry.
    #[must_use]
    pub fn with_reason(mut self, reason: String) -> Self {
        self.reason = Some(reason);
        self
    }
}

/// Writes structured audit entries to a persistent store.
///
/// Implementations must be [`Send`] and [`Sync`] so one logger can be
/// shared by every session actor.
pub trait AuditLogger: Send + Sync {
    /// Record a single audit entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write operation fails.
    fn log_entry(&self, entry: AuditEntry) -> crate::Result<()>;
}

pub use writer::JsonlAuditWriter;
