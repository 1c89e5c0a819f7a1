//! Interview session model and lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppError, Result};

/// Lifecycle status for an interview session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created by intake, not yet started.
    Pending,
    /// Interview running; the only status that accepts mutations.
    InProgress,
    /// Closed normally by stop request or deadline.
    Completed,
    /// Closed by the risk threshold.
    Terminated,
}

impl SessionStatus {
    /// Whether no further transitions are possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Terminated)
    }

    /// Storage name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Terminated => "terminated",
        }
    }

    /// Parse a storage name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "terminated" => Some(Self::Terminated),
            _ => None,
        }
    }
}

/// Reason code carried by a terminated session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Risk score reached the configured threshold.
    HighRisk,
}

impl TerminationReason {
    /// Storage name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HighRisk => "high_risk",
        }
    }

    /// Parse a storage name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "high_risk" => Some(Self::HighRisk),
            _ => None,
        }
    }
}

/// What caused a session to close.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CloseTrigger {
    /// Explicit stop request from the participant.
    StopRequested,
    /// Interview countdown reached zero.
    DeadlineExpired,
    /// Accumulated risk reached the threshold.
    RiskThreshold,
}

impl CloseTrigger {
    /// Storage name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StopRequested => "stop_requested",
            Self::DeadlineExpired => "deadline_expired",
            Self::RiskThreshold => "risk_threshold",
        }
    }

    /// Parse a storage name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "stop_requested" => Some(Self::StopRequested),
            "deadline_expired" => Some(Self::DeadlineExpired),
            "risk_threshold" => Some(Self::RiskThreshold),
            _ => None,
        }
    }
}

/// Position and reference material the interview is conducted against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionContext {
    /// Position applied for.
    pub position: String,
    /// Extracted reference text (resume).
    pub reference_text: String,
}

/// Final state of a closed session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClosureOutcome {
    /// `Completed` or `Terminated`.
    pub status: SessionStatus,
    /// What closed the session.
    pub trigger: CloseTrigger,
    /// Present only for terminated sessions.
    pub reason: Option<TerminationReason>,
    /// Closure time.
    pub ended_at: DateTime<Utc>,
    /// Risk score frozen at closure.
    pub risk_score: u32,
}

/// Result of a close attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The session moved into a terminal status.
    Applied,
    /// The session was already terminal; nothing changed.
    AlreadyClosed,
}

/// Interview session entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    /// Unique record identifier.
    pub id: String,
    /// Account that owns the session; immutable after creation.
    pub owner_id: String,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Interview context; frozen once the session starts.
    pub context: Option<SessionContext>,
    /// Cumulative risk; frozen once the session closes.
    pub risk_score: u32,
    /// Set on closure by the risk threshold.
    pub termination_reason: Option<TerminationReason>,
    /// Set on any closure.
    pub close_trigger: Option<CloseTrigger>,
    /// Intake timestamp.
    pub created_at: DateTime<Utc>,
    /// Set on entry into `InProgress`.
    pub started_at: Option<DateTime<Utc>>,
    /// Set exactly once on entry into a terminal status.
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Construct a new pending session with a generated identifier.
    #[must_use]
    pub fn new(owner_id: String, context: Option<SessionContext>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id,
            status: SessionStatus::Pending,
            context,
            risk_score: 0,
            termination_reason: None,
            close_trigger: None,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self.status, next),
            (SessionStatus::Pending, SessionStatus::InProgress)
                | (
                    SessionStatus::InProgress,
                    SessionStatus::Completed | SessionStatus::Terminated
                )
        )
    }

    /// Attach or replace the interview context while still pending.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidTransition` once the session has started.
    pub fn attach_context(&mut self, context: SessionContext) -> Result<()> {
        if self.status != SessionStatus::Pending {
            return Err(AppError::InvalidTransition(format!(
                "context of session {} is frozen",
                self.id
            )));
        }
        self.context = Some(context);
        Ok(())
    }

    /// `Pending → InProgress`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidTransition` if the session is not pending,
    /// or `AppError::MissingContext` if no context is attached.
    pub fn begin(&mut self, at: DateTime<Utc>) -> Result<()> {
        if !self.can_transition_to(SessionStatus::InProgress) {
            return Err(AppError::InvalidTransition(format!(
                "session {} cannot start from {}",
                self.id,
                self.status.as_str()
            )));
        }
        if self.context.is_none() {
            return Err(AppError::MissingContext(format!(
                "session {} has no position or reference material",
                self.id
            )));
        }
        self.status = SessionStatus::InProgress;
        self.started_at = Some(at);
        Ok(())
    }

    /// Reject mutations unless the session is in progress.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionClosed` for any other status.
    pub fn ensure_in_progress(&self) -> Result<()> {
        if self.status == SessionStatus::InProgress {
            Ok(())
        } else {
            Err(AppError::SessionClosed(self.id.clone()))
        }
    }

    /// `InProgress → Completed`. Terminal sessions report `AlreadyClosed`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionClosed` if the session never started.
    pub fn complete(&mut self, trigger: CloseTrigger, at: DateTime<Utc>) -> Result<Transition> {
        self.close(SessionStatus::Completed, trigger, None, at)
    }

    /// `InProgress → Terminated` with a reason code.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionClosed` if the session never started.
    pub fn terminate(&mut self, reason: TerminationReason, at: DateTime<Utc>) -> Result<Transition> {
        self.close(
            SessionStatus::Terminated,
            CloseTrigger::RiskThreshold,
            Some(reason),
            at,
        )
    }

    fn close(
        &mut self,
        status: SessionStatus,
        trigger: CloseTrigger,
        reason: Option<TerminationReason>,
        at: DateTime<Utc>,
    ) -> Result<Transition> {
        if self.status.is_terminal() {
            return Ok(Transition::AlreadyClosed);
        }
        if !self.can_transition_to(status) {
            return Err(AppError::SessionClosed(self.id.clone()));
        }
        self.status = status;
        self.close_trigger = Some(trigger);
        self.termination_reason = reason;
        // Clock skew must never yield `ended_at < started_at`.
        self.ended_at = Some(self.started_at.map_or(at, |started| at.max(started)));
        Ok(Transition::Applied)
    }

    /// Closure details, present once the session is terminal.
    #[must_use]
    pub fn closure_outcome(&self) -> Option<ClosureOutcome> {
        if !self.status.is_terminal() {
            return None;
        }
        Some(ClosureOutcome {
            status: self.status,
            trigger: self.close_trigger?,
            reason: self.termination_reason,
            ended_at: self.ended_at?,
            risk_score: self.risk_score,
        })
    }
}
