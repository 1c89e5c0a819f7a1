//! Interview repository for `SQLite` persistence.
//!
//! Every state-changing method is written so the caller can persist a
//! step before applying it in memory: a step that fails here leaves no
//! partial trace in the store.

use std::sync::Arc;

use crate::models::session::{
    CloseTrigger, Session, SessionContext, SessionStatus, TerminationReason,
};
use crate::models::turn::{Speaker, Turn};
use crate::models::violation::{ViolationEvent, ViolationKind};
use crate::{AppError, Result};

use super::db::{format_timestamp, parse_timestamp, Database};

/// Repository wrapper around `SQLite` for interviews, violations, and turns.
#[derive(Clone)]
pub struct InterviewRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct InterviewRow {
    id: String,
    owner_id: String,
    status: String,
    position: Option<String>,
    reference_text: Option<String>,
    risk_score: i64,
    termination_reason: Option<String>,
    close_trigger: Option<String>,
    created_at: String,
    started_at: Option<String>,
    ended_at: Option<String>,
}

impl InterviewRow {
    /// Convert a database row into the domain model.
    fn into_session(self) -> Result<Session> {
        let status = SessionStatus::parse(&self.status)
            .ok_or_else(|| AppError::Db(format!("invalid interview status: {}", self.status)))?;
        let termination_reason = self
            .termination_reason
            .as_deref()
            .map(|value| {
                TerminationReason::parse(value)
                    .ok_or_else(|| AppError::Db(format!("invalid termination_reason: {value}")))
            })
            .transpose()?;
        let close_trigger = self
            .close_trigger
            .as_deref()
            .map(|value| {
                CloseTrigger::parse(value)
                    .ok_or_else(|| AppError::Db(format!("invalid close_trigger: {value}")))
            })
            .transpose()?;
        let context = match (self.position, self.reference_text) {
            (Some(position), reference_text) => Some(SessionContext {
                position,
                reference_text: reference_text.unwrap_or_default(),
            }),
            (None, _) => None,
        };
        let risk_score = u32::try_from(self.risk_score)
            .map_err(|e| AppError::Db(format!("invalid risk_score: {e}")))?;

        Ok(Session {
            id: self.id,
            owner_id: self.owner_id,
            status,
            context,
            risk_score,
            termination_reason,
            close_trigger,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            started_at: self
                .started_at
                .as_deref()
                .map(|v| parse_timestamp("started_at", v))
                .transpose()?,
            ended_at: self
                .ended_at
                .as_deref()
                .map(|v| parse_timestamp("ended_at", v))
                .transpose()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ViolationRow {
    kind: String,
    weight: i64,
    observed_at: String,
}

impl ViolationRow {
    fn into_event(self) -> Result<ViolationEvent> {
        Ok(ViolationEvent {
            kind: ViolationKind::from(self.kind),
            weight: u32::try_from(self.weight)
                .map_err(|e| AppError::Db(format!("invalid weight: {e}")))?,
            observed_at: parse_timestamp("observed_at", &self.observed_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TurnRow {
    sequence: i64,
    speaker: String,
    content: String,
    created_at: String,
}

impl TurnRow {
    fn into_turn(self) -> Result<Turn> {
        Ok(Turn {
            sequence: u64::try_from(self.sequence)
                .map_err(|e| AppError::Db(format!("invalid sequence: {e}")))?,
            speaker: Speaker::parse(&self.speaker)
                .ok_or_else(|| AppError::Db(format!("invalid speaker: {}", self.speaker)))?,
            content: self.content,
            created_at: parse_timestamp("created_at", &self.created_at)?,
        })
    }
}

fn optional_timestamp(value: Option<chrono::DateTime<chrono::Utc>>) -> Option<String> {
    value.map(format_timestamp)
}

impl InterviewRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new interview record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the database insert fails.
    pub async fn create(&self, session: &Session) -> Result<Session> {
        let (position, reference_text) = match session.context {
            Some(ref context) => (
                Some(context.position.as_str()),
                Some(context.reference_text.as_str()),
            ),
            None => (None, None),
        };

        sqlx::query(
            "INSERT INTO interview (id, owner_id, status, position, reference_text,
             risk_score, termination_reason, close_trigger, created_at, started_at, ended_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(&session.id)
        .bind(&session.owner_id)
        .bind(session.status.as_str())
        .bind(position)
        .bind(reference_text)
        .bind(i64::from(session.risk_score))
        .bind(session.termination_reason.map(TerminationReason::as_str))
        .bind(session.close_trigger.map(CloseTrigger::as_str))
        .bind(format_timestamp(session.created_at))
        .bind(optional_timestamp(session.started_at))
        .bind(optional_timestamp(session.ended_at))
        .execute(self.db.as_ref())
        .await?;

        Ok(session.clone())
    }

    /// Retrieve an interview by identifier.
    ///
    /// Returns `Ok(None)` if the interview does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        let row: Option<InterviewRow> = sqlx::query_as("SELECT * FROM interview WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;
        row.map(InterviewRow::into_session).transpose()
    }

    /// Replace the context of a pending interview.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidTransition` if the interview is no longer
    /// pending, or `AppError::Db` if the update fails.
    pub async fn attach_context(&self, id: &str, context: &SessionContext) -> Result<()> {
        let result = sqlx::query(
            "UPDATE interview SET position = ?1, reference_text = ?2
             WHERE id = ?3 AND status = 'pending'",
        )
        .bind(&context.position)
        .bind(&context.reference_text)
        .bind(id)
        .execute(self.db.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::InvalidTransition(format!(
                "context of interview {id} cannot change"
            )));
        }
        Ok(())
    }

    /// Persist `Pending → InProgress`. Returns `false` if another caller
    /// started the interview first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn mark_started(&self, session: &Session) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE interview SET status = ?1, started_at = ?2
             WHERE id = ?3 AND status = 'pending'",
        )
        .bind(session.status.as_str())
        .bind(optional_timestamp(session.started_at))
        .bind(&session.id)
        .execute(self.db.as_ref())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Insert a violation and write the resulting interview state (score,
    /// and the termination if the threshold was crossed) in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionClosed` if the stored interview is no
    /// longer in progress, or `AppError::Db` if a write fails. Nothing is
    /// written in either case.
    pub async fn record_violation(&self, next: &Session, event: &ViolationEvent) -> Result<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            "INSERT INTO violation (interview_id, kind, weight, observed_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&next.id)
        .bind(event.kind.as_str())
        .bind(i64::from(event.weight))
        .bind(format_timestamp(event.observed_at))
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            "UPDATE interview SET risk_score = ?1, status = ?2, termination_reason = ?3,
             close_trigger = ?4, ended_at = ?5
             WHERE id = ?6 AND status = 'in_progress'",
        )
        .bind(i64::from(next.risk_score))
        .bind(next.status.as_str())
        .bind(next.termination_reason.map(TerminationReason::as_str))
        .bind(next.close_trigger.map(CloseTrigger::as_str))
        .bind(optional_timestamp(next.ended_at))
        .bind(&next.id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Err(AppError::SessionClosed(next.id.clone()));
        }

        tx.commit().await?;
        Ok(())
    }

    /// Persist a normal closure of an in-progress interview.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionClosed` if the stored interview is no
    /// longer in progress, or `AppError::Db` if the update fails.
    pub async fn close(&self, next: &Session) -> Result<()> {
        let result = sqlx::query(
            "UPDATE interview SET status = ?1, termination_reason = ?2, close_trigger = ?3,
             ended_at = ?4, risk_score = ?5
             WHERE id = ?6 AND status = 'in_progress'",
        )
        .bind(next.status.as_str())
        .bind(next.termination_reason.map(TerminationReason::as_str))
        .bind(next.close_trigger.map(CloseTrigger::as_str))
        .bind(optional_timestamp(next.ended_at))
        .bind(i64::from(next.risk_score))
        .bind(&next.id)
        .execute(self.db.as_ref())
        .await?;

        if result.rows_affected() != 1 {
            return Err(AppError::SessionClosed(next.id.clone()));
        }
        Ok(())
    }

    /// Append one transcript turn.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails, including a duplicate
    /// sequence number.
    pub async fn append_turn(&self, interview_id: &str, turn: &Turn) -> Result<()> {
        let sequence = i64::try_from(turn.sequence)
            .map_err(|e| AppError::Db(format!("sequence out of range: {e}")))?;

        sqlx::query(
            "INSERT INTO turn (interview_id, sequence, speaker, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(interview_id)
        .bind(sequence)
        .bind(turn.speaker.as_str())
        .bind(&turn.content)
        .bind(format_timestamp(turn.created_at))
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Violations of an interview in ingestion order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_violations(&self, interview_id: &str) -> Result<Vec<ViolationEvent>> {
        let rows: Vec<ViolationRow> = sqlx::query_as(
            "SELECT kind, weight, observed_at FROM violation
             WHERE interview_id = ?1 ORDER BY id ASC",
        )
        .bind(interview_id)
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(ViolationRow::into_event).collect()
    }

    /// Transcript of an interview in sequence order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_turns(&self, interview_id: &str) -> Result<Vec<Turn>> {
        let rows: Vec<TurnRow> = sqlx::query_as(
            "SELECT sequence, speaker, content, created_at FROM turn
             WHERE interview_id = ?1 ORDER BY sequence ASC",
        )
        .bind(interview_id)
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(TurnRow::into_turn).collect()
    }

    /// Interviews owned by an account, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Session>> {
        let rows: Vec<InterviewRow> = sqlx::query_as(
            "SELECT * FROM interview WHERE owner_id = ?1 ORDER BY created_at DESC",
        )
        .bind(owner_id)
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(InterviewRow::into_session).collect()
    }

    /// Interviews persisted as in progress, used for restart recovery.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_in_progress(&self) -> Result<Vec<Session>> {
        let rows: Vec<InterviewRow> =
            sqlx::query_as("SELECT * FROM interview WHERE status = 'in_progress'")
                .fetch_all(self.db.as_ref())
                .await?;
        rows.into_iter().map(InterviewRow::into_session).collect()
    }
}
