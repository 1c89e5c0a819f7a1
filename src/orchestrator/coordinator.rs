//! Session coordinator: the explicit map from session id to live actor.
//!
//! A session is attached to an actor when it starts (or is recovered
//! after a restart) and retired from the map when it closes. Requests for
//! sessions that are not live fall back to the store, which is always
//! written before a closure becomes visible, so a retired session answers
//! with `SessionClosed` (or its recorded closure, for stop requests) and
//! an id the store has never seen answers with `UnknownSession`.
//!
//! Starting, recovering, and the store fallback all run under one attach
//! gate, so a session the store records as in progress is never reported
//! closed while its actor is still being attached.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tracing::{info, warn};

use super::risk_ledger::RiskLedger;
use super::session_actor::{
    prepare_session, SessionHandle, SessionView, StopOutcome, ViolationOutcome,
};
use super::transcript_log::TranscriptLog;
use crate::audit::{AuditEntry, AuditEventType, AuditLogger};
use crate::config::GlobalConfig;
use crate::generation::ReplyGenerator;
use crate::models::effect::SessionEffect;
use crate::models::session::{Session, SessionContext, SessionStatus};
use crate::models::turn::Turn;
use crate::models::violation::ViolationKind;
use crate::persistence::interview_repo::InterviewRepo;
use crate::{AppError, Result};

/// Tunables shared by every session actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorSettings {
    /// Score at or above which a session is terminated.
    pub risk_threshold: u32,
    /// Interview length from start to automatic completion.
    pub deadline: Duration,
    /// Transcript turns sent as generation context.
    pub context_turns: usize,
    /// Reference material characters sent as generation context.
    pub reference_excerpt_chars: usize,
    /// Reference material characters sent with a report request.
    pub report_excerpt_chars: usize,
    /// Buffered effects per subscriber before it starts lagging.
    pub effect_capacity: usize,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            risk_threshold: 100,
            deadline: Duration::from_secs(25 * 60),
            context_turns: 10,
            reference_excerpt_chars: 2000,
            report_excerpt_chars: 1000,
            effect_capacity: 64,
        }
    }
}

impl From<&GlobalConfig> for CoordinatorSettings {
    fn from(config: &GlobalConfig) -> Self {
        Self {
            risk_threshold: config.risk.threshold,
            deadline: config.deadline(),
            context_turns: config.generation.context_turns,
            reference_excerpt_chars: config.generation.reference_excerpt_chars,
            report_excerpt_chars: config.generation.report_excerpt_chars,
            ..Self::default()
        }
    }
}

/// Thread-safe map of live session handles keyed by session id.
pub type LiveSessions = Arc<Mutex<HashMap<String, SessionHandle>>>;

/// Entry point for every session operation.
pub struct SessionCoordinator {
    live: LiveSessions,
    // Held while a session moves between the store and the live map.
    attach_gate: AsyncMutex<()>,
    repo: InterviewRepo,
    generator: Arc<dyn ReplyGenerator>,
    settings: Arc<CoordinatorSettings>,
    audit: Option<Arc<dyn AuditLogger>>,
}

impl SessionCoordinator {
    /// Create a coordinator with no live sessions.
    #[must_use]
    pub fn new(
        repo: InterviewRepo,
        generator: Arc<dyn ReplyGenerator>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            live: LiveSessions::default(),
            attach_gate: AsyncMutex::new(()),
            repo,
            generator,
            settings: Arc::new(settings),
            audit: None,
        }
    }

    /// Record session lifecycle events to an audit log.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Active settings.
    #[must_use]
    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Generation capability used for replies and reports.
    #[must_use]
    pub fn generator(&self) -> &dyn ReplyGenerator {
        self.generator.as_ref()
    }

    /// Number of sessions with an attached actor that has not retired.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Handle of a live session, pruning it if it has already closed.
    #[must_use]
    pub fn handle(&self, session_id: &str) -> Option<SessionHandle> {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        match live.get(session_id) {
            Some(handle) if handle.is_closed() => {
                live.remove(session_id);
                None
            }
            Some(handle) => Some(handle.clone()),
            None => None,
        }
    }

    /// Intake: persist a new pending session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn create_session(&self, owner_id: String, context: SessionContext) -> Result<Session> {
        let session = Session::new(owner_id, Some(context));
        let created = self.repo.create(&session).await?;
        info!(session_id = %created.id, owner_id = %created.owner_id, "session created");
        Ok(created)
    }

    /// Replace the context of a session that has not started yet.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnknownSession` for unknown ids and
    /// `AppError::InvalidTransition` once the session has started.
    pub async fn attach_context(&self, session_id: &str, context: SessionContext) -> Result<Session> {
        let mut session = self
            .repo
            .get_by_id(session_id)
            .await?
            .ok_or_else(|| AppError::UnknownSession(session_id.to_owned()))?;
        session.attach_context(context)?;
        if let Some(ref context) = session.context {
            self.repo.attach_context(session_id, context).await?;
        }
        info!(session_id, "session context attached");
        Ok(session)
    }

    /// `Pending → InProgress`: attach an actor and start the countdown.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnknownSession` for unknown ids,
    /// `AppError::InvalidTransition` if the session is not pending, and
    /// `AppError::MissingContext` if it has no context.
    pub async fn start_session(&self, session_id: &str) -> Result<Arc<SessionView>> {
        let _gate = self.attach_gate.lock().await;
        if self.handle(session_id).is_some() {
            return Err(AppError::InvalidTransition(format!(
                "session {session_id} is already in progress"
            )));
        }

        let mut session = self
            .repo
            .get_by_id(session_id)
            .await?
            .ok_or_else(|| AppError::UnknownSession(session_id.to_owned()))?;
        session.begin(Utc::now())?;

        if !self.repo.mark_started(&session).await? {
            return Err(AppError::InvalidTransition(format!(
                "session {session_id} was started concurrently"
            )));
        }

        let handle = self.attach(
            session,
            RiskLedger::new(),
            TranscriptLog::new(),
            self.settings.deadline,
        );
        info!(session_id, deadline_secs = self.settings.deadline.as_secs(), "session started");
        self.audit(AuditEntry::new(AuditEventType::SessionStart).with_session(session_id.to_owned()));
        Ok(handle.view())
    }

    /// Record a violation against a live session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionClosed` if the session is not in progress
    /// and `AppError::UnknownSession` for unknown ids.
    pub async fn report_violation(
        &self,
        session_id: &str,
        kind: ViolationKind,
        weight: u32,
    ) -> Result<ViolationOutcome> {
        self.live_handle(session_id)
            .await?
            .report_violation(kind, weight)
            .await
    }

    /// Submit a participant turn and return the committed reply.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionClosed`, `AppError::UnknownSession`, or
    /// `AppError::GenerationUnavailable`.
    pub async fn submit_turn(&self, session_id: &str, content: String) -> Result<Turn> {
        self.live_handle(session_id)
            .await?
            .submit_turn(content, self.generator.as_ref())
            .await
    }

    /// Complete a session on participant request. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnknownSession` for unknown ids and
    /// `AppError::SessionClosed` for sessions that never started.
    pub async fn request_stop(&self, session_id: &str) -> Result<StopOutcome> {
        match self.handle(session_id) {
            Some(handle) => handle.request_stop().await,
            None => self.recorded_closure(session_id).await,
        }
    }

    /// Complete a session because its countdown expired. Idempotent.
    ///
    /// # Errors
    ///
    /// Same as [`request_stop`](Self::request_stop).
    pub async fn on_deadline_expired(&self, session_id: &str) -> Result<StopOutcome> {
        match self.handle(session_id) {
            Some(handle) => handle.deadline_expired().await,
            None => self.recorded_closure(session_id).await,
        }
    }

    /// Consistent view of any known session, live or retired.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnknownSession` for unknown ids.
    pub async fn view(&self, session_id: &str) -> Result<Arc<SessionView>> {
        if let Some(handle) = self.handle(session_id) {
            return Ok(handle.view());
        }

        let session = self
            .repo
            .get_by_id(session_id)
            .await?
            .ok_or_else(|| AppError::UnknownSession(session_id.to_owned()))?;
        let ledger = RiskLedger::from_events(self.repo.list_violations(session_id).await?);
        let transcript = TranscriptLog::from_turns(self.repo.list_turns(session_id).await?);
        Ok(Arc::new(SessionView::new(
            session,
            ledger.snapshot(),
            transcript.snapshot(),
        )))
    }

    /// Subscribe to a live session's outbound effects.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionClosed` or `AppError::UnknownSession`.
    pub async fn subscribe(&self, session_id: &str) -> Result<broadcast::Receiver<SessionEffect>> {
        Ok(self.live_handle(session_id).await?.subscribe())
    }

    /// Sessions owned by an account, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Session>> {
        self.repo.list_by_owner(owner_id).await
    }

    /// Re-attach actors to sessions persisted as in progress.
    ///
    /// Each recovered session keeps the remainder of its countdown; a
    /// session whose deadline passed while the server was down completes
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the store cannot be read.
    pub async fn recover_in_progress(&self) -> Result<usize> {
        let mut recovered = 0;
        for listed in self.repo.list_in_progress().await? {
            let _gate = self.attach_gate.lock().await;
            if self.handle(&listed.id).is_some() {
                continue;
            }
            // Re-read under the gate; a live actor may have closed it since.
            match self.repo.get_by_id(&listed.id).await? {
                Some(session) if session.status == SessionStatus::InProgress => {
                    self.resume(session).await?;
                    recovered += 1;
                }
                _ => {}
            }
        }
        Ok(recovered)
    }

    /// Attach an actor to a session the store records as in progress,
    /// restoring its ledger, transcript, and the rest of its countdown.
    /// The caller holds `attach_gate`.
    async fn resume(&self, session: Session) -> Result<SessionHandle> {
        let ledger = RiskLedger::from_events(self.repo.list_violations(&session.id).await?);
        let transcript = TranscriptLog::from_turns(self.repo.list_turns(&session.id).await?);
        let elapsed = session
            .started_at
            .and_then(|started| (Utc::now() - started).to_std().ok())
            .unwrap_or_default();
        let remaining = self.settings.deadline.saturating_sub(elapsed);

        info!(
            session_id = %session.id,
            risk_score = ledger.total(),
            turns = transcript.len(),
            remaining_secs = remaining.as_secs(),
            "recovering in-progress session"
        );
        let session_id = session.id.clone();
        let handle = self.attach(session, ledger, transcript, remaining);
        self.audit(AuditEntry::new(AuditEventType::SessionRecovered).with_session(session_id));
        Ok(handle)
    }

    fn attach(
        &self,
        session: Session,
        ledger: RiskLedger,
        transcript: TranscriptLog,
        deadline: Duration,
    ) -> SessionHandle {
        let live = Arc::clone(&self.live);
        let on_retire = Box::new(move |session_id: &str| {
            live.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(session_id);
        });

        let session_id = session.id.clone();
        let (handle, task) = prepare_session(
            session,
            ledger,
            transcript,
            deadline,
            Arc::clone(&self.settings),
            self.repo.clone(),
            self.audit.clone(),
            on_retire,
        );
        // Registered before the actor runs, so its retire hook always
        // finds the entry to remove.
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id, handle.clone());
        task.spawn();
        handle
    }

    fn audit(&self, entry: AuditEntry) {
        if let Some(ref audit) = self.audit {
            if let Err(err) = audit.log_entry(entry) {
                warn!(%err, "failed to write audit entry");
            }
        }
    }

    async fn live_handle(&self, session_id: &str) -> Result<SessionHandle> {
        if let Some(handle) = self.handle(session_id) {
            return Ok(handle);
        }

        let _gate = self.attach_gate.lock().await;
        // A start or recovery may have attached it while we waited.
        if let Some(handle) = self.handle(session_id) {
            return Ok(handle);
        }
        let session = self
            .repo
            .get_by_id(session_id)
            .await?
            .ok_or_else(|| AppError::UnknownSession(session_id.to_owned()))?;
        if session.status != SessionStatus::InProgress {
            return Err(AppError::SessionClosed(session_id.to_owned()));
        }

        warn!(session_id, "in-progress session had no actor, resuming it");
        self.resume(session).await
    }

    async fn recorded_closure(&self, session_id: &str) -> Result<StopOutcome> {
        let session = self
            .repo
            .get_by_id(session_id)
            .await?
            .ok_or_else(|| AppError::UnknownSession(session_id.to_owned()))?;
        session
            .closure_outcome()
            .map(|outcome| StopOutcome {
                outcome,
                newly_closed: false,
            })
            .ok_or(AppError::SessionClosed(session.id))
    }
}
