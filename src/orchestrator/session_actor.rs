//! Per-session actor: the single writer of one session's state.
//!
//! Every mutation (violation report, turn commit, stop, deadline) arrives
//! as a [`SessionCommand`] on one `mpsc` queue and is applied to
//! completion before the next command is read. Each step persists first
//! and only then updates memory, publishes a fresh [`SessionView`] on a
//! `watch` channel, and broadcasts its [`SessionEffect`]s.
//!
//! Reply generation is the one slow operation. [`SessionHandle::submit_turn`]
//! runs it outside the actor, between a `BeginTurn` and a `CommitReply`
//! command, so violation reports and stop requests are never queued
//! behind a network call.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::coordinator::CoordinatorSettings;
use super::deadline_timer::{DeadlineTimer, DeadlineTimerHandle};
use super::risk_ledger::{LedgerSnapshot, RiskLedger};
use super::transcript_log::{TranscriptLog, TranscriptSnapshot};
use crate::audit::{AuditEntry, AuditEventType, AuditLogger};
use crate::generation::{prompt, ReplyGenerator, ReplyRequest};
use crate::models::effect::SessionEffect;
use crate::models::session::{
    ClosureOutcome, CloseTrigger, Session, SessionStatus, TerminationReason,
};
use crate::models::turn::{Speaker, Turn};
use crate::models::violation::{RiskLevel, ViolationEvent, ViolationKind};
use crate::persistence::interview_repo::InterviewRepo;
use crate::{AppError, Result};

const COMMAND_CAPACITY: usize = 64;

/// Callback run once when the session reaches a terminal status.
pub(crate) type RetireHook = Box<dyn FnOnce(&str) + Send>;

/// Consistent point-in-time view of one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    /// Session record.
    pub session: Session,
    /// Display band of the current score.
    pub risk_level: RiskLevel,
    /// Violation history.
    pub violations: LedgerSnapshot,
    /// Transcript.
    pub transcript: TranscriptSnapshot,
}

impl SessionView {
    /// Assemble a view from its parts.
    #[must_use]
    pub fn new(session: Session, violations: LedgerSnapshot, transcript: TranscriptSnapshot) -> Self {
        Self {
            risk_level: RiskLevel::from_score(session.risk_score),
            session,
            violations,
            transcript,
        }
    }
}

/// Result of a committed violation report.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ViolationOutcome {
    /// Score after this violation.
    pub risk_score: u32,
    /// Status after this violation.
    pub status: SessionStatus,
    /// Whether this violation terminated the session.
    pub terminated: bool,
    /// Number of violations recorded so far.
    pub violation_count: usize,
}

/// Result of a stop request or deadline expiry.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct StopOutcome {
    /// The session's closure, whether new or pre-existing.
    pub outcome: ClosureOutcome,
    /// `false` when the session was already closed.
    pub newly_closed: bool,
}

/// Command accepted by a session actor.
#[derive(Debug)]
pub enum SessionCommand {
    /// Record a violation and apply the termination rule.
    ReportViolation {
        /// Violation category.
        kind: ViolationKind,
        /// Risk contribution.
        weight: u32,
        /// Outcome channel.
        reply: oneshot::Sender<Result<ViolationOutcome>>,
    },
    /// Commit a participant turn and return the generation request.
    BeginTurn {
        /// Participant text.
        content: String,
        /// Request for the generation capability.
        reply: oneshot::Sender<Result<ReplyRequest>>,
    },
    /// Commit a generated counterpart reply if the session is still open.
    CommitReply {
        /// Generated text.
        content: String,
        /// Committed turn.
        reply: oneshot::Sender<Result<Turn>>,
    },
    /// Give up on an in-flight reply because the session closed.
    AbandonReply {
        /// Acknowledgement.
        reply: oneshot::Sender<Result<()>>,
    },
    /// Close the session normally.
    Close {
        /// Stop request or deadline.
        trigger: CloseTrigger,
        /// Absent for fire-and-forget closes from the deadline timer.
        reply: Option<oneshot::Sender<Result<StopOutcome>>>,
    },
}

/// Cheaply cloneable handle to a running session actor.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: Arc<str>,
    commands: mpsc::Sender<SessionCommand>,
    view: watch::Receiver<Arc<SessionView>>,
    effects: broadcast::Sender<SessionEffect>,
    // Serializes turn submissions so a reply always directly follows its prompt.
    turn_lane: Arc<Mutex<()>>,
}

impl SessionHandle {
    /// The session this handle addresses.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Latest published view. Never blocks the actor.
    #[must_use]
    pub fn view(&self) -> Arc<SessionView> {
        Arc::clone(&*self.view.borrow())
    }

    /// Whether the latest published view is terminal.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.view.borrow().session.status.is_terminal()
    }

    /// Subscribe to outbound effects committed from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEffect> {
        self.effects.subscribe()
    }

    /// Record a violation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionClosed` if the session is not in progress,
    /// or `AppError::Db` if the step could not be persisted.
    pub async fn report_violation(&self, kind: ViolationKind, weight: u32) -> Result<ViolationOutcome> {
        self.call(|reply| SessionCommand::ReportViolation {
            kind,
            weight,
            reply,
        })
        .await
    }

    /// Append a participant turn, obtain a reply, and commit it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionClosed` if the session is closed before
    /// the participant turn or before the reply commits, and
    /// `AppError::GenerationUnavailable` if no reply could be generated;
    /// the participant turn stays committed in that case.
    pub async fn submit_turn(&self, content: String, generator: &dyn ReplyGenerator) -> Result<Turn> {
        let _lane = self.turn_lane.lock().await;

        let request = self
            .call(|reply| SessionCommand::BeginTurn { content, reply })
            .await?;

        let generated = tokio::select! {
            result = generator.generate_reply(&request) => Some(result),
            () = wait_for_closure(self.view.clone()) => None,
        };

        match generated {
            Some(Ok(text)) => {
                self.call(|reply| SessionCommand::CommitReply {
                    content: text,
                    reply,
                })
                .await
            }
            Some(Err(_)) if self.is_closed() => {
                debug!(session_id = %self.session_id, "generation failed after session closed");
                Err(AppError::SessionClosed(self.session_id.to_string()))
            }
            Some(Err(err)) => {
                warn!(session_id = %self.session_id, %err, "reply generation failed");
                Err(match err {
                    AppError::GenerationUnavailable(_) => err,
                    other => AppError::GenerationUnavailable(other.to_string()),
                })
            }
            None => {
                self.call(|reply| SessionCommand::AbandonReply { reply })
                    .await?;
                Err(AppError::SessionClosed(self.session_id.to_string()))
            }
        }
    }

    /// Complete the session on participant request. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the closure could not be persisted.
    pub async fn request_stop(&self) -> Result<StopOutcome> {
        self.close(CloseTrigger::StopRequested).await
    }

    /// Complete the session because its countdown ran out. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the closure could not be persisted.
    pub async fn deadline_expired(&self) -> Result<StopOutcome> {
        self.close(CloseTrigger::DeadlineExpired).await
    }

    async fn close(&self, trigger: CloseTrigger) -> Result<StopOutcome> {
        self.call(|reply| SessionCommand::Close {
            trigger,
            reply: Some(reply),
        })
        .await
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> SessionCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| AppError::SessionClosed(self.session_id.to_string()))?;
        rx.await
            .map_err(|_| AppError::SessionClosed(self.session_id.to_string()))?
    }
}

/// Resolve once the session is terminal; pend forever if the actor is gone.
async fn wait_for_closure(mut view: watch::Receiver<Arc<SessionView>>) {
    let closed = view
        .wait_for(|v| v.session.status.is_terminal())
        .await
        .is_ok();
    if !closed {
        std::future::pending::<()>().await;
    }
}

/// Actor built by [`prepare_session`] whose task has not started yet.
pub(crate) struct SessionTask {
    actor: SessionActor,
    commands: mpsc::Receiver<SessionCommand>,
}

impl SessionTask {
    /// Start the actor. Its retire hook may run as soon as this returns.
    pub(crate) fn spawn(self) {
        let span = info_span!("session_actor", session_id = %self.actor.session.id);
        tokio::spawn(self.actor.run(self.commands).instrument(span));
    }
}

/// Build the actor for an in-progress session and start its deadline
/// timer. The actor itself runs once [`SessionTask::spawn`] is called, so
/// the caller can register the handle before the session can retire.
#[allow(clippy::too_many_arguments)] // Internal plumbing; not part of public API width.
pub(crate) fn prepare_session(
    session: Session,
    ledger: RiskLedger,
    transcript: TranscriptLog,
    deadline: Duration,
    settings: Arc<CoordinatorSettings>,
    repo: InterviewRepo,
    audit: Option<Arc<dyn AuditLogger>>,
    on_retire: RetireHook,
) -> (SessionHandle, SessionTask) {
    let session_id: Arc<str> = Arc::from(session.id.as_str());
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (effects, _) = broadcast::channel(settings.effect_capacity.max(1));
    let initial = SessionView::new(session.clone(), ledger.snapshot(), transcript.snapshot());
    let (view_tx, view_rx) = watch::channel(Arc::new(initial));

    let timer = DeadlineTimer::new(
        session.id.clone(),
        deadline,
        command_tx.clone(),
        CancellationToken::new(),
    )
    .spawn();

    let actor = SessionActor {
        session,
        ledger,
        transcript,
        settings,
        repo,
        effects: effects.clone(),
        view_tx,
        deadline: Some(timer),
        audit,
        on_retire: Some(on_retire),
    };

    let handle = SessionHandle {
        session_id,
        commands: command_tx,
        view: view_rx,
        effects,
        turn_lane: Arc::new(Mutex::new(())),
    };
    let task = SessionTask {
        actor,
        commands: command_rx,
    };
    (handle, task)
}

struct SessionActor {
    session: Session,
    ledger: RiskLedger,
    transcript: TranscriptLog,
    settings: Arc<CoordinatorSettings>,
    repo: InterviewRepo,
    effects: broadcast::Sender<SessionEffect>,
    view_tx: watch::Sender<Arc<SessionView>>,
    deadline: Option<DeadlineTimerHandle>,
    audit: Option<Arc<dyn AuditLogger>>,
    on_retire: Option<RetireHook>,
}

impl SessionActor {
    async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        debug!("session actor started");
        while let Some(command) = commands.recv().await {
            self.handle(command).await;
        }
        debug!(status = self.session.status.as_str(), "session actor stopped");
    }

    async fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::ReportViolation {
                kind,
                weight,
                reply,
            } => {
                let _ = reply.send(self.report_violation(kind, weight).await);
            }
            SessionCommand::BeginTurn { content, reply } => {
                let _ = reply.send(self.begin_turn(content).await);
            }
            SessionCommand::CommitReply { content, reply } => {
                let _ = reply.send(self.commit_reply(content).await);
            }
            SessionCommand::AbandonReply { reply } => {
                let result = if self.session.ensure_in_progress().is_ok() {
                    Ok(())
                } else {
                    Err(self.discard_reply())
                };
                let _ = reply.send(result);
            }
            SessionCommand::Close { trigger, reply } => {
                let result = self.close(trigger).await;
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(err) = result {
                            warn!(%err, trigger = trigger.as_str(), "session close failed");
                        }
                    }
                }
            }
        }
    }

    async fn report_violation(&mut self, kind: ViolationKind, weight: u32) -> Result<ViolationOutcome> {
        self.session.ensure_in_progress()?;

        let event = ViolationEvent::new(kind, weight);
        let total = self.ledger.projected(weight);
        let crossed = total >= self.settings.risk_threshold;

        // Score and termination are computed and persisted as one step.
        let mut next = self.session.clone();
        next.risk_score = total;
        if crossed {
            next.terminate(TerminationReason::HighRisk, event.observed_at)?;
        }
        self.repo.record_violation(&next, &event).await?;

        self.session = next;
        let kind_name = event.kind.as_str().to_owned();
        self.ledger.accumulate(event);
        info!(
            kind = %kind_name,
            weight,
            risk_score = total,
            "violation recorded"
        );
        self.audit(
            AuditEntry::new(AuditEventType::ViolationRecorded)
                .with_violation(kind_name, weight)
                .with_risk_score(total),
        );
        self.publish();

        if crossed {
            warn!(
                risk_score = total,
                threshold = self.settings.risk_threshold,
                "risk threshold reached, session terminated"
            );
            self.audit(
                AuditEntry::new(AuditEventType::SessionTerminate)
                    .with_risk_score(total)
                    .with_reason(TerminationReason::HighRisk.as_str().to_owned()),
            );
            let _ = self.effects.send(SessionEffect::Terminated {
                reason: TerminationReason::HighRisk,
                risk_score: total,
            });
            self.retire();
        }

        Ok(ViolationOutcome {
            risk_score: total,
            status: self.session.status,
            terminated: crossed,
            violation_count: self.ledger.len(),
        })
    }

    async fn begin_turn(&mut self, content: String) -> Result<ReplyRequest> {
        self.session.ensure_in_progress()?;
        let context = self.session.context.clone().ok_or_else(|| {
            AppError::MissingContext(format!("session {} has no context", self.session.id))
        })?;

        let history = self
            .transcript
            .snapshot()
            .tail(self.settings.context_turns)
            .to_vec();
        let participant_turn = self.commit_turn(Speaker::Participant, content).await?;

        Ok(ReplyRequest {
            session_id: self.session.id.clone(),
            position: context.position,
            reference_excerpt: prompt::excerpt(
                &context.reference_text,
                self.settings.reference_excerpt_chars,
            ),
            history,
            participant_turn,
        })
    }

    async fn commit_reply(&mut self, content: String) -> Result<Turn> {
        if self.session.ensure_in_progress().is_err() {
            return Err(self.discard_reply());
        }
        self.commit_turn(Speaker::Counterpart, content).await
    }

    async fn commit_turn(&mut self, speaker: Speaker, content: String) -> Result<Turn> {
        let turn = Turn {
            sequence: self.transcript.next_sequence(),
            speaker,
            content,
            created_at: Utc::now(),
        };
        self.repo.append_turn(&self.session.id, &turn).await?;

        let sequence = self
            .transcript
            .append(speaker, turn.content.clone(), turn.created_at);
        debug_assert_eq!(sequence, turn.sequence);
        debug!(sequence, speaker = speaker.as_str(), "turn committed");

        self.publish();
        let _ = self.effects.send(SessionEffect::TurnAppended { turn: turn.clone() });
        Ok(turn)
    }

    fn discard_reply(&self) -> AppError {
        info!("session closed while reply was in flight, reply discarded");
        self.audit(AuditEntry::new(AuditEventType::ReplyDiscarded));
        let _ = self.effects.send(SessionEffect::SessionClosed);
        AppError::SessionClosed(self.session.id.clone())
    }

    async fn close(&mut self, trigger: CloseTrigger) -> Result<StopOutcome> {
        if let Some(outcome) = self.session.closure_outcome() {
            debug!(trigger = trigger.as_str(), "session already closed");
            return Ok(StopOutcome {
                outcome,
                newly_closed: false,
            });
        }

        let mut next = self.session.clone();
        next.complete(trigger, Utc::now())?;
        self.repo.close(&next).await?;
        self.session = next;

        let outcome = self
            .session
            .closure_outcome()
            .ok_or_else(|| AppError::SessionClosed(self.session.id.clone()))?;

        info!(
            trigger = trigger.as_str(),
            risk_score = self.session.risk_score,
            "session completed"
        );
        self.audit(
            AuditEntry::new(AuditEventType::SessionComplete)
                .with_reason(trigger.as_str().to_owned())
                .with_risk_score(self.session.risk_score),
        );
        self.publish();
        let _ = self.effects.send(SessionEffect::Completed { trigger });
        self.retire();

        Ok(StopOutcome {
            outcome,
            newly_closed: true,
        })
    }

    /// Stop the deadline timer and remove the session from the live map.
    fn retire(&mut self) {
        if let Some(timer) = self.deadline.take() {
            timer.cancel();
        }
        if let Some(hook) = self.on_retire.take() {
            hook(&self.session.id);
        }
    }

    fn publish(&self) {
        let view = SessionView::new(
            self.session.clone(),
            self.ledger.snapshot(),
            self.transcript.snapshot(),
        );
        self.view_tx.send_replace(Arc::new(view));
    }

    fn audit(&self, entry: AuditEntry) {
        if let Some(ref audit) = self.audit {
            if let Err(err) = audit.log_entry(entry.with_session(self.session.id.clone())) {
                warn!(%err, "failed to write audit entry");
            }
        }
    }
}
