//! Unit tests for the interview repository.
//!
//! Covers CRUD, guarded status transitions, the atomic violation write,
//! transcript ordering, and owner listings.

use std::sync::Arc;

use chrono::{Duration, Utc};
use interview_proctor::models::session::{
    CloseTrigger, Session, SessionContext, SessionStatus, TerminationReason,
};
use interview_proctor::models::turn::{Speaker, Turn};
use interview_proctor::models::violation::{ViolationEvent, ViolationKind};
use interview_proctor::persistence::db;
use interview_proctor::persistence::interview_repo::InterviewRepo;
use interview_proctor::AppError;

async fn repo() -> InterviewRepo {
    let db = Arc::new(db::connect_memory().await.expect("db"));
    InterviewRepo::new(db)
}

fn context() -> SessionContext {
    SessionContext {
        position: "SRE".into(),
        reference_text: "On-call for a payments platform.".into(),
    }
}

async fn in_progress(repo: &InterviewRepo) -> Session {
    let mut session = Session::new("owner-a".into(), Some(context()));
    repo.create(&session).await.expect("create");
    session.begin(Utc::now()).expect("begin");
    assert!(repo.mark_started(&session).await.expect("mark started"));
    session
}

fn turn(sequence: u64, speaker: Speaker, content: &str) -> Turn {
    Turn {
        sequence,
        speaker,
        content: content.into(),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn create_and_get_round_trip() {
    let repo = repo().await;
    let session = Session::new("owner-a".into(), Some(context()));
    repo.create(&session).await.expect("create");

    let loaded = repo.get_by_id(&session.id).await.expect("get").expect("exists");
    assert_eq!(loaded, session);
    assert!(repo.get_by_id("missing").await.expect("get").is_none());
}

#[tokio::test]
async fn session_without_context_round_trips() {
    let repo = repo().await;
    let session = Session::new("owner-a".into(), None);
    repo.create(&session).await.expect("create");
    let loaded = repo.get_by_id(&session.id).await.expect("get").expect("exists");
    assert!(loaded.context.is_none());
}

#[tokio::test]
async fn context_attaches_only_while_pending() {
    let repo = repo().await;
    let pending = Session::new("owner-a".into(), None);
    repo.create(&pending).await.expect("create");
    repo.attach_context(&pending.id, &context()).await.expect("attach");
    let loaded = repo.get_by_id(&pending.id).await.expect("get").expect("exists");
    assert_eq!(loaded.context, Some(context()));

    let started = in_progress(&repo).await;
    let err = repo.attach_context(&started.id, &context()).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)), "{err}");
}

#[tokio::test]
async fn mark_started_succeeds_once() {
    let repo = repo().await;
    let session = in_progress(&repo).await;
    assert!(!repo.mark_started(&session).await.expect("second mark"));

    let loaded = repo.get_by_id(&session.id).await.expect("get").expect("exists");
    assert_eq!(loaded.status, SessionStatus::InProgress);
    assert_eq!(loaded.started_at, session.started_at);
}

#[tokio::test]
async fn violation_and_score_are_written_together() {
    let repo = repo().await;
    let mut session = in_progress(&repo).await;
    session.risk_score = 20;
    let event = ViolationEvent::new(ViolationKind::FocusLost, 20);
    repo.record_violation(&session, &event).await.expect("record");

    let loaded = repo.get_by_id(&session.id).await.expect("get").expect("exists");
    assert_eq!(loaded.risk_score, 20);
    let events = repo.list_violations(&session.id).await.expect("list");
    assert_eq!(events, vec![event]);
}

#[tokio::test]
async fn terminating_violation_closes_the_row() {
    let repo = repo().await;
    let mut session = in_progress(&repo).await;
    session.risk_score = 120;
    session
        .terminate(TerminationReason::HighRisk, Utc::now())
        .expect("terminate");
    let event = ViolationEvent::new("gaze_away".into(), 120);
    repo.record_violation(&session, &event).await.expect("record");

    let loaded = repo.get_by_id(&session.id).await.expect("get").expect("exists");
    assert_eq!(loaded.status, SessionStatus::Terminated);
    assert_eq!(loaded.termination_reason, Some(TerminationReason::HighRisk));
    assert_eq!(loaded.close_trigger, Some(CloseTrigger::RiskThreshold));
    assert_eq!(loaded.ended_at, session.ended_at);
    assert_eq!(
        repo.list_violations(&session.id).await.expect("list")[0].kind,
        ViolationKind::Other("gaze_away".into())
    );

    let err = repo.record_violation(&session, &event).await.unwrap_err();
    assert!(matches!(err, AppError::SessionClosed(_)));
    assert_eq!(repo.list_violations(&session.id).await.expect("list").len(), 1);
}

#[tokio::test]
async fn rejected_violation_leaves_no_row() {
    let repo = repo().await;
    let session = Session::new("owner-a".into(), Some(context()));
    repo.create(&session).await.expect("create");

    let event = ViolationEvent::new(ViolationKind::FocusLost, 20);
    let err = repo.record_violation(&session, &event).await.unwrap_err();
    assert!(matches!(err, AppError::SessionClosed(_)), "{err}");
    assert!(repo.list_violations(&session.id).await.expect("list").is_empty());
}

#[tokio::test]
async fn close_applies_once() {
    let repo = repo().await;
    let mut session = in_progress(&repo).await;
    session
        .complete(CloseTrigger::StopRequested, Utc::now())
        .expect("complete");
    repo.close(&session).await.expect("close");

    let loaded = repo.get_by_id(&session.id).await.expect("get").expect("exists");
    assert_eq!(loaded.closure_outcome(), session.closure_outcome());

    let err = repo.close(&session).await.unwrap_err();
    assert!(matches!(err, AppError::SessionClosed(_)));
}

#[tokio::test]
async fn turns_list_in_sequence_order() {
    let repo = repo().await;
    let session = in_progress(&repo).await;
    repo.append_turn(&session.id, &turn(2, Speaker::Counterpart, "Why?"))
        .await
        .expect("append");
    repo.append_turn(&session.id, &turn(1, Speaker::Participant, "Hi"))
        .await
        .expect("append");

    let turns = repo.list_turns(&session.id).await.expect("list");
    let sequences: Vec<u64> = turns.iter().map(|t| t.sequence).collect();
    assert_eq!(sequences, vec![1, 2]);
    assert_eq!(turns[1].speaker, Speaker::Counterpart);
}

#[tokio::test]
async fn duplicate_turn_sequence_is_rejected() {
    let repo = repo().await;
    let session = in_progress(&repo).await;
    repo.append_turn(&session.id, &turn(1, Speaker::Participant, "a"))
        .await
        .expect("append");
    let err = repo
        .append_turn(&session.id, &turn(1, Speaker::Participant, "b"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Db(_)));
}

#[tokio::test]
async fn owner_listing_is_newest_first() {
    let repo = repo().await;
    let mut older = Session::new("owner-b".into(), Some(context()));
    older.created_at = Utc::now() - Duration::hours(1);
    repo.create(&older).await.expect("create");
    let newer = Session::new("owner-b".into(), Some(context()));
    repo.create(&newer).await.expect("create");
    let other = Session::new("owner-c".into(), Some(context()));
    repo.create(&other).await.expect("create");

    let listed = repo.list_by_owner("owner-b").await.expect("list");
    let ids: Vec<&str> = listed.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec![newer.id.as_str(), older.id.as_str()]);
}

#[tokio::test]
async fn in_progress_listing_excludes_other_statuses() {
    let repo = repo().await;
    let open = in_progress(&repo).await;
    let pending = Session::new("owner-a".into(), Some(context()));
    repo.create(&pending).await.expect("create");
    let mut closed = in_progress(&repo).await;
    closed
        .complete(CloseTrigger::DeadlineExpired, Utc::now())
        .expect("complete");
    repo.close(&closed).await.expect("close");

    let listed = repo.list_in_progress().await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, open.id);
}

#[tokio::test]
async fn file_database_persists_across_connections() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("data").join("interviews.db");

    let session = Session::new("owner-f".into(), Some(context()));
    {
        let pool = db::connect(&path).await.expect("connect");
        InterviewRepo::new(Arc::new(pool.clone()))
            .create(&session)
            .await
            .expect("create");
        pool.close().await;
    }

    let pool = db::connect(&path).await.expect("reconnect");
    let loaded = InterviewRepo::new(Arc::new(pool))
        .get_by_id(&session.id)
        .await
        .expect("get");
    assert_eq!(loaded.map(|s| s.id), Some(session.id));
}
