//! Unit tests for the per-session deadline timer.
//!
//! Validates single firing, cancellation, and drop semantics.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use interview_proctor::models::session::CloseTrigger;
use interview_proctor::orchestrator::deadline_timer::DeadlineTimer;
use interview_proctor::orchestrator::session_actor::SessionCommand;

fn test_timer(
    session_id: &str,
    millis: u64,
) -> (DeadlineTimer, mpsc::Receiver<SessionCommand>, CancellationToken) {
    let ct = CancellationToken::new();
    let (tx, rx) = mpsc::channel(8);
    let timer = DeadlineTimer::new(
        session_id.to_owned(),
        Duration::from_millis(millis),
        tx,
        ct.clone(),
    );
    (timer, rx, ct)
}

#[tokio::test]
async fn fires_exactly_one_close() {
    let (timer, mut rx, _ct) = test_timer("d1", 50);
    let handle = timer.spawn();
    assert_eq!(handle.session_id(), "d1");

    let command = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("should fire before timeout")
        .expect("channel open");
    assert!(
        matches!(
            command,
            SessionCommand::Close {
                trigger: CloseTrigger::DeadlineExpired,
                reply: None
            }
        ),
        "expected deadline close, got {command:?}"
    );
    assert!(handle.has_fired());

    handle.await_completion().await;
    assert!(rx.recv().await.is_none(), "timer must not fire twice");
}

#[tokio::test]
async fn cancel_prevents_firing() {
    let (timer, mut rx, _ct) = test_timer("d2", 100);
    let handle = timer.spawn();
    handle.cancel();

    let received = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
    assert!(
        matches!(received, Ok(None)),
        "cancelled timer should exit without sending"
    );
    assert!(!handle.has_fired());
}

#[tokio::test]
async fn dropping_handle_cancels() {
    let (timer, mut rx, ct) = test_timer("d3", 100);
    let handle = timer.spawn();
    drop(handle);
    assert!(ct.is_cancelled());

    let received = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
    assert!(matches!(received, Ok(None)));
}

#[tokio::test]
async fn parent_token_cancels_timer() {
    let (timer, mut rx, ct) = test_timer("d4", 100);
    let handle = timer.spawn();
    ct.cancel();

    let received = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
    assert!(matches!(received, Ok(None)));
    assert!(!handle.has_fired());
}

#[tokio::test]
async fn closed_actor_is_tolerated() {
    let (timer, rx, _ct) = test_timer("d5", 10);
    drop(rx);
    let handle = timer.spawn();
    tokio::time::timeout(Duration::from_secs(2), handle.await_completion())
        .await
        .expect("timer task exits");
}
