//! Per-session interview countdown.
//!
//! A [`DeadlineTimer`] sleeps for the interview duration and then
//! enqueues exactly one [`SessionCommand::Close`] with
//! [`CloseTrigger::DeadlineExpired`] into its session's command queue,
//! so expiry is ordered with every other event for that session. The
//! timer never fires twice. Cancelling it (or dropping its handle) before
//! expiry turns it into a no-op.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

use super::session_actor::SessionCommand;
use crate::models::session::CloseTrigger;

/// Builder for a per-session deadline timer.
///
/// Call [`spawn`](Self::spawn) to start the background countdown.
pub struct DeadlineTimer {
    session_id: String,
    duration: Duration,
    commands: mpsc::Sender<SessionCommand>,
    cancel: CancellationToken,
}

impl DeadlineTimer {
    /// Construct a new timer (does not start counting yet).
    #[must_use]
    pub fn new(
        session_id: String,
        duration: Duration,
        commands: mpsc::Sender<SessionCommand>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session_id,
            duration,
            commands,
            cancel,
        }
    }

    /// Spawn the countdown task and return a handle for controlling it.
    #[must_use]
    pub fn spawn(self) -> DeadlineTimerHandle {
        let fired = Arc::new(AtomicBool::new(false));
        let cancel_for_handle = self.cancel.clone();
        let span = info_span!("deadline_timer", session_id = %self.session_id);

        let task_handle = tokio::spawn(
            Self::run(
                self.session_id.clone(),
                self.duration,
                self.commands,
                self.cancel,
                Arc::clone(&fired),
            )
            .instrument(span),
        );

        DeadlineTimerHandle {
            fired,
            session_id: self.session_id,
            join_handle: Some(task_handle),
            cancel: cancel_for_handle,
        }
    }

    async fn run(
        session_id: String,
        duration: Duration,
        commands: mpsc::Sender<SessionCommand>,
        cancel: CancellationToken,
        fired: Arc<AtomicBool>,
    ) {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(session_id, "deadline timer cancelled");
                return;
            }
            () = tokio::time::sleep(duration) => {}
        }

        fired.store(true, Ordering::SeqCst);
        info!(session_id, secs = duration.as_secs(), "interview deadline reached");

        let command = SessionCommand::Close {
            trigger: CloseTrigger::DeadlineExpired,
            reply: None,
        };
        if commands.send(command).await.is_err() {
            debug!(session_id, "session actor gone before deadline delivery");
        }
    }
}

/// Handle returned from [`DeadlineTimer::spawn`].
pub struct DeadlineTimerHandle {
    fired: Arc<AtomicBool>,
    session_id: String,
    join_handle: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl Drop for DeadlineTimerHandle {
    /// Cancel the countdown when the handle is dropped.
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl DeadlineTimerHandle {
    /// Cancel the countdown. No-op if it already fired.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the deadline has been reached.
    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// The session ID this handle controls.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Wait for the countdown task to exit without cancelling it.
    pub async fn await_completion(mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.await;
        }
    }
}
