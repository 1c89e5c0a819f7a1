//! Session orchestration modules.
//!
//! Covers the per-session actor that owns the risk ledger and transcript,
//! the coordinator that maps session ids to live actors, and the deadline
//! timer that completes sessions when their countdown ends.

pub mod coordinator;
pub mod deadline_timer;
pub mod risk_ledger;
pub mod session_actor;
pub mod transcript_log;

pub use coordinator::{CoordinatorSettings, SessionCoordinator};
pub use session_actor::{SessionHandle, SessionView, StopOutcome, ViolationOutcome};
