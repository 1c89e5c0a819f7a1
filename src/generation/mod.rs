//! Reply and report generation.
//!
//! The [`ReplyGenerator`] trait is the only seam to the external
//! text-generation service. Session actors never call it: turn handling
//! invokes it between committing the participant turn and committing the
//! reply, so a slow or failing service never blocks session state.

pub mod gemini;
pub mod prompt;
pub mod report;

use std::future::Future;
use std::pin::Pin;

use crate::models::turn::Turn;
use crate::Result;

pub use gemini::HttpReplyGenerator;

/// Everything the counterpart needs to produce its next reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRequest {
    /// Session the reply belongs to.
    pub session_id: String,
    /// Position being interviewed for.
    pub position: String,
    /// Bounded excerpt of the reference material.
    pub reference_excerpt: String,
    /// Most recent turns before the participant turn, oldest first.
    pub history: Vec<Turn>,
    /// The committed participant turn being answered.
    pub participant_turn: Turn,
}

/// Boxed future returned by [`ReplyGenerator`] methods.
pub type GenerationFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// External text-generation capability.
///
/// Implementations must be [`Send`] and [`Sync`] so one generator can be
/// shared by every session.
pub trait ReplyGenerator: Send + Sync {
    /// Produce the counterpart's reply to a participant turn.
    ///
    /// # Errors
    ///
    /// Returns `AppError::GenerationUnavailable` if the service fails or
    /// returns no text.
    fn generate_reply<'a>(&'a self, request: &'a ReplyRequest) -> GenerationFuture<'a>;

    /// Produce raw assessment text for a finished interview.
    ///
    /// # Errors
    ///
    /// Returns `AppError::GenerationUnavailable` if the service fails or
    /// returns no text.
    fn generate_report<'a>(&'a self, prompt: &'a str) -> GenerationFuture<'a>;
}
