//! End-of-session report generation.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use super::{prompt, ReplyGenerator};
use crate::models::report::{Assessment, InterviewReport};
use crate::models::turn::Speaker;
use crate::orchestrator::session_actor::SessionView;
use crate::{AppError, Result};

static CODE_FENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*```[a-zA-Z]*\s*$").ok());

/// Remove Markdown code fences wrapped around a JSON reply.
#[must_use]
pub fn strip_code_fences(raw: &str) -> String {
    let stripped = match CODE_FENCE.as_ref() {
        Some(fence) => fence.replace_all(raw, ""),
        None => raw.into(),
    };
    stripped.trim().to_owned()
}

/// Parse an assessment reply, tolerating surrounding code fences.
///
/// Returns `None` if the reply is not a valid assessment.
#[must_use]
pub fn parse_assessment(raw: &str) -> Option<Assessment> {
    serde_json::from_str(&strip_code_fences(raw)).ok()
}

/// Ask the generation capability to assess a session's transcript.
///
/// A reply that does not parse yields the fallback assessment, built from
/// the transcript's turn counts, with `fallback` set.
///
/// # Errors
///
/// Returns `AppError::MissingContext` if the session has no context and
/// `AppError::GenerationUnavailable` if the generation call fails.
pub async fn generate_report(
    view: &SessionView,
    generator: &dyn ReplyGenerator,
    reference_excerpt_chars: usize,
) -> Result<InterviewReport> {
    let session = &view.session;
    let context = session.context.as_ref().ok_or_else(|| {
        AppError::MissingContext(format!("session {} has no context", session.id))
    })?;

    let turns: Vec<_> = view.transcript.iter().cloned().collect();
    let report_prompt = prompt::report_prompt(
        &context.position,
        &prompt::excerpt(&context.reference_text, reference_excerpt_chars),
        &turns,
    );
    let raw = generator.generate_report(&report_prompt).await?;

    let (assessment, fallback) = match parse_assessment(&raw) {
        Some(assessment) => (assessment, false),
        None => {
            warn!(session_id = %session.id, "assessment reply did not parse, using fallback");
            let questions = u32::try_from(view.transcript.count_by(Speaker::Counterpart))
                .unwrap_or(u32::MAX);
            let answers = u32::try_from(view.transcript.count_by(Speaker::Participant))
                .unwrap_or(u32::MAX);
            (Assessment::fallback(questions, answers), true)
        }
    };

    info!(
        session_id = %session.id,
        overall_score = assessment.overall_score,
        fallback,
        "report generated"
    );

    Ok(InterviewReport {
        session_id: session.id.clone(),
        position: context.position.clone(),
        interview_date: session.created_at,
        status: session.status,
        risk_score: session.risk_score,
        violation_count: view.violations.len(),
        fallback,
        assessment,
    })
}
