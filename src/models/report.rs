//! End-of-session performance report.

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use super::session::SessionStatus;

/// Assessment returned by the generation capability.
///
/// Field names follow the JSON the generation prompt asks for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    /// Overall score, 0–100.
    #[serde(deserialize_with = "deserialize_score")]
    pub overall_score: u8,
    /// Key strengths.
    #[serde(default)]
    pub strengths: Vec<String>,
    /// Areas for improvement.
    #[serde(default)]
    pub weaknesses: Vec<String>,
    /// Technical score, 0–100.
    #[serde(deserialize_with = "deserialize_score")]
    pub technical_score: u8,
    /// Communication score, 0–100.
    #[serde(deserialize_with = "deserialize_score")]
    pub communication_score: u8,
    /// Confidence score, 0–100.
    #[serde(deserialize_with = "deserialize_score")]
    pub confidence_score: u8,
    /// Problem-solving score, 0–100.
    #[serde(deserialize_with = "deserialize_score")]
    pub problem_solving_score: u8,
    /// Narrative feedback.
    #[serde(default)]
    pub detailed_feedback: String,
    /// Concrete next steps.
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Counterpart turns.
    #[serde(default)]
    pub questions_asked: u32,
    /// Participant turns.
    #[serde(default)]
    pub answers_given: u32,
    /// `short`, `medium`, or `long`.
    #[serde(default)]
    pub average_response_length: String,
    /// Estimated duration.
    #[serde(default)]
    pub interview_duration: String,
    /// `Excellent`, `Good`, `Average`, or `Needs Improvement`.
    #[serde(default)]
    pub performance_level: String,
}

impl Assessment {
    /// Neutral assessment used when the generated reply cannot be parsed.
    #[must_use]
    pub fn fallback(questions_asked: u32, answers_given: u32) -> Self {
        Self {
            overall_score: 70,
            strengths: vec![
                "Completed the interview".into(),
                "Responded to questions".into(),
                "Showed engagement".into(),
            ],
            weaknesses: vec!["Could provide more detailed responses".into()],
            technical_score: 70,
            communication_score: 70,
            confidence_score: 70,
            problem_solving_score: 70,
            detailed_feedback: "The interview was conducted successfully. \
                                Continue practicing to improve your skills."
                .into(),
            recommendations: vec![
                "Practice more technical questions".into(),
                "Improve response clarity".into(),
                "Research the company thoroughly".into(),
            ],
            questions_asked,
            answers_given,
            average_response_length: "medium".into(),
            interview_duration: "15-20 minutes".into(),
            performance_level: "Good".into(),
        }
    }
}

/// Accept any JSON number as a 0–100 score, rounded and clamped.
fn deserialize_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() {
        return Err(D::Error::custom("score must be a finite number"));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Clamped to 0..=100.
    let score = value.round().clamp(0.0, 100.0) as u8;
    Ok(score)
}

/// Report for one session: the assessment plus integrity facts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InterviewReport {
    /// Session identifier.
    pub session_id: String,
    /// Position interviewed for.
    pub position: String,
    /// Intake time.
    pub interview_date: DateTime<Utc>,
    /// Session status when the report was produced.
    pub status: SessionStatus,
    /// Risk score when the report was produced.
    pub risk_score: u32,
    /// Number of recorded violations.
    pub violation_count: usize,
    /// Whether `assessment` is the fallback rather than a generated one.
    pub fallback: bool,
    /// Performance assessment.
    pub assessment: Assessment,
}
