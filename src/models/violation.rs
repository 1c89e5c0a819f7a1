//! Violation events and risk classification.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of an environment-integrity observation.
///
/// The set is open: kinds the server does not know about are carried
/// verbatim in [`ViolationKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ViolationKind {
    /// No face visible to the camera.
    SubjectAbsent,
    /// More than one face visible.
    MultipleSubjects,
    /// Phone, book, or other forbidden object in frame.
    ForbiddenObject,
    /// Interview tab or window lost focus.
    FocusLost,
    /// Participant left fullscreen mode.
    FullscreenExit,
    /// Kind reported by a signal source but not catalogued here.
    Other(String),
}

impl ViolationKind {
    /// All catalogued kinds.
    #[must_use]
    pub fn known() -> [Self; 5] {
        [
            Self::SubjectAbsent,
            Self::MultipleSubjects,
            Self::ForbiddenObject,
            Self::FocusLost,
            Self::FullscreenExit,
        ]
    }

    /// Wire name of the kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::SubjectAbsent => "subject_absent",
            Self::MultipleSubjects => "multiple_subjects",
            Self::ForbiddenObject => "forbidden_object",
            Self::FocusLost => "focus_lost",
            Self::FullscreenExit => "fullscreen_exit",
            Self::Other(name) => name,
        }
    }

    /// Weight the proctoring client historically assigned to this kind.
    #[must_use]
    pub fn default_weight(&self) -> Option<u32> {
        match self {
            Self::SubjectAbsent => Some(5),
            Self::MultipleSubjects | Self::FocusLost => Some(20),
            Self::ForbiddenObject => Some(15),
            Self::FullscreenExit => Some(10),
            Self::Other(_) => None,
        }
    }
}

impl From<String> for ViolationKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            // Older client names are aliases of catalogued kinds.
            "subject_absent" | "face_missing" => Self::SubjectAbsent,
            "multiple_subjects" | "multiple_faces" => Self::MultipleSubjects,
            "forbidden_object" | "object_detected" => Self::ForbiddenObject,
            "focus_lost" | "tab_switch" => Self::FocusLost,
            "fullscreen_exit" => Self::FullscreenExit,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for ViolationKind {
    fn from(value: &str) -> Self {
        Self::from(value.to_owned())
    }
}

impl From<ViolationKind> for String {
    fn from(kind: ViolationKind) -> Self {
        match kind {
            ViolationKind::Other(name) => name,
            known => known.as_str().to_owned(),
        }
    }
}

impl Display for ViolationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation contributing risk to a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViolationEvent {
    /// Observation category.
    pub kind: ViolationKind,
    /// Contribution to the risk score.
    pub weight: u32,
    /// Server-assigned ingestion time.
    pub observed_at: DateTime<Utc>,
}

impl ViolationEvent {
    /// Stamp a new event with the current time.
    #[must_use]
    pub fn new(kind: ViolationKind, weight: u32) -> Self {
        Self {
            kind,
            weight,
            observed_at: Utc::now(),
        }
    }
}

/// Display banding of a risk score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Below 50.
    Low,
    /// 50 to 79.
    Elevated,
    /// 80 and above.
    High,
}

impl RiskLevel {
    /// Band a raw score.
    #[must_use]
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=49 => Self::Low,
            50..=79 => Self::Elevated,
            _ => Self::High,
        }
    }
}
