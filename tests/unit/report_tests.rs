//! Unit tests for assessment parsing and report assembly.

use chrono::Utc;
use interview_proctor::generation::report::{generate_report, parse_assessment};
use interview_proctor::generation::{GenerationFuture, ReplyGenerator, ReplyRequest};
use interview_proctor::models::session::{Session, SessionContext};
use interview_proctor::models::turn::Speaker;
use interview_proctor::models::violation::{ViolationEvent, ViolationKind};
use interview_proctor::orchestrator::risk_ledger::RiskLedger;
use interview_proctor::orchestrator::transcript_log::TranscriptLog;
use interview_proctor::orchestrator::SessionView;
use interview_proctor::AppError;

/// Returns a fixed report reply and records the prompt it was given.
struct FixedReport {
    reply: Result<String, AppError>,
    prompt: std::sync::Mutex<Option<String>>,
}

impl FixedReport {
    fn new(reply: Result<String, AppError>) -> Self {
        Self {
            reply,
            prompt: std::sync::Mutex::new(None),
        }
    }
}

impl ReplyGenerator for FixedReport {
    fn generate_reply<'a>(&'a self, _request: &'a ReplyRequest) -> GenerationFuture<'a> {
        Box::pin(async { Ok(String::new()) })
    }

    fn generate_report<'a>(&'a self, prompt: &'a str) -> GenerationFuture<'a> {
        *self.prompt.lock().unwrap() = Some(prompt.to_owned());
        let reply = self.reply.clone();
        Box::pin(async move { reply })
    }
}

fn view_with_transcript() -> SessionView {
    let mut session = Session::new(
        "owner-r".into(),
        Some(SessionContext {
            position: "Platform Engineer".into(),
            reference_text: "Kubernetes operator author.".into(),
        }),
    );
    session.begin(Utc::now()).unwrap();
    session.risk_score = 15;

    let mut ledger = RiskLedger::new();
    ledger.accumulate(ViolationEvent::new(ViolationKind::ForbiddenObject, 15));

    let mut transcript = TranscriptLog::new();
    let now = Utc::now();
    transcript.append(Speaker::Participant, "I wrote an operator.".into(), now);
    transcript.append(Speaker::Counterpart, "What did it reconcile?".into(), now);
    transcript.append(Speaker::Participant, "Database clusters.".into(), now);

    SessionView::new(session, ledger.snapshot(), transcript.snapshot())
}

#[test]
fn parses_fenced_camel_case_json() {
    let raw = "```json\n{\"overallScore\": 90, \"technicalScore\": 91, \
               \"communicationScore\": 88, \"confidenceScore\": 80, \
               \"problemSolvingScore\": 85}\n```";
    let assessment = parse_assessment(raw).expect("parses");
    assert_eq!(assessment.overall_score, 90);
    assert!(assessment.strengths.is_empty());
}

#[test]
fn fractional_scores_are_rounded() {
    let raw = "{\"overallScore\": 78.5, \"technicalScore\": 81.2, \
               \"communicationScore\": 100.4, \"confidenceScore\": 0, \
               \"problemSolvingScore\": 64.49}";
    let assessment = parse_assessment(raw).expect("parses");
    assert_eq!(assessment.overall_score, 79);
    assert_eq!(assessment.technical_score, 81);
    assert_eq!(assessment.communication_score, 100);
    assert_eq!(assessment.confidence_score, 0);
    assert_eq!(assessment.problem_solving_score, 64);
}

#[test]
fn non_numeric_score_does_not_parse() {
    let raw = "{\"overallScore\": \"high\", \"technicalScore\": 1, \
               \"communicationScore\": 1, \"confidenceScore\": 1, \
               \"problemSolvingScore\": 1}";
    assert!(parse_assessment(raw).is_none());
}

#[test]
fn missing_required_score_does_not_parse() {
    assert!(parse_assessment("{\"overallScore\": 90}").is_none());
}

#[tokio::test]
async fn unparseable_reply_yields_fallback_with_turn_counts() {
    let view = view_with_transcript();
    let generator = FixedReport::new(Ok("The candidate was great.".into()));

    let report = generate_report(&view, &generator, 2000).await.expect("report");
    assert!(report.fallback);
    assert_eq!(report.assessment.overall_score, 70);
    assert_eq!(report.assessment.questions_asked, 1);
    assert_eq!(report.assessment.answers_given, 2);
    assert_eq!(report.risk_score, 15);
    assert_eq!(report.violation_count, 1);
    assert_eq!(report.position, "Platform Engineer");
}

#[tokio::test]
async fn prompt_carries_transcript_and_excerpt() {
    let view = view_with_transcript();
    let generator = FixedReport::new(Ok("{}".into()));
    generate_report(&view, &generator, 10).await.expect("report");

    let prompt = generator.prompt.lock().unwrap().clone().expect("prompt sent");
    assert!(prompt.contains("Platform Engineer"));
    assert!(prompt.contains("Kubernetes"));
    assert!(!prompt.contains("operator author"));
    assert!(prompt.contains("Candidate: I wrote an operator."));
    assert!(prompt.contains("Interviewer: What did it reconcile?"));
}

#[tokio::test]
async fn generation_failure_propagates() {
    let view = view_with_transcript();
    let generator = FixedReport::new(Err(AppError::GenerationUnavailable("down".into())));
    let err = generate_report(&view, &generator, 2000).await.unwrap_err();
    assert!(matches!(err, AppError::GenerationUnavailable(_)));
}

#[tokio::test]
async fn missing_context_is_rejected() {
    let session = Session::new("owner-r".into(), None);
    let view = SessionView::new(
        session,
        RiskLedger::new().snapshot(),
        TranscriptLog::new().snapshot(),
    );
    let generator = FixedReport::new(Ok("{}".into()));
    let err = generate_report(&view, &generator, 2000).await.unwrap_err();
    assert!(matches!(err, AppError::MissingContext(_)));
    assert!(generator.prompt.lock().unwrap().is_none());
}
