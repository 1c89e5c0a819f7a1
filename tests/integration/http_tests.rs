//! Integration tests for the session API router.
//!
//! Requests are driven through `tower::ServiceExt::oneshot` against an
//! in-memory coordinator; no socket is bound.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use interview_proctor::config::RiskConfig;
use interview_proctor::generation::ReplyGenerator;
use interview_proctor::http::handlers::HealthResponse;
use interview_proctor::http::{router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::test_helpers::{harness, test_settings, EchoGenerator};

const ASSESSMENT: &str = "```json\n{\"overallScore\": 82, \"technicalScore\": 85, \
    \"communicationScore\": 80, \"confidenceScore\": 78, \"problemSolvingScore\": 84, \
    \"strengths\": [\"Clear answers\"], \"performanceLevel\": \"Good\"}\n```";

async fn app_with(generator: Arc<dyn ReplyGenerator>) -> Router {
    let h = harness(generator, test_settings()).await;
    router(Arc::new(AppState {
        coordinator: h.coordinator,
        risk: RiskConfig::default(),
    }))
}

async fn app() -> Router {
    app_with(Arc::new(EchoGenerator::default())).await
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Create and start a session through the API, returning its id.
async fn started(app: &Router) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/sessions",
        Some(json!({
            "owner_id": "owner-http",
            "position": "Data Engineer",
            "reference_text": "SQL, Spark, Airflow."
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
    let id = body["id"].as_str().unwrap().to_owned();

    let (status, body) = send(app, Method::POST, &format!("/sessions/{id}/start"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["status"], "in_progress");
    id
}

#[tokio::test]
async fn health_reports_live_sessions() {
    let app = app().await;
    started(&app).await;

    let response = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let health: HealthResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.live_sessions, 1);
}

#[tokio::test]
async fn create_requires_owner_and_position() {
    let app = app().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/sessions",
        Some(json!({ "owner_id": "", "position": "Data Engineer" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn violation_without_weight_uses_configured_weight() {
    let app = app().await;
    let id = started(&app).await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/sessions/{id}/violations"),
        Some(json!({ "kind": "focus_lost" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["risk_score"], 20);
    assert_eq!(body["terminated"], false);
    assert_eq!(body["violation_count"], 1);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/sessions/{id}/violations"),
        Some(json!({ "kind": "gaze_away", "weight": 7 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["risk_score"], 27);
}

#[tokio::test]
async fn client_kind_names_use_catalogued_weights() {
    let app = app().await;
    let id = started(&app).await;

    for (kind, expected) in [
        ("tab_switch", 20),
        ("face_missing", 25),
        ("multiple_faces", 45),
        ("object_detected", 60),
    ] {
        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/sessions/{id}/violations"),
            Some(json!({ "kind": kind })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{kind}");
        assert_eq!(body["risk_score"], expected, "{kind}");
    }

    let (_, view) = send(&app, Method::GET, &format!("/sessions/{id}"), None).await;
    assert_eq!(view["violations"]["events"][0]["kind"], "focus_lost");
}

#[tokio::test]
async fn unknown_kind_without_weight_is_rejected() {
    let app = app().await;
    let id = started(&app).await;

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/sessions/{id}/violations"),
        Some(json!({ "kind": "gaze_away" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, view) = send(&app, Method::GET, &format!("/sessions/{id}"), None).await;
    assert_eq!(view["session"]["risk_score"], 0);
}

#[tokio::test]
async fn turn_stop_and_post_stop_rejection() {
    let app = app().await;
    let id = started(&app).await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/sessions/{id}/turns"),
        Some(json!({ "content": "I built a pipeline." })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sequence"], 2);
    assert_eq!(body["speaker"], "counterpart");
    assert_eq!(body["content"], "reply to: I built a pipeline.");

    let (status, body) = send(&app, Method::POST, &format!("/sessions/{id}/stop"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["newly_closed"], true);
    assert_eq!(body["outcome"]["status"], "completed");

    let (status, body) = send(&app, Method::POST, &format!("/sessions/{id}/stop"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["newly_closed"], false);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/sessions/{id}/violations"),
        Some(json!({ "kind": "focus_lost" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "session_closed");
}

#[tokio::test]
async fn empty_turn_is_rejected() {
    let app = app().await;
    let id = started(&app).await;
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/sessions/{id}/turns"),
        Some(json!({ "content": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let app = app().await;
    for (method, uri) in [
        (Method::GET, "/sessions/missing"),
        (Method::POST, "/sessions/missing/start"),
        (Method::POST, "/sessions/missing/stop"),
        (Method::GET, "/sessions/missing/report"),
    ] {
        let (status, body) = send(&app, method, uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body["error"], "unknown_session");
    }
}

#[tokio::test]
async fn report_parses_generated_assessment() {
    let app = app_with(Arc::new(EchoGenerator::with_report(ASSESSMENT))).await;
    let id = started(&app).await;
    send(
        &app,
        Method::POST,
        &format!("/sessions/{id}/turns"),
        Some(json!({ "content": "Partitioning matters." })),
    )
    .await;
    send(&app, Method::POST, &format!("/sessions/{id}/stop"), None).await;

    let (status, body) = send(&app, Method::GET, &format!("/sessions/{id}/report"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fallback"], false);
    assert_eq!(body["position"], "Data Engineer");
    assert_eq!(body["status"], "completed");
    assert_eq!(body["assessment"]["overallScore"], 82);
    assert_eq!(body["assessment"]["performanceLevel"], "Good");
}

#[tokio::test]
async fn report_falls_back_on_unparseable_assessment() {
    let app = app_with(Arc::new(EchoGenerator::with_report("not json at all"))).await;
    let id = started(&app).await;
    send(
        &app,
        Method::POST,
        &format!("/sessions/{id}/turns"),
        Some(json!({ "content": "Hello" })),
    )
    .await;

    let (status, body) = send(&app, Method::GET, &format!("/sessions/{id}/report"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fallback"], true);
    assert_eq!(body["assessment"]["overallScore"], 70);
    assert_eq!(body["assessment"]["questionsAsked"], 1);
    assert_eq!(body["assessment"]["answersGiven"], 1);
}

#[tokio::test]
async fn report_generation_failure_is_unavailable() {
    let app = app().await;
    let id = started(&app).await;
    let (status, body) = send(&app, Method::GET, &format!("/sessions/{id}/report"), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "generation_unavailable");
}

#[tokio::test]
async fn owner_listing_includes_created_sessions() {
    let app = app().await;
    let first = started(&app).await;
    let second = started(&app).await;

    let (status, body) = send(&app, Method::GET, "/owners/owner-http/sessions", None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&first.as_str()));
    assert!(ids.contains(&second.as_str()));

    let (_, body) = send(&app, Method::GET, "/owners/nobody/sessions", None).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn event_stream_greets_and_ends_after_stop() {
    let app = app().await;
    let id = started(&app).await;

    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/sessions/{id}/events"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    send(&app, Method::POST, &format!("/sessions/{id}/stop"), None).await;

    let bytes = tokio::time::timeout(
        Duration::from_secs(5),
        to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .expect("stream should end once the session retires")
    .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(text.contains("event: greeting"));
    assert!(text.contains("Data Engineer position"));
    assert!(text.contains("event: completed"));
    assert!(text.contains("event: end"));
    let greeting_at = text.find("event: greeting").unwrap();
    let completed_at = text.find("event: completed").unwrap();
    assert!(greeting_at < completed_at);
}

#[tokio::test]
async fn event_stream_of_closed_session_is_conflict() {
    let app = app().await;
    let id = started(&app).await;
    send(&app, Method::POST, &format!("/sessions/{id}/stop"), None).await;

    let (status, _) = send(&app, Method::GET, &format!("/sessions/{id}/events"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}
