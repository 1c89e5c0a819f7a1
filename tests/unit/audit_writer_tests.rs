//! Unit tests for the JSONL audit writer.

use chrono::Utc;
use interview_proctor::audit::{AuditEntry, AuditEventType, AuditLogger, JsonlAuditWriter};
use serde_json::Value;

fn read_lines(writer: &JsonlAuditWriter) -> Vec<Value> {
    let path = writer.path_for(Utc::now().date_naive());
    std::fs::read_to_string(path)
        .expect("audit file exists")
        .lines()
        .map(|line| serde_json::from_str(line).expect("valid json line"))
        .collect()
}

#[test]
fn file_is_named_by_date() {
    let temp = tempfile::tempdir().expect("tempdir");
    let writer = JsonlAuditWriter::new(temp.path().to_path_buf()).expect("writer");
    let date = chrono::NaiveDate::from_ymd_opt(2026, 3, 9).expect("date");
    assert_eq!(writer.path_for(date), temp.path().join("audit-2026-03-09.jsonl"));
}

#[test]
fn creates_missing_directory() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path().join("nested").join("audit");
    JsonlAuditWriter::new(dir.clone()).expect("writer");
    assert!(dir.is_dir());
}

#[test]
fn writes_one_line_per_entry() {
    let temp = tempfile::tempdir().expect("tempdir");
    let writer = JsonlAuditWriter::new(temp.path().to_path_buf()).expect("writer");

    writer
        .log_entry(AuditEntry::new(AuditEventType::SessionStart).with_session("s1".into()))
        .expect("write start");
    writer
        .log_entry(
            AuditEntry::new(AuditEventType::ViolationRecorded)
                .with_session("s1".into())
                .with_violation("focus_lost".into(), 20)
                .with_risk_score(20),
        )
        .expect("write violation");

    let lines = read_lines(&writer);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["event_type"], "session_start");
    assert_eq!(lines[0]["session_id"], "s1");
    assert_eq!(lines[1]["event_type"], "violation_recorded");
    assert_eq!(lines[1]["violation_kind"], "focus_lost");
    assert_eq!(lines[1]["weight"], 20);
    assert_eq!(lines[1]["risk_score"], 20);
}

#[test]
fn absent_optional_fields_are_omitted() {
    let temp = tempfile::tempdir().expect("tempdir");
    let writer = JsonlAuditWriter::new(temp.path().to_path_buf()).expect("writer");
    writer
        .log_entry(
            AuditEntry::new(AuditEventType::SessionComplete)
                .with_session("s2".into())
                .with_reason("deadline_expired".into()),
        )
        .expect("write");

    let line = &read_lines(&writer)[0];
    let object = line.as_object().expect("object");
    assert_eq!(line["reason"], "deadline_expired");
    assert!(!object.contains_key("violation_kind"));
    assert!(!object.contains_key("weight"));
    assert!(!object.contains_key("risk_score"));
    assert!(object.contains_key("timestamp"));
}

#[test]
fn second_writer_appends_to_same_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let first = JsonlAuditWriter::new(temp.path().to_path_buf()).expect("writer");
    first
        .log_entry(AuditEntry::new(AuditEventType::SessionStart))
        .expect("write");
    drop(first);

    let second = JsonlAuditWriter::new(temp.path().to_path_buf()).expect("writer");
    second
        .log_entry(AuditEntry::new(AuditEventType::SessionRecovered))
        .expect("write");

    let lines = read_lines(&second);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1]["event_type"], "session_recovered");
}
