//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS` and are safe to
//! re-run on every server startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS interview (
    id                  TEXT PRIMARY KEY NOT NULL,
    owner_id            TEXT NOT NULL,
    status              TEXT NOT NULL CHECK(status IN ('pending','in_progress','completed','terminated')),
    position            TEXT,
    reference_text      TEXT,
    risk_score          INTEGER NOT NULL DEFAULT 0 CHECK(risk_score >= 0),
    termination_reason  TEXT CHECK(termination_reason IS NULL OR termination_reason IN ('high_risk')),
    close_trigger       TEXT CHECK(close_trigger IS NULL OR close_trigger IN ('stop_requested','deadline_expired','risk_threshold')),
    created_at          TEXT NOT NULL,
    started_at          TEXT,
    ended_at            TEXT
);

CREATE TABLE IF NOT EXISTS violation (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    interview_id    TEXT NOT NULL REFERENCES interview(id),
    kind            TEXT NOT NULL,
    weight          INTEGER NOT NULL CHECK(weight >= 0),
    observed_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS turn (
    interview_id    TEXT NOT NULL REFERENCES interview(id),
    sequence        INTEGER NOT NULL CHECK(sequence >= 1),
    speaker         TEXT NOT NULL CHECK(speaker IN ('participant','counterpart')),
    content         TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    PRIMARY KEY (interview_id, sequence)
);

CREATE INDEX IF NOT EXISTS idx_interview_owner ON interview(owner_id);
CREATE INDEX IF NOT EXISTS idx_interview_status ON interview(status);
CREATE INDEX IF NOT EXISTS idx_violation_interview ON violation(interview_id);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
