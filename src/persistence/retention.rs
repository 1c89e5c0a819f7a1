//! Retention service for time-based data purge.
//!
//! Runs as a background task deleting children first (violations, turns),
//! then closed interviews whose `ended_at` is older than `retention_days`.
//! Pending and in-progress interviews are never purged.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::db::{format_timestamp, Database};
use crate::Result;

const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Spawn the retention purge background task.
///
/// The task runs hourly until `cancel` fires.
#[must_use]
pub fn spawn_retention_task(
    db: Arc<Database>,
    retention_days: u32,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("retention task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));
                    if let Err(err) = purge_expired(&db, cutoff).await {
                        error!(?err, "retention purge failed");
                    }
                }
            }
        }
    })
}

/// Delete every closed interview that ended before `cutoff`, with its
/// violations and turns. Returns the number of interviews removed.
///
/// # Errors
///
/// Returns `AppError::Db` if any delete fails; the purge is rolled back.
pub async fn purge_expired(db: &Database, cutoff: DateTime<Utc>) -> Result<u64> {
    let cutoff_str = format_timestamp(cutoff);
    let mut tx = db.begin().await?;

    // Delete children first to maintain referential integrity.
    for table in ["violation", "turn"] {
        // `table` comes from the literal list above, never from input.
        let query = format!(
            "DELETE FROM {table} WHERE interview_id IN \
             (SELECT id FROM interview \
              WHERE status IN ('completed','terminated') AND ended_at < ?1)"
        );
        sqlx::query(&query)
            .bind(&cutoff_str)
            .execute(&mut *tx)
            .await?;
    }

    let result = sqlx::query(
        "DELETE FROM interview \
         WHERE status IN ('completed','terminated') AND ended_at < ?1",
    )
    .bind(&cutoff_str)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let purged = result.rows_affected();
    info!(purged, "retention purge completed");
    Ok(purged)
}
