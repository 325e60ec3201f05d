use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::instrument;

use domain::history::{DiffStatus, HistoryChange};
use tilehawk_application::{
    error::{AppError, AppResult},
    ports::outgoing::history_store::HistoryStorePort,
};

use super::utils::SqliteExecutor;

pub struct SqliteHistoryStoreAdapter {
    pool: SqlitePool,
    executor: SqliteExecutor,
}

impl SqliteHistoryStoreAdapter {
    #[must_use]
    pub fn new(pool: SqlitePool, query_timeout_secs: u64) -> Self {
        Self {
            pool,
            executor: SqliteExecutor::new(query_timeout_secs),
        }
    }
}

fn change_from_row(row: &SqliteRow) -> AppResult<HistoryChange> {
    let get_err = |e: sqlx::Error| AppError::DatabaseError {
        message: format!("Malformed history row: {e}"),
    };
    let status: String = row.try_get("status").map_err(get_err)?;
    Ok(HistoryChange {
        timestamp: row.try_get("timestamp").map_err(get_err)?,
        status: status.parse::<DiffStatus>()?,
        num_remaining: row.try_get("num_remaining").map_err(get_err)?,
        num_target: row.try_get("num_target").map_err(get_err)?,
        completion_percent: row.try_get("completion_percent").map_err(get_err)?,
        progress_pixels: row.try_get("progress_pixels").map_err(get_err)?,
        regress_pixels: row.try_get("regress_pixels").map_err(get_err)?,
    })
}

#[async_trait::async_trait]
impl HistoryStorePort for SqliteHistoryStoreAdapter {
    #[instrument(skip(self, change))]
    async fn append(&self, project_id: i64, change: &HistoryChange) -> AppResult<()> {
        self.executor
            .execute_with_timeout(
                || {
                    sqlx::query(
                        "INSERT INTO history_change \
                         (project_id, timestamp, status, num_remaining, num_target, \
                          completion_percent, progress_pixels, regress_pixels) \
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                    )
                    .bind(project_id)
                    .bind(change.timestamp)
                    .bind(change.status.as_str())
                    .bind(change.num_remaining)
                    .bind(change.num_target)
                    .bind(change.completion_percent)
                    .bind(change.progress_pixels)
                    .bind(change.regress_pixels)
                    .execute(&self.pool)
                },
                &format!("Failed to append history for project {project_id}"),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn latest(&self, project_id: i64) -> AppResult<Option<HistoryChange>> {
        let row = self
            .executor
            .execute_with_timeout(
                || {
                    sqlx::query(
                        "SELECT * FROM history_change \
                         WHERE project_id = ? \
                         ORDER BY timestamp DESC, id DESC LIMIT 1",
                    )
                    .bind(project_id)
                    .fetch_optional(&self.pool)
                },
                &format!("Failed to get latest history for project {project_id}"),
            )
            .await?;
        row.as_ref().map(change_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn history_for(&self, project_id: i64) -> AppResult<Vec<HistoryChange>> {
        let rows = self
            .executor
            .execute_with_timeout(
                || {
                    sqlx::query(
                        "SELECT * FROM history_change \
                         WHERE project_id = ? \
                         ORDER BY timestamp, id",
                    )
                    .bind(project_id)
                    .fetch_all(&self.pool)
                },
                &format!("Failed to list history for project {project_id}"),
            )
            .await?;
        rows.iter().map(change_from_row).collect()
    }
}
