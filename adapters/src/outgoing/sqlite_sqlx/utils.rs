use std::{future::Future, time::Duration};

use tokio::time::timeout;

use tilehawk_application::error::{AppError, AppResult};

/// SQLite signals lock contention through these error codes; everything
/// else is treated as fatal.
const BUSY_CODES: [&str; 3] = ["5", "6", "517"];

pub(crate) fn map_sqlx_error(context: &str, error: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &error {
        if let Some(code) = db.code()
            && BUSY_CODES.contains(&code.as_ref())
        {
            return AppError::DatabaseBusy {
                message: format!("{context}: {db}"),
            };
        }
    }
    AppError::DatabaseError {
        message: format!("{context}: {error}"),
    }
}

pub(crate) struct SqliteExecutor {
    timeout_secs: u64,
}

impl SqliteExecutor {
    pub(crate) fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }

    pub(crate) async fn execute_with_timeout<T, F, Fut>(
        &self,
        operation: F,
        error_context: &str,
    ) -> AppResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        timeout(Duration::from_secs(self.timeout_secs), operation())
            .await
            .map_err(|_| AppError::DatabaseError {
                message: format!("{error_context}: DB timeout"),
            })?
            .map_err(|e| map_sqlx_error(error_context, e))
    }
}
