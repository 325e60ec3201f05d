pub mod history_store_sqlite;
pub mod project_store_sqlite;
pub mod tile_store_sqlite;
pub(crate) mod utils;

use sqlx::SqlitePool;

use tilehawk_application::error::{AppError, AppResult};

/// Applies the embedded schema migrations.
pub async fn run_migrations(pool: &SqlitePool) -> AppResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| AppError::DatabaseError {
            message: format!("Failed to run migrations: {e}"),
        })
}
