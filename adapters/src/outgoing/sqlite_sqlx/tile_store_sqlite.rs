use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::instrument;

use domain::geometry::TileCoord;
use domain::tile::{BURNING_HEAT, MAX_TEMPERATURE, TileRecord};
use tilehawk_application::{
    error::{AppError, AppResult},
    ports::outgoing::tile_store::TileStorePort,
};

use super::utils::SqliteExecutor;

pub struct SqliteTileStoreAdapter {
    pool: SqlitePool,
    executor: SqliteExecutor,
}

impl SqliteTileStoreAdapter {
    #[must_use]
    pub fn new(pool: SqlitePool, query_timeout_secs: u64) -> Self {
        Self {
            pool,
            executor: SqliteExecutor::new(query_timeout_secs),
        }
    }
}

fn tile_from_row(row: &SqliteRow) -> AppResult<TileRecord> {
    let tile_x: i64 = row.try_get("tile_x").map_err(|e| AppError::DatabaseError {
        message: format!("Malformed tile row: {e}"),
    })?;
    let tile_y: i64 = row.try_get("tile_y").map_err(|e| AppError::DatabaseError {
        message: format!("Malformed tile row: {e}"),
    })?;
    Ok(TileRecord {
        coord: TileCoord::new(tile_x, tile_y)?,
        heat: row.try_get("heat").unwrap_or(BURNING_HEAT),
        last_checked: row.try_get("last_checked").unwrap_or(0),
        last_update: row.try_get("last_update").unwrap_or(0),
        etag: row.try_get("http_etag").unwrap_or_default(),
    })
}

#[async_trait::async_trait]
impl TileStorePort for SqliteTileStoreAdapter {
    #[instrument(skip(self))]
    async fn get_tile(&self, coord: TileCoord) -> AppResult<Option<TileRecord>> {
        let row = self
            .executor
            .execute_with_timeout(
                || {
                    sqlx::query(
                        "SELECT id, tile_x, tile_y, heat, last_checked, last_update, http_etag \
                         FROM tile_info WHERE id = ?",
                    )
                    .bind(coord.tile_id())
                    .fetch_optional(&self.pool)
                },
                &format!("Failed to get tile {coord}"),
            )
            .await?;
        row.as_ref().map(tile_from_row).transpose()
    }

    #[instrument(skip(self, coords))]
    async fn insert_burning(&self, coords: &[TileCoord]) -> AppResult<()> {
        let context = format!("Failed to insert {} burning tiles", coords.len());
        self.executor
            .execute_with_timeout(
                || async {
                    let mut tx = self.pool.begin().await?;
                    for coord in coords {
                        sqlx::query(
                            "INSERT INTO tile_info (id, tile_x, tile_y, heat) \
                             VALUES (?, ?, ?, ?) \
                             ON CONFLICT (id) DO UPDATE SET heat = excluded.heat \
                             WHERE tile_info.heat = 0",
                        )
                        .bind(coord.tile_id())
                        .bind(coord.x)
                        .bind(coord.y)
                        .bind(BURNING_HEAT)
                        .execute(&mut *tx)
                        .await?;
                    }
                    tx.commit().await
                },
                &context,
            )
            .await
    }

    #[instrument(skip(self, record))]
    async fn upsert_tile(&self, record: &TileRecord) -> AppResult<bool> {
        let result = self
            .executor
            .execute_with_timeout(
                || {
                    sqlx::query(
                        "INSERT INTO tile_info \
                         (id, tile_x, tile_y, heat, last_checked, last_update, http_etag) \
                         VALUES (?, ?, ?, ?, ?, ?, ?) \
                         ON CONFLICT (id) DO NOTHING",
                    )
                    .bind(record.tile_id())
                    .bind(record.coord.x)
                    .bind(record.coord.y)
                    .bind(record.heat)
                    .bind(record.last_checked)
                    .bind(record.last_update)
                    .bind(record.etag.as_str())
                    .execute(&self.pool)
                },
                &format!("Failed to upsert tile {}", record.coord),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn mark_checked(
        &self,
        coord: TileCoord,
        last_checked: i64,
        last_update: i64,
        etag: &str,
    ) -> AppResult<()> {
        self.executor
            .execute_with_timeout(
                || {
                    sqlx::query(
                        "UPDATE tile_info \
                         SET last_checked = ?, last_update = ?, http_etag = ? \
                         WHERE id = ?",
                    )
                    .bind(last_checked)
                    .bind(last_update)
                    .bind(etag)
                    .bind(coord.tile_id())
                    .execute(&self.pool)
                },
                &format!("Failed to mark tile {coord} checked"),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn next_burning(&self) -> AppResult<Option<TileRecord>> {
        let row = self
            .executor
            .execute_with_timeout(
                || {
                    sqlx::query(
                        "SELECT id, tile_x, tile_y, heat, last_checked, last_update, http_etag \
                         FROM tile_info \
                         WHERE heat = ? AND last_update = 0 \
                         ORDER BY id LIMIT 1",
                    )
                    .bind(BURNING_HEAT)
                    .fetch_optional(&self.pool)
                },
                "Failed to pick next burning tile",
            )
            .await?;
        row.as_ref().map(tile_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn coolest_in_heat(&self, heat: i64) -> AppResult<Option<TileRecord>> {
        let row = self
            .executor
            .execute_with_timeout(
                || {
                    sqlx::query(
                        "SELECT id, tile_x, tile_y, heat, last_checked, last_update, http_etag \
                         FROM tile_info \
                         WHERE heat = ? \
                         ORDER BY last_checked, id LIMIT 1",
                    )
                    .bind(heat)
                    .fetch_optional(&self.pool)
                },
                &format!("Failed to pick coolest tile in heat {heat}"),
            )
            .await?;
        row.as_ref().map(tile_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn tiles_in_heat(&self, heat: i64) -> AppResult<Vec<TileRecord>> {
        let rows = self
            .executor
            .execute_with_timeout(
                || {
                    sqlx::query(
                        "SELECT id, tile_x, tile_y, heat, last_checked, last_update, http_etag \
                         FROM tile_info \
                         WHERE heat = ? \
                         ORDER BY last_checked, id",
                    )
                    .bind(heat)
                    .fetch_all(&self.pool)
                },
                &format!("Failed to list tiles in heat {heat}"),
            )
            .await?;
        rows.iter().map(tile_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn tiles_for_redistribution(&self) -> AppResult<Vec<TileRecord>> {
        let rows = self
            .executor
            .execute_with_timeout(
                || {
                    sqlx::query(
                        "SELECT id, tile_x, tile_y, heat, last_checked, last_update, http_etag \
                         FROM tile_info \
                         WHERE (heat = ? AND last_update > 0) \
                            OR (heat BETWEEN 1 AND ?) \
                         ORDER BY last_update DESC, id",
                    )
                    .bind(BURNING_HEAT)
                    .bind(MAX_TEMPERATURE)
                    .fetch_all(&self.pool)
                },
                "Failed to list tiles for redistribution",
            )
            .await?;
        rows.iter().map(tile_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn num_temperature_queues(&self) -> AppResult<i64> {
        let row = self
            .executor
            .execute_with_timeout(
                || {
                    sqlx::query(
                        "SELECT COALESCE(MAX(heat), 0) AS num \
                         FROM tile_info WHERE heat BETWEEN 1 AND ?",
                    )
                    .bind(MAX_TEMPERATURE)
                    .fetch_one(&self.pool)
                },
                "Failed to count temperature queues",
            )
            .await?;
        row.try_get("num").map_err(|e| AppError::DatabaseError {
            message: format!("Malformed queue count row: {e}"),
        })
    }

    #[instrument(skip(self, assignments))]
    async fn apply_heat_assignments(&self, assignments: &[(i64, i64)]) -> AppResult<()> {
        let context = format!("Failed to apply {} heat assignments", assignments.len());
        self.executor
            .execute_with_timeout(
                || async {
                    let mut tx = self.pool.begin().await?;
                    for &(id, heat) in assignments {
                        sqlx::query("UPDATE tile_info SET heat = ? WHERE id = ?")
                            .bind(heat)
                            .bind(id)
                            .execute(&mut *tx)
                            .await?;
                    }
                    tx.commit().await
                },
                &context,
            )
            .await
    }

    #[instrument(skip(self))]
    async fn deactivate_orphan_tiles(&self) -> AppResult<u64> {
        let result = self
            .executor
            .execute_with_timeout(
                || {
                    sqlx::query(
                        "UPDATE tile_info SET heat = 0 \
                         WHERE heat != 0 AND id NOT IN ( \
                             SELECT tp.tile_id FROM tile_project tp \
                             JOIN project_info p ON p.id = tp.project_id \
                             WHERE p.state = 'active')",
                    )
                    .execute(&self.pool)
                },
                "Failed to deactivate orphan tiles",
            )
            .await?;
        Ok(result.rows_affected())
    }
}
