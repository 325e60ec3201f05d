use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::instrument;

use domain::geometry::TileCoord;
use domain::project::{ProjectRecord, ProjectState};
use tilehawk_application::{
    error::{AppError, AppResult},
    ports::outgoing::project_store::{NewProject, ProjectStorePort},
};

use super::utils::SqliteExecutor;

pub struct SqliteProjectStoreAdapter {
    pool: SqlitePool,
    executor: SqliteExecutor,
}

impl SqliteProjectStoreAdapter {
    #[must_use]
    pub fn new(pool: SqlitePool, query_timeout_secs: u64) -> Self {
        Self {
            pool,
            executor: SqliteExecutor::new(query_timeout_secs),
        }
    }
}

fn project_from_row(row: &SqliteRow) -> AppResult<ProjectRecord> {
    let get_err = |e: sqlx::Error| AppError::DatabaseError {
        message: format!("Malformed project row: {e}"),
    };
    let state: String = row.try_get("state").map_err(get_err)?;
    Ok(ProjectRecord {
        id: row.try_get("id").map_err(get_err)?,
        owner_id: row.try_get("owner_id").map_err(get_err)?,
        name: row.try_get("name").map_err(get_err)?,
        state: ProjectState::parse(&state),
        x: row.try_get("x").map_err(get_err)?,
        y: row.try_get("y").map_err(get_err)?,
        width: row.try_get("width").map_err(get_err)?,
        height: row.try_get("height").map_err(get_err)?,
        first_seen: row.try_get("first_seen").unwrap_or(0),
        last_check: row.try_get("last_check").unwrap_or(0),
        max_completion_pixels: row.try_get("max_completion_pixels").unwrap_or(0),
        max_completion_percent: row.try_get("max_completion_percent").unwrap_or(0.0),
        max_completion_time: row.try_get("max_completion_time").unwrap_or(0),
        total_progress: row.try_get("total_progress").unwrap_or(0),
        total_regress: row.try_get("total_regress").unwrap_or(0),
        largest_regress_pixels: row.try_get("largest_regress_pixels").unwrap_or(0),
        has_missing_tiles: row.try_get::<i64, _>("has_missing_tiles").unwrap_or(0) != 0,
    })
}

#[async_trait::async_trait]
impl ProjectStorePort for SqliteProjectStoreAdapter {
    #[instrument(skip(self, project), fields(name = %project.name))]
    async fn upsert_project(&self, project: &NewProject) -> AppResult<i64> {
        let row = self
            .executor
            .execute_with_timeout(
                || {
                    sqlx::query(
                        "INSERT INTO project_info \
                         (owner_id, name, state, x, y, width, height, first_seen, last_check) \
                         VALUES (?, ?, 'active', ?, ?, ?, ?, ?, ?) \
                         ON CONFLICT (owner_id, name) DO UPDATE SET \
                             state = 'active', \
                             x = excluded.x, \
                             y = excluded.y, \
                             width = excluded.width, \
                             height = excluded.height \
                         RETURNING id",
                    )
                    .bind(project.owner_id)
                    .bind(project.name.as_str())
                    .bind(project.x)
                    .bind(project.y)
                    .bind(project.width)
                    .bind(project.height)
                    .bind(project.first_seen)
                    .bind(project.first_seen)
                    .fetch_one(&self.pool)
                },
                &format!("Failed to upsert project {}", project.name),
            )
            .await?;
        row.try_get("id").map_err(|e| AppError::DatabaseError {
            message: format!("Malformed upsert result: {e}"),
        })
    }

    #[instrument(skip(self))]
    async fn find_by_source(&self, owner_id: i64, name: &str) -> AppResult<Option<ProjectRecord>> {
        let row = self
            .executor
            .execute_with_timeout(
                || {
                    sqlx::query("SELECT * FROM project_info WHERE owner_id = ? AND name = ?")
                        .bind(owner_id)
                        .bind(name)
                        .fetch_optional(&self.pool)
                },
                &format!("Failed to find project {owner_id}/{name}"),
            )
            .await?;
        row.as_ref().map(project_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn get_project(&self, id: i64) -> AppResult<Option<ProjectRecord>> {
        let row = self
            .executor
            .execute_with_timeout(
                || {
                    sqlx::query("SELECT * FROM project_info WHERE id = ?")
                        .bind(id)
                        .fetch_optional(&self.pool)
                },
                &format!("Failed to get project {id}"),
            )
            .await?;
        row.as_ref().map(project_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn active_projects(&self) -> AppResult<Vec<ProjectRecord>> {
        let rows = self
            .executor
            .execute_with_timeout(
                || {
                    sqlx::query("SELECT * FROM project_info WHERE state = 'active' ORDER BY id")
                        .fetch_all(&self.pool)
                },
                "Failed to list active projects",
            )
            .await?;
        rows.iter().map(project_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn mark_inactive(&self, id: i64) -> AppResult<()> {
        self.executor
            .execute_with_timeout(
                || {
                    sqlx::query("UPDATE project_info SET state = 'inactive' WHERE id = ?")
                        .bind(id)
                        .execute(&self.pool)
                },
                &format!("Failed to mark project {id} inactive"),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self, tiles))]
    async fn replace_tile_links(&self, id: i64, tiles: &[TileCoord]) -> AppResult<()> {
        let context = format!("Failed to relink project {id} to {} tiles", tiles.len());
        self.executor
            .execute_with_timeout(
                || async {
                    let mut tx = self.pool.begin().await?;
                    sqlx::query("DELETE FROM tile_project WHERE project_id = ?")
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                    for tile in tiles {
                        sqlx::query(
                            "INSERT INTO tile_project (tile_id, project_id) VALUES (?, ?) \
                             ON CONFLICT (tile_id, project_id) DO NOTHING",
                        )
                        .bind(tile.tile_id())
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
    async fn projects_overlapping(&self, coord: TileCoord) -> AppResult<Vec<ProjectRecord>> {
        let rows = self
            .executor
            .execute_with_timeout(
                || {
                    sqlx::query(
                        "SELECT p.* FROM project_info p \
                         JOIN tile_project tp ON tp.project_id = p.id \
                         WHERE tp.tile_id = ? AND p.state = 'active' \
                         ORDER BY p.id",
                    )
                    .bind(coord.tile_id())
                    .fetch_all(&self.pool)
                },
                &format!("Failed to list projects overlapping tile {coord}"),
            )
            .await?;
        rows.iter().map(project_from_row).collect()
    }

    #[instrument(skip(self, project), fields(name = %project.name))]
    async fn update_aggregates(&self, project: &ProjectRecord) -> AppResult<()> {
        self.executor
            .execute_with_timeout(
                || {
                    sqlx::query(
                        "UPDATE project_info SET \
                             last_check = ?, \
                             max_completion_pixels = ?, \
                             max_completion_percent = ?, \
                             max_completion_time = ?, \
                             total_progress = ?, \
                             total_regress = ?, \
                             largest_regress_pixels = ?, \
                             has_missing_tiles = ? \
                         WHERE id = ?",
                    )
                    .bind(project.last_check)
                    .bind(project.max_completion_pixels)
                    .bind(project.max_completion_percent)
                    .bind(project.max_completion_time)
                    .bind(project.total_progress)
                    .bind(project.total_regress)
                    .bind(project.largest_regress_pixels)
                    .bind(i64::from(project.has_missing_tiles))
                    .bind(project.id)
                    .execute(&self.pool)
                },
                &format!("Failed to update aggregates for project {}", project.id),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]

    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;
    use crate::outgoing::sqlite_sqlx::run_migrations;
    use crate::outgoing::sqlite_sqlx::tile_store_sqlite::SqliteTileStoreAdapter;
    use tilehawk_application::ports::outgoing::tile_store::TileStorePort;

    async fn stores() -> (SqliteProjectStoreAdapter, SqliteTileStoreAdapter) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        (
            SqliteProjectStoreAdapter::new(pool.clone(), 5),
            SqliteTileStoreAdapter::new(pool, 5),
        )
    }

    async fn store() -> SqliteProjectStoreAdapter {
        stores().await.0
    }

    fn new_project(owner_id: i64, name: &str) -> NewProject {
        NewProject {
            owner_id,
            name: name.to_string(),
            x: 2500,
            y: 3500,
            width: 1200,
            height: 800,
            first_seen: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn upsert_and_find_round_trip() {
        let store = store().await;
        let id = store.upsert_project(&new_project(1, "art_2_3_500_500")).await.unwrap();

        let found = store.find_by_source(1, "art_2_3_500_500").await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.state, ProjectState::Active);
        assert_eq!((found.x, found.y, found.width, found.height), (2500, 3500, 1200, 800));
        assert_eq!(found.first_seen, 1_700_000_000);
    }

    #[tokio::test]
    async fn upsert_existing_reactivates_and_keeps_first_seen() {
        let store = store().await;
        let id = store.upsert_project(&new_project(1, "art")).await.unwrap();
        store.mark_inactive(id).await.unwrap();

        let mut reloaded = new_project(1, "art");
        reloaded.first_seen = 1_800_000_000;
        reloaded.width = 600;
        let id_again = store.upsert_project(&reloaded).await.unwrap();

        assert_eq!(id, id_again);
        let found = store.get_project(id).await.unwrap().unwrap();
        assert_eq!(found.state, ProjectState::Active);
        assert_eq!(found.width, 600);
        assert_eq!(found.first_seen, 1_700_000_000);
    }

    #[tokio::test]
    async fn overlap_queries_resolve_through_links() {
        let (store, tiles) = stores().await;
        let id = store.upsert_project(&new_project(1, "art")).await.unwrap();
        let covered = TileCoord::new(2, 3).unwrap();
        let other = TileCoord::new(10, 10).unwrap();
        tiles.insert_burning(&[covered]).await.unwrap();
        store.replace_tile_links(id, &[covered]).await.unwrap();

        let hits = store.projects_overlapping(covered).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);
        assert!(store.projects_overlapping(other).await.unwrap().is_empty());

        // Inactive projects drop out of the overlap index.
        store.mark_inactive(id).await.unwrap();
        assert!(store.projects_overlapping(covered).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replace_tile_links_is_exact() {
        let (store, tiles) = stores().await;
        let id = store.upsert_project(&new_project(1, "art")).await.unwrap();
        let a = TileCoord::new(0, 0).unwrap();
        let b = TileCoord::new(1, 0).unwrap();

        tiles.insert_burning(&[a, b]).await.unwrap();
        store.replace_tile_links(id, &[a, b]).await.unwrap();
        store.replace_tile_links(id, &[b]).await.unwrap();

        assert!(store.projects_overlapping(a).await.unwrap().is_empty());
        assert_eq!(store.projects_overlapping(b).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn aggregates_round_trip() {
        let store = store().await;
        let id = store.upsert_project(&new_project(1, "art")).await.unwrap();
        let mut record = store.get_project(id).await.unwrap().unwrap();

        record.last_check = 1_700_000_100;
        record.max_completion_pixels = 42;
        record.max_completion_percent = 87.5;
        record.max_completion_time = 1_700_000_050;
        record.total_progress = 100;
        record.total_regress = 7;
        record.largest_regress_pixels = 5;
        record.has_missing_tiles = true;
        store.update_aggregates(&record).await.unwrap();

        let reloaded = store.get_project(id).await.unwrap().unwrap();
        assert_eq!(reloaded, record);
    }

    #[tokio::test]
    async fn active_projects_excludes_inactive() {
        let store = store().await;
        let keep = store.upsert_project(&new_project(1, "keep")).await.unwrap();
        let drop = store.upsert_project(&new_project(1, "drop")).await.unwrap();
        store.mark_inactive(drop).await.unwrap();

        let active = store.active_projects().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, keep);
    }
}
