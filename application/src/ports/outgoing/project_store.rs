use std::sync::Arc;

use domain::geometry::TileCoord;
use domain::project::ProjectRecord;

use crate::error::AppResult;

/// New project row before the store has assigned an id.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub owner_id: i64,
    pub name: String,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub first_seen: i64,
}

#[async_trait::async_trait]
pub trait ProjectStorePort: Send + Sync {
    /// Inserts the project or, when `(owner_id, name)` already exists,
    /// re-activates it and refreshes its rectangle. Returns the row id.
    async fn upsert_project(&self, project: &NewProject) -> AppResult<i64>;

    async fn find_by_source(&self, owner_id: i64, name: &str) -> AppResult<Option<ProjectRecord>>;

    async fn get_project(&self, id: i64) -> AppResult<Option<ProjectRecord>>;

    async fn active_projects(&self) -> AppResult<Vec<ProjectRecord>>;

    async fn mark_inactive(&self, id: i64) -> AppResult<()>;

    /// Replaces the project's tile links with exactly `tiles`, in one
    /// transaction.
    async fn replace_tile_links(&self, id: i64, tiles: &[TileCoord]) -> AppResult<()>;

    /// Active projects whose rectangle overlaps the given tile, resolved
    /// through the tile-project index.
    async fn projects_overlapping(&self, coord: TileCoord) -> AppResult<Vec<ProjectRecord>>;

    /// Writes back the aggregate columns mutated by the diff engine.
    async fn update_aggregates(&self, project: &ProjectRecord) -> AppResult<()>;
}

pub type DynProjectStorePort = Arc<dyn ProjectStorePort>;
