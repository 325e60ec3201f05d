use std::sync::Arc;

use domain::geometry::TileCoord;
use domain::tile::TileRecord;

use crate::error::AppResult;

/// Durable state for the tile lattice. Every call is atomic; multi-row
/// operations run inside a single transaction.
#[async_trait::async_trait]
pub trait TileStorePort: Send + Sync {
    async fn get_tile(&self, coord: TileCoord) -> AppResult<Option<TileRecord>>;

    /// Inserts missing tiles as burning (heat 999) and re-burns inactive
    /// (heat 0) ones. Tiles already scheduled are left alone.
    async fn insert_burning(&self, coords: &[TileCoord]) -> AppResult<()>;

    /// Inserts the full record unless a row for that tile already exists.
    /// Returns whether a row was created.
    async fn upsert_tile(&self, record: &TileRecord) -> AppResult<bool>;

    /// Records a completed poll. `last_update` carries the prior value on
    /// an unchanged poll and the poll time on a changed one.
    async fn mark_checked(
        &self,
        coord: TileCoord,
        last_checked: i64,
        last_update: i64,
        etag: &str,
    ) -> AppResult<()>;

    /// The unchecked burning tile with the lowest id, if any.
    async fn next_burning(&self) -> AppResult<Option<TileRecord>>;

    /// Least recently checked tile at exactly this heat; ties break on the
    /// lowest id.
    async fn coolest_in_heat(&self, heat: i64) -> AppResult<Option<TileRecord>>;

    async fn tiles_in_heat(&self, heat: i64) -> AppResult<Vec<TileRecord>>;

    /// Tiles eligible for redistribution: checked burning tiles plus every
    /// temperature tile, most recently changed first (ties on id).
    async fn tiles_for_redistribution(&self) -> AppResult<Vec<TileRecord>>;

    /// Highest temperature currently in use, 0 when no temperature queues
    /// exist.
    async fn num_temperature_queues(&self) -> AppResult<i64>;

    /// Applies new heat values in one transaction. Callers pass only rows
    /// whose heat actually changes.
    async fn apply_heat_assignments(&self, assignments: &[(i64, i64)]) -> AppResult<()>;

    /// Sets heat 0 on tiles no active project overlaps; returns how many
    /// rows changed.
    async fn deactivate_orphan_tiles(&self) -> AppResult<u64>;
}

pub type DynTileStorePort = Arc<dyn TileStorePort>;
