use std::sync::Arc;

use domain::geometry::TileCoord;
use domain::image::IndexedImage;

use crate::error::AppResult;

/// Filesystem cache of canonical tiles, one file per observed tile. Only
/// ingest writes here; the stitcher and rebuild read.
#[async_trait::async_trait]
pub trait TileCachePort: Send + Sync {
    /// `Ok(None)` when the tile has never been cached; decode failures
    /// surface as errors so callers can decide whether a corrupt entry
    /// counts as missing.
    async fn load(&self, coord: TileCoord) -> AppResult<Option<IndexedImage>>;

    /// Atomically replaces the cached file.
    async fn store(&self, coord: TileCoord, image: &IndexedImage) -> AppResult<()>;

    async fn contains(&self, coord: TileCoord) -> AppResult<bool>;

    /// Every cached tile with its file mtime in unix seconds.
    async fn list(&self) -> AppResult<Vec<(TileCoord, i64)>>;
}

pub type DynTileCachePort = Arc<dyn TileCachePort>;
