use std::sync::Arc;

use domain::geometry::TileCoord;

use crate::error::AppResult;

/// A successfully downloaded tile body plus its response validator.
#[derive(Debug, Clone)]
pub struct TileDownload {
    pub body: Vec<u8>,
    pub etag: String,
}

/// Fetches one tile image from the remote source. Implementations apply a
/// hard request deadline and never retry; any non-200 status, timeout, or
/// transport failure surfaces as `AppError::TileUnavailable`.
#[async_trait::async_trait]
pub trait TileFetcherPort: Send + Sync {
    async fn fetch_tile(&self, coord: TileCoord) -> AppResult<TileDownload>;
}

pub type DynTileFetcherPort = Arc<dyn TileFetcherPort>;
