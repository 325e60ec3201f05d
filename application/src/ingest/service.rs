use tracing::{debug, info, instrument};

use domain::geometry::TileCoord;

use crate::error::{AppError, AppResult};
use crate::ports::outgoing::palette_codec::DynPaletteCodecPort;
use crate::ports::outgoing::tile_cache::DynTileCachePort;
use crate::ports::outgoing::tile_fetcher::DynTileFetcherPort;

/// Result of polling one tile against the remote source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Fresh content differs from the cache; the cache file was replaced.
    Changed { etag: String },
    /// Fresh content is byte-identical to the cache.
    Unchanged { etag: String },
    /// The remote could not serve a usable tile; no state was touched.
    Unavailable,
}

/// Downloads tiles, canonicalizes them, and keeps the tile cache current.
/// Never retries; an unavailable tile is simply tried again whenever the
/// scheduler next offers it.
pub struct TilePoller {
    fetcher: DynTileFetcherPort,
    codec: DynPaletteCodecPort,
    cache: DynTileCachePort,
}

impl TilePoller {
    #[must_use]
    pub fn new(
        fetcher: DynTileFetcherPort,
        codec: DynPaletteCodecPort,
        cache: DynTileCachePort,
    ) -> Self {
        Self {
            fetcher,
            codec,
            cache,
        }
    }

    /// Fetches one tile and reconciles it against the cache.
    #[instrument(skip(self))]
    pub async fn check_tile(&self, coord: TileCoord) -> AppResult<FetchOutcome> {
        let download = match self.fetcher.fetch_tile(coord).await {
            Ok(download) => download,
            Err(AppError::TileUnavailable { message }) => {
                debug!(%coord, reason = %message, "tile unavailable");
                return Ok(FetchOutcome::Unavailable);
            }
            Err(other) => return Err(other),
        };

        let fresh = match self.codec.decode_canonical(&download.body) {
            Ok(image) => image,
            Err(error) => {
                debug!(%coord, %error, "tile decode failed");
                return Ok(FetchOutcome::Unavailable);
            }
        };

        // A corrupt cache entry reads as absent: the fresh bytes simply
        // replace it below.
        let cached = match self.cache.load(coord).await {
            Ok(cached) => cached,
            Err(error) => {
                debug!(%coord, %error, "cached tile unreadable, replacing");
                None
            }
        };

        if let Some(cached) = cached
            && cached.as_bytes() == fresh.as_bytes()
        {
            info!(%coord, "no change detected");
            return Ok(FetchOutcome::Unchanged {
                etag: download.etag,
            });
        }

        info!(%coord, "change detected, updating cache");
        self.cache.store(coord, &fresh).await?;
        Ok(FetchOutcome::Changed {
            etag: download.etag,
        })
    }
}
