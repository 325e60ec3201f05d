use tracing::{instrument, warn};

use domain::geometry::PixelRect;
use domain::image::IndexedImage;

use crate::error::AppResult;
use crate::ports::outgoing::tile_cache::DynTileCachePort;

/// Composition of a canvas region from cached tiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StitchedRegion {
    pub image: IndexedImage,
    /// True when at least one tile under the region was absent or
    /// unreadable; its pixels stay transparent.
    pub has_missing_tiles: bool,
}

/// Composes project-sized images out of the tile cache. Read-only; the
/// cache is owned by ingest.
pub struct Stitcher {
    cache: DynTileCachePort,
}

impl Stitcher {
    #[must_use]
    pub fn new(cache: DynTileCachePort) -> Self {
        Self { cache }
    }

    /// Builds an image exactly covering `rect`. Missing tiles leave their
    /// region transparent and flip the missing flag.
    #[instrument(skip(self))]
    pub async fn stitch(&self, rect: PixelRect) -> AppResult<StitchedRegion> {
        let mut image = IndexedImage::new(rect.size())?;
        let origin = rect.origin();
        let mut has_missing_tiles = false;

        for tile in rect.tiles() {
            let cached = match self.cache.load(tile).await {
                Ok(cached) => cached,
                Err(error) => {
                    warn!(%tile, %error, "cached tile unreadable, leaving transparent");
                    has_missing_tiles = true;
                    continue;
                }
            };
            match cached {
                Some(tile_image) => {
                    image.paste(&tile_image, tile.origin().offset(origin));
                }
                None => {
                    warn!(%tile, "tile missing from cache, leaving transparent");
                    has_missing_tiles = true;
                }
            }
        }

        Ok(StitchedRegion {
            image,
            has_missing_tiles,
        })
    }
}
