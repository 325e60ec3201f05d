use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::instrument;

use domain::geometry::TileCoord;
use domain::image::IndexedImage;
use tilehawk_application::{
    error::AppResult,
    ports::outgoing::{palette_codec::DynPaletteCodecPort, tile_cache::TileCachePort},
};

use super::{unix_mtime, write_atomic};

/// One canonical paletted PNG per observed tile, named `tile-{tx}_{ty}.png`.
pub struct FsTileCacheAdapter {
    dir: PathBuf,
    codec: DynPaletteCodecPort,
}

impl FsTileCacheAdapter {
    #[must_use]
    pub fn new(dir: &Path, codec: DynPaletteCodecPort) -> Self {
        Self {
            dir: dir.to_path_buf(),
            codec,
        }
    }

    fn tile_path(&self, coord: TileCoord) -> PathBuf {
        self.dir.join(format!("tile-{coord}.png"))
    }
}

#[async_trait::async_trait]
impl TileCachePort for FsTileCacheAdapter {
    #[instrument(skip(self))]
    async fn load(&self, coord: TileCoord) -> AppResult<Option<IndexedImage>> {
        match tokio::fs::read(self.tile_path(coord)).await {
            Ok(bytes) => Ok(Some(self.codec.decode_canonical(&bytes)?)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    #[instrument(skip(self, image))]
    async fn store(&self, coord: TileCoord, image: &IndexedImage) -> AppResult<()> {
        let bytes = self.codec.encode_canonical(image)?;
        write_atomic(&self.tile_path(coord), &bytes).await
    }

    #[instrument(skip(self))]
    async fn contains(&self, coord: TileCoord) -> AppResult<bool> {
        Ok(tokio::fs::try_exists(self.tile_path(coord)).await?)
    }

    #[instrument(skip(self))]
    async fn list(&self) -> AppResult<Vec<(TileCoord, i64)>> {
        let mut listed = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(listed),
            Err(error) => return Err(error.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(coords) = name
                .strip_prefix("tile-")
                .and_then(|rest| rest.strip_suffix(".png"))
            else {
                continue;
            };
            let Ok(coord) = coords.parse::<TileCoord>() else {
                continue;
            };
            let mtime = entry.metadata().await.map_or(0, |m| unix_mtime(&m));
            listed.push((coord, mtime));
        }
        listed.sort_by_key(|(coord, _)| coord.tile_id());
        Ok(listed)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::Arc;

    use domain::geometry::Size;

    use super::*;
    use crate::outgoing::image_rs::palette_codec_image::PngPaletteCodec;

    fn cache(dir: &Path) -> FsTileCacheAdapter {
        FsTileCacheAdapter::new(dir, Arc::new(PngPaletteCodec::new()))
    }

    #[tokio::test]
    async fn store_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let coord = TileCoord::new(3, 7).unwrap();
        let mut image = IndexedImage::new(Size::new(4, 4)).unwrap();
        image.put_pixel(1, 2, 9);

        assert!(!cache.contains(coord).await.unwrap());
        cache.store(coord, &image).await.unwrap();
        assert!(cache.contains(coord).await.unwrap());

        let loaded = cache.load(coord).await.unwrap().unwrap();
        assert_eq!(loaded, image);
        assert!(dir.path().join("tile-3_7.png").exists());
    }

    #[tokio::test]
    async fn load_missing_tile_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let loaded = cache.load(TileCoord::new(0, 0).unwrap()).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn load_corrupt_tile_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tile-0_0.png"), b"garbage").unwrap();
        let cache = cache(dir.path());
        assert!(cache.load(TileCoord::new(0, 0).unwrap()).await.is_err());
    }

    #[tokio::test]
    async fn list_parses_tile_names() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let image = IndexedImage::new(Size::new(2, 2)).unwrap();
        cache.store(TileCoord::new(5, 6).unwrap(), &image).await.unwrap();
        cache.store(TileCoord::new(1, 2).unwrap(), &image).await.unwrap();
        std::fs::write(dir.path().join("unrelated.png"), b"x").unwrap();

        let listed = cache.list().await.unwrap();
        let coords: Vec<_> = listed.iter().map(|(c, _)| *c).collect();
        assert_eq!(
            coords,
            vec![TileCoord::new(1, 2).unwrap(), TileCoord::new(5, 6).unwrap()]
        );
        assert!(listed.iter().all(|(_, mtime)| *mtime > 0));
    }

    #[tokio::test]
    async fn list_of_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir.path().join("never-created"));
        assert!(cache.list().await.unwrap().is_empty());
    }
}
