use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::instrument;

use domain::image::IndexedImage;
use tilehawk_application::{
    error::AppResult,
    ports::outgoing::{palette_codec::DynPaletteCodecPort, snapshot_store::SnapshotStorePort},
};

use super::{unix_mtime, write_atomic};

/// One snapshot PNG per project under `{owner_id}/{name}.snapshot.png`.
pub struct FsSnapshotStoreAdapter {
    dir: PathBuf,
    codec: DynPaletteCodecPort,
}

impl FsSnapshotStoreAdapter {
    #[must_use]
    pub fn new(dir: &Path, codec: DynPaletteCodecPort) -> Self {
        Self {
            dir: dir.to_path_buf(),
            codec,
        }
    }

    fn snapshot_path(&self, owner_id: i64, name: &str) -> PathBuf {
        self.dir
            .join(owner_id.to_string())
            .join(format!("{name}.snapshot.png"))
    }
}

#[async_trait::async_trait]
impl SnapshotStorePort for FsSnapshotStoreAdapter {
    #[instrument(skip(self))]
    async fn load(&self, owner_id: i64, name: &str) -> AppResult<Option<IndexedImage>> {
        match tokio::fs::read(self.snapshot_path(owner_id, name)).await {
            Ok(bytes) => Ok(Some(self.codec.decode_canonical(&bytes)?)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    #[instrument(skip(self, image))]
    async fn store(&self, owner_id: i64, name: &str, image: &IndexedImage) -> AppResult<()> {
        let bytes = self.codec.encode_canonical(image)?;
        write_atomic(&self.snapshot_path(owner_id, name), &bytes).await
    }

    #[instrument(skip(self))]
    async fn remove(&self, owner_id: i64, name: &str) -> AppResult<()> {
        match tokio::fs::remove_file(self.snapshot_path(owner_id, name)).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    #[instrument(skip(self))]
    async fn modified_at(&self, owner_id: i64, name: &str) -> AppResult<Option<i64>> {
        match tokio::fs::metadata(self.snapshot_path(owner_id, name)).await {
            Ok(metadata) => Ok(Some(unix_mtime(&metadata))),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::Arc;

    use domain::geometry::Size;

    use super::*;
    use crate::outgoing::image_rs::palette_codec_image::PngPaletteCodec;

    fn store(dir: &Path) -> FsSnapshotStoreAdapter {
        FsSnapshotStoreAdapter::new(dir, Arc::new(PngPaletteCodec::new()))
    }

    #[tokio::test]
    async fn snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let mut image = IndexedImage::new(Size::new(4, 4)).unwrap();
        image.put_pixel(0, 0, 2);

        assert!(store.load(1, "art_0_0_0_0").await.unwrap().is_none());
        store.store(1, "art_0_0_0_0", &image).await.unwrap();

        let loaded = store.load(1, "art_0_0_0_0").await.unwrap().unwrap();
        assert_eq!(loaded, image);
        assert!(store.modified_at(1, "art_0_0_0_0").await.unwrap().unwrap() > 0);
        assert!(dir.path().join("1/art_0_0_0_0.snapshot.png").exists());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let image = IndexedImage::new(Size::new(2, 2)).unwrap();
        store.store(0, "p", &image).await.unwrap();

        store.remove(0, "p").await.unwrap();
        store.remove(0, "p").await.unwrap();
        assert!(store.load(0, "p").await.unwrap().is_none());
        assert!(store.modified_at(0, "p").await.unwrap().is_none());
    }
}
