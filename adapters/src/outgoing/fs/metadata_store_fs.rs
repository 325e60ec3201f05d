use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::instrument;

use domain::project::ProjectMetadata;
use tilehawk_application::{
    error::AppResult,
    ports::outgoing::metadata_store::MetadataStorePort,
};

use super::write_atomic;

/// One JSON record per project under `{owner_id}/{name}.metadata.json`.
pub struct FsMetadataStoreAdapter {
    dir: PathBuf,
}

impl FsMetadataStoreAdapter {
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn metadata_path(&self, owner_id: i64, name: &str) -> PathBuf {
        self.dir
            .join(owner_id.to_string())
            .join(format!("{name}.metadata.json"))
    }
}

#[async_trait::async_trait]
impl MetadataStorePort for FsMetadataStoreAdapter {
    #[instrument(skip(self))]
    async fn load(&self, owner_id: i64, name: &str) -> AppResult<Option<ProjectMetadata>> {
        match tokio::fs::read(self.metadata_path(owner_id, name)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    #[instrument(skip(self, metadata))]
    async fn store(&self, owner_id: i64, name: &str, metadata: &ProjectMetadata) -> AppResult<()> {
        let bytes = serde_json::to_vec_pretty(metadata)?;
        write_atomic(&self.metadata_path(owner_id, name), &bytes).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use domain::geometry::{PixelRect, Point, Size};

    use super::*;

    #[tokio::test]
    async fn metadata_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsMetadataStoreAdapter::new(dir.path());

        let rect = PixelRect::from_origin_size(Point::new(10, 20), Size::new(30, 40));
        let mut metadata = ProjectMetadata::from_rect(rect, "art_0_0_10_20", 1_700_000_000);
        metadata.total_progress = 50;
        metadata.tile_last_update.insert("0_0".to_string(), 123);
        metadata.tile_updates_24h.push(("0_0".to_string(), 123));

        assert!(store.load(2, "art_0_0_10_20").await.unwrap().is_none());
        store.store(2, "art_0_0_10_20", &metadata).await.unwrap();

        let loaded = store.load(2, "art_0_0_10_20").await.unwrap().unwrap();
        assert_eq!(loaded, metadata);
        assert!(dir.path().join("2/art_0_0_10_20.metadata.json").exists());
    }

    #[tokio::test]
    async fn corrupt_metadata_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsMetadataStoreAdapter::new(dir.path());
        std::fs::create_dir_all(dir.path().join("0")).unwrap();
        std::fs::write(dir.path().join("0/p.metadata.json"), b"{not json").unwrap();

        assert!(store.load(0, "p").await.is_err());
    }
}
