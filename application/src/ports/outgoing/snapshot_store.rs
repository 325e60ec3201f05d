use std::sync::Arc;

use domain::image::IndexedImage;

use crate::error::AppResult;

/// Per-project snapshots of the most recent observed canvas state, owned
/// by the diff engine.
#[async_trait::async_trait]
pub trait SnapshotStorePort: Send + Sync {
    async fn load(&self, owner_id: i64, name: &str) -> AppResult<Option<IndexedImage>>;

    async fn store(&self, owner_id: i64, name: &str, image: &IndexedImage) -> AppResult<()>;

    async fn remove(&self, owner_id: i64, name: &str) -> AppResult<()>;

    /// Snapshot file mtime in unix seconds, if one exists.
    async fn modified_at(&self, owner_id: i64, name: &str) -> AppResult<Option<i64>>;
}

pub type DynSnapshotStorePort = Arc<dyn SnapshotStorePort>;
