use std::sync::Arc;

use domain::project::ProjectMetadata;

use crate::error::AppResult;

/// Stable keyed metadata record per project, sufficient to round-trip
/// every tracked field.
#[async_trait::async_trait]
pub trait MetadataStorePort: Send + Sync {
    async fn load(&self, owner_id: i64, name: &str) -> AppResult<Option<ProjectMetadata>>;

    async fn store(&self, owner_id: i64, name: &str, metadata: &ProjectMetadata) -> AppResult<()>;
}

pub type DynMetadataStorePort = Arc<dyn MetadataStorePort>;
