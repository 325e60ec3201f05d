use std::sync::Arc;

use domain::history::HistoryChange;

use crate::error::AppResult;

#[async_trait::async_trait]
pub trait HistoryStorePort: Send + Sync {
    async fn append(&self, project_id: i64, change: &HistoryChange) -> AppResult<()>;

    async fn latest(&self, project_id: i64) -> AppResult<Option<HistoryChange>>;

    /// Full history for a project, ascending by timestamp.
    async fn history_for(&self, project_id: i64) -> AppResult<Vec<HistoryChange>>;
}

pub type DynHistoryStorePort = Arc<dyn HistoryStorePort>;
