use domain::geometry::TileCoord;

use crate::error::AppResult;
use crate::ingest::service::FetchOutcome;

/// What a single scheduling step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The scheduler had nothing to offer; the caller should idle briefly.
    Idle,
    Polled {
        coord: TileCoord,
        outcome: FetchOutcome,
        /// Projects re-diffed because this tile changed.
        projects_diffed: usize,
    },
}

/// The dispatcher's work surface. Pacing (sleeps, shutdown) belongs to the
/// binary; these steps never block beyond their own I/O.
#[async_trait::async_trait]
pub trait MonitorUseCase: Send {
    /// Prime scheduler state and run the initial project scan.
    async fn start(&mut self) -> AppResult<()>;

    /// Reconcile the project directory against the store: load added and
    /// modified files, deactivate removed ones.
    async fn sync_projects(&mut self) -> AppResult<()>;

    /// Poll at most one tile and fan out diffs if it changed. Transient
    /// store contention is retried once; any other store failure aborts
    /// the step and surfaces, leaving recovery pacing to the caller.
    async fn poll_once(&mut self) -> AppResult<PollOutcome>;
}

/// Summary counters for the one-shot database rebuild.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RebuildSummary {
    pub projects_created: u64,
    pub tiles_created: u64,
    pub links_created: u64,
    pub history_inferred: u64,
}

#[async_trait::async_trait]
pub trait RebuildUseCase: Send + Sync {
    /// Reconstructs store rows from filesystem artifacts. Idempotent.
    async fn rebuild(&self) -> AppResult<RebuildSummary>;
}
