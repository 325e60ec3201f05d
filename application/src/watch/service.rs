use tracing::{debug, info, instrument};

use domain::geometry::TileCoord;

use crate::clock::unix_now;
use crate::diff::service::DiffEngine;
use crate::error::AppResult;
use crate::ingest::service::{FetchOutcome, TilePoller};
use crate::ports::incoming::monitor::{MonitorUseCase, PollOutcome};
use crate::ports::outgoing::project_store::DynProjectStorePort;
use crate::ports::outgoing::tile_store::DynTileStorePort;
use crate::projects::service::ProjectSyncService;
use crate::scheduler::queues::QueueSystem;

/// The dispatcher: asks the scheduler for a tile, runs ingest, records the
/// poll, and fans the change out to every overlapping project's diff. One
/// logical worker advances sequentially; the tile row update is persisted
/// before any diff runs so diffs observe the new `last_update`.
pub struct WatchService {
    scheduler: QueueSystem,
    poller: TilePoller,
    diff: DiffEngine,
    sync: ProjectSyncService,
    tiles: DynTileStorePort,
    projects: DynProjectStorePort,
}

impl WatchService {
    #[must_use]
    pub fn new(
        scheduler: QueueSystem,
        poller: TilePoller,
        diff: DiffEngine,
        sync: ProjectSyncService,
        tiles: DynTileStorePort,
        projects: DynProjectStorePort,
    ) -> Self {
        Self {
            scheduler,
            poller,
            diff,
            sync,
            tiles,
            projects,
        }
    }

    /// Transient store contention is retried once before surfacing.
    async fn mark_checked_retrying(
        &self,
        coord: TileCoord,
        last_checked: i64,
        last_update: i64,
        etag: &str,
    ) -> AppResult<()> {
        match self
            .tiles
            .mark_checked(coord, last_checked, last_update, etag)
            .await
        {
            Err(error) if error.is_transient() => {
                debug!(%coord, %error, "store busy, retrying once");
                self.tiles
                    .mark_checked(coord, last_checked, last_update, etag)
                    .await
            }
            other => other,
        }
    }
}

#[async_trait::async_trait]
impl MonitorUseCase for WatchService {
    async fn start(&mut self) -> AppResult<()> {
        self.scheduler.start().await?;
        self.sync_projects().await?;
        info!(
            num_queues = self.scheduler.num_queues(),
            projects = self.sync.tracked_len(),
            "monitor started"
        );
        Ok(())
    }

    #[instrument(skip(self))]
    async fn sync_projects(&mut self) -> AppResult<()> {
        let loaded = self.sync.sync(&self.diff).await?;
        if loaded > 0 {
            info!(loaded, "project sync loaded files");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn poll_once(&mut self) -> AppResult<PollOutcome> {
        let Some(tile) = self.scheduler.select_next_tile().await? else {
            return Ok(PollOutcome::Idle);
        };

        let outcome = self.poller.check_tile(tile.coord).await?;
        let now = unix_now();
        let mut projects_diffed = 0usize;

        match &outcome {
            FetchOutcome::Unavailable => {
                // No state advances; the tile stays due for its queue.
            }
            FetchOutcome::Unchanged { etag } => {
                self.mark_checked_retrying(tile.coord, now, tile.last_update, etag)
                    .await?;
            }
            FetchOutcome::Changed { etag } => {
                // The tile row must be visible before any diff runs.
                self.mark_checked_retrying(tile.coord, now, now, etag).await?;
                for project in self.projects.projects_overlapping(tile.coord).await? {
                    // Same store-error policy as the tile row write: one
                    // retry on contention, fatal errors abort the
                    // iteration and surface to the loop.
                    self.diff.run_diff_retrying(&project, Some(tile.coord)).await?;
                    projects_diffed += 1;
                }
            }
        }

        Ok(PollOutcome::Polled {
            coord: tile.coord,
            outcome,
            projects_diffed,
        })
    }
}
