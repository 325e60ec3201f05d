use std::sync::Arc;

use tracing::{info, instrument, warn};

use domain::geometry::PixelRect;
use domain::history::{DiffStatus, HistoryChange};
use domain::image::IndexedImage;
use domain::palette::TRANSPARENT;
use domain::project::ProjectRecord;
use domain::tile::TileRecord;

use crate::error::AppResult;
use crate::ports::incoming::monitor::{RebuildSummary, RebuildUseCase};
use crate::ports::outgoing::history_store::DynHistoryStorePort;
use crate::ports::outgoing::project_source::DynProjectSourcePort;
use crate::ports::outgoing::project_store::{DynProjectStorePort, NewProject};
use crate::ports::outgoing::snapshot_store::DynSnapshotStorePort;
use crate::ports::outgoing::tile_cache::DynTileCachePort;
use crate::ports::outgoing::tile_store::DynTileStorePort;
use crate::stitch::service::Stitcher;

/// Reconstructs the database from filesystem artifacts: project rows from
/// target images, tile rows from cache file mtimes, links from rectangles,
/// and a single inferred history record per project that shows completed
/// pixels. ETags and heat assignments are gone for good; every recovered
/// tile restarts as burning. Safe to re-run on an existing database.
pub struct RebuildService {
    source: DynProjectSourcePort,
    cache: DynTileCachePort,
    snapshots: DynSnapshotStorePort,
    stitcher: Stitcher,
    tiles: DynTileStorePort,
    projects: DynProjectStorePort,
    history: DynHistoryStorePort,
}

impl RebuildService {
    #[must_use]
    pub fn new(
        source: DynProjectSourcePort,
        cache: DynTileCachePort,
        snapshots: DynSnapshotStorePort,
        tiles: DynTileStorePort,
        projects: DynProjectStorePort,
        history: DynHistoryStorePort,
    ) -> Self {
        let stitcher = Stitcher::new(Arc::clone(&cache));
        Self {
            source,
            cache,
            snapshots,
            stitcher,
            tiles,
            projects,
            history,
        }
    }

    async fn rebuild_projects(&self, summary: &mut RebuildSummary) -> AppResult<()> {
        for file in self.source.scan().await? {
            if self
                .projects
                .find_by_source(file.owner_id, &file.name)
                .await?
                .is_some()
            {
                continue;
            }
            let image = match self.source.open_target(file.owner_id, &file.name).await {
                Ok(image) => image,
                Err(error) => {
                    warn!(name = %file.name, %error, "skipping unreadable project file");
                    continue;
                }
            };
            let rect = PixelRect::from_origin_size(file.origin, image.size());
            if let Err(error) = rect.validate_in_canvas() {
                warn!(name = %file.name, %error, "skipping out-of-bounds project file");
                continue;
            }
            let origin = rect.origin();
            let size = rect.size();
            self.projects
                .upsert_project(&NewProject {
                    owner_id: file.owner_id,
                    name: file.name.clone(),
                    x: origin.x,
                    y: origin.y,
                    width: size.w,
                    height: size.h,
                    first_seen: file.mtime,
                })
                .await?;
            summary.projects_created += 1;
            info!(owner = file.owner_id, name = %file.name, "recovered project");
        }
        Ok(())
    }

    async fn rebuild_tiles(&self, summary: &mut RebuildSummary) -> AppResult<()> {
        for (coord, mtime) in self.cache.list().await? {
            let mut record = TileRecord::burning(coord);
            record.last_checked = mtime;
            if self.tiles.upsert_tile(&record).await? {
                summary.tiles_created += 1;
            }
        }
        Ok(())
    }

    async fn rebuild_links(&self, summary: &mut RebuildSummary) -> AppResult<()> {
        for project in self.projects.active_projects().await? {
            let tiles = project.tiles();
            self.tiles.insert_burning(&tiles).await?;
            self.projects.replace_tile_links(project.id, &tiles).await?;
            summary.links_created += tiles.len() as u64;
        }
        Ok(())
    }

    /// Recovers one coarse history row per project from the snapshot, or
    /// from a full stitch when every covering tile is cached. Projects
    /// with no completed pixels stay historyless.
    async fn infer_history(&self, summary: &mut RebuildSummary) -> AppResult<()> {
        for project in self.projects.active_projects().await? {
            if self.history.latest(project.id).await?.is_some() {
                continue;
            }
            let target = match self.source.open_target(project.owner_id, &project.name).await {
                Ok(target) => target,
                Err(error) => {
                    warn!(name = %project.name, %error, "cannot reopen target, skipping history");
                    continue;
                }
            };
            let Some((canvas, timestamp)) = self.recover_canvas(&project).await? else {
                continue;
            };

            let mut num_target = 0i64;
            let mut num_remaining = 0i64;
            for (&t, &c) in target.as_bytes().iter().zip(canvas.as_bytes()) {
                if t == TRANSPARENT {
                    continue;
                }
                num_target += 1;
                if c != t {
                    num_remaining += 1;
                }
            }
            let num_target = num_target.max(1);
            if num_remaining >= num_target {
                continue;
            }

            let completed = num_target - num_remaining;
            #[allow(clippy::cast_precision_loss)]
            let percent = 100.0 - (num_remaining as f64 * 100.0 / num_target as f64);
            let status = if num_remaining == 0 {
                DiffStatus::Complete
            } else {
                DiffStatus::InProgress
            };

            self.history
                .append(
                    project.id,
                    &HistoryChange {
                        timestamp,
                        status,
                        num_remaining,
                        num_target,
                        completion_percent: percent,
                        progress_pixels: completed,
                        regress_pixels: 0,
                    },
                )
                .await?;

            let mut record = project.clone();
            record.max_completion_pixels = num_remaining;
            record.max_completion_percent = percent;
            record.max_completion_time = timestamp;
            record.total_progress = completed;
            self.projects.update_aggregates(&record).await?;

            summary.history_inferred += 1;
            info!(name = %project.name, percent = format!("{percent:.1}"), "inferred history");
        }
        Ok(())
    }

    /// The most trustworthy view of the canvas under a project: its
    /// snapshot if present, else a stitch when no tile is missing.
    async fn recover_canvas(
        &self,
        project: &ProjectRecord,
    ) -> AppResult<Option<(IndexedImage, i64)>> {
        match self.snapshots.load(project.owner_id, &project.name).await {
            Ok(Some(snapshot)) => {
                let timestamp = self
                    .snapshots
                    .modified_at(project.owner_id, &project.name)
                    .await?
                    .unwrap_or(project.last_check);
                return Ok(Some((snapshot, timestamp)));
            }
            Ok(None) => {}
            Err(error) => {
                warn!(name = %project.name, %error, "snapshot unreadable during rebuild");
            }
        }

        for tile in project.tiles() {
            if !self.cache.contains(tile).await? {
                return Ok(None);
            }
        }
        let stitched = self.stitcher.stitch(project.rect()).await?;
        Ok(Some((stitched.image, project.last_check)))
    }
}

#[async_trait::async_trait]
impl RebuildUseCase for RebuildService {
    #[instrument(skip(self))]
    async fn rebuild(&self) -> AppResult<RebuildSummary> {
        let mut summary = RebuildSummary::default();
        self.rebuild_projects(&mut summary).await?;
        self.rebuild_tiles(&mut summary).await?;
        self.rebuild_links(&mut summary).await?;
        self.infer_history(&mut summary).await?;
        info!(
            projects = summary.projects_created,
            tiles = summary.tiles_created,
            links = summary.links_created,
            history = summary.history_inferred,
            "rebuild complete"
        );
        Ok(summary)
    }
}
