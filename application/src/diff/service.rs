use tracing::{debug, info, instrument};

use domain::geometry::TileCoord;
use domain::history::{DiffStatus, HistoryChange};
use domain::image::IndexedImage;
use domain::palette::TRANSPARENT;
use domain::project::{ProjectMetadata, ProjectRecord};

use crate::clock::unix_now;
use crate::error::AppResult;
use crate::ports::outgoing::history_store::DynHistoryStorePort;
use crate::ports::outgoing::metadata_store::DynMetadataStorePort;
use crate::ports::outgoing::project_source::DynProjectSourcePort;
use crate::ports::outgoing::project_store::DynProjectStorePort;
use crate::ports::outgoing::snapshot_store::DynSnapshotStorePort;
use crate::stitch::service::Stitcher;

/// Counters from one diff run.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffReport {
    pub status: DiffStatus,
    pub num_remaining: i64,
    pub num_target: i64,
    pub completion_percent: f64,
    pub progress_pixels: i64,
    pub regress_pixels: i64,
    pub history_written: bool,
}

/// Compares a project's target against the stitched live canvas,
/// attributing per-pixel progress and regress between runs via the stored
/// snapshot, and maintains the project's rolling aggregates and history.
pub struct DiffEngine {
    source: DynProjectSourcePort,
    stitcher: Stitcher,
    snapshots: DynSnapshotStorePort,
    metadata: DynMetadataStorePort,
    projects: DynProjectStorePort,
    history: DynHistoryStorePort,
}

struct PixelCounts {
    num_target: i64,
    num_remaining: i64,
    progress: i64,
    regress: i64,
}

impl DiffEngine {
    #[must_use]
    pub fn new(
        source: DynProjectSourcePort,
        stitcher: Stitcher,
        snapshots: DynSnapshotStorePort,
        metadata: DynMetadataStorePort,
        projects: DynProjectStorePort,
        history: DynHistoryStorePort,
    ) -> Self {
        Self {
            source,
            stitcher,
            snapshots,
            metadata,
            projects,
            history,
        }
    }

    /// [`Self::run_diff`] with the store-error policy applied: transient
    /// contention is retried once, everything else surfaces to the caller.
    /// A retry after a partially persisted run is safe because the second
    /// pass observes the stored snapshot and emits no duplicate history.
    pub async fn run_diff_retrying(
        &self,
        project: &ProjectRecord,
        changed_tile: Option<TileCoord>,
    ) -> AppResult<DiffReport> {
        match self.run_diff(project, changed_tile).await {
            Err(error) if error.is_transient() => {
                debug!(name = %project.name, %error, "store busy during diff, retrying once");
                self.run_diff(project, changed_tile).await
            }
            other => other,
        }
    }

    /// Runs one incremental diff for `project`. `changed_tile` names the
    /// tile whose change triggered this run, if any.
    #[instrument(skip(self, project), fields(project = %project.name))]
    pub async fn run_diff(
        &self,
        project: &ProjectRecord,
        changed_tile: Option<TileCoord>,
    ) -> AppResult<DiffReport> {
        let rect = project.rect();
        let target = self.source.open_target(project.owner_id, &project.name).await?;
        let stitched = self.stitcher.stitch(rect).await?;
        let current = stitched.image;
        let now = unix_now();

        let mut meta = match self.metadata.load(project.owner_id, &project.name).await? {
            Some(meta) => meta,
            None => {
                let mut fresh = ProjectMetadata::from_rect(rect, &project.name, now);
                fresh.first_seen = project.first_seen;
                fresh
            }
        };
        meta.last_check = now;
        meta.has_missing_tiles = stitched.has_missing_tiles;

        let prev = self.load_snapshot(project, &current).await;
        let counts = count_pixels(&target, &current, prev.as_ref());

        let num_target = counts.num_target.max(1);
        #[allow(clippy::cast_precision_loss)]
        let completion_percent =
            100.0 * (1.0 - counts.num_remaining as f64 / num_target as f64);
        let status = if counts.num_remaining == 0 {
            DiffStatus::Complete
        } else {
            DiffStatus::InProgress
        };
        let report = DiffReport {
            status,
            num_remaining: counts.num_remaining,
            num_target,
            completion_percent,
            progress_pixels: counts.progress,
            regress_pixels: counts.regress,
            history_written: false,
        };

        // Canvas identical to the last observation: nothing to attribute,
        // nothing to record.
        if prev.as_ref() == Some(&current) {
            meta.prune_old_updates();
            self.persist(project, &meta).await?;
            return Ok(report);
        }

        // First observation already matching the target counts as not yet
        // started: baseline the snapshot but emit no history.
        if prev.is_none() && current == target {
            self.snapshots
                .store(project.owner_id, &project.name, &current)
                .await?;
            meta.last_snapshot = now;
            meta.prune_old_updates();
            self.persist(project, &meta).await?;
            debug!("target already present on first observation, baseline only");
            return Ok(report);
        }

        meta.total_progress += counts.progress;
        meta.total_regress += counts.regress;
        meta.largest_regress_pixels = meta.largest_regress_pixels.max(counts.regress);
        if meta.max_completion_pixels == 0 || counts.num_remaining < meta.max_completion_pixels {
            meta.max_completion_pixels = counts.num_remaining;
            meta.max_completion_percent = completion_percent;
            meta.max_completion_time = now;
        }
        if let Some(tile) = changed_tile {
            meta.record_tile_update(tile, now);
        }
        meta.prune_old_updates();

        self.snapshots
            .store(project.owner_id, &project.name, &current)
            .await?;
        meta.last_snapshot = now;

        let change = HistoryChange {
            timestamp: now,
            status,
            num_remaining: counts.num_remaining,
            num_target,
            completion_percent,
            progress_pixels: counts.progress,
            regress_pixels: counts.regress,
        };
        self.history.append(project.id, &change).await?;
        self.persist(project, &meta).await?;

        match status {
            DiffStatus::Complete => info!("complete"),
            DiffStatus::InProgress => info!(
                remaining = counts.num_remaining,
                percent = format!("{completion_percent:.2}"),
                progress = counts.progress,
                regress = counts.regress,
                "diff recorded"
            ),
        }

        Ok(DiffReport {
            history_written: true,
            ..report
        })
    }

    /// Loads the prior snapshot, discarding anything unreadable or of the
    /// wrong dimensions.
    async fn load_snapshot(
        &self,
        project: &ProjectRecord,
        current: &IndexedImage,
    ) -> Option<IndexedImage> {
        match self.snapshots.load(project.owner_id, &project.name).await {
            Ok(Some(prev)) if prev.size() == current.size() => Some(prev),
            Ok(Some(_)) => {
                debug!("snapshot has stale dimensions, treating as no prior");
                None
            }
            Ok(None) => None,
            Err(error) => {
                debug!(%error, "snapshot unreadable, treating as no prior");
                None
            }
        }
    }

    async fn persist(&self, project: &ProjectRecord, meta: &ProjectMetadata) -> AppResult<()> {
        self.metadata
            .store(project.owner_id, &project.name, meta)
            .await?;
        let mut record = project.clone();
        meta.apply_to_record(&mut record);
        self.projects.update_aggregates(&record).await
    }
}

/// Walks every target-relevant pixel once, accumulating remaining count
/// and snapshot-attributed progress/regress.
fn count_pixels(
    target: &IndexedImage,
    current: &IndexedImage,
    prev: Option<&IndexedImage>,
) -> PixelCounts {
    let prev_bytes = prev.map(IndexedImage::as_bytes);
    let mut counts = PixelCounts {
        num_target: 0,
        num_remaining: 0,
        progress: 0,
        regress: 0,
    };

    for (i, (&t, &c)) in target
        .as_bytes()
        .iter()
        .zip(current.as_bytes())
        .enumerate()
    {
        if t == TRANSPARENT {
            continue;
        }
        counts.num_target += 1;
        if c != t {
            counts.num_remaining += 1;
        }
        if let Some(p) = prev_bytes.and_then(|bytes| bytes.get(i)).copied() {
            if p == t && c != t {
                counts.regress += 1;
            }
            if p != t && c == t {
                counts.progress += 1;
            }
        }
    }
    counts
}
