use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use domain::error::DomainError;
use domain::geometry::PixelRect;
use domain::project::ProjectRecord;

use crate::clock::unix_now;
use crate::diff::service::DiffEngine;
use crate::error::{AppError, AppResult};
use crate::ports::outgoing::project_source::{DynProjectSourcePort, ProjectFile};
use crate::ports::outgoing::project_store::{DynProjectStorePort, NewProject};
use crate::ports::outgoing::tile_store::DynTileStorePort;

/// A project currently tracked in memory, keyed by source path for cheap
/// modification checks between cycles.
#[derive(Debug, Clone)]
struct TrackedProject {
    id: i64,
    owner_id: i64,
    name: String,
    mtime: i64,
}

/// Reconciles the project directory against the store: new and modified
/// target images become active projects with tile links and burning tile
/// rows; removed files deactivate their project and orphaned tiles.
pub struct ProjectSyncService {
    source: DynProjectSourcePort,
    projects: DynProjectStorePort,
    tiles: DynTileStorePort,
    tracked: HashMap<PathBuf, TrackedProject>,
}

impl ProjectSyncService {
    #[must_use]
    pub fn new(
        source: DynProjectSourcePort,
        projects: DynProjectStorePort,
        tiles: DynTileStorePort,
    ) -> Self {
        Self {
            source,
            projects,
            tiles,
            tracked: HashMap::new(),
        }
    }

    /// One reconciliation pass. Returns how many files were loaded or
    /// reloaded; each of those got an initial diff.
    #[instrument(skip(self, diff))]
    pub async fn sync(&mut self, diff: &DiffEngine) -> AppResult<usize> {
        let files = self.source.scan().await?;
        let on_disk: HashMap<PathBuf, ProjectFile> =
            files.into_iter().map(|f| (f.path.clone(), f)).collect();

        let removed: Vec<PathBuf> = self
            .tracked
            .keys()
            .filter(|path| !on_disk.contains_key(*path))
            .cloned()
            .collect();
        for path in removed {
            self.forget(&path).await?;
        }

        let mut loaded = 0usize;
        for (path, file) in &on_disk {
            let modified = match self.tracked.get(path) {
                Some(tracked) => tracked.mtime != file.mtime,
                None => true,
            };
            if !modified {
                continue;
            }
            match self.load(file).await {
                Ok(Some(record)) => {
                    loaded += 1;
                    // Store errors under the initial diff follow the same
                    // policy as every other store call on this path: one
                    // retry on contention, fatal errors surface.
                    diff.run_diff_retrying(&record, None).await?;
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(path = %path.display(), %error, "project load failed");
                }
            }
        }
        Ok(loaded)
    }

    /// Drops a project whose source file disappeared. The row and history
    /// stay for the record; only the links and activity go away.
    async fn forget(&mut self, path: &Path) -> AppResult<()> {
        let Some(tracked) = self.tracked.remove(path) else {
            return Ok(());
        };
        self.projects.mark_inactive(tracked.id).await?;
        self.projects.replace_tile_links(tracked.id, &[]).await?;
        let deactivated = self.tiles.deactivate_orphan_tiles().await?;
        info!(
            name = %tracked.name,
            owner = tracked.owner_id,
            deactivated_tiles = deactivated,
            "forgot project"
        );
        Ok(())
    }

    /// Validates and registers one project file. Returns `None` when the
    /// file was rejected.
    async fn load(&mut self, file: &ProjectFile) -> AppResult<Option<ProjectRecord>> {
        let image = match self.source.open_target(file.owner_id, &file.name).await {
            Ok(image) => image,
            Err(AppError::Domain(DomainError::ColorNotInPalette(colors))) => {
                warn!(name = %file.name, colors, "colors not in palette, rejecting");
                self.source.reject(&file.path).await?;
                return Ok(None);
            }
            Err(AppError::CodecError { message }) => {
                warn!(name = %file.name, reason = %message, "image unreadable, rejecting");
                self.source.reject(&file.path).await?;
                return Ok(None);
            }
            Err(other) => return Err(other),
        };

        let rect = PixelRect::from_origin_size(file.origin, image.size());
        if let Err(error) = rect.validate_in_canvas() {
            warn!(name = %file.name, %error, "rejecting out-of-bounds project");
            self.source.reject(&file.path).await?;
            return Ok(None);
        }

        let now = unix_now();
        let origin = rect.origin();
        let size = rect.size();
        let id = self
            .projects
            .upsert_project(&NewProject {
                owner_id: file.owner_id,
                name: file.name.clone(),
                x: origin.x,
                y: origin.y,
                width: size.w,
                height: size.h,
                first_seen: now,
            })
            .await?;

        let tiles = rect.tiles();
        self.tiles.insert_burning(&tiles).await?;
        self.projects.replace_tile_links(id, &tiles).await?;

        self.tracked.insert(
            file.path.clone(),
            TrackedProject {
                id,
                owner_id: file.owner_id,
                name: file.name.clone(),
                mtime: file.mtime,
            },
        );

        let record = self
            .projects
            .get_project(id)
            .await?
            .ok_or_else(|| AppError::DatabaseError {
                message: format!("project {id} vanished after upsert"),
            })?;
        info!(name = %file.name, owner = file.owner_id, rect = %rect, "loaded project");
        Ok(Some(record))
    }

    /// Number of projects currently tracked in memory.
    #[must_use]
    pub fn tracked_len(&self) -> usize {
        self.tracked.len()
    }
}
