use std::path::{Path, PathBuf};
use std::sync::Arc;

use domain::geometry::Point;
use domain::image::IndexedImage;

use crate::error::AppResult;

/// A candidate project file discovered in the project directory. The
/// placement comes from the trailing `{tx}_{ty}_{px}_{py}` coordinates in
/// the file name; `-`, `_`, and space all work as separators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFile {
    pub owner_id: i64,
    /// File stem; `(owner_id, name)` is the project identity.
    pub name: String,
    pub path: PathBuf,
    pub mtime: i64,
    pub origin: Point,
}

/// On-disk discovery of project target images. Files live either directly
/// in the project directory (owner 0) or inside numeric per-owner
/// subdirectories.
#[async_trait::async_trait]
pub trait ProjectSourcePort: Send + Sync {
    /// All files whose names carry valid placement coordinates, sorted by
    /// path. Files without coordinates are ignored, not rejected.
    async fn scan(&self) -> AppResult<Vec<ProjectFile>>;

    /// Opens and canonicalizes the target image for a project. Fails with
    /// `ColorNotInPalette` for images using foreign colors.
    async fn open_target(&self, owner_id: i64, name: &str) -> AppResult<IndexedImage>;

    /// Moves an invalid file into the rejected directory.
    async fn reject(&self, path: &Path) -> AppResult<()>;
}

pub type DynProjectSourcePort = Arc<dyn ProjectSourcePort>;
